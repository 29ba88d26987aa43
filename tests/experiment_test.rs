//! Tests for building, querying and editing experiments

use std::collections::BTreeMap;

use experimentator::application::{DesignTreeSpec, ExperimentSpec};
use experimentator::domain::{
    condition, full_cross, Condition, Design, DesignTree, DomainError, IndependentVariable, Level,
    Ordering, RunState, SortOrder, Value, COUNTERBALANCE_IV, SORTED_IV,
};
use experimentator::util::testing::{init_test_setup, seeded_rng};
use experimentator::{ApplicationError, Experiment, Settings};

fn iv<V: Into<Value> + Clone>(name: &str, values: &[V]) -> IndependentVariable {
    IndependentVariable::discrete(name, values.iter().cloned())
}

#[test]
fn given_tree_when_reading_leaf_conditions_then_exactly_declared_assignments() {
    // Arrange
    init_test_setup();
    let session_ivs = vec![iv("day", &["mon", "tue"])];
    let trial_ivs = vec![iv("speed", &[1, 2, 3]), iv("size", &[15, 30])];
    let tree = DesignTree::new(vec![
        Level::new("session", Design::new(session_ivs.clone())),
        Level::new("trial", Design::new(trial_ivs.clone())),
    ]);

    // Act
    let experiment = Experiment::new(tree, &mut seeded_rng(3)).unwrap();

    // Assert
    let expected: Vec<Condition> = full_cross(&[session_ivs, trial_ivs].concat());
    let mut leaves: Vec<Condition> = experiment
        .leaves()
        .into_iter()
        .map(|leaf| experiment.sections().merged_condition(leaf))
        .collect();
    leaves.sort();
    let mut expected_sorted = expected;
    expected_sorted.sort();
    assert_eq!(leaves, expected_sorted);
}

#[test]
fn given_counterbalanced_blocks_when_building_then_sessions_share_orders_by_key() {
    // Arrange
    let tree = DesignTree::new(vec![
        Level::new(
            "participant",
            Design::default().with_ordering(Ordering::shuffle(2)),
        ),
        Level::new("session", Design::default()),
        Level::new(
            "block",
            Design::new(vec![iv("task", &["a", "b"])])
                .with_ordering(Ordering::complete_counterbalance(1)),
        ),
    ]);

    // Act
    let experiment = Experiment::new(tree, &mut seeded_rng(9)).unwrap();

    // Assert
    let mut orders: BTreeMap<Value, Vec<Vec<Value>>> = BTreeMap::new();
    for session in experiment.all_subsections(Some("session"), &Condition::new()) {
        let key = experiment.value(session, COUNTERBALANCE_IV).unwrap();
        let order = experiment
            .children(session)
            .iter()
            .map(|&b| experiment.value(b, "task").unwrap())
            .collect();
        orders.entry(key).or_default().push(order);
    }
    assert_eq!(orders.len(), 2);
    for sessions in orders.values() {
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0], sessions[1]);
    }
    let distinct: Vec<&Vec<Value>> = orders.values().map(|s| &s[0]).collect();
    assert_ne!(distinct[0], distinct[1]);
}

#[test]
fn given_heterogeneous_tree_when_reading_missing_iv_then_malformed_branch_detected() {
    // Arrange
    let tree = DesignTree::new(vec![Level::new(
        "participant",
        Design::new(vec![iv("design", &["main_a", "main_b"])]).with_ordering(Ordering::fixed(1)),
    )])
    .with_subtree(
        "main_a",
        vec![Level::new("trial", Design::new(vec![iv("difficulty", &[1, 2])]))],
    )
    .with_subtree(
        "main_b",
        vec![
            Level::new("block", Design::new(vec![iv("hand", &["l", "r"])])),
            Level::new("trial", Design::new(vec![iv("speed", &[1])])),
        ],
    );

    // Act
    let experiment = Experiment::new(tree, &mut seeded_rng(1)).unwrap();

    // Assert
    let a = experiment.subsection(&[("participant", 1)]).unwrap();
    let b = experiment.subsection(&[("participant", 2)]).unwrap();
    assert_eq!(experiment.data(experiment.children(a)[0]).unwrap().level, "trial");
    assert_eq!(experiment.data(experiment.children(b)[0]).unwrap().level, "block");
    let leaf_b = experiment
        .subsection(&[("participant", 2), ("block", 1), ("trial", 1)])
        .unwrap();
    assert!(matches!(
        experiment.value(leaf_b, "difficulty"),
        Err(ApplicationError::Domain(DomainError::MissingVariable { .. }))
    ));
}

#[test]
fn given_spec_error_when_building_then_no_experiment_returned() {
    let tree = DesignTree::new(vec![
        Level::new("session", Design::default()),
        Level::new(
            "trial",
            Design::new(vec![iv("x", &[1, 2, 3])]).with_ordering(Ordering::latin_square(1)),
        ),
    ]);

    let result = Experiment::new(tree, &mut seeded_rng(1));

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::OddBalancedLatinSquare(3)))
    ));
}

#[test]
fn given_experiment_when_adding_participant_then_rest_untouched() {
    // Arrange
    let trial = Design::new(vec![iv("speed", &[1, 2]), iv("side", &["l", "r"])]);
    let mut experiment = Experiment::within_subjects(trial, 2, &mut seeded_rng(5)).unwrap();
    let before: Vec<Condition> = experiment
        .leaves()
        .into_iter()
        .map(|l| experiment.context(l))
        .collect();
    let root = experiment.root().unwrap();

    // Act
    let added = experiment
        .add_section(root, &Condition::new(), None, &mut seeded_rng(6))
        .unwrap();

    // Assert
    assert_eq!(experiment.data(added).unwrap().number, 3);
    assert_eq!(experiment.children(added).len(), 4);
    let after: Vec<Condition> = experiment
        .leaves()
        .into_iter()
        .take(before.len())
        .map(|l| experiment.context(l))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn given_pinned_and_unpinned_ivs_when_adding_trial_then_values_are_declared() {
    let trial = Design::new(vec![iv("speed", &[1, 2, 3]), iv("side", &["l", "r"])]);
    let mut experiment = Experiment::within_subjects(trial, 1, &mut seeded_rng(5)).unwrap();
    let participant = experiment.subsection(&[("participant", 1)]).unwrap();

    for seed in 0..20 {
        let added = experiment
            .add_section(participant, &condition([("side", "r")]), Some(1), &mut seeded_rng(seed))
            .unwrap();

        let data = experiment.data(added).unwrap();
        assert_eq!(data.condition["side"], Value::from("r"));
        assert!([1, 2, 3].map(Value::from).contains(&data.condition["speed"]));
    }
    assert_eq!(experiment.children(participant).len(), 26);
}

#[test]
fn given_pinned_value_outside_declared_set_when_adding_then_rejected_and_unchanged() {
    let trial = Design::new(vec![iv("speed", &[1, 2, 3])]);
    let mut experiment = Experiment::within_subjects(trial, 1, &mut seeded_rng(5)).unwrap();
    let participant = experiment.subsection(&[("participant", 1)]).unwrap();
    let before = experiment.sections().len();

    let result = experiment.add_section(participant, &condition([("speed", 4)]), None, &mut seeded_rng(0));

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::InvalidPinnedValue { .. }))
    ));
    assert_eq!(experiment.sections().len(), before);
}

#[test]
fn given_section_removed_when_reindexing_then_numbers_close_gap() {
    let trial = Design::new(vec![iv("speed", &[1, 2, 3])]);
    let mut experiment = Experiment::within_subjects(trial, 3, &mut seeded_rng(5)).unwrap();
    let second = experiment.subsection(&[("participant", 2)]).unwrap();

    experiment.remove_section(second).unwrap();

    let index = experiment.section_index();
    let participants: Vec<usize> = index
        .keys()
        .filter(|path| path.len() == 1)
        .map(|path| path[0].1)
        .collect();
    assert_eq!(participants, vec![1, 2]);
    assert_eq!(experiment.leaves().len(), 6);
}

#[test]
fn given_root_section_when_removing_then_rejected_and_experiment_usable() {
    let trial = Design::new(vec![iv("speed", &[1, 2])]);
    let mut experiment = Experiment::within_subjects(trial, 2, &mut seeded_rng(5)).unwrap();
    let root = experiment.root().unwrap();
    let before = experiment.render().unwrap();

    let result = experiment.remove_section(root);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::CannotRemoveRoot))
    ));
    assert_eq!(experiment.root().unwrap(), root);
    assert_eq!(experiment.render().unwrap(), before);
    assert!(experiment.subsection(&[("participant", 2), ("trial", 2)]).is_ok());
}

#[test]
fn given_sort_both_on_mixed_numbers_when_building_then_parents_split_by_direction() {
    // Arrange
    let tree = DesignTree::new(vec![
        Level::new("session", Design::default().with_ordering(Ordering::fixed(2))),
        Level::new(
            "trial",
            Design::new(vec![IndependentVariable::discrete(
                "speed",
                [Value::from(2), Value::from(0.5), Value::from(1), Value::from(1.5)],
            )])
            .with_ordering(Ordering::sorted(1, SortOrder::Both)),
        ),
    ]);

    // Act
    let experiment = Experiment::new(tree, &mut seeded_rng(4)).unwrap();

    // Assert
    let sessions = experiment.all_subsections(Some("session"), &Condition::new());
    assert_eq!(sessions.len(), 4);
    let mut directions = BTreeMap::new();
    for session in sessions {
        let direction = experiment.value(session, SORTED_IV).unwrap();
        let speeds: Vec<Value> = experiment
            .children(session)
            .iter()
            .map(|&t| experiment.value(t, "speed").unwrap())
            .collect();
        let expected: Vec<Value> = if direction == Value::from("ascending") {
            vec![Value::from(0.5), Value::from(1), Value::from(1.5), Value::from(2)]
        } else {
            vec![Value::from(2), Value::from(1.5), Value::from(1), Value::from(0.5)]
        };
        assert_eq!(speeds, expected, "{direction}");
        *directions.entry(direction).or_insert(0) += 1;
    }
    assert_eq!(
        directions,
        BTreeMap::from([(Value::from("ascending"), 2), (Value::from("descending"), 2)])
    );
}

#[test]
fn given_all_trials_finished_when_marking_then_participant_finished() {
    let trial = Design::new(vec![iv("speed", &[1, 2])]);
    let mut experiment = Experiment::within_subjects(trial, 2, &mut seeded_rng(5)).unwrap();
    let participant = experiment.subsection(&[("participant", 1)]).unwrap();

    for t in experiment.children(participant).to_vec() {
        experiment.mark_started(t).unwrap();
        experiment.mark_finished(t).unwrap();
    }

    assert_eq!(experiment.data(participant).unwrap().state, RunState::Finished);
    assert_eq!(
        experiment.find_first_not_run("participant"),
        Some(experiment.subsection(&[("participant", 2)]).unwrap())
    );
}

#[test]
fn given_json_spec_when_building_then_structure_matches() {
    // Arrange
    let spec: ExperimentSpec = serde_json::from_str(
        r#"{
            "seed": 11,
            "design": [
                {"name": "participant", "ordering": "Shuffle", "n": 2},
                {"name": "block", "ivs": {"hand": ["left", "right"]}, "order": "Ordering"},
                {"name": "trial", "ivs": {"speed": [1, 2, 3]}, "ordering": ["Shuffle", 2], "practice": false}
            ]
        }"#,
    )
    .unwrap();

    // Act
    let experiment = Experiment::from_spec(&spec, &Settings::default()).unwrap();

    // Assert
    assert_eq!(experiment.leaves().len(), 2 * 2 * 6);
    let trial = experiment
        .subsection(&[("participant", 1), ("block", 2), ("trial", 6)])
        .unwrap();
    assert_eq!(experiment.value(trial, "hand").unwrap(), Value::from("right"));
    assert_eq!(experiment.value(trial, "practice").unwrap(), Value::from(false));
}

#[test]
fn given_same_seed_when_building_from_spec_twice_then_identical_trees() {
    let spec: DesignTreeSpec = serde_json::from_str(
        r#"[{"name": "trial", "ivs": {"a": [1, 2, 3, 4]}, "ordering": "Shuffle", "n": 3}]"#,
    )
    .unwrap();
    let settings = Settings {
        seed: Some(42),
        ..Settings::default()
    };

    let first = Experiment::from_design_spec(&spec, &settings).unwrap();
    let second = Experiment::from_design_spec(&spec, &settings).unwrap();

    assert_eq!(first.render().unwrap(), second.render().unwrap());
}

#[test]
fn given_built_experiment_when_serialized_then_round_trips() {
    // Arrange
    let tree = DesignTree::new(vec![
        Level::new("session", Design::default().with_ordering(Ordering::fixed(2))),
        Level::new(
            "block",
            Design::new(vec![iv("task", &["a", "b"])]).with_ordering(Ordering::latin_square(1)),
        ),
    ]);
    let mut experiment = Experiment::new(tree, &mut seeded_rng(8)).unwrap();
    let first = experiment.leaves()[0];
    experiment.mark_started(first).unwrap();

    // Act
    let json = serde_json::to_string(&experiment).unwrap();
    let restored: Experiment = serde_json::from_str(&json).unwrap();

    // Assert
    assert_eq!(restored.render().unwrap(), experiment.render().unwrap());
    assert_eq!(restored.tree(), experiment.tree());
    assert_eq!(restored.prepared(), experiment.prepared());
    assert_eq!(
        restored.find_first_partially_run("block"),
        experiment.find_first_partially_run("block")
    );
}
