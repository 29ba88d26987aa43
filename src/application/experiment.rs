//! Experiment facade: builds the section tree and answers queries on it.

use generational_arena::Index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::spec::{DesignTreeSpec, ExperimentSpec};
use crate::config::Settings;
use crate::domain::{
    Condition, Design, DesignTree, Level, Ordering, PreparedTree, RunState, SectionArena,
    SectionData, SectionPath, SectionTreeBuilder, Value,
};

/// A generated experiment: its design tree, the prepared designs and the
/// section hierarchy built from them.
///
/// Serializable as plain data so it can be saved and resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    tree: DesignTree,
    prepared: PreparedTree,
    sections: SectionArena,
}

impl Experiment {
    /// Prepare `tree` and build every section.
    #[instrument(level = "debug", skip(tree, rng), fields(entry = %tree.entry))]
    pub fn new<R: Rng + ?Sized>(tree: DesignTree, rng: &mut R) -> ApplicationResult<Self> {
        let prepared = tree.prepare(rng)?;
        let sections = SectionTreeBuilder::new(&prepared).build(rng)?;
        info!(sections = sections.len(), "experiment generated");
        Ok(Self {
            tree,
            prepared,
            sections,
        })
    }

    /// Build from a parsed design tree, using `settings` for the entry
    /// subtree, discriminator and seed.
    pub fn from_design_spec(spec: &DesignTreeSpec, settings: &Settings) -> ApplicationResult<Self> {
        let tree = spec.to_design_tree(&settings.entry, &settings.discriminator)?;
        Self::new(tree, &mut settings.rng())
    }

    /// Build from an experiment file; values set in the file override `settings`.
    pub fn from_spec(spec: &ExperimentSpec, settings: &Settings) -> ApplicationResult<Self> {
        let settings = Settings {
            seed: spec.seed.or(settings.seed),
            entry: spec.entry.clone().unwrap_or_else(|| settings.entry.clone()),
            discriminator: spec
                .discriminator
                .clone()
                .unwrap_or_else(|| settings.discriminator.clone()),
        };
        Self::from_design_spec(&spec.design, &settings)
    }

    /// Participants, each running every trial of `trial`.
    pub fn within_subjects<R: Rng + ?Sized>(
        trial: Design,
        participants: usize,
        rng: &mut R,
    ) -> ApplicationResult<Self> {
        let tree = DesignTree::new(vec![
            participant_level(participants),
            Level::new("trial", trial),
        ]);
        Self::new(tree, rng)
    }

    /// Participants, blocks and trials.
    pub fn blocked<R: Rng + ?Sized>(
        trial: Design,
        block: Design,
        participants: usize,
        rng: &mut R,
    ) -> ApplicationResult<Self> {
        let tree = DesignTree::new(vec![
            participant_level(participants),
            Level::new("block", block),
            Level::new("trial", trial),
        ]);
        Self::new(tree, rng)
    }

    /// Homogeneous experiment with one design per named level, top first.
    pub fn basic<R: Rng + ?Sized>(
        levels: impl IntoIterator<Item = (String, Design)>,
        rng: &mut R,
    ) -> ApplicationResult<Self> {
        let levels = levels
            .into_iter()
            .map(|(name, design)| Level::new(name, design))
            .collect();
        Self::new(DesignTree::new(levels), rng)
    }

    pub fn tree(&self) -> &DesignTree {
        &self.tree
    }

    pub fn prepared(&self) -> &PreparedTree {
        &self.prepared
    }

    pub fn sections(&self) -> &SectionArena {
        &self.sections
    }

    pub fn root(&self) -> ApplicationResult<Index> {
        self.sections
            .root()
            .ok_or_else(|| ApplicationError::spec("experiment has no root section"))
    }

    pub fn data(&self, idx: Index) -> ApplicationResult<&SectionData> {
        Ok(self.sections.data(idx)?)
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.sections.children(idx)
    }

    /// Section reached by `(level, number)` pairs from the root.
    pub fn subsection(&self, path: &[(&str, usize)]) -> ApplicationResult<Index> {
        Ok(self.sections.find(self.root()?, path)?)
    }

    /// Sections, optionally restricted to `level`, whose context holds
    /// every pair in `filter`. Level names act as keys for section numbers.
    pub fn all_subsections(&self, level: Option<&str>, filter: &Condition) -> Vec<Index> {
        self.sections
            .iter()
            .filter(|(_, node)| level.map_or(true, |l| node.data.level == l))
            .map(|(idx, _)| idx)
            .filter(|&idx| {
                let context = self.sections.context(idx);
                filter.iter().all(|(k, v)| context.get(k) == Some(v))
            })
            .collect()
    }

    /// Pre-order traversal of the subtree at `idx`.
    pub fn walk(&self, idx: Index) -> Vec<Index> {
        self.sections.walk(idx).map(|(i, _)| i).collect()
    }

    pub fn parents(&self, idx: Index) -> Vec<Index> {
        self.sections.parents(idx)
    }

    pub fn leaves(&self) -> Vec<Index> {
        self.sections.leaves()
    }

    /// Merged view handed to run callbacks.
    pub fn context(&self, idx: Index) -> Condition {
        self.sections.context(idx)
    }

    pub fn value(&self, idx: Index, name: &str) -> ApplicationResult<Value> {
        Ok(self.sections.value(idx, name)?)
    }

    pub fn section_index(&self) -> std::collections::BTreeMap<SectionPath, Index> {
        self.sections.section_index()
    }

    pub fn find_first_not_run(&self, level: &str) -> Option<Index> {
        self.sections.find_first(level, RunState::NotStarted)
    }

    pub fn find_first_partially_run(&self, level: &str) -> Option<Index> {
        self.sections.find_first(level, RunState::Partial)
    }

    pub fn mark_started(&mut self, idx: Index) -> ApplicationResult<()> {
        Ok(self.sections.mark_started(idx)?)
    }

    pub fn mark_finished(&mut self, idx: Index) -> ApplicationResult<()> {
        Ok(self.sections.mark_finished(idx)?)
    }

    pub fn add_data(&mut self, idx: Index, data: Condition) -> ApplicationResult<()> {
        Ok(self.sections.add_data(idx, data)?)
    }

    /// Insert a new child of `parent`; see [`SectionTreeBuilder::add_section`].
    #[instrument(level = "debug", skip(self, rng))]
    pub fn add_section<R: Rng + ?Sized>(
        &mut self,
        parent: Index,
        pinned: &Condition,
        position: Option<usize>,
        rng: &mut R,
    ) -> ApplicationResult<Index> {
        let builder = SectionTreeBuilder::new(&self.prepared);
        Ok(builder.add_section(&mut self.sections, parent, pinned, position, rng)?)
    }

    /// Remove a section with its descendants; later siblings move up one number.
    pub fn remove_section(&mut self, idx: Index) -> ApplicationResult<SectionData> {
        Ok(self.sections.remove_subtree(idx)?)
    }

    /// Text tree of every section.
    pub fn render(&self) -> ApplicationResult<String> {
        Ok(self.sections.render(self.root()?).to_string())
    }
}

fn participant_level(participants: usize) -> Level {
    Level::new(
        "participant",
        Design::default().with_ordering(Ordering::shuffle(participants)),
    )
}
