//! Ordering strategies: how the unique conditions of one level are duplicated
//! and sequenced.
//!
//! Atomic orderings (`Fixed`, `Shuffle`, one-directional `Sorted`) order each
//! section independently. Non-atomic orderings (`CompleteCounterbalance`,
//! `LatinSquare`, `Sorted { order: Both }`) must coordinate across sibling
//! sections, so they install a derived IV on the parent level; the parent's
//! value of that IV selects which precomputed sequence a section receives.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::latin::{balanced_latin_square, latin_square};
use crate::domain::value::{Condition, IndependentVariable, Value};

pub const COUNTERBALANCE_IV: &str = "counterbalance_order";
pub const SORTED_IV: &str = "sorted_order";
pub const LATIN_SQUARE_IV: &str = "latin_square_row";

/// Names that non-atomic orderings may install on a parent level.
pub const RESERVED_IV_NAMES: [&str; 3] = [COUNTERBALANCE_IV, SORTED_IV, LATIN_SQUARE_IV];

const MAX_COUNTERBALANCE_ORDERS: u128 = 1_000_000;
const SHUFFLE_ATTEMPTS: usize = 1_000;

/// Sorting direction for [`Ordering::Sorted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
    #[default]
    Both,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
            SortOrder::Both => "both",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascending" => Ok(SortOrder::Ascending),
            "descending" => Ok(SortOrder::Descending),
            "both" => Ok(SortOrder::Both),
            other => Err(DomainError::InvalidOrdering(format!(
                "unknown sort order '{other}'"
            ))),
        }
    }
}

/// Ordering strategy of one design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Ordering {
    /// Conditions in generation order, the whole sequence cycled `number` times.
    #[serde(rename = "ordering")]
    Fixed { number: usize },
    /// Uniformly random permutation of the duplicated conditions.
    Shuffle { number: usize, avoid_repeats: bool },
    /// Every distinct ordering of the duplicated conditions, one per derived IV value.
    CompleteCounterbalance { number: usize },
    /// Sorted by the value of the level's single IV.
    Sorted { number: usize, order: SortOrder },
    /// Rows of a Latin square, each row cycled `number` times.
    LatinSquare {
        number: usize,
        balanced: bool,
        uniform: bool,
    },
}

impl Default for Ordering {
    fn default() -> Self {
        Ordering::shuffle(1)
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ordering::Fixed { number } => write!(f, "Ordering(number={number})"),
            Ordering::Shuffle {
                number,
                avoid_repeats,
            } => write!(f, "Shuffle(number={number}, avoid_repeats={avoid_repeats})"),
            Ordering::CompleteCounterbalance { number } => {
                write!(f, "CompleteCounterbalance(number={number})")
            }
            Ordering::Sorted { number, order } => {
                write!(f, "Sorted(number={number}, order='{}')", order.as_str())
            }
            Ordering::LatinSquare {
                number,
                balanced,
                uniform,
            } => write!(
                f,
                "LatinSquare(number={number}, balanced={balanced}, uniform={uniform})"
            ),
        }
    }
}

impl Ordering {
    pub fn fixed(number: usize) -> Self {
        Ordering::Fixed { number }
    }

    pub fn shuffle(number: usize) -> Self {
        Ordering::Shuffle {
            number,
            avoid_repeats: false,
        }
    }

    pub fn shuffle_avoiding_repeats(number: usize) -> Self {
        Ordering::Shuffle {
            number,
            avoid_repeats: true,
        }
    }

    pub fn complete_counterbalance(number: usize) -> Self {
        Ordering::CompleteCounterbalance { number }
    }

    pub fn sorted(number: usize, order: SortOrder) -> Self {
        Ordering::Sorted { number, order }
    }

    /// Balanced, non-uniform Latin square.
    pub fn latin_square(number: usize) -> Self {
        Ordering::LatinSquare {
            number,
            balanced: true,
            uniform: false,
        }
    }

    pub fn number(&self) -> usize {
        match self {
            Ordering::Fixed { number }
            | Ordering::Shuffle { number, .. }
            | Ordering::CompleteCounterbalance { number }
            | Ordering::Sorted { number, .. }
            | Ordering::LatinSquare { number, .. } => *number,
        }
    }

    pub fn set_number(&mut self, n: usize) {
        match self {
            Ordering::Fixed { number }
            | Ordering::Shuffle { number, .. }
            | Ordering::CompleteCounterbalance { number }
            | Ordering::Sorted { number, .. }
            | Ordering::LatinSquare { number, .. } => *number = n,
        }
    }

    /// Name of the derived IV this ordering installs on the parent, if any.
    pub fn derived_iv_name(&self) -> Option<&'static str> {
        match self {
            Ordering::CompleteCounterbalance { .. } => Some(COUNTERBALANCE_IV),
            Ordering::Sorted {
                order: SortOrder::Both,
                ..
            } => Some(SORTED_IV),
            Ordering::LatinSquare { .. } => Some(LATIN_SQUARE_IV),
            _ => None,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.derived_iv_name().is_none()
    }

    /// Reject parameter combinations that can never produce an order.
    pub fn validate(&self) -> DomainResult<()> {
        if self.number() == 0 {
            return Err(DomainError::InvalidOrdering(format!(
                "{self}: number must be at least 1"
            )));
        }
        if let Ordering::LatinSquare {
            balanced: true,
            uniform: true,
            ..
        } = self
        {
            return Err(DomainError::InvalidOrdering(
                "cannot create a balanced, uniform Latin square".to_string(),
            ));
        }
        Ok(())
    }

    /// First pass: duplicate the unique conditions and precompute whatever
    /// must be shared between sibling sections.
    #[instrument(level = "debug", skip(conditions, rng), fields(ordering = %self))]
    pub fn prepare<R: Rng + ?Sized>(
        &self,
        conditions: Vec<Condition>,
        rng: &mut R,
    ) -> DomainResult<PreparedOrdering> {
        self.validate()?;
        let number = self.number();
        let duplicated = cycled(&conditions, number);

        let plan = match self {
            Ordering::Fixed { .. } => OrderPlan::Fixed(duplicated),
            Ordering::Shuffle { avoid_repeats, .. } => {
                if *avoid_repeats {
                    check_repeats_avoidable(&duplicated)?;
                }
                OrderPlan::Shuffled {
                    conditions: duplicated,
                    avoid_repeats: *avoid_repeats,
                }
            }
            Ordering::CompleteCounterbalance { .. } => {
                let orders = distinct_permutations(&duplicated)?;
                warn!(
                    "Creating IV '{}' with {} levels.",
                    COUNTERBALANCE_IV,
                    orders.len()
                );
                keyed(
                    COUNTERBALANCE_IV,
                    orders
                        .into_iter()
                        .enumerate()
                        .map(|(i, order)| (Value::from(i), order)),
                )
            }
            Ordering::Sorted { order, .. } => {
                let iv_count = duplicated.first().map_or(0, |c| c.len());
                if iv_count != 1 {
                    return Err(DomainError::SortedNeedsSingleIv(iv_count));
                }
                let mut ascending = duplicated;
                ascending.sort_by(|a, b| a.values().next().cmp(&b.values().next()));
                let mut descending = ascending.clone();
                descending.sort_by(|a, b| b.values().next().cmp(&a.values().next()));
                match order {
                    SortOrder::Ascending => OrderPlan::Fixed(ascending),
                    SortOrder::Descending => OrderPlan::Fixed(descending),
                    SortOrder::Both => {
                        warn!(
                            "Creating IV '{}' with levels 'ascending' and 'descending'.",
                            SORTED_IV
                        );
                        keyed(
                            SORTED_IV,
                            [
                                (Value::from("ascending"), ascending),
                                (Value::from("descending"), descending),
                            ],
                        )
                    }
                }
            }
            Ordering::LatinSquare {
                balanced, uniform, ..
            } => {
                let order = conditions.len();
                let square = if *balanced {
                    balanced_latin_square(order, rng)?
                } else {
                    let kind = if *uniform { "" } else { "non-" };
                    warn!("Constructing Latin square of order {order} from a {kind}uniform distribution...");
                    let square = latin_square(order, !uniform, *uniform, !uniform, rng);
                    warn!("Latin square construction complete.");
                    square
                };
                warn!("Creating IV '{}' with {} levels.", LATIN_SQUARE_IV, order);
                keyed(
                    LATIN_SQUARE_IV,
                    square.into_iter().enumerate().map(|(i, row)| {
                        let sequence: Vec<Condition> =
                            row.iter().map(|&c| conditions[c].clone()).collect();
                        (Value::from(i), cycled(&sequence, number))
                    }),
                )
            }
        };

        Ok(PreparedOrdering { plan })
    }
}

/// The whole sequence repeated `number` times, back to back.
pub(crate) fn cycled(conditions: &[Condition], number: usize) -> Vec<Condition> {
    std::iter::repeat(conditions)
        .take(number)
        .flatten()
        .cloned()
        .collect()
}

fn keyed(
    iv_name: &str,
    orders: impl IntoIterator<Item = (Value, Vec<Condition>)>,
) -> OrderPlan {
    OrderPlan::Keyed {
        iv_name: iv_name.to_string(),
        orders: orders.into_iter().collect(),
    }
}

/// Ordering after its first pass; holds the duplicated conditions and, for
/// non-atomic strategies, every sequence addressable by the derived IV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedOrdering {
    plan: OrderPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum OrderPlan {
    Fixed(Vec<Condition>),
    Shuffled {
        conditions: Vec<Condition>,
        avoid_repeats: bool,
    },
    Keyed {
        iv_name: String,
        orders: Vec<(Value, Vec<Condition>)>,
    },
}

impl PreparedOrdering {
    /// The IV to install one level up; `None` for atomic orderings.
    pub fn derived_iv(&self) -> Option<IndependentVariable> {
        match &self.plan {
            OrderPlan::Keyed { iv_name, orders } => Some(IndependentVariable::discrete(
                iv_name.clone(),
                orders.iter().map(|(value, _)| value.clone()),
            )),
            _ => None,
        }
    }

    /// Sequence for one section; `parent` is the merged data of the section
    /// that will own the generated children.
    pub fn order<R: Rng + ?Sized>(
        &self,
        parent: &Condition,
        rng: &mut R,
    ) -> DomainResult<Vec<Condition>> {
        match &self.plan {
            OrderPlan::Fixed(conditions) => Ok(conditions.clone()),
            OrderPlan::Shuffled {
                conditions,
                avoid_repeats,
            } => Ok(shuffled(conditions, *avoid_repeats, rng)),
            OrderPlan::Keyed { iv_name, orders } => parent
                .get(iv_name)
                .and_then(|value| orders.iter().find(|(key, _)| key == value))
                .map(|(_, order)| order.clone())
                .ok_or_else(|| DomainError::MissingDerivedValue(iv_name.clone())),
        }
    }
}

fn has_repeats(conditions: &[Condition]) -> bool {
    conditions.windows(2).any(|pair| pair[0] == pair[1])
}

/// Collapse a multiset into (representative index, count) pairs, first occurrence order.
fn multiset_counts(conditions: &[Condition]) -> (Vec<usize>, Vec<usize>) {
    let mut representatives: Vec<usize> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for (i, condition) in conditions.iter().enumerate() {
        match representatives
            .iter()
            .position(|&r| conditions[r] == *condition)
        {
            Some(slot) => counts[slot] += 1,
            None => {
                representatives.push(i);
                counts.push(1);
            }
        }
    }
    (representatives, counts)
}

/// A multiset can be arranged without adjacent duplicates iff its most frequent
/// element fills at most every other slot.
fn check_repeats_avoidable(conditions: &[Condition]) -> DomainResult<()> {
    let (_, counts) = multiset_counts(conditions);
    let most = counts.iter().copied().max().unwrap_or(0);
    if most > conditions.len().div_ceil(2) {
        return Err(DomainError::Infeasible(format!(
            "cannot avoid repeats: a condition occurs {most} times among {} entries",
            conditions.len()
        )));
    }
    Ok(())
}

fn shuffled<R: Rng + ?Sized>(
    conditions: &[Condition],
    avoid_repeats: bool,
    rng: &mut R,
) -> Vec<Condition> {
    let mut order = conditions.to_vec();
    order.shuffle(rng);
    if !avoid_repeats || !has_repeats(&order) {
        return order;
    }
    // Rejection sampling keeps the permutation uniform among repeat-free ones.
    for _ in 0..SHUFFLE_ATTEMPTS {
        order.shuffle(rng);
        if !has_repeats(&order) {
            return order;
        }
    }
    debug!("rejection sampling exhausted, building repeat-free order sequentially");
    sequential_without_repeats(conditions, rng)
}

/// Draws one element at a time, weighted by remaining count, skipping any
/// choice that would leave the remainder impossible to arrange.
fn sequential_without_repeats<R: Rng + ?Sized>(
    conditions: &[Condition],
    rng: &mut R,
) -> Vec<Condition> {
    let (representatives, mut counts) = multiset_counts(conditions);
    let mut result = Vec::with_capacity(conditions.len());
    let mut previous: Option<usize> = None;

    while result.len() < conditions.len() {
        let mut candidates: Vec<usize> = Vec::new();
        for slot in 0..counts.len() {
            if counts[slot] == 0 || Some(slot) == previous {
                continue;
            }
            counts[slot] -= 1;
            if arrangeable(&counts, slot) {
                candidates.push(slot);
            }
            counts[slot] += 1;
        }
        // Feasibility was checked up front, so at least one candidate remains.
        let Ok(&slot) = candidates.choose_weighted(rng, |&slot| counts[slot]) else {
            break;
        };
        counts[slot] -= 1;
        result.push(conditions[representatives[slot]].clone());
        previous = Some(slot);
    }
    result
}

fn arrangeable(counts: &[usize], previous: usize) -> bool {
    let remaining: usize = counts.iter().sum();
    let Some((slot, &most)) = counts.iter().enumerate().max_by_key(|&(_, &c)| c) else {
        return true;
    };
    if most > remaining.div_ceil(2) {
        return false;
    }
    // With an odd remainder the majority element must come first.
    !(remaining % 2 == 1 && most == remaining.div_ceil(2) && slot == previous)
}

fn factorial(n: usize) -> Option<u128> {
    (1..=n as u128).try_fold(1u128, |acc, k| acc.checked_mul(k))
}

/// All distinct orderings of a multiset, lexicographic by first-occurrence index.
fn distinct_permutations(conditions: &[Condition]) -> DomainResult<Vec<Vec<Condition>>> {
    let (representatives, mut counts) = multiset_counts(conditions);

    let total = factorial(conditions.len())
        .and_then(|n| {
            counts
                .iter()
                .try_fold(1u128, |acc, &c| factorial(c).and_then(|f| acc.checked_mul(f)))
                .map(|d| n / d)
        })
        .unwrap_or(u128::MAX);
    if total > MAX_COUNTERBALANCE_ORDERS {
        return Err(DomainError::TooManyOrderings(total));
    }

    let mut orders = Vec::with_capacity(total as usize);
    let mut current = Vec::with_capacity(conditions.len());
    permute(&mut counts, &mut current, conditions.len(), &mut orders);

    Ok(orders
        .into_iter()
        .map(|order| {
            order
                .into_iter()
                .map(|slot| conditions[representatives[slot]].clone())
                .collect()
        })
        .collect())
}

fn permute(counts: &mut [usize], current: &mut Vec<usize>, len: usize, out: &mut Vec<Vec<usize>>) {
    if current.len() == len {
        out.push(current.clone());
        return;
    }
    for slot in 0..counts.len() {
        if counts[slot] == 0 {
            continue;
        }
        counts[slot] -= 1;
        current.push(slot);
        permute(counts, current, len, out);
        current.pop();
        counts[slot] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::condition;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn single(values: &[i64]) -> Vec<Condition> {
        values.iter().map(|&v| condition([("a", v)])).collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn given_fixed_when_ordering_then_cycles_whole_sequence(#[case] number: usize) {
        let conditions = single(&[1, 2, 3]);
        let prepared = Ordering::fixed(number)
            .prepare(conditions.clone(), &mut rng())
            .unwrap();

        let order = prepared.order(&Condition::new(), &mut rng()).unwrap();

        assert_eq!(order, cycled(&conditions, number));
        assert!(prepared.derived_iv().is_none());
    }

    #[test]
    fn given_shuffle_when_ordering_then_same_multiset() {
        let conditions = single(&[1, 2, 3, 4, 5, 6]);
        let prepared = Ordering::shuffle(2)
            .prepare(conditions.clone(), &mut rng())
            .unwrap();

        let mut order = prepared.order(&Condition::new(), &mut rng()).unwrap();
        order.sort();
        let mut expected = cycled(&conditions, 2);
        expected.sort();

        assert_eq!(order, expected);
    }

    #[test]
    fn given_two_conditions_when_shuffling_without_repeats_then_never_adjacent() {
        let conditions = single(&[1, 2]);
        let prepared = Ordering::shuffle_avoiding_repeats(2)
            .prepare(conditions, &mut rng())
            .unwrap();

        for seed in 0..1000 {
            let mut rng = StdRng::seed_from_u64(seed);
            let order = prepared.order(&Condition::new(), &mut rng).unwrap();
            assert_eq!(order.len(), 4);
            assert!(!has_repeats(&order), "seed {seed} produced {order:?}");
        }
    }

    #[test]
    fn given_many_duplicates_when_shuffling_without_repeats_then_falls_back_to_sequential() {
        let conditions = single(&[1, 2]);
        let prepared = Ordering::shuffle_avoiding_repeats(30)
            .prepare(conditions, &mut rng())
            .unwrap();

        let order = prepared.order(&Condition::new(), &mut rng()).unwrap();

        assert_eq!(order.len(), 60);
        assert!(!has_repeats(&order));
    }

    #[test]
    fn given_single_condition_when_avoiding_repeats_then_infeasible() {
        let result = Ordering::shuffle_avoiding_repeats(2).prepare(single(&[1]), &mut rng());
        assert!(matches!(result, Err(DomainError::Infeasible(_))));
    }

    #[test]
    fn given_three_conditions_twice_when_counterbalancing_then_ninety_orders() {
        let conditions = single(&[1, 2, 3]);
        let prepared = Ordering::complete_counterbalance(2)
            .prepare(conditions.clone(), &mut rng())
            .unwrap();

        let iv = prepared.derived_iv().unwrap();
        assert_eq!(iv.name, COUNTERBALANCE_IV);
        assert_eq!(iv.discrete_values().len(), 90);

        let mut seen = std::collections::HashSet::new();
        for value in iv.discrete_values() {
            let parent = condition([(COUNTERBALANCE_IV, value.clone())]);
            let order = prepared.order(&parent, &mut rng()).unwrap();
            assert_eq!(order.len(), 6);
            let mut sorted = order.clone();
            sorted.sort();
            let mut expected = cycled(&conditions, 2);
            expected.sort();
            assert_eq!(sorted, expected);
            assert!(seen.insert(order));
        }
    }

    #[test]
    fn given_repeated_condition_when_counterbalancing_then_counts_distinct_orders_only() {
        let conditions = single(&[1, 2, 2]);
        let prepared = Ordering::complete_counterbalance(1)
            .prepare(conditions, &mut rng())
            .unwrap();

        assert_eq!(prepared.derived_iv().unwrap().discrete_values().len(), 3);
    }

    #[test]
    fn given_missing_derived_value_when_ordering_then_errors() {
        let prepared = Ordering::complete_counterbalance(1)
            .prepare(single(&[1, 2]), &mut rng())
            .unwrap();

        let result = prepared.order(&Condition::new(), &mut rng());

        assert_eq!(
            result,
            Err(DomainError::MissingDerivedValue(COUNTERBALANCE_IV.into()))
        );
    }

    #[rstest]
    #[case(SortOrder::Ascending, vec![1, 1, 2, 2, 3, 3])]
    #[case(SortOrder::Descending, vec![3, 3, 2, 2, 1, 1])]
    fn given_one_way_sort_when_ordering_then_atomic_and_monotonic(
        #[case] order: SortOrder,
        #[case] expected: Vec<i64>,
    ) {
        let prepared = Ordering::sorted(2, order)
            .prepare(single(&[2, 3, 1]), &mut rng())
            .unwrap();

        assert!(prepared.derived_iv().is_none());
        assert_eq!(
            prepared.order(&Condition::new(), &mut rng()).unwrap(),
            single(&expected)
        );
    }

    #[test]
    fn given_mixed_int_and_float_values_when_sorting_ascending_then_numeric_order() {
        let speeds = vec![
            condition([("speed", Value::from(2))]),
            condition([("speed", Value::from(0.5))]),
            condition([("speed", Value::from(1))]),
        ];

        let prepared = Ordering::sorted(1, SortOrder::Ascending)
            .prepare(speeds, &mut rng())
            .unwrap();

        let order = prepared.order(&Condition::new(), &mut rng()).unwrap();
        let values: Vec<Value> = order.into_iter().map(|c| c["speed"].clone()).collect();
        assert_eq!(values, vec![Value::from(0.5), Value::from(1), Value::from(2)]);
    }

    #[test]
    fn given_both_sort_when_ordering_then_keyed_by_direction() {
        let prepared = Ordering::sorted(1, SortOrder::Both)
            .prepare(single(&[2, 3, 1]), &mut rng())
            .unwrap();

        let iv = prepared.derived_iv().unwrap();
        assert_eq!(iv.name, SORTED_IV);
        assert_eq!(
            iv.discrete_values(),
            &[Value::from("ascending"), Value::from("descending")]
        );
        let up = prepared
            .order(&condition([(SORTED_IV, "ascending")]), &mut rng())
            .unwrap();
        let down = prepared
            .order(&condition([(SORTED_IV, "descending")]), &mut rng())
            .unwrap();
        assert_eq!(up, single(&[1, 2, 3]));
        assert_eq!(down, single(&[3, 2, 1]));
    }

    #[test]
    fn given_two_ivs_when_sorting_then_errors() {
        let conditions = vec![condition([("a", 1), ("b", 2)])];
        let result = Ordering::sorted(1, SortOrder::Both).prepare(conditions, &mut rng());
        assert_eq!(result, Err(DomainError::SortedNeedsSingleIv(2)));
    }

    #[test]
    fn given_latin_square_with_number_two_when_ordering_then_rows_cycle() {
        let prepared = Ordering::latin_square(2)
            .prepare(single(&[1, 2, 3, 4]), &mut rng())
            .unwrap();

        let iv = prepared.derived_iv().unwrap();
        assert_eq!(iv.discrete_values().len(), 4);
        for value in iv.discrete_values() {
            let order = prepared
                .order(&condition([(LATIN_SQUARE_IV, value.clone())]), &mut rng())
                .unwrap();
            assert_eq!(order.len(), 8);
            assert_eq!(order[..4], order[4..]);
            assert!(!has_repeats(&order[..4]));
        }
    }

    #[test]
    fn given_balanced_latin_square_with_odd_conditions_then_errors() {
        let result = Ordering::latin_square(1).prepare(single(&[1, 2, 3]), &mut rng());
        assert_eq!(result, Err(DomainError::OddBalancedLatinSquare(3)));
    }

    #[test]
    fn given_unbalanced_latin_square_with_odd_conditions_then_prepares() {
        let ordering = Ordering::LatinSquare {
            number: 1,
            balanced: false,
            uniform: false,
        };
        let prepared = ordering.prepare(single(&[1, 2, 3]), &mut rng()).unwrap();
        assert_eq!(prepared.derived_iv().unwrap().discrete_values().len(), 3);
    }

    #[rstest]
    #[case(Ordering::fixed(0))]
    #[case(Ordering::LatinSquare { number: 1, balanced: true, uniform: true })]
    fn given_invalid_parameters_when_validating_then_errors(#[case] ordering: Ordering) {
        assert!(matches!(
            ordering.validate(),
            Err(DomainError::InvalidOrdering(_))
        ));
    }

    #[test]
    fn test_too_many_counterbalance_orders_rejected() {
        let conditions = single(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let result = Ordering::complete_counterbalance(1).prepare(conditions, &mut rng());
        assert!(matches!(result, Err(DomainError::TooManyOrderings(_))));
    }
}
