//! IV values, conditions and independent-variable declarations.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Opaque IV value.
///
/// Values are compared and hashed but never interpreted. Integers and floats
/// compare numerically, an integer sorting first on an exact tie. Floats use
/// their total order, so `NaN` is comparable, but it has no JSON form and
/// is rejected in IV declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::List(_) => 4,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        match self {
            Value::Float(x) => x.is_nan(),
            Value::List(items) => items.iter().any(Value::is_nan),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b).then(CmpOrdering::Less),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)).then(CmpOrdering::Greater),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => write!(f, "[{}]", items.iter().join(", ")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// One concrete assignment of values to the IVs of a level.
pub type Condition = BTreeMap<String, Value>;

/// Build a [`Condition`] from `(name, value)` pairs.
pub fn condition<K, V, I>(pairs: I) -> Condition
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Possible values of an independent variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvValues {
    /// Ordered, deduplicated discrete values.
    Discrete(Vec<Value>),
    /// Values are read verbatim from a design-matrix column.
    Continuous,
}

/// Named factor varied across sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndependentVariable {
    pub name: String,
    pub values: IvValues,
}

impl IndependentVariable {
    /// Discrete IV; duplicate values are dropped, first occurrence wins.
    pub fn discrete<V: Into<Value>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values: IvValues::Discrete(values.into_iter().map(Into::into).unique().collect()),
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: IvValues::Continuous,
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self.values, IvValues::Continuous)
    }

    /// Discrete values, empty for continuous IVs.
    pub fn discrete_values(&self) -> &[Value] {
        match &self.values {
            IvValues::Discrete(values) => values,
            IvValues::Continuous => &[],
        }
    }
}

/// Full factorial cross of discrete IVs, last IV varying fastest.
///
/// Zero IVs produce a single empty condition.
pub fn full_cross(ivs: &[IndependentVariable]) -> Vec<Condition> {
    if ivs.is_empty() {
        return vec![Condition::new()];
    }
    ivs.iter()
        .map(|iv| iv.discrete_values().iter().cloned())
        .multi_cartesian_product()
        .map(|combination| {
            ivs.iter()
                .map(|iv| iv.name.clone())
                .zip(combination)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_duplicate_values_when_declaring_iv_then_deduplicates_in_order() {
        let iv = IndependentVariable::discrete("speed", [3, 1, 3, 2, 1]);
        assert_eq!(
            iv.discrete_values(),
            &[Value::Int(3), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn given_two_ivs_when_crossing_then_last_varies_fastest() {
        let ivs = vec![
            IndependentVariable::discrete("a", [1, 2, 3]),
            IndependentVariable::discrete("b", [1, 2]),
        ];

        let conditions = full_cross(&ivs);

        assert_eq!(conditions.len(), 6);
        assert_eq!(conditions[0], condition([("a", 1), ("b", 1)]));
        assert_eq!(conditions[1], condition([("a", 1), ("b", 2)]));
        assert_eq!(conditions[5], condition([("a", 3), ("b", 2)]));
    }

    #[test]
    fn given_no_ivs_when_crossing_then_single_empty_condition() {
        assert_eq!(full_cross(&[]), vec![Condition::new()]);
    }

    #[test]
    fn test_float_values_have_total_order() {
        let mut values = vec![Value::from(1.5), Value::from(-2.0), Value::from(0.0)];
        values.sort();
        assert_eq!(
            values,
            vec![Value::from(-2.0), Value::from(0.0), Value::from(1.5)]
        );
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
    }

    #[test]
    fn given_mixed_ints_and_floats_when_sorting_then_numeric_order() {
        let mut values = vec![Value::from(2), Value::from(0.5), Value::from(1), Value::from(1.0)];

        values.sort();

        assert_eq!(
            values,
            vec![Value::from(0.5), Value::from(1), Value::from(1.0), Value::from(2)]
        );
        assert_ne!(Value::from(1), Value::from(1.0));
        assert!(Value::from(3) > Value::from(2.5));
    }

    #[test]
    fn given_nested_nan_when_checking_then_detected() {
        assert!(Value::from(vec![Value::from(1), Value::from(f64::NAN)]).is_nan());
        assert!(!Value::from(vec![1, 2]).is_nan());
    }
}
