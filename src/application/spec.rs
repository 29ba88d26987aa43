//! Dictionary-shaped experiment specifications.
//!
//! These types mirror what a YAML, JSON or TOML file parses into and are
//! converted into domain objects with [`DesignTreeSpec::to_design_tree`].
//!
//! ```yaml
//! - name: participant
//!   ivs: {group: [a, b]}
//! - name: trial
//!   ivs: {speed: [1, 2, 3], size: [15, 30]}
//!   ordering: Shuffle
//!   n: 3
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::domain::{
    Design, DesignMatrix, DesignTree, DomainError, IndependentVariable, Level, Ordering, SortOrder,
    Value,
};

/// Design tree given either as a plain list of levels or as named subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DesignTreeSpec {
    Levels(Vec<LevelSpec>),
    Subtrees(BTreeMap<String, Vec<LevelSpec>>),
}

/// One level: a single design, or a list of designs run in sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelSpec {
    Single(DesignSpec),
    Sequence(Vec<DesignSpec>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesignSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub ivs: IvSpecs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_matrix: Option<DesignMatrix>,
    #[serde(default, alias = "order", skip_serializing_if = "Option::is_none")]
    pub ordering: Option<OrderingSpec>,
    #[serde(default, alias = "n", skip_serializing_if = "Option::is_none")]
    pub number: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_data: BTreeMap<String, Value>,
    /// Any other key lands in the design's extra data too
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// IVs in declaration order; a missing value list marks a continuous IV.
///
/// Accepts a mapping `{name: [values]}` or a list of `[name, [values]]`
/// pairs. Order matters: design-matrix columns bind to IVs by position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IvSpecs(pub Vec<(String, Option<Vec<Value>>)>);

impl Serialize for IvSpecs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, values) in &self.0 {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IvSpecs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IvSpecsVisitor;

        impl<'de> Visitor<'de> for IvSpecsVisitor {
            type Value = IvSpecs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of IV names to values or a list of [name, values] pairs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<IvSpecs, A::Error> {
                let mut ivs = Vec::new();
                while let Some(entry) = access.next_entry()? {
                    ivs.push(entry);
                }
                Ok(IvSpecs(ivs))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<IvSpecs, A::Error> {
                let mut ivs = Vec::new();
                while let Some(entry) = access.next_element()? {
                    ivs.push(entry);
                }
                Ok(IvSpecs(ivs))
            }

            fn visit_unit<E>(self) -> Result<IvSpecs, E> {
                Ok(IvSpecs::default())
            }

            fn visit_none<E>(self) -> Result<IvSpecs, E> {
                Ok(IvSpecs::default())
            }
        }

        deserializer.deserialize_any(IvSpecsVisitor)
    }
}

/// Ordering as a class name, `[name, args...]` or `{class: name, kwargs...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderingSpec {
    Name(String),
    Positional(Vec<Value>),
    Keyword(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderingKind {
    Fixed,
    Shuffle,
    CompleteCounterbalance,
    Sorted,
    LatinSquare,
}

impl OrderingKind {
    fn lookup(name: &str) -> ApplicationResult<Self> {
        match name.to_lowercase().as_str() {
            "ordering" => Ok(Self::Fixed),
            "shuffle" => Ok(Self::Shuffle),
            "completecounterbalance" | "complete_counterbalance" | "counterbalance"
            | "counterbalanced" => Ok(Self::CompleteCounterbalance),
            "sorted" | "sort" => Ok(Self::Sorted),
            "latinsquare" | "latin_square" => Ok(Self::LatinSquare),
            _ => Err(ApplicationError::spec(format!("unknown ordering '{name}'"))),
        }
    }

    fn default_ordering(self) -> Ordering {
        match self {
            Self::Fixed => Ordering::fixed(1),
            Self::Shuffle => Ordering::shuffle(1),
            Self::CompleteCounterbalance => Ordering::complete_counterbalance(1),
            Self::Sorted => Ordering::sorted(1, SortOrder::Both),
            Self::LatinSquare => Ordering::latin_square(1),
        }
    }

    /// Names of positional arguments, in order.
    fn parameters(self) -> &'static [&'static str] {
        match self {
            Self::Fixed | Self::CompleteCounterbalance => &["number"],
            Self::Shuffle => &["number", "avoid_repeats"],
            Self::Sorted => &["number", "order"],
            Self::LatinSquare => &["number", "balanced", "uniform"],
        }
    }
}

impl OrderingSpec {
    pub fn to_ordering(&self) -> ApplicationResult<Ordering> {
        match self {
            OrderingSpec::Name(name) => build_ordering(name, Vec::new()),
            OrderingSpec::Positional(items) => {
                let (name, args) = items
                    .split_first()
                    .ok_or_else(|| ApplicationError::spec("empty ordering list"))?;
                let name = name
                    .as_str()
                    .ok_or_else(|| ApplicationError::spec(format!("ordering name {name} is not a string")))?;
                let parameters = OrderingKind::lookup(name)?.parameters();
                if args.len() > parameters.len() {
                    return Err(ApplicationError::spec(format!(
                        "{name} takes at most {} arguments",
                        parameters.len()
                    )));
                }
                let kwargs = parameters
                    .iter()
                    .map(|p| p.to_string())
                    .zip(args.iter().cloned())
                    .collect();
                build_ordering(name, kwargs)
            }
            OrderingSpec::Keyword(map) => {
                let mut kwargs = map.clone();
                let name = ["class", "name", "function"]
                    .iter()
                    .find_map(|key| kwargs.remove(*key))
                    .ok_or_else(|| ApplicationError::spec("ordering map needs a 'class' key"))?;
                let name = name
                    .as_str()
                    .ok_or_else(|| ApplicationError::spec(format!("ordering name {name} is not a string")))?;
                build_ordering(name, kwargs.into_iter().collect())
            }
        }
    }
}

fn build_ordering(name: &str, kwargs: Vec<(String, Value)>) -> ApplicationResult<Ordering> {
    let mut ordering = OrderingKind::lookup(name)?.default_ordering();
    for (key, value) in kwargs {
        match (key.as_str(), &mut ordering) {
            ("number" | "n", ordering) => ordering.set_number(as_count(&key, &value)?),
            ("avoid_repeats", Ordering::Shuffle { avoid_repeats, .. }) => {
                *avoid_repeats = as_flag(&key, &value)?
            }
            ("order", Ordering::Sorted { order, .. }) => {
                *order = value
                    .as_str()
                    .ok_or_else(|| ApplicationError::spec(format!("sort order {value} is not a string")))?
                    .parse()?
            }
            ("balanced", Ordering::LatinSquare { balanced, .. }) => {
                *balanced = as_flag(&key, &value)?
            }
            ("uniform", Ordering::LatinSquare { uniform, .. }) => *uniform = as_flag(&key, &value)?,
            (other, _) => {
                return Err(ApplicationError::spec(format!(
                    "unexpected argument '{other}' for ordering '{name}'"
                )))
            }
        }
    }
    ordering.validate()?;
    Ok(ordering)
}

fn as_count(key: &str, value: &Value) -> ApplicationResult<usize> {
    value
        .as_int()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ApplicationError::spec(format!("'{key}' must be a non-negative integer, got {value}")))
}

fn as_flag(key: &str, value: &Value) -> ApplicationResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(ApplicationError::spec(format!("'{key}' must be true or false, got {value}"))),
    }
}

impl DesignSpec {
    /// Level name (if given) and the design it describes.
    pub fn to_design(&self) -> ApplicationResult<(Option<String>, Design)> {
        let ivs = self
            .ivs
            .0
            .iter()
            .map(|(name, values)| match values {
                Some(values) => IndependentVariable::discrete(name.clone(), values.iter().cloned()),
                None => IndependentVariable::continuous(name.clone()),
            })
            .collect();

        let mut ordering = match (&self.ordering, &self.design_matrix) {
            (Some(spec), _) => spec.to_ordering()?,
            (None, Some(_)) => Ordering::fixed(1),
            (None, None) => Ordering::shuffle(1),
        };
        if let Some(number) = self.number {
            ordering.set_number(number);
        }

        let mut extra_data = self.extra_data.clone();
        extra_data.extend(self.extra.clone());

        let design = Design {
            ivs,
            ordering,
            design_matrix: self.design_matrix.clone(),
            extra_data,
        };
        Ok((self.name.clone(), design))
    }
}

impl LevelSpec {
    pub fn to_level(&self) -> ApplicationResult<Level> {
        let specs = match self {
            LevelSpec::Single(spec) => std::slice::from_ref(spec),
            LevelSpec::Sequence(specs) => specs.as_slice(),
        };

        let mut name: Option<String> = None;
        let mut designs = Vec::with_capacity(specs.len());
        for spec in specs {
            let (level_name, design) = spec.to_design()?;
            match (&name, level_name) {
                (Some(current), Some(other)) if *current != other => {
                    return Err(DomainError::LevelNameMismatch(current.clone()).into())
                }
                (None, Some(other)) => name = Some(other),
                _ => {}
            }
            designs.push(design);
        }

        let name = name.ok_or_else(|| ApplicationError::spec("every level needs a 'name'"))?;
        Ok(Level::sequence(name, designs))
    }
}

impl DesignTreeSpec {
    /// Build a design tree; `entry` names the subtree to start from and
    /// `discriminator` the IV selecting subtrees.
    pub fn to_design_tree(&self, entry: &str, discriminator: &str) -> ApplicationResult<DesignTree> {
        let levels = |specs: &[LevelSpec]| -> ApplicationResult<Vec<Level>> {
            specs.iter().map(LevelSpec::to_level).collect()
        };

        let tree = match self {
            DesignTreeSpec::Levels(specs) => DesignTree::new(levels(specs)?).with_entry(entry),
            DesignTreeSpec::Subtrees(subtrees) => {
                let main = subtrees.get(entry).ok_or_else(|| {
                    ApplicationError::spec(format!("no subtree named '{entry}'"))
                })?;
                let mut tree = DesignTree::new(levels(main)?).with_entry(entry);
                for (name, specs) in subtrees.iter().filter(|(name, _)| *name != entry) {
                    tree = tree.with_subtree(name.clone(), levels(specs)?);
                }
                tree
            }
        };
        Ok(tree.with_discriminator(discriminator))
    }
}

/// Whole experiment file: the design tree plus optional settings overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub design: DesignTreeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}
