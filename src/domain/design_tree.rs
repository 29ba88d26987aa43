//! Level structure of an experiment, possibly branching into named subtrees.
//!
//! A homogeneous tree is a single subtree. A heterogeneous tree has several;
//! sections at the last level of a subtree pick the subtree for their
//! children by the value of the discriminator IV.

use std::collections::{BTreeMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::design::{Design, PreparedDesign};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::value::{Condition, IndependentVariable, Value};

pub const DEFAULT_ENTRY: &str = "main";
pub const DEFAULT_DISCRIMINATOR: &str = "design";

/// Named level holding one design, or several run one after another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    pub designs: Vec<Design>,
}

impl Level {
    pub fn new(name: impl Into<String>, design: Design) -> Self {
        Self::sequence(name, vec![design])
    }

    pub fn sequence(name: impl Into<String>, designs: Vec<Design>) -> Self {
        Self {
            name: name.into(),
            designs,
        }
    }

    fn declared_ivs(&self) -> HashSet<&str> {
        self.designs.iter().flat_map(|d| d.iv_names()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignTree {
    pub entry: String,
    pub discriminator: String,
    pub subtrees: BTreeMap<String, Vec<Level>>,
}

impl DesignTree {
    /// Homogeneous tree from its levels, top first.
    pub fn new(levels: Vec<Level>) -> Self {
        Self {
            entry: DEFAULT_ENTRY.to_string(),
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            subtrees: BTreeMap::from([(DEFAULT_ENTRY.to_string(), levels)]),
        }
    }

    /// Add a subtree reachable through the discriminator IV.
    pub fn with_subtree(mut self, name: impl Into<String>, levels: Vec<Level>) -> Self {
        self.subtrees.insert(name.into(), levels);
        self
    }

    pub fn with_discriminator(mut self, name: impl Into<String>) -> Self {
        self.discriminator = name.into();
        self
    }

    /// Rename the entry subtree.
    pub fn with_entry(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if let Some(levels) = self.subtrees.remove(&self.entry) {
            self.subtrees.insert(name.clone(), levels);
        }
        self.entry = name;
        self
    }

    pub fn is_heterogeneous(&self) -> bool {
        self.subtrees.len() > 1
    }

    pub fn levels(&self, subtree: &str) -> DomainResult<&[Level]> {
        self.subtrees
            .get(subtree)
            .map(Vec::as_slice)
            .ok_or_else(|| DomainError::UnknownSubtree(subtree.to_string()))
    }

    /// Structural checks across all subtrees and every path from the entry.
    pub fn validate(&self) -> DomainResult<()> {
        self.levels(&self.entry)?;

        for (name, levels) in &self.subtrees {
            if levels.is_empty() {
                return Err(DomainError::EmptySubtree(name.clone()));
            }
            for (depth, level) in levels.iter().enumerate() {
                if level.designs.is_empty() {
                    return Err(DomainError::EmptyLevel(level.name.clone()));
                }
                for design in &level.designs {
                    design.validate(&level.name)?;
                }
                let branches = depth + 1 == levels.len();
                if !branches && level.declared_ivs().contains(self.discriminator.as_str()) {
                    return Err(DomainError::MisplacedDiscriminator {
                        subtree: name.clone(),
                        name: self.discriminator.clone(),
                    });
                }
            }
        }

        let mut reached = HashSet::new();
        self.validate_path(&self.entry, &mut PathScope::default(), &mut reached)?;
        for name in self.subtrees.keys().filter(|n| !reached.contains(n.as_str())) {
            warn!("Subtree '{name}' is not reachable from '{}'.", self.entry);
        }
        Ok(())
    }

    fn validate_path<'a>(
        &'a self,
        subtree: &'a str,
        scope: &mut PathScope<'a>,
        reached: &mut HashSet<&'a str>,
    ) -> DomainResult<()> {
        if scope.subtrees.contains(&subtree) {
            return Err(DomainError::BranchCycle(subtree.to_string()));
        }
        reached.insert(subtree);
        let levels = self.levels(subtree)?;
        let mark = scope.mark();
        scope.subtrees.push(subtree);

        for level in levels {
            scope.enter_level(level, &self.discriminator)?;
        }

        let last = &levels[levels.len() - 1];
        for branch in self.branch_names(last)? {
            self.validate_path(branch, scope, reached)?;
        }

        scope.subtrees.pop();
        scope.reset(mark);
        Ok(())
    }

    /// Subtree names reachable from a level through the discriminator.
    fn branch_names<'a>(&'a self, level: &'a Level) -> DomainResult<Vec<&'a str>> {
        let mut names = Vec::new();
        for iv in level.designs.iter().flat_map(|d| &d.ivs) {
            if iv.name != self.discriminator {
                continue;
            }
            for value in iv.discrete_values() {
                let name = self.branch_name(value)?;
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn branch_name<'a>(&'a self, value: &Value) -> DomainResult<&'a str> {
        value
            .as_str()
            .and_then(|name| self.subtrees.get_key_value(name))
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| DomainError::UnknownBranch {
                value: value.clone(),
            })
    }

    /// First pass: prepare every design bottom-up within each subtree so that
    /// derived IVs of non-atomic orderings reach the level above.
    #[instrument(level = "debug", skip(self, rng), fields(entry = %self.entry))]
    pub fn prepare<R: Rng + ?Sized>(&self, rng: &mut R) -> DomainResult<PreparedTree> {
        self.validate()?;

        let mut subtrees = BTreeMap::new();
        for (name, levels) in &self.subtrees {
            subtrees.insert(name.clone(), prepare_subtree(name, levels, rng)?);
        }
        debug!(subtrees = subtrees.len(), "design tree prepared");

        Ok(PreparedTree {
            entry: self.entry.clone(),
            discriminator: self.discriminator.clone(),
            subtrees,
        })
    }
}

fn prepare_subtree<R: Rng + ?Sized>(
    subtree: &str,
    levels: &[Level],
    rng: &mut R,
) -> DomainResult<Vec<PreparedLevel>> {
    let mut derived: Vec<IndependentVariable> = Vec::new();
    let mut prepared = Vec::with_capacity(levels.len());

    for (depth, level) in levels.iter().enumerate().rev() {
        let mut installed: Vec<IndependentVariable> = Vec::new();
        let mut designs = Vec::with_capacity(level.designs.len());
        for design in &level.designs {
            let design = design.prepare(&level.name, &derived, rng)?;
            if let Some(iv) = design.derived_iv() {
                if depth == 0 {
                    return Err(DomainError::NonAtomicAtTop(subtree.to_string()));
                }
                if installed.iter().any(|other| other.name == iv.name) {
                    return Err(DomainError::DuplicateIv {
                        level: level.name.clone(),
                        name: iv.name,
                    });
                }
                installed.push(iv);
            }
            designs.push(design);
        }
        prepared.push(PreparedLevel {
            name: level.name.clone(),
            designs,
        });
        derived = installed;
    }

    prepared.reverse();
    Ok(prepared)
}

/// Names already bound on the current path.
#[derive(Default)]
struct PathScope<'a> {
    subtrees: Vec<&'a str>,
    levels: Vec<&'a str>,
    ivs: Vec<&'a str>,
}

impl<'a> PathScope<'a> {
    fn mark(&self) -> (usize, usize) {
        (self.levels.len(), self.ivs.len())
    }

    fn reset(&mut self, (levels, ivs): (usize, usize)) {
        self.levels.truncate(levels);
        self.ivs.truncate(ivs);
    }

    fn enter_level(&mut self, level: &'a Level, discriminator: &str) -> DomainResult<()> {
        if self.levels.contains(&level.name.as_str()) {
            return Err(DomainError::DuplicateLevel(level.name.clone()));
        }
        if self.ivs.contains(&level.name.as_str()) {
            return Err(DomainError::IvShadowsLevel {
                level: level.name.clone(),
                name: level.name.clone(),
            });
        }
        self.levels.push(&level.name);

        let mut declared: Vec<&str> = level.declared_ivs().into_iter().collect();
        declared.sort_unstable();
        for name in declared {
            if self.levels.contains(&name) {
                return Err(DomainError::IvShadowsLevel {
                    level: level.name.clone(),
                    name: name.to_string(),
                });
            }
            if name == discriminator {
                continue;
            }
            if self.ivs.contains(&name) {
                return Err(DomainError::DuplicateIv {
                    level: level.name.clone(),
                    name: name.to_string(),
                });
            }
            self.ivs.push(name);
        }
        Ok(())
    }
}

/// Position of a level inside a prepared tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesignCursor {
    pub subtree: String,
    pub depth: usize,
}

impl DesignCursor {
    pub fn new(subtree: impl Into<String>, depth: usize) -> Self {
        Self {
            subtree: subtree.into(),
            depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedLevel {
    pub name: String,
    pub designs: Vec<PreparedDesign>,
}

/// Design tree after its first pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTree {
    pub entry: String,
    pub discriminator: String,
    pub subtrees: BTreeMap<String, Vec<PreparedLevel>>,
}

impl PreparedTree {
    /// Level generating the children of the root section.
    pub fn entry_cursor(&self) -> DesignCursor {
        DesignCursor::new(self.entry.clone(), 0)
    }

    pub fn level(&self, cursor: &DesignCursor) -> DomainResult<&PreparedLevel> {
        self.subtrees
            .get(&cursor.subtree)
            .ok_or_else(|| DomainError::UnknownSubtree(cursor.subtree.clone()))?
            .get(cursor.depth)
            .ok_or_else(|| DomainError::UnknownSubtree(format!("{}[{}]", cursor.subtree, cursor.depth)))
    }

    /// Level generating the children of a section created at `cursor` with
    /// the given own `condition`; `None` means the section is a leaf.
    pub fn next(
        &self,
        cursor: &DesignCursor,
        condition: &Condition,
    ) -> DomainResult<Option<DesignCursor>> {
        let levels = self
            .subtrees
            .get(&cursor.subtree)
            .ok_or_else(|| DomainError::UnknownSubtree(cursor.subtree.clone()))?;

        if cursor.depth + 1 < levels.len() {
            return Ok(Some(DesignCursor::new(cursor.subtree.clone(), cursor.depth + 1)));
        }
        match condition.get(&self.discriminator) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .filter(|name| self.subtrees.contains_key(*name))
                .map(|name| Some(DesignCursor::new(name, 0)))
                .ok_or_else(|| DomainError::UnknownBranch {
                    value: value.clone(),
                }),
        }
    }
}
