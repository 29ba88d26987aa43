//! Tree builder: second pass, turning a prepared design tree into sections.

use generational_arena::Index;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, instrument, trace};

use crate::domain::arena::{RunState, SectionArena, SectionData};
use crate::domain::design::PreparedDesign;
use crate::domain::design_tree::{PreparedLevel, PreparedTree};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::value::Condition;

/// Constructs section hierarchies from a [`PreparedTree`].
pub struct SectionTreeBuilder<'a> {
    tree: &'a PreparedTree,
}

impl<'a> SectionTreeBuilder<'a> {
    pub fn new(tree: &'a PreparedTree) -> Self {
        Self { tree }
    }

    /// Build the whole hierarchy below a fresh synthetic root.
    ///
    /// Nothing is returned on error, so a failed build never leaves a
    /// partially constructed tree behind.
    #[instrument(level = "debug", skip(self, rng))]
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> DomainResult<SectionArena> {
        let mut arena = SectionArena::new();
        let root = arena.insert_node(SectionData::root(Some(self.tree.entry_cursor())), None);
        self.grow(&mut arena, root, rng)?;
        debug!(sections = arena.len(), "section tree built");
        Ok(arena)
    }

    /// Generate every descendant of `idx`, which must not have children yet.
    pub fn grow<R: Rng + ?Sized>(
        &self,
        arena: &mut SectionArena,
        idx: Index,
        rng: &mut R,
    ) -> DomainResult<()> {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let children = self.generate_children(arena, current, rng)?;
            // Reverse so sections are filled in experiment order
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }

    fn generate_children<R: Rng + ?Sized>(
        &self,
        arena: &mut SectionArena,
        parent: Index,
        rng: &mut R,
    ) -> DomainResult<Vec<Index>> {
        let Some(cursor) = arena.data(parent)?.cursor.clone() else {
            return Ok(Vec::new());
        };
        let level = self.tree.level(&cursor)?;
        let context = arena.context(parent);

        let mut created = Vec::new();
        for design in &level.designs {
            for condition in design.order(&context, rng)? {
                let next = self.tree.next(&cursor, &condition)?;
                let data = SectionData {
                    level: level.name.clone(),
                    number: created.len() + 1,
                    condition,
                    data: design.extra_data.clone(),
                    cursor: next,
                    state: RunState::NotStarted,
                };
                created.push(arena.insert_node(data, Some(parent)));
            }
        }
        trace!(parent = %arena.describe(parent), level = %level.name, count = created.len(), "children generated");
        Ok(created)
    }

    /// Insert one new child of `parent` and generate its descendants.
    ///
    /// `pinned` fixes IV values; the remaining IVs of the matching design are
    /// drawn uniformly from their possible values. `position` is the 1-based
    /// number the new section takes, appending when `None`. On error the
    /// tree is left as it was.
    #[instrument(level = "debug", skip(self, arena, rng))]
    pub fn add_section<R: Rng + ?Sized>(
        &self,
        arena: &mut SectionArena,
        parent: Index,
        pinned: &Condition,
        position: Option<usize>,
        rng: &mut R,
    ) -> DomainResult<Index> {
        let cursor = arena
            .data(parent)?
            .cursor
            .clone()
            .ok_or_else(|| DomainError::BottomLevel(arena.describe(parent)))?;
        let level = self.tree.level(&cursor)?;
        let design = matching_design(level, pinned)?;
        let condition = sample_condition(design, pinned, rng)?;

        let max = arena.children(parent).len() + 1;
        let slot = match position {
            None => max - 1,
            Some(p) if (1..=max).contains(&p) => p - 1,
            Some(p) => return Err(DomainError::InvalidPosition { position: p, max }),
        };

        let data = SectionData {
            level: level.name.clone(),
            number: slot + 1,
            cursor: self.tree.next(&cursor, &condition)?,
            condition,
            data: design.extra_data.clone(),
            state: RunState::NotStarted,
        };
        let idx = arena.insert_child_at(parent, slot, data)?;
        if let Err(e) = self.grow(arena, idx, rng) {
            arena.remove_subtree(idx)?;
            return Err(e);
        }
        debug!(section = %arena.describe(idx), "section added");
        Ok(idx)
    }
}

/// First design at the level declaring every pinned IV.
fn matching_design<'t>(level: &'t PreparedLevel, pinned: &Condition) -> DomainResult<&'t PreparedDesign> {
    if let Some(design) = level
        .designs
        .iter()
        .find(|d| pinned.keys().all(|name| d.domain(name).is_some()))
    {
        return Ok(design);
    }
    if let Some(unknown) = pinned
        .keys()
        .find(|name| level.designs.iter().all(|d| d.domain(name).is_none()))
    {
        return Err(DomainError::UnknownIv(unknown.clone()));
    }
    Err(DomainError::PinnedAcrossDesigns {
        level: level.name.clone(),
        names: pinned.keys().cloned().collect(),
    })
}

fn sample_condition<R: Rng + ?Sized>(
    design: &PreparedDesign,
    pinned: &Condition,
    rng: &mut R,
) -> DomainResult<Condition> {
    for (name, value) in pinned {
        let allowed = design
            .domain(name)
            .is_some_and(|iv| iv.discrete_values().contains(value));
        if !allowed {
            return Err(DomainError::InvalidPinnedValue {
                name: name.clone(),
                value: value.clone(),
            });
        }
    }

    let mut condition = pinned.clone();
    for iv in &design.domains {
        if condition.contains_key(&iv.name) {
            continue;
        }
        let value = iv
            .discrete_values()
            .choose(rng)
            .ok_or_else(|| DomainError::EmptyIv {
                name: iv.name.clone(),
            })?;
        condition.insert(iv.name.clone(), value.clone());
    }
    Ok(condition)
}
