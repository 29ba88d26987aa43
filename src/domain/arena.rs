use std::collections::BTreeMap;
use std::fmt;

use generational_arena::{Arena, Index};
use serde::{Deserialize, Serialize};
use termtree::Tree;
use tracing::{debug, instrument};

use crate::domain::design_tree::DesignCursor;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::value::{Condition, Value};

/// Level name of the synthetic root section.
pub const ROOT_LEVEL: &str = "_base";

/// `(level name, section number)` pairs from the top level down.
pub type SectionPath = Vec<(String, usize)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Partial,
    Finished,
}

/// Data payload of one experiment section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionData {
    /// Level this section belongs to
    pub level: String,
    /// 1-based ordinal among siblings
    pub number: usize,
    /// IV values assigned to this section
    pub condition: Condition,
    /// Design extra data and values attached with `add_data`
    pub data: Condition,
    /// Level generating this section's children, None for leaves
    pub cursor: Option<DesignCursor>,
    pub state: RunState,
}

impl SectionData {
    pub fn root(cursor: Option<DesignCursor>) -> Self {
        Self {
            level: ROOT_LEVEL.to_string(),
            number: 1,
            condition: Condition::new(),
            data: Condition::new(),
            cursor,
            state: RunState::NotStarted,
        }
    }
}

impl fmt::Display for SectionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level, self.number)?;
        if !self.condition.is_empty() {
            let pairs: Vec<String> = self
                .condition
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " ({})", pairs.join(", "))?;
        }
        Ok(())
    }
}

/// Section node in the arena-based hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionNode {
    pub data: SectionData,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes, in section-number order
    pub children: Vec<Index>,
}

/// Arena-based section tree.
///
/// Uses generational arena so indices of removed sections never alias new
/// ones. Each arena holds exactly one experiment hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionArena {
    arena: Arena<SectionNode>,
    root: Option<Index>,
}

impl Default for SectionArena {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn insert_node(&mut self, data: SectionData, parent: Option<Index>) -> Index {
        let node = SectionNode {
            data,
            parent,
            children: Vec::new(),
        };
        let node_idx = self.arena.insert(node);

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.push(node_idx);
            }
        } else {
            self.root = Some(node_idx);
        }

        node_idx
    }

    /// Insert a child at a 0-based slot among its siblings and renumber them.
    pub fn insert_child_at(
        &mut self,
        parent: Index,
        slot: usize,
        data: SectionData,
    ) -> DomainResult<Index> {
        let siblings = self.node(parent)?.children.len();
        let node_idx = self.arena.insert(SectionNode {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children.insert(slot.min(siblings), node_idx);
        }
        self.renumber(parent);
        Ok(node_idx)
    }

    pub fn get_node(&self, idx: Index) -> Option<&SectionNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut SectionNode> {
        self.arena.get_mut(idx)
    }

    fn node(&self, idx: Index) -> DomainResult<&SectionNode> {
        self.arena
            .get(idx)
            .ok_or_else(|| DomainError::SectionNotFound(format!("{idx:?}")))
    }

    fn node_mut(&mut self, idx: Index) -> DomainResult<&mut SectionNode> {
        self.arena
            .get_mut(idx)
            .ok_or_else(|| DomainError::SectionNotFound(format!("{idx:?}")))
    }

    pub fn data(&self, idx: Index) -> DomainResult<&SectionData> {
        self.node(idx).map(|node| &node.data)
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.get_node(idx)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Pre-order traversal from the root.
    pub fn iter(&self) -> SectionIterator {
        SectionIterator::new(self, self.root)
    }

    /// Pre-order traversal of the subtree rooted at `idx`, `idx` included.
    pub fn walk(&self, idx: Index) -> SectionIterator {
        SectionIterator::new(self, Some(idx))
    }

    pub fn iter_postorder(&self) -> PostOrderIterator {
        PostOrderIterator::new(self)
    }

    /// Number of levels below and including the root.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        if let Some(root) = self.root {
            self.calculate_depth(root)
        } else {
            0
        }
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.get_node(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Sections without children, in experiment order.
    pub fn leaves(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Ancestors of `idx` from the root down, `idx` excluded.
    pub fn parents(&self, idx: Index) -> Vec<Index> {
        let mut chain = Vec::new();
        let mut current = self.get_node(idx).and_then(|node| node.parent);
        while let Some(parent_idx) = current {
            chain.push(parent_idx);
            current = self.get_node(parent_idx).and_then(|node| node.parent);
        }
        chain.reverse();
        chain
    }

    /// Level names and numbers from the top level down to `idx`; the root
    /// itself has an empty path.
    pub fn path(&self, idx: Index) -> SectionPath {
        self.parents(idx)
            .into_iter()
            .chain(std::iter::once(idx))
            .filter(|&i| Some(i) != self.root)
            .filter_map(|i| self.get_node(i))
            .map(|node| (node.data.level.clone(), node.data.number))
            .collect()
    }

    /// Follow `(level, number)` pairs down from `from`.
    pub fn find(&self, from: Index, path: &[(&str, usize)]) -> DomainResult<Index> {
        let mut current = from;
        for (level, number) in path {
            current = self
                .children(current)
                .iter()
                .copied()
                .find(|&child| {
                    self.get_node(child)
                        .is_some_and(|n| n.data.level == *level && n.data.number == *number)
                })
                .ok_or_else(|| DomainError::SectionNotFound(format!("{level} {number}")))?;
        }
        Ok(current)
    }

    /// Reverse mapping from section path to section.
    pub fn section_index(&self) -> BTreeMap<SectionPath, Index> {
        self.iter().map(|(idx, _)| (self.path(idx), idx)).collect()
    }

    /// IV values of `idx` overlaid on all of its ancestors'.
    pub fn merged_condition(&self, idx: Index) -> Condition {
        let mut merged = Condition::new();
        for i in self.parents(idx).into_iter().chain(std::iter::once(idx)) {
            if let Some(node) = self.get_node(i) {
                merged.extend(node.data.condition.clone());
            }
        }
        merged
    }

    /// Everything a section sees: IV values, section numbers keyed by level
    /// name and attached data, the nearest section winning on conflicts.
    pub fn context(&self, idx: Index) -> Condition {
        let mut context = Condition::new();
        for i in self.parents(idx).into_iter().chain(std::iter::once(idx)) {
            if let Some(node) = self.get_node(i) {
                if Some(i) != self.root {
                    context.insert(node.data.level.clone(), Value::from(node.data.number));
                }
                context.extend(node.data.data.clone());
                context.extend(node.data.condition.clone());
            }
        }
        context
    }

    /// Value of `name` as seen from `idx`.
    pub fn value(&self, idx: Index, name: &str) -> DomainResult<Value> {
        self.context(idx)
            .remove(name)
            .ok_or_else(|| DomainError::MissingVariable {
                section: self.describe(idx),
                name: name.to_string(),
            })
    }

    pub fn add_data(&mut self, idx: Index, data: Condition) -> DomainResult<()> {
        self.node_mut(idx)?.data.data.extend(data);
        Ok(())
    }

    /// Remove `idx` with all descendants and renumber its former siblings.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_subtree(&mut self, idx: Index) -> DomainResult<SectionData> {
        let parent = self.node(idx)?.parent;
        if parent.is_none() {
            return Err(DomainError::CannotRemoveRoot);
        }
        let doomed: Vec<Index> = self.walk(idx).map(|(i, _)| i).collect();

        if let Some(parent_idx) = parent {
            if let Some(parent_node) = self.arena.get_mut(parent_idx) {
                parent_node.children.retain(|&child| child != idx);
            }
        }

        let mut removed = None;
        for i in doomed {
            if let Some(node) = self.arena.remove(i) {
                if i == idx {
                    removed = Some(node.data);
                }
            }
        }
        if let Some(parent_idx) = parent {
            self.renumber(parent_idx);
        }
        debug!(removed = removed.is_some(), "subtree removed");
        removed.ok_or_else(|| DomainError::SectionNotFound(format!("{idx:?}")))
    }

    /// Restore 1, 2, 3, ... numbering among the children of `parent`.
    pub fn renumber(&mut self, parent: Index) {
        let children = self.children(parent).to_vec();
        for (i, child) in children.into_iter().enumerate() {
            if let Some(node) = self.arena.get_mut(child) {
                node.data.number = i + 1;
            }
        }
    }

    /// Mark `idx` and every not-yet-started ancestor as partially run.
    pub fn mark_started(&mut self, idx: Index) -> DomainResult<()> {
        self.node_mut(idx)?.data.state = RunState::Partial;
        for parent in self.parents(idx) {
            if let Some(node) = self.arena.get_mut(parent) {
                if node.data.state == RunState::NotStarted {
                    node.data.state = RunState::Partial;
                }
            }
        }
        Ok(())
    }

    /// Mark `idx` finished; ancestors whose children are now all finished
    /// follow.
    pub fn mark_finished(&mut self, idx: Index) -> DomainResult<()> {
        self.node_mut(idx)?.data.state = RunState::Finished;
        for parent in self.parents(idx).into_iter().rev() {
            let done = self
                .children(parent)
                .iter()
                .all(|&c| self.get_node(c).is_some_and(|n| n.data.state == RunState::Finished));
            if !done {
                break;
            }
            if let Some(node) = self.arena.get_mut(parent) {
                node.data.state = RunState::Finished;
            }
        }
        Ok(())
    }

    /// First section at `level`, in experiment order, in the given state.
    pub fn find_first(&self, level: &str, state: RunState) -> Option<Index> {
        self.iter()
            .find(|(_, node)| node.data.level == level && node.data.state == state)
            .map(|(idx, _)| idx)
    }

    /// Human-readable label, e.g. `session 2 > block 1`.
    pub fn describe(&self, idx: Index) -> String {
        let path = self.path(idx);
        if path.is_empty() {
            return ROOT_LEVEL.to_string();
        }
        path.iter()
            .map(|(level, number)| format!("{level} {number}"))
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// Text rendering of the subtree at `idx`.
    pub fn render(&self, idx: Index) -> Tree<String> {
        let label = self
            .get_node(idx)
            .map(|node| node.data.to_string())
            .unwrap_or_default();
        let mut tree = Tree::new(label);
        for &child in self.children(idx) {
            tree.push(self.render(child));
        }
        tree
    }
}

pub struct SectionIterator<'a> {
    arena: &'a SectionArena,
    stack: Vec<Index>,
}

impl<'a> SectionIterator<'a> {
    fn new(arena: &'a SectionArena, start: Option<Index>) -> Self {
        Self {
            arena,
            stack: start.into_iter().collect(),
        }
    }
}

impl<'a> Iterator for SectionIterator<'a> {
    type Item = (Index, &'a SectionNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a SectionArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a SectionArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push((root, false));
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a SectionNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
