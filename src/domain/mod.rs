//! Domain layer: designs, orderings and the section tree
//!
//! This layer is independent of external concerns (no I/O, no config loading).
//! All randomness is injected by the caller.

pub mod arena;
pub mod builder;
pub mod design;
pub mod design_tree;
pub mod error;
pub mod latin;
pub mod ordering;
pub mod value;

pub use arena::{RunState, SectionArena, SectionData, SectionNode, SectionPath, ROOT_LEVEL};
pub use builder::SectionTreeBuilder;
pub use design::{Design, DesignMatrix, PreparedDesign};
pub use design_tree::{DesignCursor, DesignTree, Level, PreparedLevel, PreparedTree};
pub use error::{DomainError, DomainResult};
pub use latin::{balanced_latin_square, is_latin_rectangle, latin_square, Square};
pub use ordering::{
    Ordering, PreparedOrdering, SortOrder, COUNTERBALANCE_IV, LATIN_SQUARE_IV, RESERVED_IV_NAMES,
    SORTED_IV,
};
pub use value::{condition, full_cross, Condition, IndependentVariable, IvValues, Value};
