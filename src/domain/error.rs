//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::value::Value;

/// Domain errors represent malformed designs, infeasible orderings and
/// rejected tree edits. Generation never retries on its own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    // Malformed designs
    #[error("IV '{name}' declared more than once (level '{level}')")]
    DuplicateIv { level: String, name: String },

    #[error("IV '{name}' at level '{level}' collides with reserved derived IV name")]
    ReservedIvName { level: String, name: String },

    #[error("IV '{name}' has no values")]
    EmptyIv { name: String },

    #[error("IV '{name}' has a NaN value")]
    NanValue { name: String },

    #[error("continuous IV '{name}' requires a design matrix")]
    ContinuousWithoutMatrix { name: String },

    #[error("design matrix row {row} has {found} columns, expected {expected} (one per IV)")]
    MatrixShape {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("design matrix column for IV '{name}' has {found} distinct values, IV declares {expected}")]
    MatrixLevels {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid ordering: {0}")]
    InvalidOrdering(String),

    #[error("ordering 'Sorted' only works with exactly one IV (got {0})")]
    SortedNeedsSingleIv(usize),

    #[error("cannot compute a balanced Latin square with an odd order ({0})")]
    OddBalancedLatinSquare(usize),

    #[error("complete counterbalance would create {0} orderings")]
    TooManyOrderings(u128),

    #[error("non-atomic ordering at the top level of subtree '{0}'")]
    NonAtomicAtTop(String),

    #[error("subtree '{0}' is not defined")]
    UnknownSubtree(String),

    #[error("subtree '{0}' has no levels")]
    EmptySubtree(String),

    #[error("discriminator value {value} does not name a subtree")]
    UnknownBranch { value: Value },

    #[error("discriminator IV '{name}' must be on the last level of subtree '{subtree}'")]
    MisplacedDiscriminator { subtree: String, name: String },

    #[error("branch cycle through subtree '{0}'")]
    BranchCycle(String),

    #[error("designs at level '{0}' must share one level name")]
    LevelNameMismatch(String),

    #[error("level '{0}' has no designs")]
    EmptyLevel(String),

    #[error("level name '{0}' appears twice on one path")]
    DuplicateLevel(String),

    #[error("IV '{name}' shadows level name '{level}'")]
    IvShadowsLevel { level: String, name: String },

    // Infeasibility
    #[error("infeasible ordering: {0}")]
    Infeasible(String),

    // Generation / lookup
    #[error("parent has no value for derived IV '{0}'")]
    MissingDerivedValue(String),

    #[error("section {section} has no value for '{name}'")]
    MissingVariable { section: String, name: String },

    #[error("section not found: {0}")]
    SectionNotFound(String),

    // Incremental-edit errors
    #[error("cannot add sections below the bottom level ({0})")]
    BottomLevel(String),

    #[error("IV '{0}' is not declared at this level")]
    UnknownIv(String),

    #[error("no single design at level '{level}' declares all of {names:?}")]
    PinnedAcrossDesigns { level: String, names: Vec<String> },

    #[error("the root section cannot be removed")]
    CannotRemoveRoot,

    #[error("value {value} is not a declared value of IV '{name}'")]
    InvalidPinnedValue { name: String, value: Value },

    #[error("insert position {position} out of range 1..={max}")]
    InvalidPosition { position: usize, max: usize },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
