//! Application layer: experiment facade and specification parsing
//!
//! This layer turns parsed specifications and settings into domain objects.

pub mod error;
pub mod experiment;
pub mod spec;

pub use error::{ApplicationError, ApplicationResult};
pub use experiment::Experiment;
pub use spec::{DesignSpec, DesignTreeSpec, ExperimentSpec, IvSpecs, LevelSpec, OrderingSpec};
