//! Generate hierarchical experiment section trees from declarative designs.
//!
//! A [`DesignTree`] names the levels of an experiment (participant, session,
//! block, trial, ...) and the [`Design`] governing each one. Building an
//! [`Experiment`] crosses IVs into conditions, orders them per level and
//! coordinates non-atomic orderings (counterbalancing, Latin squares) across
//! sibling sections.

pub mod application;
pub mod config;
pub mod domain;
pub mod util;

pub use application::{ApplicationError, ApplicationResult, Experiment};
pub use config::Settings;
pub use domain::{
    Condition, Design, DesignTree, DomainError, IndependentVariable, Level, Ordering, Value,
};
