//! Shared helpers outside the domain model.

pub mod testing;
