//! Domain layer types and invariants.

pub mod collections;
pub mod error;
pub mod tree;
