//! Application services and the persistence contracts they depend on.

pub mod error;
pub mod repos;
pub mod system_collections;
