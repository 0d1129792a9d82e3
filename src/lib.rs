//! Declarative provisioning of system media collections.
//!
//! A configured [`domain::tree::CollectionTree`] is materialised in a
//! [`application::repos::CollectionsRepo`] by the
//! [`application::system_collections::SystemCollectionManager`], which then
//! answers key → identifier lookups from a two-tier cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
