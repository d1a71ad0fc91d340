//! OpsGraph Store - SQLite-backed persistence for component graphs
//!
//! This crate provides the persistence service of the workbench:
//! - Batch persist with optimistic concurrency (version tokens)
//! - Cycle-safe cascading delete with shared-ownership semantics
//! - Reverse-reference queries and glob name search
//! - Tagging, per-view state, and cached bootstrap root discovery

pub mod bootstrap;
pub mod schema;
pub mod search;
pub mod store;

// Re-exports for convenience
pub use bootstrap::{compare_bootstrap, BootstrapResolver, BOOTSTRAP_TAG};
pub use schema::STORE_SCHEMA_VERSION;
pub use search::{SearchFilter, SearchResults};
pub use store::{GraphStore, StoreError};
