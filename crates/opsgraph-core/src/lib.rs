//! OpsGraph Core - In-memory component model for the persistent graph store
//!
//! This crate provides the store-independent building blocks:
//! - Component capability traits and the rehydration registry
//! - Persisted record shapes (the entity model)
//! - Dirty-object aggregation over cyclic component graphs
//! - Step-behind caching for expensive repeated lookups

pub mod cache;
pub mod component;
pub mod dirty;
pub mod record;

// Re-exports for convenience
pub use cache::{LookupError, StepBehindCache};
pub use component::{
    BaseComponent, BootstrapOrdering, Component, ComponentFactory, ComponentHandle,
    ComponentRegistry, ModelPersistence, RegistryError,
};
pub use dirty::{DirtyObjectManager, ExplicitDirtyManager, ImplicitDirtyManager};
pub use record::{
    now_millis, ComponentRecord, ReferenceEdge, TagAssociation, TagRecord, ViewState,
};
