//! Component Capability Model
//!
//! In-memory components are the unit of persistence: the store consumes
//! them through the [`Component`] trait and nothing else. Optional
//! behaviors (model persistence, nested dirty aggregation, bootstrap
//! ordering) are a closed set of named capabilities resolved through typed
//! accessors rather than runtime type lookup, so a component declares what
//! it supports at construction time.

use crate::dirty::DirtyObjectManager;
use crate::record::ComponentRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to a live component
pub type ComponentHandle = Arc<dyn Component>;

/// Capability: opaque get/set of the serialized model state
///
/// Components without this capability persist with an empty model blob.
pub trait ModelPersistence: Send + Sync {
    /// Current serialized model, if any
    fn model_blob(&self) -> Option<String>;

    /// Replace the serialized model (e.g. on rehydration)
    fn set_model_blob(&self, blob: String);
}

/// Capability value: position of a bootstrap root in the startup ordering
///
/// Components are grouped by `category_index` and ordered within a
/// category by `component_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOrdering {
    pub category_index: i32,
    pub component_index: i32,
}

/// The capability surface the store requires from every in-memory component
///
/// Object-safe; the store and the dirty-tracking layer only ever see
/// `Arc<dyn Component>`. Mutating accessors take `&self`; implementations
/// use interior mutability.
pub trait Component: Send + Sync {
    /// Stable, globally unique id
    fn id(&self) -> &str;

    /// Displayed name
    fn display_name(&self) -> String;

    /// Type tag selecting the rehydration factory on load
    fn type_tag(&self) -> &str;

    /// User id of the creator
    fn creator(&self) -> String;

    /// User id of the current owner
    fn owner(&self) -> String;

    /// External correlation key, unique per (external_key, type_tag)
    fn external_key(&self) -> Option<String> {
        None
    }

    /// Whether in-memory state differs from the last persisted state
    fn is_dirty(&self) -> bool;

    /// Clear the dirty flag (called by the store after a successful persist)
    fn mark_clean(&self);

    /// Creation timestamp (epoch ms); `None` until first persisted
    fn creation_timestamp_ms(&self) -> Option<i64>;

    /// Stamp the creation timestamp (called by the store on first persist)
    fn set_creation_timestamp_ms(&self, ts_ms: i64);

    /// Last stored version this component was loaded from (0 = never persisted)
    fn version(&self) -> i64;

    /// Update the version token (called by the store after commit)
    fn set_version(&self, version: i64);

    /// Direct children, in persistence order
    fn local_children(&self) -> Vec<ComponentHandle>;

    /// Capability: serialized model access
    fn model_persistence(&self) -> Option<&dyn ModelPersistence> {
        None
    }

    /// Capability: nested dirty-object aggregation
    fn dirty_manager(&self) -> Option<&dyn DirtyObjectManager> {
        None
    }

    /// Capability: bootstrap startup ordering
    fn bootstrap_ordering(&self) -> Option<BootstrapOrdering> {
        None
    }
}

/// Errors from the component registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No factory registered for type tag: {0}")]
    UnknownTypeTag(String),
}

/// Factory closure rehydrating a stored record into a live component
pub type ComponentFactory = Box<dyn Fn(&ComponentRecord) -> ComponentHandle + Send + Sync>;

/// Registry mapping type tags to rehydration factories
///
/// Explicitly constructed and passed by reference; there is no process-wide
/// registry, so tests can run independent instances side by side.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the [`BaseComponent`] factory registered
    /// under [`BaseComponent::TYPE_TAG`]
    pub fn with_base_factory() -> Self {
        let mut registry = Self::new();
        registry.register(BaseComponent::TYPE_TAG, |record| {
            Arc::new(BaseComponent::from_record(record))
        });
        registry
    }

    /// Register a factory for a type tag, replacing any previous one
    pub fn register<F>(&mut self, type_tag: &str, factory: F)
    where
        F: Fn(&ComponentRecord) -> ComponentHandle + Send + Sync + 'static,
    {
        self.factories.insert(type_tag.to_string(), Box::new(factory));
    }

    /// Whether a factory exists for the tag
    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Rehydrate a stored record into a live component
    pub fn rehydrate(&self, record: &ComponentRecord) -> Result<ComponentHandle, RegistryError> {
        let factory = self
            .factories
            .get(&record.type_tag)
            .ok_or_else(|| RegistryError::UnknownTypeTag(record.type_tag.clone()))?;
        Ok(factory(record))
    }
}

/// Mutable interior of a [`BaseComponent`]
struct BaseState {
    name: String,
    owner: String,
    children: Vec<ComponentHandle>,
    model_blob: Option<String>,
    dirty: bool,
    created_at_ms: Option<i64>,
    version: i64,
    bootstrap_ordering: Option<BootstrapOrdering>,
}

/// General-purpose component implementation
///
/// Covers the workbench's simple domain types: a displayed name, an owner,
/// ordered children and an opaque model blob, with interior mutability via
/// `parking_lot::RwLock`. Richer domain types implement [`Component`]
/// directly.
pub struct BaseComponent {
    id: String,
    type_tag: String,
    creator: String,
    external_key: Option<String>,
    state: RwLock<BaseState>,
}

impl BaseComponent {
    /// Type tag the default registry factory is registered under
    pub const TYPE_TAG: &'static str = "base";

    /// Create a new, never-persisted component
    ///
    /// Starts dirty (it has never been saved) with version 0.
    pub fn new(id: &str, name: &str, creator: &str) -> Self {
        Self {
            id: id.to_string(),
            type_tag: Self::TYPE_TAG.to_string(),
            creator: creator.to_string(),
            external_key: None,
            state: RwLock::new(BaseState {
                name: name.to_string(),
                owner: creator.to_string(),
                children: Vec::new(),
                model_blob: None,
                dirty: true,
                created_at_ms: None,
                version: 0,
                bootstrap_ordering: None,
            }),
        }
    }

    /// Override the type tag (for factories registered under another tag)
    pub fn with_type_tag(mut self, type_tag: &str) -> Self {
        self.type_tag = type_tag.to_string();
        self
    }

    /// Attach an external correlation key
    pub fn with_external_key(mut self, key: &str) -> Self {
        self.external_key = Some(key.to_string());
        self
    }

    /// Declare the bootstrap ordering capability
    pub fn with_bootstrap_ordering(self, category_index: i32, component_index: i32) -> Self {
        self.state.write().bootstrap_ordering = Some(BootstrapOrdering {
            category_index,
            component_index,
        });
        self
    }

    /// Rebuild a component from its stored record
    ///
    /// The result is clean (it mirrors the store) and carries the stored
    /// version token. Children are not materialized here; they are resolved
    /// from the edge table on demand by the caller.
    pub fn from_record(record: &ComponentRecord) -> Self {
        Self {
            id: record.id.clone(),
            type_tag: record.type_tag.clone(),
            creator: record.creator.clone(),
            external_key: record.external_key.clone(),
            state: RwLock::new(BaseState {
                name: record.name.clone(),
                owner: record.owner.clone(),
                children: Vec::new(),
                model_blob: record.model_blob.clone(),
                dirty: false,
                created_at_ms: Some(record.created_at_ms),
                version: record.version,
                bootstrap_ordering: None,
            }),
        }
    }

    /// Rename the component, marking it dirty
    pub fn set_display_name(&self, name: &str) {
        let mut state = self.state.write();
        state.name = name.to_string();
        state.dirty = true;
    }

    /// Transfer ownership, marking the component dirty
    pub fn set_owner(&self, owner: &str) {
        let mut state = self.state.write();
        state.owner = owner.to_string();
        state.dirty = true;
    }

    /// Append a child reference, marking the component dirty
    pub fn add_child(&self, child: ComponentHandle) {
        let mut state = self.state.write();
        state.children.push(child);
        state.dirty = true;
    }

    /// Replace the ordered child list, marking the component dirty
    pub fn set_children(&self, children: Vec<ComponentHandle>) {
        let mut state = self.state.write();
        state.children = children;
        state.dirty = true;
    }

    /// Force the dirty flag (for callers tracking out-of-band mutations)
    pub fn mark_dirty(&self) {
        self.state.write().dirty = true;
    }
}

impl Component for BaseComponent {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> String {
        self.state.read().name.clone()
    }

    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn creator(&self) -> String {
        self.creator.clone()
    }

    fn owner(&self) -> String {
        self.state.read().owner.clone()
    }

    fn external_key(&self) -> Option<String> {
        self.external_key.clone()
    }

    fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    fn mark_clean(&self) {
        self.state.write().dirty = false;
    }

    fn creation_timestamp_ms(&self) -> Option<i64> {
        self.state.read().created_at_ms
    }

    fn set_creation_timestamp_ms(&self, ts_ms: i64) {
        self.state.write().created_at_ms = Some(ts_ms);
    }

    fn version(&self) -> i64 {
        self.state.read().version
    }

    fn set_version(&self, version: i64) {
        self.state.write().version = version;
    }

    fn local_children(&self) -> Vec<ComponentHandle> {
        self.state.read().children.clone()
    }

    fn model_persistence(&self) -> Option<&dyn ModelPersistence> {
        Some(self)
    }

    fn bootstrap_ordering(&self) -> Option<BootstrapOrdering> {
        self.state.read().bootstrap_ordering
    }
}

impl ModelPersistence for BaseComponent {
    fn model_blob(&self) -> Option<String> {
        self.state.read().model_blob.clone()
    }

    fn set_model_blob(&self, blob: String) {
        let mut state = self.state.write();
        state.model_blob = Some(blob);
        state.dirty = true;
    }
}
