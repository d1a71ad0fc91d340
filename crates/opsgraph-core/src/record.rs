//! Persisted Record Shapes
//!
//! The entity model shared between the in-memory component layer and the
//! SQLite persistence layer. These structs mirror the stored rows exactly;
//! rehydration into live components happens through the
//! [`ComponentRegistry`](crate::component::ComponentRegistry).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as epoch milliseconds.
///
/// All persisted timestamps (creation, last-modified) use this resolution.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A persisted component row
///
/// `version` is the optimistic concurrency token: it starts at 1 on first
/// persist and strictly increases on every committed mutation of the
/// component or of any edge naming it as parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Stable, globally unique component id
    pub id: String,

    /// Displayed name
    pub name: String,

    /// User id of the creator
    pub creator: String,

    /// User id of the current owner
    pub owner: String,

    /// Creation timestamp (epoch ms), immutable once stamped at first persist
    pub created_at_ms: i64,

    /// Optional external correlation key, unique per (external_key, type_tag)
    pub external_key: Option<String>,

    /// Last-modified timestamp (epoch ms)
    pub modified_at_ms: i64,

    /// Type tag selecting the rehydration factory
    pub type_tag: String,

    /// Opaque serialized model state
    pub model_blob: Option<String>,

    /// Monotonic version counter (optimistic concurrency token)
    pub version: i64,
}

/// A persisted, ordered containment edge
///
/// Edges are the sole source of child ordering. A child may be referenced
/// from multiple parents (shared ownership); no two edges from the same
/// parent share a `seq_no`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    /// Referencing (containing) component id
    pub parent_id: String,

    /// Referenced component id
    pub child_id: String,

    /// Position of the child within the parent's ordered children
    pub seq_no: i64,
}

/// A global tag catalog entry
///
/// Catalog entries are independent of any component: a tag survives even
/// when no component is associated with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub tag_id: String,
    pub default_property: Option<String>,
}

/// A component-to-tag association row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssociation {
    pub component_id: String,
    pub tag_id: String,
    pub property_override: Option<String>,
}

/// Per-view persisted state, keyed by (component_id, view_type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub component_id: String,
    pub view_type: String,
    pub blob: String,
}
