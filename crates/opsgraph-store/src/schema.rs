//! SQLite Schema Definitions for the Component-Graph Store
//!
//! One database holds the full component graph: component rows, ordered
//! reference edges, the global tag catalog, tag associations and per-view
//! state. Everything the store persists lives in these five tables plus a
//! small key/value metadata table.

/// Schema version for store databases
pub const STORE_SCHEMA_VERSION: &str = "1.0";

/// SQL to create the component table
///
/// `version` is the optimistic concurrency token: stamped 1 on insert and
/// incremented on every committed mutation of the row or of the edge set
/// it parents. `created_at_ms` is immutable once set.
pub const SCHEMA_CREATE_COMPONENTS: &str = r#"
CREATE TABLE IF NOT EXISTS component (
    -- Stable, globally unique component id
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,

    -- Provenance
    creator TEXT NOT NULL,
    owner TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,

    -- External correlation key, unique per (external_key, type_tag)
    external_key TEXT,

    modified_at_ms INTEGER NOT NULL,

    -- Type tag selecting the in-memory rehydration factory
    type_tag TEXT NOT NULL,

    -- Opaque serialized model state
    model_blob TEXT,

    -- Optimistic concurrency token
    version INTEGER NOT NULL
)
"#;

/// SQL to create the ordered reference-edge table
///
/// Edges are the sole source of child ordering. A child may appear under
/// multiple parents (shared ownership); no two edges from one parent may
/// share a sequence number.
pub const SCHEMA_CREATE_EDGES: &str = r#"
CREATE TABLE IF NOT EXISTS component_edge (
    parent_id TEXT NOT NULL,
    child_id TEXT NOT NULL,
    seq_no INTEGER NOT NULL,

    UNIQUE(parent_id, seq_no)
)
"#;

/// SQL to create the global tag catalog
///
/// Catalog entries are independent of components and survive untagging.
pub const SCHEMA_CREATE_TAGS: &str = r#"
CREATE TABLE IF NOT EXISTS tag (
    tag_id TEXT PRIMARY KEY NOT NULL,
    default_property TEXT
)
"#;

/// SQL to create the component-to-tag association table
pub const SCHEMA_CREATE_TAG_ASSOCIATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS tag_association (
    component_id TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    property_override TEXT,

    UNIQUE(component_id, tag_id)
)
"#;

/// SQL to create the per-view state table
pub const SCHEMA_CREATE_VIEW_STATE: &str = r#"
CREATE TABLE IF NOT EXISTS view_state (
    component_id TEXT NOT NULL,
    view_type TEXT NOT NULL,
    blob TEXT NOT NULL,

    PRIMARY KEY (component_id, view_type)
)
"#;

/// SQL to create the metadata table
///
/// Stores store-level metadata like the schema version.
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes for efficient queries
pub const SCHEMA_CREATE_INDEXES: &str = r#"
-- Reverse-reference lookups (who references this child?)
CREATE INDEX IF NOT EXISTS idx_edge_child ON component_edge(child_id);

-- Forward edge queries in child order
CREATE INDEX IF NOT EXISTS idx_edge_parent ON component_edge(parent_id, seq_no);

-- Tag discovery without full scans
CREATE INDEX IF NOT EXISTS idx_assoc_tag ON tag_association(tag_id);
CREATE INDEX IF NOT EXISTS idx_assoc_component ON tag_association(component_id);

-- Name pattern search
CREATE INDEX IF NOT EXISTS idx_component_name ON component(name);

-- External key correlation, unique per (external_key, type_tag)
CREATE UNIQUE INDEX IF NOT EXISTS idx_component_external_key
    ON component(external_key, type_tag) WHERE external_key IS NOT NULL;
"#;

/// Column names for component queries (in order for row mapping)
pub const COMPONENT_COLUMNS: &str =
    "id, name, creator, owner, created_at_ms, external_key, modified_at_ms, type_tag, model_blob, version";
