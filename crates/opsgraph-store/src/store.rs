//! Component-Graph Persistence Service
//!
//! `GraphStore` persists batches of in-memory components to SQLite, tracks
//! versions for optimistic concurrency, resolves reverse-reference
//! queries, and cascades deletes through edges, tag associations and view
//! state inside a single transaction per call.

use crate::schema::{
    COMPONENT_COLUMNS, SCHEMA_CREATE_COMPONENTS, SCHEMA_CREATE_EDGES, SCHEMA_CREATE_INDEXES,
    SCHEMA_CREATE_METADATA, SCHEMA_CREATE_TAGS, SCHEMA_CREATE_TAG_ASSOCIATIONS,
    SCHEMA_CREATE_VIEW_STATE, STORE_SCHEMA_VERSION,
};
use crate::search::{glob_to_like, SearchFilter, SearchResults};
use opsgraph_core::{
    now_millis, ComponentHandle, ComponentRecord, ComponentRegistry, ReferenceEdge, RegistryError,
    TagRecord,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Transaction};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during store operations
///
/// A missing component on read is a normal result (`Ok(None)`), never an
/// error; delete is idempotent and never raises not-found.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or statement failure; fatal to the current call
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Version mismatch detected at commit; never silently resolved
    #[error("Conflicting write on component {id}: stored version {stored}, caller has {actual}")]
    Conflict { id: String, stored: i64, actual: i64 },

    /// Search glob uses syntax outside the supported `*` wildcard
    #[error("Malformed search pattern: {0}")]
    MalformedPattern(String),

    /// Stored type tag has no registered rehydration factory
    #[error("No factory registered for type tag: {0}")]
    UnknownTypeTag(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for StoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownTypeTag(tag) => StoreError::UnknownTypeTag(tag),
        }
    }
}

/// SQLite-backed persistence service for the component graph
///
/// The connection lives behind a `parking_lot::Mutex`, so a store can be
/// shared across threads (`Arc<GraphStore>`); every mutating operation
/// runs inside one transaction and either commits completely or rolls the
/// whole call back.
pub struct GraphStore {
    conn: Mutex<Connection>,
    registry: ComponentRegistry,
}

impl GraphStore {
    /// Open (creating if needed) a store database at the given path
    pub fn open(path: &Path, registry: ComponentRegistry) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::create_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory(registry: ComponentRegistry) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::create_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    /// Configure connection with optimal settings
    fn configure_connection(conn: &Connection) -> SqliteResult<()> {
        // WAL mode for better concurrent read performance
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // NORMAL is a good balance of safety/speed under WAL
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Temp store in memory for better performance
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(SCHEMA_CREATE_COMPONENTS, [])?;
        conn.execute(SCHEMA_CREATE_EDGES, [])?;
        conn.execute(SCHEMA_CREATE_TAGS, [])?;
        conn.execute(SCHEMA_CREATE_TAG_ASSOCIATIONS, [])?;
        conn.execute(SCHEMA_CREATE_VIEW_STATE, [])?;
        conn.execute(SCHEMA_CREATE_METADATA, [])?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;
        conn.execute(
            "INSERT OR IGNORE INTO store_metadata (key, value) VALUES ('schema_version', ?1)",
            [STORE_SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// The registry used to rehydrate stored records
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // =========================================================================
    // Persist
    // =========================================================================

    /// Upsert an explicit batch of components (not a transitive closure)
    ///
    /// New ids are inserted with the creation timestamp stamped now and
    /// version 1; existing ids are version-checked updates. The edge rows
    /// of each persisted component are replaced from its in-memory child
    /// order. Fails atomically: any conflict or statement failure rolls
    /// the whole batch back. On success every component is marked clean,
    /// its version token updated, and the latest stored records returned.
    pub fn persist(
        &self,
        components: &[ComponentHandle],
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        let now = now_millis();
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let mut records = Vec::with_capacity(components.len());
        for component in components {
            records.push(Self::upsert_component(&tx, component, now)?);
        }

        tx.commit()?;
        drop(conn);

        for (component, record) in components.iter().zip(&records) {
            component.set_version(record.version);
            if component.creation_timestamp_ms().is_none() {
                component.set_creation_timestamp_ms(record.created_at_ms);
            }
            component.mark_clean();
        }

        debug!(count = components.len(), "persisted component batch");
        Ok(records)
    }

    fn upsert_component(
        tx: &Transaction<'_>,
        component: &ComponentHandle,
        now: i64,
    ) -> Result<ComponentRecord, StoreError> {
        let id = component.id();
        let model_blob = component.model_persistence().and_then(|m| m.model_blob());

        let stored: Option<(i64, i64)> = tx
            .query_row(
                "SELECT version, created_at_ms FROM component WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (version, created_at_ms) = match stored {
            None => {
                tx.execute(
                    r#"
                    INSERT INTO component
                        (id, name, creator, owner, created_at_ms, external_key, modified_at_ms, type_tag, model_blob, version)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                    params![
                        id,
                        component.display_name(),
                        component.creator(),
                        component.owner(),
                        now,
                        component.external_key(),
                        now,
                        component.type_tag(),
                        model_blob,
                        1i64,
                    ],
                )?;
                (1, now)
            }
            Some((stored_version, created_at_ms)) => {
                if component.version() != stored_version {
                    warn!(
                        id,
                        stored_version,
                        caller_version = component.version(),
                        "optimistic concurrency conflict"
                    );
                    return Err(StoreError::Conflict {
                        id: id.to_string(),
                        stored: stored_version,
                        actual: component.version(),
                    });
                }

                let next = stored_version + 1;
                tx.execute(
                    r#"
                    UPDATE component
                    SET name = ?2, owner = ?3, modified_at_ms = ?4, model_blob = ?5, version = ?6
                    WHERE id = ?1
                    "#,
                    params![
                        id,
                        component.display_name(),
                        component.owner(),
                        now,
                        model_blob,
                        next,
                    ],
                )?;
                (next, created_at_ms)
            }
        };

        // Edges are replaced wholesale from the in-memory child order;
        // the edge table is the sole source of ordering.
        tx.execute("DELETE FROM component_edge WHERE parent_id = ?1", [id])?;
        for (seq, child) in component.local_children().iter().enumerate() {
            tx.execute(
                "INSERT INTO component_edge (parent_id, child_id, seq_no) VALUES (?1, ?2, ?3)",
                params![id, child.id(), seq as i64],
            )?;
        }

        Ok(ComponentRecord {
            id: id.to_string(),
            name: component.display_name(),
            creator: component.creator(),
            owner: component.owner(),
            created_at_ms,
            external_key: component.external_key(),
            modified_at_ms: now,
            type_tag: component.type_tag().to_string(),
            model_blob,
            version,
        })
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Load a stored record without rehydrating it
    pub fn get_record(&self, id: &str) -> Result<Option<ComponentRecord>, StoreError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!("SELECT {COMPONENT_COLUMNS} FROM component WHERE id = ?1"),
                [id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Load and rehydrate a component by id
    ///
    /// An absent id is `Ok(None)`; callers decide how to treat missing
    /// references. Children are not materialized; resolve them from
    /// [`get_edges`](Self::get_edges) on demand.
    pub fn get_component(&self, id: &str) -> Result<Option<ComponentHandle>, StoreError> {
        match self.get_record(id)? {
            Some(record) => Ok(Some(self.registry.rehydrate(&record)?)),
            None => Ok(None),
        }
    }

    /// Ordered outgoing edges of a parent
    pub fn get_edges(&self, parent_id: &str) -> Result<Vec<ReferenceEdge>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT parent_id, child_id, seq_no FROM component_edge WHERE parent_id = ?1 ORDER BY seq_no",
        )?;
        let edges = stmt
            .query_map([parent_id], |row| {
                Ok(ReferenceEdge {
                    parent_id: row.get(0)?,
                    child_id: row.get(1)?,
                    seq_no: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(edges)
    }

    /// Reverse lookup: every component whose edge set names `id` as child
    pub fn get_references(&self, id: &str) -> Result<Vec<ComponentHandle>, StoreError> {
        let records = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {COMPONENT_COLUMNS} FROM component
                WHERE id IN (SELECT DISTINCT parent_id FROM component_edge WHERE child_id = ?1)
                "#
            ))?;
            let rows = stmt
                .query_map([id], Self::row_to_record)?
                .collect::<SqliteResult<Vec<_>>>()?;
            rows
        };

        records
            .iter()
            .map(|record| self.registry.rehydrate(record).map_err(StoreError::from))
            .collect()
    }

    /// Number of stored components
    pub fn component_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM component", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a batch of components with full cascade, one transaction
    ///
    /// For each target: every edge naming it (either side), its tag
    /// associations and view state, and the record itself are removed;
    /// every surviving parent whose edge set lost an entry gets a version
    /// bump. Children referenced only by the deleted component are NOT
    /// garbage-collected; they survive and stay loadable by id.
    /// Idempotent on missing ids.
    pub fn delete(&self, components: &[ComponentHandle]) -> Result<(), StoreError> {
        let ids: Vec<&str> = components.iter().map(|c| c.id()).collect();
        self.delete_ids(&ids)
    }

    /// Delete by id; same cascade and idempotency as [`delete`](Self::delete)
    pub fn delete_ids(&self, ids: &[&str]) -> Result<(), StoreError> {
        let now = now_millis();
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        for id in ids {
            Self::delete_one(&tx, id, now)?;
        }

        tx.commit()?;
        debug!(count = ids.len(), "deleted component batch");
        Ok(())
    }

    fn delete_one(tx: &Transaction<'_>, id: &str, now: i64) -> Result<(), StoreError> {
        // Surviving parents lose an edge; each gets exactly one version
        // bump regardless of how many edges it had to this child.
        let parents: Vec<String> = tx
            .prepare(
                "SELECT DISTINCT parent_id FROM component_edge WHERE child_id = ?1 AND parent_id <> ?1",
            )?
            .query_map([id], |row| row.get(0))?
            .collect::<SqliteResult<_>>()?;

        tx.execute(
            "DELETE FROM component_edge WHERE parent_id = ?1 OR child_id = ?1",
            [id],
        )?;
        tx.execute("DELETE FROM tag_association WHERE component_id = ?1", [id])?;
        tx.execute("DELETE FROM view_state WHERE component_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM component WHERE id = ?1", [id])?;

        for parent in &parents {
            tx.execute(
                "UPDATE component SET version = version + 1, modified_at_ms = ?2 WHERE id = ?1",
                params![parent, now],
            )?;
        }

        if removed == 0 {
            debug!(id, "delete of absent component is a no-op");
        }
        Ok(())
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Create the tag if absent, then associate every given component
    pub fn tag_components(
        &self,
        tag_id: &str,
        components: &[ComponentHandle],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO tag (tag_id, default_property) VALUES (?1, NULL)",
            [tag_id],
        )?;
        for component in components {
            tx.execute(
                "INSERT OR IGNORE INTO tag_association (component_id, tag_id, property_override) VALUES (?1, ?2, NULL)",
                params![component.id(), tag_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Create or replace a tag catalog entry
    pub fn create_tag(&self, tag_id: &str, default_property: Option<&str>) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO tag (tag_id, default_property) VALUES (?1, ?2)",
            params![tag_id, default_property],
        )?;
        Ok(())
    }

    /// Look up a tag catalog entry
    pub fn get_tag(&self, tag_id: &str) -> Result<Option<TagRecord>, StoreError> {
        let conn = self.conn.lock();
        let tag = conn
            .query_row(
                "SELECT tag_id, default_property FROM tag WHERE tag_id = ?1",
                [tag_id],
                |row| {
                    Ok(TagRecord {
                        tag_id: row.get(0)?,
                        default_property: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(tag)
    }

    /// Whether any component is currently associated with the tag
    pub fn has_components_tagged_by(&self, tag_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tag_association WHERE tag_id = ?1)",
            [tag_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Load and rehydrate every component associated with the tag
    pub fn components_tagged_by(&self, tag_id: &str) -> Result<Vec<ComponentHandle>, StoreError> {
        let records = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {COMPONENT_COLUMNS} FROM component
                WHERE id IN (SELECT component_id FROM tag_association WHERE tag_id = ?1)
                "#
            ))?;
            let rows = stmt
                .query_map([tag_id], Self::row_to_record)?
                .collect::<SqliteResult<Vec<_>>>()?;
            rows
        };

        records
            .iter()
            .map(|record| self.registry.rehydrate(record).map_err(StoreError::from))
            .collect()
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Glob name search (`*` matches any possibly empty sequence),
    /// optionally restricted by a creator filter
    pub fn find_components_by_name_pattern(
        &self,
        pattern: &str,
        filter: Option<&SearchFilter>,
    ) -> Result<SearchResults, StoreError> {
        let like = glob_to_like(pattern)?;
        let creator = filter.and_then(|f| f.creator.as_deref());

        let conn = self.conn.lock();
        let records = match creator {
            Some(creator) => {
                let mut stmt = conn.prepare(&format!(
                    r#"
                    SELECT {COMPONENT_COLUMNS} FROM component
                    WHERE name LIKE ?1 ESCAPE '\' AND creator = ?2
                    ORDER BY name
                    "#
                ))?;
                let rows = stmt
                    .query_map(params![like, creator], Self::row_to_record)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    r#"
                    SELECT {COMPONENT_COLUMNS} FROM component
                    WHERE name LIKE ?1 ESCAPE '\'
                    ORDER BY name
                    "#
                ))?;
                let rows = stmt
                    .query_map([like], Self::row_to_record)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
        };

        Ok(SearchResults::new(records))
    }

    // =========================================================================
    // View State
    // =========================================================================

    /// Write (or replace) one per-view blob
    pub fn set_view_property(
        &self,
        component_id: &str,
        view_type: &str,
        blob: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO view_state (component_id, view_type, blob) VALUES (?1, ?2, ?3)",
            params![component_id, view_type, blob],
        )?;
        Ok(())
    }

    /// Read one per-view blob
    pub fn view_property(
        &self,
        component_id: &str,
        view_type: &str,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let blob = conn
            .query_row(
                "SELECT blob FROM view_state WHERE component_id = ?1 AND view_type = ?2",
                params![component_id, view_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob)
    }

    /// Map of view-type to blob for one component
    pub fn all_view_properties(
        &self,
        component_id: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT view_type, blob FROM view_state WHERE component_id = ?1")?;
        let pairs = stmt
            .query_map([component_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(pairs.into_iter().collect())
    }

    /// Convert a database row to a ComponentRecord
    fn row_to_record(row: &rusqlite::Row<'_>) -> SqliteResult<ComponentRecord> {
        Ok(ComponentRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            creator: row.get(2)?,
            owner: row.get(3)?,
            created_at_ms: row.get(4)?,
            external_key: row.get(5)?,
            modified_at_ms: row.get(6)?,
            type_tag: row.get(7)?,
            model_blob: row.get(8)?,
            version: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsgraph_core::{BaseComponent, Component};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn store() -> GraphStore {
        GraphStore::in_memory(ComponentRegistry::with_base_factory()).unwrap()
    }

    fn component(id: &str, name: &str, creator: &str) -> Arc<BaseComponent> {
        Arc::new(BaseComponent::new(id, name, creator))
    }

    fn batch(components: &[&Arc<BaseComponent>]) -> Vec<ComponentHandle> {
        components
            .iter()
            .map(|c| Arc::clone(c) as ComponentHandle)
            .collect()
    }

    #[test]
    fn test_persist_and_round_trip() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let store = store();

        let parent = component("p", "Ground Station", "alice");
        let a = component("a", "Uplink", "alice");
        let b = component("b", "Downlink", "alice");
        parent.add_child(a.clone());
        parent.add_child(b.clone());
        parent
            .model_persistence()
            .unwrap()
            .set_model_blob("{\"band\":\"S\"}".to_string());

        let records = store.persist(&batch(&[&parent, &a, &b])).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].version, 1);
        assert!(!parent.is_dirty());
        assert_eq!(parent.version(), 1);
        assert!(parent.creation_timestamp_ms().is_some());

        let loaded = store.get_record("p").unwrap().unwrap();
        assert_eq!(loaded.name, "Ground Station");
        assert_eq!(loaded.owner, "alice");
        assert_eq!(loaded.model_blob, Some("{\"band\":\"S\"}".to_string()));

        // Child edges round-trip by id and order
        let edges = store.get_edges("p").unwrap();
        let children: Vec<(&str, i64)> = edges
            .iter()
            .map(|e| (e.child_id.as_str(), e.seq_no))
            .collect();
        assert_eq!(children, vec![("a", 0), ("b", 1)]);
    }

    #[test]
    fn test_get_component_rehydrates() {
        let store = store();
        let c = component("c1", "Console", "alice");
        store.persist(&batch(&[&c])).unwrap();

        let loaded = store.get_component("c1").unwrap().unwrap();
        assert_eq!(loaded.id(), "c1");
        assert_eq!(loaded.display_name(), "Console");
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.version(), 1);
    }

    #[test]
    fn test_get_component_absent_is_none() {
        let store = store();
        assert!(store.get_component("missing").unwrap().is_none());
    }

    #[test]
    fn test_get_component_unknown_tag_is_error() {
        let store = store();
        let c = Arc::new(
            BaseComponent::new("c1", "Console", "alice").with_type_tag("telemetry-panel"),
        );
        store.persist(&batch(&[&c])).unwrap();

        let err = store.get_component("c1").err().unwrap();
        assert!(matches!(err, StoreError::UnknownTypeTag(tag) if tag == "telemetry-panel"));
    }

    #[test]
    fn test_update_bumps_version_and_stamps_modified() {
        let store = store();
        let c = component("c1", "Console", "alice");
        let first = store.persist(&batch(&[&c])).unwrap().remove(0);

        c.set_display_name("Console v2");
        let second = store.persist(&batch(&[&c])).unwrap().remove(0);

        assert_eq!(second.version, 2);
        assert_eq!(second.name, "Console v2");
        // Creation timestamp is immutable once stamped
        assert_eq!(second.created_at_ms, first.created_at_ms);
        assert!(second.modified_at_ms >= first.modified_at_ms);
        assert_eq!(c.version(), 2);
    }

    #[test]
    fn test_stale_version_conflicts_and_rolls_back() {
        let store = store();
        let c = component("c1", "Console", "alice");
        store.persist(&batch(&[&c])).unwrap();

        // A second session loads and persists the same component first.
        let other = store.get_component("c1").unwrap().unwrap();
        store.persist(&[other]).unwrap(); // now stored at version 2

        // Our copy still carries version 1: its write must conflict.
        c.set_display_name("stale rename");
        let fresh = component("c2", "Fresh", "alice");
        let err = store.persist(&batch(&[&fresh, &c])).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { ref id, stored: 2, actual: 1 } if id == "c1"
        ));

        // The whole batch rolled back: the fresh component was not kept.
        assert!(store.get_record("c2").unwrap().is_none());
        let stored = store.get_record("c1").unwrap().unwrap();
        assert_eq!(stored.name, "Console");
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_delete_cascades_and_bumps_parents_once() {
        let store = store();

        // Two parents reference the same child; p1 references it twice.
        let p1 = component("p1", "Panel One", "alice");
        let p2 = component("p2", "Panel Two", "alice");
        let child = component("c", "Shared Child", "alice");
        p1.add_child(child.clone());
        p1.add_child(child.clone());
        p2.add_child(child.clone());

        store.persist(&batch(&[&p1, &p2, &child])).unwrap();
        store.set_view_property("c", "plot", "{}").unwrap();
        store.tag_components("favorites", &batch(&[&child])).unwrap();

        store.delete(&batch(&[&child])).unwrap();

        // Record, edges, view state and associations are gone
        assert!(store.get_record("c").unwrap().is_none());
        assert!(store.get_edges("p1").unwrap().is_empty());
        assert!(store.get_edges("p2").unwrap().is_empty());
        assert!(store.all_view_properties("c").unwrap().is_empty());
        assert!(!store.has_components_tagged_by("favorites").unwrap());

        // Each surviving parent bumped by exactly 1, even p1 (two edges)
        assert_eq!(store.get_record("p1").unwrap().unwrap().version, 2);
        assert_eq!(store.get_record("p2").unwrap().unwrap().version, 2);

        // The tag catalog entry itself survives
        assert!(store.get_tag("favorites").unwrap().is_some());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = store();
        // Absent id: no error, twice in a row
        store.delete_ids(&["ghost"]).unwrap();
        store.delete_ids(&["ghost"]).unwrap();

        let c = component("c1", "Console", "alice");
        store.persist(&batch(&[&c])).unwrap();
        store.delete_ids(&["c1"]).unwrap();
        store.delete_ids(&["c1"]).unwrap();
        assert!(store.get_record("c1").unwrap().is_none());
    }

    #[test]
    fn test_orphaned_child_survives_parent_delete() {
        // Policy: no garbage collection of orphans; the child stays
        // loadable after its only referencing parent is deleted.
        let store = store();
        let parent = component("p", "Parent", "alice");
        let child = component("c", "Child", "alice");
        parent.add_child(child.clone());
        store.persist(&batch(&[&parent, &child])).unwrap();

        store.delete(&batch(&[&parent])).unwrap();

        assert!(store.get_record("p").unwrap().is_none());
        let orphan = store.get_record("c").unwrap().unwrap();
        // The orphan's own edge set did not change: no version bump
        assert_eq!(orphan.version, 1);
    }

    #[test]
    fn test_get_references_over_graph_shapes() {
        let store = store();

        let a = component("a", "A", "alice");
        let b = component("b", "B", "alice");
        let c = component("c", "C", "alice");
        a.add_child(b.clone());
        b.add_child(c.clone());
        store.persist(&batch(&[&a, &b, &c])).unwrap();

        // No referers
        assert!(store.get_references("a").unwrap().is_empty());

        // Single referer
        let refs_b = store.get_references("b").unwrap();
        assert_eq!(refs_b.len(), 1);
        assert_eq!(refs_b[0].id(), "a");

        // Chained A -> B -> C: references of C is exactly {B}
        let refs_c = store.get_references("c").unwrap();
        assert_eq!(refs_c.len(), 1);
        assert_eq!(refs_c[0].id(), "b");
    }

    #[test]
    fn test_tag_survives_last_component_delete() {
        let store = store();
        let c = component("c1", "Root", "alice");
        store.persist(&batch(&[&c])).unwrap();

        store.tag_components("bootstrap", &batch(&[&c])).unwrap();
        assert!(store.has_components_tagged_by("bootstrap").unwrap());

        store.delete(&batch(&[&c])).unwrap();
        assert!(!store.has_components_tagged_by("bootstrap").unwrap());
        assert!(store.get_tag("bootstrap").unwrap().is_some());
    }

    #[test]
    fn test_tag_components_is_create_if_absent() {
        let store = store();
        store.create_tag("starred", Some("gold")).unwrap();

        let c = component("c1", "Console", "alice");
        store.persist(&batch(&[&c])).unwrap();
        store.tag_components("starred", &batch(&[&c])).unwrap();

        // Existing default property was not clobbered
        let tag = store.get_tag("starred").unwrap().unwrap();
        assert_eq!(tag.default_property, Some("gold".to_string()));

        let tagged = store.components_tagged_by("starred").unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id(), "c1");
    }

    #[test]
    fn test_name_pattern_search() {
        let store = store();
        let names = [
            ("1", "hit one", "alice"),
            ("2", "hit two", "bob"),
            ("3", "hitch", "alice"),
            ("4", "miss", "alice"),
            ("5", "another miss", "bob"),
        ];
        let components: Vec<Arc<BaseComponent>> = names
            .iter()
            .map(|(id, name, creator)| component(id, name, creator))
            .collect();
        let handles: Vec<ComponentHandle> = components
            .iter()
            .map(|c| Arc::clone(c) as ComponentHandle)
            .collect();
        store.persist(&handles).unwrap();

        let results = store.find_components_by_name_pattern("hit*", None).unwrap();
        assert_eq!(results.count(), 3);

        // Creator filter further restricts the match set
        let filtered = store
            .find_components_by_name_pattern("hit*", Some(&SearchFilter::by_creator("alice")))
            .unwrap();
        assert_eq!(filtered.count(), 2);

        // Interior wildcard
        let interior = store.find_components_by_name_pattern("*miss", None).unwrap();
        assert_eq!(interior.count(), 2);

        // No wildcard means exact match
        let exact = store.find_components_by_name_pattern("hitch", None).unwrap();
        assert_eq!(exact.count(), 1);
        assert_eq!(exact.iter().next().unwrap().id, "3");
    }

    #[test]
    fn test_malformed_pattern_is_rejected() {
        let store = store();
        let err = store
            .find_components_by_name_pattern("hit?", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::MalformedPattern(_)));
    }

    #[test]
    fn test_view_properties_round_trip() {
        let store = store();
        let c = component("c1", "Console", "alice");
        store.persist(&batch(&[&c])).unwrap();

        store.set_view_property("c1", "plot", "{\"axis\":\"t\"}").unwrap();
        store.set_view_property("c1", "table", "{\"cols\":3}").unwrap();
        // Replace on the composite key
        store.set_view_property("c1", "plot", "{\"axis\":\"x\"}").unwrap();

        assert_eq!(
            store.view_property("c1", "plot").unwrap(),
            Some("{\"axis\":\"x\"}".to_string())
        );
        assert_eq!(store.view_property("c1", "gauge").unwrap(), None);

        let all = store.all_view_properties("c1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("table"), Some(&"{\"cols\":3}".to_string()));
    }

    #[test]
    fn test_persist_preserves_child_reorder() {
        let store = store();
        let parent = component("p", "Parent", "alice");
        let a = component("a", "A", "alice");
        let b = component("b", "B", "alice");
        parent.add_child(a.clone());
        parent.add_child(b.clone());
        store.persist(&batch(&[&parent, &a, &b])).unwrap();

        // Reverse the order and persist again
        parent.set_children(vec![b.clone(), a.clone()]);
        store.persist(&batch(&[&parent])).unwrap();

        let edges = store.get_edges("p").unwrap();
        let children: Vec<&str> = edges.iter().map(|e| e.child_id.as_str()).collect();
        assert_eq!(children, vec!["b", "a"]);
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        {
            let store =
                GraphStore::open(&path, ComponentRegistry::with_base_factory()).unwrap();
            let c = component("c1", "Console", "alice");
            store.persist(&batch(&[&c])).unwrap();
        }

        let store = GraphStore::open(&path, ComponentRegistry::with_base_factory()).unwrap();
        let loaded = store.get_component("c1").unwrap().unwrap();
        assert_eq!(loaded.display_name(), "Console");
        assert_eq!(loaded.version(), 1);
    }

    #[test]
    fn test_external_key_unique_per_type() {
        let store = store();
        let a = Arc::new(BaseComponent::new("a", "A", "alice").with_external_key("sat-7"));
        store.persist(&batch(&[&a])).unwrap();

        // Same external key, same type tag: rejected by the store
        let b = Arc::new(BaseComponent::new("b", "B", "alice").with_external_key("sat-7"));
        assert!(matches!(
            store.persist(&batch(&[&b])),
            Err(StoreError::Sqlite(_))
        ));

        // Same key under a different type tag is allowed, so register a
        // second factory for it.
        let mut registry = ComponentRegistry::with_base_factory();
        registry.register("other", |record| {
            Arc::new(BaseComponent::from_record(record))
        });
        let store = GraphStore::in_memory(registry).unwrap();
        let a = Arc::new(BaseComponent::new("a", "A", "alice").with_external_key("sat-7"));
        let c = Arc::new(
            BaseComponent::new("c", "C", "alice")
                .with_external_key("sat-7")
                .with_type_tag("other"),
        );
        store.persist(&batch(&[&a, &c])).unwrap();
        assert_eq!(store.component_count().unwrap(), 2);
    }
}
