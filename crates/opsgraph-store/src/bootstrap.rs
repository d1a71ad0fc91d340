//! Bootstrap Root Discovery
//!
//! Well-known root components are discovered through a reserved tag rather
//! than fixed ids, ordered by their bootstrap-ordering capability, and
//! served through a step-behind cache so every new session does not re-run
//! the discovery query.

use crate::store::GraphStore;
use opsgraph_core::{ComponentHandle, LookupError, StepBehindCache};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Reserved tag id marking bootstrap roots
pub const BOOTSTRAP_TAG: &str = "bootstrap";

/// Three-level bootstrap comparator
///
/// 1. Category index ascending, when both sides expose the ordering
///    capability; 2. component index ascending as the tiebreak within a
///    category; 3. components lacking the capability sort after those that
///    have it, and compare among themselves by creation timestamp
///    ascending. Id is the final tiebreak so the order is total.
pub fn compare_bootstrap(a: &ComponentHandle, b: &ComponentHandle) -> Ordering {
    let by_creation = |x: &ComponentHandle, y: &ComponentHandle| {
        x.creation_timestamp_ms()
            .cmp(&y.creation_timestamp_ms())
            .then_with(|| x.id().cmp(y.id()))
    };

    match (a.bootstrap_ordering(), b.bootstrap_ordering()) {
        (Some(oa), Some(ob)) => oa
            .category_index
            .cmp(&ob.category_index)
            .then(oa.component_index.cmp(&ob.component_index))
            .then_with(|| by_creation(a, b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => by_creation(a, b),
    }
}

/// Cached discovery of bootstrap root components
///
/// Wraps the tagged-component query in a [`StepBehindCache`]: repeated
/// calls serve the previously discovered roots while a background refresh
/// picks up concurrently committed changes. Callers that just tagged a new
/// root use [`refresh`](Self::refresh) to see it immediately.
pub struct BootstrapResolver {
    store: Arc<GraphStore>,
    cache: StepBehindCache<Vec<ComponentHandle>>,
}

impl BootstrapResolver {
    pub fn new(store: Arc<GraphStore>) -> Self {
        let lookup_store = Arc::clone(&store);
        let cache = StepBehindCache::new(move || {
            let mut roots = lookup_store.components_tagged_by(BOOTSTRAP_TAG)?;
            roots.sort_by(compare_bootstrap);
            debug!(count = roots.len(), "bootstrap discovery query completed");
            Ok(roots)
        });

        Self { store, cache }
    }

    /// Ordered bootstrap roots, served step-behind
    ///
    /// The first call runs the discovery query synchronously; later calls
    /// return the last completed result and refresh in the background.
    pub fn bootstrap_components(&self) -> Result<Arc<Vec<ComponentHandle>>, LookupError> {
        self.cache.get()
    }

    /// Re-run discovery synchronously and replace the cached roots
    pub fn refresh(&self) -> Result<Arc<Vec<ComponentHandle>>, LookupError> {
        self.cache.refresh()
    }

    /// Tag components as bootstrap roots and refresh the cache so the
    /// caller sees them immediately
    pub fn mark_bootstrap(
        &self,
        components: &[ComponentHandle],
    ) -> Result<Arc<Vec<ComponentHandle>>, LookupError> {
        self.store.tag_components(BOOTSTRAP_TAG, components)?;
        self.refresh()
    }
}
