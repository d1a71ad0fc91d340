//! Step-Behind Cache
//!
//! Decouples a caller's read latency from an expensive lookup by serving
//! the previously completed result while at most one background refresh
//! recomputes the value. "One step behind" means: if the underlying source
//! changes on cycle N, readers during cycle N still see cycle N-1's value
//! until the cycle-N refresh lands.
//!
//! Thread-safe via interior mutability using parking_lot::RwLock plus an
//! atomic single-flight flag for the refresh task.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Error type produced by cache lookups
pub type LookupError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Inner state shared with the background refresh thread
struct CacheInner<T> {
    /// Caller-supplied zero-argument lookup
    lookup: Box<dyn Fn() -> Result<T, LookupError> + Send + Sync>,

    /// Last completed lookup result; `None` only before the first `get()`
    value: RwLock<Option<Arc<T>>>,

    /// Single-flight flag: true while a background refresh is running
    refreshing: AtomicBool,

    /// Bumped by every synchronous `refresh()`; a background refresh that
    /// started before the bump discards its (older) result
    generation: AtomicU64,
}

/// Cache serving the last completed lookup result without blocking readers
///
/// - The very first `get()` computes synchronously (there is nothing to
///   serve yet); every later `get()` returns the cached value immediately
///   and ensures a background refresh is in flight.
/// - `refresh()` computes on the calling thread and replaces the cache
///   atomically, for callers that just caused a change they need to see.
/// - A failing background refresh leaves the previous value intact and
///   clears the in-flight flag so the next `get()` retries; `get()` is
///   never poisoned by background failures.
pub struct StepBehindCache<T: Send + Sync + 'static> {
    inner: Arc<CacheInner<T>>,
}

impl<T: Send + Sync + 'static> StepBehindCache<T> {
    /// Create a cache around the given lookup; nothing is computed yet
    pub fn new<F>(lookup: F) -> Self
    where
        F: Fn() -> Result<T, LookupError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(CacheInner {
                lookup: Box::new(lookup),
                value: RwLock::new(None),
                refreshing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Return the most recently completed lookup result
    ///
    /// Non-blocking past the first call: an in-flight refresh is never
    /// awaited. Only the first call (no cached value yet) can surface a
    /// lookup error.
    pub fn get(&self) -> Result<Arc<T>, LookupError> {
        if let Some(value) = self.inner.value.read().clone() {
            self.spawn_refresh();
            return Ok(value);
        }

        // First call: compute under the write lock so concurrent first
        // readers do not duplicate the lookup.
        let mut slot = self.inner.value.write();
        if let Some(value) = slot.clone() {
            return Ok(value);
        }
        let value = Arc::new((self.inner.lookup)()?);
        *slot = Some(value.clone());
        Ok(value)
    }

    /// Recompute on the calling thread and replace the cache immediately
    ///
    /// A background refresh that snapshotted the source before this call
    /// will discard its result, so the refreshed value cannot be clobbered
    /// by an older in-flight lookup.
    pub fn refresh(&self) -> Result<Arc<T>, LookupError> {
        let value = Arc::new((self.inner.lookup)()?);
        let mut slot = self.inner.value.write();
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        *slot = Some(value.clone());
        Ok(value)
    }

    /// Whether a background refresh is currently running
    pub fn refresh_in_flight(&self) -> bool {
        self.inner.refreshing.load(Ordering::Acquire)
    }

    /// Start a background refresh unless one is already in flight
    fn spawn_refresh(&self) {
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let started_at = inner.generation.load(Ordering::Acquire);
        std::thread::spawn(move || {
            match (inner.lookup)() {
                Ok(value) => {
                    // Checked under the write lock so a concurrent
                    // refresh() cannot interleave between check and store.
                    let mut slot = inner.value.write();
                    if inner.generation.load(Ordering::Acquire) == started_at {
                        *slot = Some(Arc::new(value));
                        debug!("background refresh completed");
                    } else {
                        debug!("discarding background refresh; a newer value landed");
                    }
                }
                Err(error) => {
                    // Previous value stays current; the next get() retries.
                    warn!(%error, "background refresh failed, keeping previous value");
                }
            }
            inner.refreshing.store(false, Ordering::Release);
        });
    }
}
