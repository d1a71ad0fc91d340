//! Dirty-Object Aggregation
//!
//! Computes, for a root component, the set of modified-but-unpersisted
//! components reachable from it. The component graph is potentially cyclic
//! (including direct self-reference), so traversal uses an explicit
//! worklist with an id-keyed visited set; termination does not depend on
//! graph topology.

use crate::component::ComponentHandle;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// Contract for dirty-object aggregation over a component subgraph
///
/// Two variants exist: [`ImplicitDirtyManager`] derives membership from
/// each component's own dirty flag; [`ExplicitDirtyManager`] maintains its
/// own registered set.
pub trait DirtyObjectManager: Send + Sync {
    /// All modified components this manager is responsible for
    fn all_modified_objects(&self) -> Vec<ComponentHandle>;

    /// Offer a component for tracking; returns whether it was accepted
    fn add_modified_object(&self, candidate: ComponentHandle) -> bool;

    /// Tell the manager the given components were just persisted
    fn notify_saved(&self, saved: &[ComponentHandle]);
}

/// Worklist traversal shared by both manager variants
///
/// Visits each component reachable from the root's direct children at most
/// once (keyed by stable id, not structural equality). A visited component
/// contributes itself when `is_member` passes; independently of that, a
/// component exposing the nested-manager capability has that manager's
/// results unioned in. The root itself never contributes; callers decide
/// how to treat the root separately.
fn collect_modified(
    root: &ComponentHandle,
    is_member: &dyn Fn(&ComponentHandle) -> bool,
) -> Vec<ComponentHandle> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut result: Vec<ComponentHandle> = Vec::new();
    let mut result_ids: HashSet<String> = HashSet::new();

    // Pre-mark the root so a back-edge to it cannot re-enter it.
    visited.insert(root.id().to_string());

    let mut worklist: VecDeque<ComponentHandle> = root.local_children().into();

    while let Some(component) = worklist.pop_front() {
        if !visited.insert(component.id().to_string()) {
            continue;
        }

        if is_member(&component) && result_ids.insert(component.id().to_string()) {
            result.push(component.clone());
        }

        // Nested managers aggregate subgraphs unrelated to structural
        // parent/child dirtiness; union their results regardless of this
        // component's own membership.
        if let Some(nested) = component.dirty_manager() {
            for modified in nested.all_modified_objects() {
                if result_ids.insert(modified.id().to_string()) {
                    result.push(modified);
                }
            }
        }

        for child in component.local_children() {
            if !visited.contains(child.id()) {
                worklist.push_back(child);
            }
        }
    }

    result
}

/// Dirty manager deriving membership from each component's own dirty flag
///
/// Stateless: `add_modified_object` is rejected and `notify_saved` is a
/// no-op, because dirtiness lives on the components themselves.
pub struct ImplicitDirtyManager {
    root: ComponentHandle,
}

impl ImplicitDirtyManager {
    pub fn new(root: ComponentHandle) -> Self {
        Self { root }
    }
}

impl DirtyObjectManager for ImplicitDirtyManager {
    fn all_modified_objects(&self) -> Vec<ComponentHandle> {
        collect_modified(&self.root, &|c| c.is_dirty())
    }

    fn add_modified_object(&self, _candidate: ComponentHandle) -> bool {
        false
    }

    fn notify_saved(&self, _saved: &[ComponentHandle]) {}
}

/// Dirty manager maintaining an explicitly registered set
///
/// Membership during traversal is presence in the registered set;
/// registered components that are not reachable from the root are still
/// reported. `notify_saved` removes exactly the intersection of the saved
/// set with the registered set.
pub struct ExplicitDirtyManager {
    root: ComponentHandle,
    registered: Mutex<HashMap<String, ComponentHandle>>,
}

impl ExplicitDirtyManager {
    pub fn new(root: ComponentHandle) -> Self {
        Self {
            root,
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// Number of currently registered components
    pub fn registered_count(&self) -> usize {
        self.registered.lock().len()
    }
}

impl DirtyObjectManager for ExplicitDirtyManager {
    fn all_modified_objects(&self) -> Vec<ComponentHandle> {
        let registered = self.registered.lock();
        let mut result = collect_modified(&self.root, &|c| registered.contains_key(c.id()));

        // Registered components outside the reachable subgraph still count.
        let reachable: HashSet<String> = result.iter().map(|c| c.id().to_string()).collect();
        for (id, component) in registered.iter() {
            if !reachable.contains(id) {
                result.push(component.clone());
            }
        }

        result
    }

    fn add_modified_object(&self, candidate: ComponentHandle) -> bool {
        self.registered
            .lock()
            .insert(candidate.id().to_string(), candidate);
        true
    }

    fn notify_saved(&self, saved: &[ComponentHandle]) {
        let mut registered = self.registered.lock();
        for component in saved {
            registered.remove(component.id());
        }
    }
}
