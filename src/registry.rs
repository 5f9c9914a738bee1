//! The consensus-group registry: an ordered set of handles to groups
//! currently resident in this execution context.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::group::ConsensusGroup;
use crate::types::GroupId;

/// Holds the sole strong references to resident consensus-group handles,
/// keyed by `GroupId`'s total order so iteration is deterministic.
///
/// The registry itself performs no locking: callers (the manager) are
/// responsible for holding the dispatch mutex across any insert, erase, or
/// snapshot-for-planning operation.
#[derive(Default)]
pub struct GroupRegistry {
    groups: BTreeMap<GroupId, Arc<dyn ConsensusGroup>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    /// Insert `handle` into the registry.
    ///
    /// Fails fatally (programmer error) if the group is already present.
    pub fn insert(&mut self, handle: Arc<dyn ConsensusGroup>) {
        let id = handle.group();
        if self.groups.insert(id, handle).is_some() {
            panic!("consensus group {} registered twice", id);
        }
    }

    /// Remove the group named `id` from the registry.
    ///
    /// Fails fatally (programmer error) if `id` is absent.
    pub fn erase(&mut self, id: GroupId) {
        if self.groups.remove(&id).is_none() {
            panic!("attempted to deregister unknown consensus group {}", id);
        }
    }

    pub fn get(&self, id: GroupId) -> Option<&Arc<dyn ConsensusGroup>> {
        self.groups.get(&id)
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ConsensusGroup>> {
        self.groups.values()
    }
}
