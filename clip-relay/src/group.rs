//! Group index: key hash → connections currently claiming it.

use crate::connection::ConnectionId;
use clip_types::KeyHash;
use std::collections::{HashMap, HashSet};

/// Maps each key hash to the set of connections registered under it.
///
/// Owned by the hub task; never shared. Empty sets are removed eagerly so
/// `group_count` reflects groups with at least one member.
#[derive(Debug, Default)]
pub struct GroupIndex {
    groups: HashMap<KeyHash, HashSet<ConnectionId>>,
}

impl GroupIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a group. Returns `false` if it was already a member.
    pub fn join(&mut self, key: KeyHash, id: ConnectionId) -> bool {
        self.groups.entry(key).or_default().insert(id)
    }

    /// Remove a connection from a group. Returns `false` if it was not a member.
    pub fn leave(&mut self, key: &KeyHash, id: ConnectionId) -> bool {
        let Some(members) = self.groups.get_mut(key) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            self.groups.remove(key);
        }
        removed
    }

    /// Members of a group, excluding `exclude` (the sender).
    pub fn members_except(&self, key: &KeyHash, exclude: ConnectionId) -> Vec<ConnectionId> {
        self.groups
            .get(key)
            .map(|members| members.iter().copied().filter(|id| *id != exclude).collect())
            .unwrap_or_default()
    }

    /// Whether `id` is registered under `key`.
    pub fn contains(&self, key: &KeyHash, id: ConnectionId) -> bool {
        self.groups.get(key).is_some_and(|m| m.contains(&id))
    }

    /// Number of members in one group.
    pub fn group_size(&self, key: &KeyHash) -> usize {
        self.groups.get(key).map_or(0, HashSet::len)
    }

    /// Number of non-empty groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total memberships across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(HashSet::len).sum()
    }

    /// Whether no connection is grouped.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
