//! In-memory bookkeeping carried between cycles

use std::collections::HashSet;

/// Ordered, duplicate-free list of identifiers
///
/// Keeps insertion order for persistence and a hash index for lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl TrackedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Append `id`; returns false if it was already present
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }
}

impl FromIterator<String> for TrackedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = TrackedSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl From<Vec<String>> for TrackedSet {
    fn from(ids: Vec<String>) -> Self {
        ids.into_iter().collect()
    }
}

/// Everything the loops read and update between cycles
#[derive(Debug, Clone, Default)]
pub struct BotState {
    /// Accounts this account follows, as tracked locally
    pub following: TrackedSet,
    /// Content ids already reposted
    pub reposted: TrackedSet,
    /// Followers whose follow failed; retried at the start of the next pass
    pub pending_follows: TrackedSet,
    /// Newest follower seen on the first page of an earlier pass
    pub last_seen_follower: Option<String>,
    pub run_count: u64,
    pub error_count: u32,
}

impl BotState {
    pub fn new(following: TrackedSet, reposted: TrackedSet) -> Self {
        Self {
            following,
            reposted,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_deduplicates_and_keeps_order() {
        let mut set = TrackedSet::new();
        assert!(set.insert("b"));
        assert!(set.insert("a"));
        assert!(!set.insert("b"));
        assert_eq!(set.as_slice(), &["b".to_string(), "a".to_string()]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_from_vec_drops_duplicates() {
        let set = TrackedSet::from(vec![
            "x".to_string(),
            "y".to_string(),
            "x".to_string(),
        ]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("x"));
        assert!(set.contains("y"));
    }

    #[test]
    fn test_new_state_starts_clean() {
        let state = BotState::new(TrackedSet::new(), vec!["cid1".to_string()].into());
        assert!(state.following.is_empty());
        assert!(state.pending_follows.is_empty());
        assert!(state.reposted.contains("cid1"));
        assert_eq!(state.last_seen_follower, None);
        assert_eq!(state.run_count, 0);
        assert_eq!(state.error_count, 0);
    }
}
