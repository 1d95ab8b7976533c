//! Subscription store with trie-based topic matching.
//!
//! Subscribers are identified by their connection slot index; the trie maps
//! topic-filter levels to subscriber lists. Matching follows MQTT 3.1.1
//! wildcards: `+` matches exactly one non-empty level, `#` matches zero or
//! more trailing levels.

use std::collections::HashMap;

/// Subscriber identity: the connection slot index assigned by the server.
pub type ClientId = usize;

/// A node in the subscription trie.
#[derive(Default)]
struct TrieNode {
    /// Subscribers whose filter ends at this node.
    subscribers: Vec<ClientId>,
    /// Child nodes by literal topic level.
    children: HashMap<String, TrieNode>,
    /// Single-level wildcard (`+`) child.
    single_wildcard: Option<Box<TrieNode>>,
    /// Multi-level wildcard (`#`) subscribers rooted at this node.
    multi_wildcard: Vec<ClientId>,
}

impl TrieNode {
    fn insert(&mut self, levels: &[&str], client: ClientId) {
        if levels.is_empty() {
            // Duplicate subscribes are no-ops.
            if !self.subscribers.contains(&client) {
                self.subscribers.push(client);
            }
            return;
        }

        let (level, remaining) = (levels[0], &levels[1..]);
        match level {
            "#" => {
                if !self.multi_wildcard.contains(&client) {
                    self.multi_wildcard.push(client);
                }
            }
            "+" => {
                let child = self
                    .single_wildcard
                    .get_or_insert_with(|| Box::new(TrieNode::default()));
                child.insert(remaining, client);
            }
            _ => {
                let child = self.children.entry(level.to_string()).or_default();
                child.insert(remaining, client);
            }
        }
    }

    fn remove(&mut self, levels: &[&str], client: ClientId) {
        if levels.is_empty() {
            self.subscribers.retain(|&c| c != client);
            return;
        }

        let (level, remaining) = (levels[0], &levels[1..]);
        match level {
            "#" => self.multi_wildcard.retain(|&c| c != client),
            "+" => {
                if let Some(child) = &mut self.single_wildcard {
                    child.remove(remaining, client);
                }
            }
            _ => {
                if let Some(child) = self.children.get_mut(level) {
                    child.remove(remaining, client);
                }
            }
        }
    }

    fn remove_client(&mut self, client: ClientId) {
        self.subscribers.retain(|&c| c != client);
        self.multi_wildcard.retain(|&c| c != client);
        if let Some(child) = &mut self.single_wildcard {
            child.remove_client(client);
        }
        for child in self.children.values_mut() {
            child.remove_client(client);
        }
    }

    fn collect(&self, levels: &[&str], out: &mut Vec<ClientId>) {
        // `#` at this depth matches the remaining levels, including none.
        out.extend_from_slice(&self.multi_wildcard);

        if levels.is_empty() {
            out.extend_from_slice(&self.subscribers);
            return;
        }

        let (level, remaining) = (levels[0], &levels[1..]);

        // `+` matches exactly one non-empty level.
        if !level.is_empty() {
            if let Some(child) = &self.single_wildcard {
                child.collect(remaining, out);
            }
        }

        if let Some(child) = self.children.get(level) {
            child.collect(remaining, out);
        }
    }
}

/// Subscription store for the topic broker.
#[derive(Default)]
pub struct SubscriptionStore {
    root: TrieNode,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `client` to a topic filter. Duplicate inserts are no-ops.
    pub fn subscribe(&mut self, topic_filter: &str, client: ClientId) {
        let levels: Vec<&str> = topic_filter.split('/').collect();
        self.root.insert(&levels, client);
    }

    /// Remove one subscription of `client`.
    pub fn unsubscribe(&mut self, topic_filter: &str, client: ClientId) {
        let levels: Vec<&str> = topic_filter.split('/').collect();
        self.root.remove(&levels, client);
    }

    /// Purge `client` from every filter.
    pub fn remove_client(&mut self, client: ClientId) {
        self.root.remove_client(client);
    }

    /// All subscribers whose filter matches `topic`, each at most once even
    /// when several of their filters match.
    pub fn matching_subscribers(&self, topic: &str) -> Vec<ClientId> {
        let mut out = Vec::new();
        self.matching_subscribers_into(topic, &mut out);
        out
    }

    /// Buffer-reusing variant of [`matching_subscribers`].
    pub fn matching_subscribers_into(&self, topic: &str, out: &mut Vec<ClientId>) {
        out.clear();
        let levels: Vec<&str> = topic.split('/').collect();
        self.root.collect(&levels, out);
        out.sort_unstable();
        out.dedup();
    }
}

/// Check whether a topic matches a topic filter. Walk-the-levels variant of
/// the trie matching, used by tests and one-off checks.
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    let mut ti = 0;
    while ti < filter_levels.len() {
        let fl = filter_levels[ti];

        if fl == "#" {
            return true;
        }
        if ti >= topic_levels.len() {
            // `a/#` also matches `a`: the `#` level may consume nothing.
            return fl == "#";
        }
        if fl == "+" {
            if topic_levels[ti].is_empty() {
                return false;
            }
        } else if fl != topic_levels[ti] {
            return false;
        }
        ti += 1;
    }

    ti == topic_levels.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let mut store = SubscriptionStore::new();
        store.subscribe("sensors/temp", 1);

        assert_eq!(store.matching_subscribers("sensors/temp"), vec![1]);
        assert!(store.matching_subscribers("sensors/humidity").is_empty());
        assert!(store.matching_subscribers("sensors").is_empty());
        assert!(store.matching_subscribers("sensors/temp/x").is_empty());
    }

    #[test]
    fn single_level_wildcard() {
        let mut store = SubscriptionStore::new();
        store.subscribe("sensors/+/temp", 1);

        assert_eq!(store.matching_subscribers("sensors/room1/temp"), vec![1]);
        assert_eq!(store.matching_subscribers("sensors/room2/temp"), vec![1]);
        assert!(store.matching_subscribers("sensors/room1/humidity").is_empty());
        assert!(store.matching_subscribers("sensors/temp").is_empty());
    }

    #[test]
    fn plus_alone_matches_single_level_only() {
        let mut store = SubscriptionStore::new();
        store.subscribe("+", 1);

        assert_eq!(store.matching_subscribers("foo"), vec![1]);
        assert!(store.matching_subscribers("foo/bar").is_empty());
    }

    #[test]
    fn plus_requires_non_empty_level() {
        let mut store = SubscriptionStore::new();
        store.subscribe("sport/+", 1);

        assert_eq!(store.matching_subscribers("sport/tennis"), vec![1]);
        assert!(store.matching_subscribers("sport/").is_empty());
        assert!(store.matching_subscribers("sport").is_empty());
    }

    #[test]
    fn hash_alone_matches_everything() {
        let mut store = SubscriptionStore::new();
        store.subscribe("#", 1);

        assert_eq!(store.matching_subscribers("foo"), vec![1]);
        assert_eq!(store.matching_subscribers("foo/bar/baz"), vec![1]);
        // Reserved topics are matchable too.
        assert_eq!(store.matching_subscribers("$SYS/discovery/response"), vec![1]);
    }

    #[test]
    fn hash_matches_parent_level() {
        let mut store = SubscriptionStore::new();
        store.subscribe("sport/#", 1);

        assert_eq!(store.matching_subscribers("sport"), vec![1]);
        assert_eq!(store.matching_subscribers("sport/tennis"), vec![1]);
        assert_eq!(store.matching_subscribers("sport/tennis/player1"), vec![1]);
        assert!(store.matching_subscribers("sports").is_empty());
    }

    #[test]
    fn overlapping_filters_dedup() {
        let mut store = SubscriptionStore::new();
        store.subscribe("a/#", 7);
        store.subscribe("a/+", 7);
        store.subscribe("a/b", 7);

        assert_eq!(store.matching_subscribers("a/b"), vec![7]);
    }

    #[test]
    fn duplicate_subscribe_is_noop() {
        let mut store = SubscriptionStore::new();
        store.subscribe("a/b", 1);
        store.subscribe("a/b", 1);

        assert_eq!(store.matching_subscribers("a/b"), vec![1]);
    }

    #[test]
    fn unsubscribe_removes_single_filter() {
        let mut store = SubscriptionStore::new();
        store.subscribe("a/b", 1);
        store.subscribe("a/#", 1);
        store.unsubscribe("a/b", 1);

        // The wildcard subscription survives.
        assert_eq!(store.matching_subscribers("a/b"), vec![1]);
        store.unsubscribe("a/#", 1);
        assert!(store.matching_subscribers("a/b").is_empty());
    }

    #[test]
    fn remove_client_purges_everything() {
        let mut store = SubscriptionStore::new();
        store.subscribe("a/b", 1);
        store.subscribe("a/+", 1);
        store.subscribe("x/#", 1);
        store.subscribe("a/b", 2);

        store.remove_client(1);

        assert_eq!(store.matching_subscribers("a/b"), vec![2]);
        assert!(store.matching_subscribers("x/y").is_empty());
    }

    #[test]
    fn fanout_scenario() {
        let mut store = SubscriptionStore::new();
        store.subscribe("a/#", 1);
        store.subscribe("a/#", 2);
        store.subscribe("a/b", 3);

        let matched = store.matching_subscribers("a/b/c");
        assert_eq!(matched, vec![1, 2]);
    }

    #[test]
    fn filter_matching_mirrors_trie() {
        assert!(topic_matches_filter("foo", "#"));
        assert!(topic_matches_filter("sport", "sport/#"));
        assert!(topic_matches_filter("sport/tennis", "sport/#"));
        assert!(topic_matches_filter("foo", "+"));
        assert!(!topic_matches_filter("foo/bar", "+"));
        assert!(!topic_matches_filter("sport/", "sport/+"));
        assert!(topic_matches_filter("sport/tennis", "sport/+"));
        assert!(!topic_matches_filter("sports", "sport/#"));
        assert!(topic_matches_filter("$SYS/discovery/response", "#"));
    }
}
