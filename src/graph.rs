// File: ./src/graph.rs
//! Reverse index from source documents to the views that consume them.
//!
//! Entries are `ViewHandle`s, i.e. (view key, generation) pairs. When a view
//! is re-created under the same key it gets a new generation, and any entry
//! still carrying the old one is dead. Dead entries are pruned lazily while
//! iterating, so teardown ordering between host and engine does not matter.
use crate::view::ViewHandle;
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    subscribers: IndexMap<String, IndexSet<ViewHandle>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `view` as a consumer of `source_id`. Idempotent.
    pub fn subscribe(&mut self, source_id: &str, view: &ViewHandle) {
        self.subscribers
            .entry(source_id.to_string())
            .or_default()
            .insert(view.clone());
    }

    /// Removes `view` from every source. Sources left without subscribers are
    /// dropped from the index.
    pub fn unsubscribe(&mut self, view: &ViewHandle) {
        for set in self.subscribers.values_mut() {
            set.shift_remove(view);
        }
        self.subscribers.retain(|_, set| !set.is_empty());
    }

    /// Snapshot of the live subscribers of `source_id`, in subscription order.
    ///
    /// `is_live` decides liveness; entries it rejects are removed.
    pub fn subscribers_of<F>(&mut self, source_id: &str, is_live: F) -> Vec<ViewHandle>
    where
        F: Fn(&ViewHandle) -> bool,
    {
        let Some(set) = self.subscribers.get_mut(source_id) else {
            return Vec::new();
        };
        let before = set.len();
        set.retain(|v| is_live(v));
        if set.len() != before {
            log::debug!(
                "Pruned {} stale subscriber(s) of '{}'",
                before - set.len(),
                source_id
            );
        }
        let snapshot: Vec<ViewHandle> = set.iter().cloned().collect();
        if snapshot.is_empty() {
            self.subscribers.shift_remove(source_id);
        }
        snapshot
    }

    /// Every source with at least one recorded subscriber.
    pub fn sources(&self) -> Vec<String> {
        self.subscribers.keys().cloned().collect()
    }

    pub fn is_subscribed(&self, source_id: &str, view: &ViewHandle) -> bool {
        self.subscribers
            .get(source_id)
            .is_some_and(|set| set.contains(view))
    }

    /// True if `view` appears under any source.
    pub fn contains_view(&self, view: &ViewHandle) -> bool {
        self.subscribers.values().any(|set| set.contains(view))
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(key: &str, generation: u64) -> ViewHandle {
        ViewHandle::new(key, generation)
    }

    #[test]
    fn test_subscribe_is_idempotent_and_ordered() {
        let mut g = DependencyGraph::new();
        let a = handle("a", 1);
        let b = handle("b", 2);
        g.subscribe("trip.md", &b);
        g.subscribe("trip.md", &a);
        g.subscribe("trip.md", &b);

        assert_eq!(g.subscribers_of("trip.md", |_| true), vec![b, a]);
    }

    #[test]
    fn test_unsubscribe_removes_everywhere() {
        let mut g = DependencyGraph::new();
        let a = handle("a", 1);
        let b = handle("b", 2);
        g.subscribe("x.md", &a);
        g.subscribe("y.md", &a);
        g.subscribe("y.md", &b);

        g.unsubscribe(&a);
        assert!(!g.contains_view(&a));
        assert_eq!(g.sources(), vec!["y.md"]);
        assert_eq!(g.subscribers_of("y.md", |_| true), vec![b]);
    }

    #[test]
    fn test_stale_generations_are_pruned_lazily() {
        let mut g = DependencyGraph::new();
        let old = handle("home.md#0", 1);
        let new = handle("home.md#0", 2);
        g.subscribe("trip.md", &old);
        g.subscribe("trip.md", &new);

        let live = g.subscribers_of("trip.md", |v| v.generation() == 2);
        assert_eq!(live, vec![new.clone()]);
        assert!(!g.is_subscribed("trip.md", &old));

        let none = g.subscribers_of("trip.md", |_| false);
        assert!(none.is_empty());
        assert!(g.is_empty());
    }
}
