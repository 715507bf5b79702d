//! The set of streams the user wants to receive

use easystreamer_core::models::StreamId;
use tokio::sync::watch;
use tracing::debug;

/// Ordered, duplicate-free set of selected streams
///
/// Every effective mutation is published to subscribers immediately; a no-op
/// `add`/`remove` publishes nothing. Ids are not validated against the catalog.
#[derive(Debug)]
pub struct SelectionSet {
    tx: watch::Sender<Vec<StreamId>>,
}

impl SelectionSet {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Append `id` unless already selected. Returns whether the set changed.
    pub fn add(&self, id: StreamId) -> bool {
        let changed = self.tx.send_if_modified(|ids| {
            if ids.contains(&id) {
                return false;
            }
            ids.push(id.clone());
            true
        });
        if changed {
            debug!(stream_id = %id, "Stream selected");
        }
        changed
    }

    /// Remove `id` if selected. Returns whether the set changed.
    pub fn remove(&self, id: &StreamId) -> bool {
        let changed = self.tx.send_if_modified(|ids| {
            let before = ids.len();
            ids.retain(|selected| selected != id);
            ids.len() != before
        });
        if changed {
            debug!(stream_id = %id, "Stream deselected");
        }
        changed
    }

    #[must_use]
    pub fn current(&self) -> Vec<StreamId> {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn contains(&self, id: &StreamId) -> bool {
        self.tx.borrow().contains(id)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<StreamId>> {
        self.tx.subscribe()
    }
}

impl Default for SelectionSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<StreamId> {
        raw.iter().copied().map(StreamId::from).collect()
    }

    #[test]
    fn test_add_keeps_insertion_order_without_duplicates() {
        let set = SelectionSet::new();
        assert!(set.add(StreamId::from("b")));
        assert!(set.add(StreamId::from("a")));
        assert!(!set.add(StreamId::from("b")));

        assert_eq!(set.current(), ids(&["b", "a"]));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let set = SelectionSet::new();
        set.add(StreamId::from("a"));
        assert!(!set.remove(&StreamId::from("zzz")));
        assert!(set.remove(&StreamId::from("a")));
        assert!(set.current().is_empty());
    }

    #[test]
    fn test_random_sequence_matches_model() {
        // Deterministic pseudo-random walk over a small id space
        let set = SelectionSet::new();
        let mut model: Vec<StreamId> = Vec::new();
        let mut seed: u32 = 0x2545_f491;

        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let id = StreamId::new(format!("s{}", seed % 7));
            if seed & 0x100 == 0 {
                set.add(id.clone());
                if !model.contains(&id) {
                    model.push(id);
                }
            } else {
                set.remove(&id);
                model.retain(|m| m != &id);
            }

            let current = set.current();
            assert_eq!(current, model);
        }
    }

    #[tokio::test]
    async fn test_only_effective_mutations_notify() {
        let set = SelectionSet::new();
        let mut rx = set.subscribe();

        set.add(StreamId::from("a"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ids(&["a"]));

        set.add(StreamId::from("a"));
        set.remove(&StreamId::from("missing"));
        assert!(!rx.has_changed().unwrap());

        // Two changes before the subscriber looks: it sees the latest value
        set.add(StreamId::from("b"));
        set.remove(&StreamId::from("a"));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ids(&["b"]));
    }
}
