//! Receive-only transceiver bookkeeping
//!
//! Each selected stream is backed by exactly one live video transceiver.
//! Transceivers are never removed from the connection: deselecting a stream
//! stops its transceiver, which stays in the slot list as a hole.

use crate::connection::{MediaConnection, Transceiver};
use crate::error::{Result, RtcError};
use crate::track::TrackKind;
use easystreamer_core::models::StreamId;
use std::sync::Arc;
use tracing::{debug, info};

struct TransceiverSlot {
    transceiver: Arc<dyn Transceiver>,
    bound: Option<StreamId>,
    stopped: bool,
}

impl TransceiverSlot {
    const fn is_free(&self) -> bool {
        !self.stopped && self.bound.is_none()
    }
}

pub struct TransceiverAllocator {
    connection: Arc<dyn MediaConnection>,
    slots: Vec<TransceiverSlot>,
}

impl TransceiverAllocator {
    pub fn new(connection: Arc<dyn MediaConnection>) -> Self {
        Self {
            connection,
            slots: Vec::new(),
        }
    }

    /// Make sure at least `n` transceivers are live, adding unbound ones as needed
    pub async fn ensure_capacity(&mut self, n: usize) -> Result<()> {
        let live = self.live_slots();
        for _ in live..n {
            let transceiver = self.connection.add_receiver(TrackKind::Video).await?;
            self.slots.push(TransceiverSlot {
                transceiver,
                bound: None,
                stopped: false,
            });
        }
        if n > live {
            debug!(added = n - live, total = self.slots.len(), "Added receive transceivers");
        }
        Ok(())
    }

    /// Assign the first free transceiver to `id`. No-op if `id` is already bound.
    pub fn bind(&mut self, id: &StreamId) -> Result<()> {
        if self.slot_of(id).is_some() {
            return Ok(());
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_free())
            .ok_or_else(|| RtcError::NoFreeTransceiver(id.to_string()))?;
        slot.bound = Some(id.clone());
        Ok(())
    }

    /// Stop and unbind the transceiver bound to `id`. No-op if unbound.
    pub async fn release(&mut self, id: &StreamId) -> Result<()> {
        let Some(index) = self.slot_of(id) else {
            return Ok(());
        };
        let slot = &mut self.slots[index];
        slot.bound = None;
        // A transceiver that fails to stop stays live and free for reuse
        slot.transceiver.stop().await?;
        slot.stopped = true;
        Ok(())
    }

    /// Bring the slots in line with `selection`: release deselected ids, then
    /// bind every selected id in order.
    pub async fn reconcile(&mut self, selection: &[StreamId]) -> Result<()> {
        let deselected: Vec<StreamId> = self
            .bound_ids()
            .into_iter()
            .filter(|id| !selection.contains(id))
            .collect();

        let mut first_error = None;
        for id in &deselected {
            if let Err(e) = self.release(id).await {
                debug!(stream_id = %id, error = %e, "Failed to stop transceiver");
                first_error.get_or_insert(e);
            }
        }

        self.ensure_capacity(selection.len()).await?;
        for id in selection {
            self.bind(id)?;
        }

        info!(
            selected = selection.len(),
            released = deselected.len(),
            live = self.live_slots(),
            total = self.total_slots(),
            "Transceivers reconciled"
        );

        first_error.map_or(Ok(()), Err)
    }

    fn slot_of(&self, id: &StreamId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.bound.as_ref() == Some(id))
    }

    /// Ids with a bound transceiver, in slot order
    #[must_use]
    pub fn bound_ids(&self) -> Vec<StreamId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.bound.clone())
            .collect()
    }

    #[must_use]
    pub fn is_bound(&self, id: &StreamId) -> bool {
        self.slot_of(id).is_some()
    }

    /// Slots ever created, stopped ones included
    #[must_use]
    pub fn total_slots(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.stopped).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;

    fn ids(raw: &[&str]) -> Vec<StreamId> {
        raw.iter().copied().map(StreamId::from).collect()
    }

    #[tokio::test]
    async fn test_ensure_capacity_never_shrinks() {
        let connection = Arc::new(MockConnection::new());
        let mut allocator = TransceiverAllocator::new(connection.clone());

        allocator.ensure_capacity(2).await.unwrap();
        allocator.ensure_capacity(1).await.unwrap();
        assert_eq!(allocator.live_slots(), 2);
        assert_eq!(connection.transceiver_count(), 2);
    }

    #[tokio::test]
    async fn test_bind_requires_free_transceiver() {
        let connection = Arc::new(MockConnection::new());
        let mut allocator = TransceiverAllocator::new(connection);

        let result = allocator.bind(&StreamId::from("cam1"));
        assert!(matches!(result, Err(RtcError::NoFreeTransceiver(_))));

        allocator.ensure_capacity(1).await.unwrap();
        allocator.bind(&StreamId::from("cam1")).unwrap();
        // Already bound: no second slot consumed
        allocator.bind(&StreamId::from("cam1")).unwrap();
        assert!(allocator.is_bound(&StreamId::from("cam1")));
    }

    #[tokio::test]
    async fn test_release_leaves_a_hole() {
        let connection = Arc::new(MockConnection::new());
        let mut allocator = TransceiverAllocator::new(connection.clone());

        allocator.reconcile(&ids(&["a", "b"])).await.unwrap();
        allocator.release(&StreamId::from("a")).await.unwrap();
        allocator.release(&StreamId::from("a")).await.unwrap();

        assert_eq!(allocator.total_slots(), 2);
        assert_eq!(allocator.live_slots(), 1);
        assert_eq!(connection.stopped_count(), 1);
        assert_eq!(allocator.bound_ids(), ids(&["b"]));
    }

    #[tokio::test]
    async fn test_reconcile_tracks_selection() {
        let connection = Arc::new(MockConnection::new());
        let mut allocator = TransceiverAllocator::new(connection.clone());

        let steps: [&[&str]; 5] = [&["a"], &["a", "b", "c"], &["c"], &[], &["d", "a"]];
        for step in steps {
            let selection = ids(step);
            allocator.reconcile(&selection).await.unwrap();

            assert_eq!(allocator.live_slots(), selection.len());
            for id in &selection {
                assert!(allocator.is_bound(id));
            }
            assert_eq!(allocator.bound_ids().len(), selection.len());
        }

        // Slots never decrease: 3 created for a,b,c then 2 more for d,a
        assert_eq!(allocator.total_slots(), 5);
        assert_eq!(connection.stopped_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_stop_keeps_transceiver_live() {
        let connection = Arc::new(MockConnection::new());
        let mut allocator = TransceiverAllocator::new(connection.clone());

        allocator.reconcile(&ids(&["a"])).await.unwrap();
        connection.fail_stops(true);
        assert!(allocator.reconcile(&ids(&["b"])).await.is_err());

        // a's transceiver is still running, so b reuses it
        assert_eq!(allocator.live_slots(), 1);
        assert_eq!(allocator.total_slots(), 1);
        assert_eq!(connection.live_count(), 1);
        assert_eq!(allocator.bound_ids(), ids(&["b"]));

        connection.fail_stops(false);
        allocator.reconcile(&[]).await.unwrap();
        assert_eq!(allocator.live_slots(), 0);
        assert_eq!(connection.stopped_count(), 1);
    }
}
