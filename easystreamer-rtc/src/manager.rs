//! Stream Manager - subscription orchestration for one client session
//!
//! This module provides:
//! - The public add/remove surface over the selection set
//! - A single event loop task that owns the allocator, the negotiation driver
//!   and the track demultiplexer
//! - Watch-channel state slices for selection, live media and negotiation

use crate::allocator::TransceiverAllocator;
use crate::connection::MediaConnection;
use crate::demux::{LiveHandles, TrackDemuxer};
use crate::error::{Result, RtcError};
use crate::negotiation::{NegotiationDriver, NegotiationStatus};
use crate::selection::SelectionSet;
use crate::track::TrackEvent;
use crate::types::SessionKey;
use easystreamer_core::api::SignalingChannel;
use easystreamer_core::models::{ResyncRequest, SessionDescription, SignalRequest, StreamId};
use easystreamer_core::ClientId;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress of the spawned negotiation round, reported back to the event loop
enum RoundOutcome {
    OfferFailed(RtcError),
    OfferSent(SessionDescription),
    Answered(SessionDescription),
    Failed(RtcError),
}

/// Stream Manager - keeps the connection's subscriptions in step with the
/// user's selection
///
/// Mutations are synchronous and cheap. The negotiation round they trigger
/// runs on its own task, so the event loop keeps handling track events while
/// an offer is gathered or an answer is awaited. Several managers can coexist,
/// each with its own connection.
pub struct StreamManager {
    client_id: ClientId,
    selection: SelectionSet,
    live_rx: watch::Receiver<LiveHandles>,
    negotiation_rx: watch::Receiver<NegotiationStatus>,
    connection: Arc<dyn MediaConnection>,
    cancel_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamManager {
    /// Start managing `connection`. Must be called within a tokio runtime.
    pub fn start(
        connection: Arc<dyn MediaConnection>,
        signaling: Arc<dyn SignalingChannel>,
        client_id: ClientId,
    ) -> Result<Self> {
        let track_events = connection
            .take_track_events()
            .ok_or_else(|| RtcError::Connection("track events already taken".to_string()))?;

        let selection = SelectionSet::new();
        let driver = NegotiationDriver::new();
        let demuxer = TrackDemuxer::new();
        let live_rx = demuxer.subscribe();
        let negotiation_rx = driver.subscribe();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let event_loop = EventLoop {
            client_id: client_id.clone(),
            connection: Arc::clone(&connection),
            signaling,
            selection_rx: selection.subscribe(),
            allocator: TransceiverAllocator::new(Arc::clone(&connection)),
            driver,
            demuxer,
            track_events,
            outcome_tx,
            outcome_rx,
            in_flight: None,
            cancel_token: cancel_token.clone(),
        };
        let task = tokio::spawn(event_loop.run());

        info!(client_id = %client_id, "Stream manager started");

        Ok(Self {
            client_id,
            selection,
            live_rx,
            negotiation_rx,
            connection,
            cancel_token,
            task: Mutex::new(Some(task)),
        })
    }

    /// Select a stream. Returns whether the selection changed.
    pub fn add(&self, id: impl Into<StreamId>) -> bool {
        self.selection.add(id.into())
    }

    /// Deselect a stream. Returns whether the selection changed.
    pub fn remove(&self, id: &StreamId) -> bool {
        self.selection.remove(id)
    }

    #[must_use]
    pub fn selection(&self) -> Vec<StreamId> {
        self.selection.current()
    }

    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    #[must_use]
    pub fn subscribe_selection(&self) -> watch::Receiver<Vec<StreamId>> {
        self.selection.subscribe()
    }

    #[must_use]
    pub fn subscribe_live(&self) -> watch::Receiver<LiveHandles> {
        self.live_rx.clone()
    }

    #[must_use]
    pub fn subscribe_negotiation(&self) -> watch::Receiver<NegotiationStatus> {
        self.negotiation_rx.clone()
    }

    #[must_use]
    pub fn live_handles(&self) -> LiveHandles {
        self.live_rx.borrow().clone()
    }

    #[must_use]
    pub fn negotiation_status(&self) -> NegotiationStatus {
        self.negotiation_rx.borrow().clone()
    }

    /// Stop the event loop and close the connection
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_token.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.connection.close().await?;
        info!(client_id = %self.client_id, "Stream manager stopped");
        Ok(())
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct EventLoop {
    client_id: ClientId,
    connection: Arc<dyn MediaConnection>,
    signaling: Arc<dyn SignalingChannel>,
    selection_rx: watch::Receiver<Vec<StreamId>>,
    allocator: TransceiverAllocator,
    driver: NegotiationDriver,
    demuxer: TrackDemuxer,
    track_events: mpsc::UnboundedReceiver<TrackEvent>,
    outcome_tx: mpsc::UnboundedSender<RoundOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<RoundOutcome>,
    /// The single outstanding negotiation round, if any
    in_flight: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                changed = self.selection_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.on_selection_changed().await;
                }
                Some(outcome) = self.outcome_rx.recv() => self.on_round_outcome(outcome).await,
                Some(event) = self.track_events.recv() => self.on_track_event(event),
            }
        }

        if let Some(round) = self.in_flight.take() {
            round.abort();
        }
        debug!(client_id = %self.client_id, "Event loop stopped");
    }

    async fn on_selection_changed(&mut self) {
        if self.driver.request_round() {
            self.start_round().await;
        } else {
            // Picked up by the follow-up round
            self.selection_rx.mark_unchanged();
        }
    }

    /// Reconcile transceivers with the latest selection and spawn the round
    /// that offers exactly that selection. Transceivers are left alone until
    /// the round reports back.
    async fn start_round(&mut self) {
        let stream_ids = self.selection_rx.borrow_and_update().clone();
        if let Err(e) = self.allocator.reconcile(&stream_ids).await {
            warn!(error = %e, "Failed to reconcile transceivers");
        }
        self.driver.begin_offer();

        info!(
            client_id = %self.client_id,
            streams = stream_ids.len(),
            transceivers = self.allocator.live_slots(),
            "Starting negotiation round"
        );

        self.in_flight = Some(tokio::spawn(run_round(
            Arc::clone(&self.connection),
            Arc::clone(&self.signaling),
            self.client_id.clone(),
            stream_ids,
            self.outcome_tx.clone(),
        )));
    }

    async fn on_round_outcome(&mut self, outcome: RoundOutcome) {
        let again = match outcome {
            RoundOutcome::OfferSent(offer) => {
                self.driver.offer_sent(offer);
                return;
            }
            RoundOutcome::OfferFailed(e) => {
                self.driver.round_failed(format!("Failed to create offer: {e}"))
            }
            RoundOutcome::Answered(answer) => {
                info!(client_id = %self.client_id, "Answer applied");
                self.driver.answer_applied(answer)
            }
            RoundOutcome::Failed(e) => self.driver.round_failed(e.to_string()),
        };
        self.in_flight = None;

        if again {
            debug!("Selection changed during negotiation, renegotiating");
            self.start_round().await;
        }
    }

    fn on_track_event(&mut self, event: TrackEvent) {
        debug!(track_id = %event.track_id(), event = event.name(), "Track event");
        if let Some(group) = self.demuxer.handle_event(event) {
            self.send_resync(group);
        }
    }

    /// Fire-and-forget; failures are only logged
    fn send_resync(&self, group: SessionKey) {
        let request = ResyncRequest {
            uid: self.client_id.clone(),
            stream_ids: vec![group.to_string()],
        };
        let signaling = Arc::clone(&self.signaling);
        tokio::spawn(async move {
            if let Err(e) = signaling.resync(&request).await {
                debug!(group = %group, error = %e, "Resync failed");
            }
        });
    }
}

/// One offer/answer round: create the offer, send it with the selection it
/// was built for, apply the answer.
async fn run_round(
    connection: Arc<dyn MediaConnection>,
    signaling: Arc<dyn SignalingChannel>,
    uid: ClientId,
    stream_ids: Vec<StreamId>,
    outcome_tx: mpsc::UnboundedSender<RoundOutcome>,
) {
    let outcome = match connection.create_offer().await {
        Err(e) => RoundOutcome::OfferFailed(e),
        Ok(offer) => {
            let _ = outcome_tx.send(RoundOutcome::OfferSent(offer.clone()));
            let request = SignalRequest {
                uid,
                stream_ids,
                offer,
            };
            match signaling.signal(&request).await {
                Err(e) => RoundOutcome::Failed(RtcError::Signaling(e)),
                Ok(answer) => match connection.set_remote_description(&answer).await {
                    Ok(()) => RoundOutcome::Answered(answer),
                    Err(e) => RoundOutcome::Failed(e),
                },
            }
        }
    };
    let _ = outcome_tx.send(outcome);
}
