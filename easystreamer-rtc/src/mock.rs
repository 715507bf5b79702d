//! In-memory connection and signaling for exercising the stream manager
//! without a network or a real peer connection.

use crate::connection::{MediaConnection, Transceiver};
use crate::error::{Result, RtcError};
use crate::track::{TrackEvent, TrackKind};
use async_trait::async_trait;
use easystreamer_core::api::SignalingChannel;
use easystreamer_core::models::{ResyncRequest, SessionDescription, SignalRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};

#[derive(Debug)]
pub struct MockTransceiver {
    pub kind: TrackKind,
    stopped: AtomicBool,
    fail_stop: Arc<AtomicBool>,
}

impl MockTransceiver {
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transceiver for MockTransceiver {
    async fn stop(&self) -> Result<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(RtcError::Connection("transceiver stop failed".to_string()));
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Records everything the manager does to the connection
///
/// A gated instance holds every `create_offer` until
/// [`MockConnection::release_offers`].
pub struct MockConnection {
    transceivers: Mutex<Vec<Arc<MockTransceiver>>>,
    offers: Mutex<Vec<SessionDescription>>,
    remote_descriptions: Mutex<Vec<SessionDescription>>,
    fail_offers: AtomicBool,
    fail_remote_descriptions: AtomicBool,
    fail_stops: Arc<AtomicBool>,
    offer_gate: Option<Semaphore>,
    closed: AtomicBool,
    events_tx: mpsc::UnboundedSender<TrackEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TrackEvent>>>,
}

impl MockConnection {
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    #[must_use]
    pub fn gated() -> Self {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(offer_gate: Option<Semaphore>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transceivers: Mutex::new(Vec::new()),
            offers: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            fail_offers: AtomicBool::new(false),
            fail_remote_descriptions: AtomicBool::new(false),
            fail_stops: Arc::new(AtomicBool::new(false)),
            offer_gate,
            closed: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Inject an inbound track event as if the peer connection reported it
    pub fn emit(&self, event: TrackEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn fail_offers(&self, fail: bool) {
        self.fail_offers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_remote_descriptions(&self, fail: bool) {
        self.fail_remote_descriptions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stops(&self, fail: bool) {
        self.fail_stops.store(fail, Ordering::SeqCst);
    }

    /// Let `n` held offers complete
    pub fn release_offers(&self, n: usize) {
        if let Some(gate) = &self.offer_gate {
            gate.add_permits(n);
        }
    }

    #[must_use]
    pub fn transceiver_count(&self) -> usize {
        self.transceivers.lock().len()
    }

    #[must_use]
    pub fn stopped_count(&self) -> usize {
        self.transceivers
            .lock()
            .iter()
            .filter(|t| t.is_stopped())
            .count()
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.transceiver_count() - self.stopped_count()
    }

    #[must_use]
    pub fn offers(&self) -> Vec<SessionDescription> {
        self.offers.lock().clone()
    }

    /// Answers successfully applied, oldest first
    #[must_use]
    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote_descriptions.lock().clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(RtcError::Closed);
        }
        Ok(())
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaConnection for MockConnection {
    async fn add_receiver(&self, kind: TrackKind) -> Result<Arc<dyn Transceiver>> {
        self.ensure_open()?;
        let transceiver = Arc::new(MockTransceiver {
            kind,
            stopped: AtomicBool::new(false),
            fail_stop: Arc::clone(&self.fail_stops),
        });
        self.transceivers.lock().push(Arc::clone(&transceiver));
        Ok(transceiver)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        if let Some(gate) = &self.offer_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail_offers.load(Ordering::SeqCst) {
            return Err(RtcError::Connection("offer creation failed".to_string()));
        }
        let offer = SessionDescription::offer(format!(
            "v=0\r\na=x-live-transceivers:{}\r\n",
            self.live_count()
        ));
        self.offers.lock().push(offer.clone());
        Ok(offer)
    }

    async fn set_remote_description(&self, answer: &SessionDescription) -> Result<()> {
        self.ensure_open()?;
        if self.fail_remote_descriptions.load(Ordering::SeqCst) {
            return Err(RtcError::InvalidDescription(
                "answer rejected by connection".to_string(),
            ));
        }
        self.remote_descriptions.lock().push(answer.clone());
        Ok(())
    }

    fn take_track_events(&self) -> Option<mpsc::UnboundedReceiver<TrackEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted signaling server
///
/// Replies with queued responses, or a minimal answer when the queue is
/// empty. A gated instance holds every reply until [`MockSignaling::release`].
pub struct MockSignaling {
    requests: Mutex<Vec<SignalRequest>>,
    resyncs: Mutex<Vec<ResyncRequest>>,
    responses: Mutex<VecDeque<easystreamer_core::Result<SessionDescription>>>,
    gate: Option<Semaphore>,
    request_count: watch::Sender<usize>,
    resync_count: watch::Sender<usize>,
}

impl MockSignaling {
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    #[must_use]
    pub fn gated() -> Self {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            resyncs: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            gate,
            request_count: watch::channel(0).0,
            resync_count: watch::channel(0).0,
        }
    }

    /// Queue the reply for the next unanswered offer
    pub fn push_response(&self, response: easystreamer_core::Result<SessionDescription>) {
        self.responses.lock().push_back(response);
    }

    /// Let `n` held replies through
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<SignalRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn resyncs(&self) -> Vec<ResyncRequest> {
        self.resyncs.lock().clone()
    }

    pub async fn wait_for_requests(&self, n: usize) {
        let mut rx = self.request_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    pub async fn wait_for_resyncs(&self, n: usize) {
        let mut rx = self.resync_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

impl Default for MockSignaling {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingChannel for MockSignaling {
    async fn signal(
        &self,
        request: &SignalRequest,
    ) -> easystreamer_core::Result<SessionDescription> {
        self.requests.lock().push(request.clone());
        self.request_count.send_modify(|count| *count += 1);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let queued = self.responses.lock().pop_front();
        queued.unwrap_or_else(|| Ok(SessionDescription::answer("v=0\r\n")))
    }

    async fn resync(&self, request: &ResyncRequest) -> easystreamer_core::Result<()> {
        self.resyncs.lock().push(request.clone());
        self.resync_count.send_modify(|count| *count += 1);
        Ok(())
    }
}
