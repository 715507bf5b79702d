//! Offer/answer state machine
//!
//! `Idle -> OfferPending -> AwaitingAnswer -> Idle`. At most one round is in
//! flight; selection changes that arrive mid-round only set `dirty`, and the
//! round that follows carries whatever the selection is by then.

use easystreamer_core::models::SessionDescription;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationPhase {
    #[default]
    Idle,
    OfferPending,
    AwaitingAnswer,
}

/// Published view of the driver
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NegotiationStatus {
    pub phase: NegotiationPhase,
    pub dirty: bool,
    pub completed_rounds: u64,
    pub failed_rounds: u64,
    /// Cleared by the next successful round
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct NegotiationDriver {
    status: NegotiationStatus,
    local_offer: Option<SessionDescription>,
    remote_answer: Option<SessionDescription>,
    status_tx: watch::Sender<NegotiationStatus>,
}

impl NegotiationDriver {
    #[must_use]
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(NegotiationStatus::default());
        Self {
            status: NegotiationStatus::default(),
            local_offer: None,
            remote_answer: None,
            status_tx,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NegotiationStatus> {
        self.status_tx.subscribe()
    }

    #[must_use]
    pub const fn phase(&self) -> NegotiationPhase {
        self.status.phase
    }

    #[must_use]
    pub const fn status(&self) -> &NegotiationStatus {
        &self.status
    }

    /// Last answer successfully applied as the remote description
    #[must_use]
    pub const fn remote_answer(&self) -> Option<&SessionDescription> {
        self.remote_answer.as_ref()
    }

    #[must_use]
    pub const fn local_offer(&self) -> Option<&SessionDescription> {
        self.local_offer.as_ref()
    }

    /// Record a selection change. Returns `true` when the caller should start
    /// a round now; otherwise the change is folded into the next round.
    pub fn request_round(&mut self) -> bool {
        if self.status.phase == NegotiationPhase::Idle {
            return true;
        }
        if !self.status.dirty {
            debug!(phase = ?self.status.phase, "Negotiation busy, marking dirty");
            self.status.dirty = true;
            self.publish();
        }
        false
    }

    /// `Idle -> OfferPending`
    pub fn begin_offer(&mut self) {
        debug_assert_eq!(self.status.phase, NegotiationPhase::Idle);
        self.status.phase = NegotiationPhase::OfferPending;
        self.status.dirty = false;
        self.publish();
    }

    /// `OfferPending -> AwaitingAnswer`
    pub fn offer_sent(&mut self, offer: SessionDescription) {
        self.local_offer = Some(offer);
        self.status.phase = NegotiationPhase::AwaitingAnswer;
        self.publish();
    }

    /// Round finished with the answer applied. Returns whether a follow-up
    /// round is owed.
    pub fn answer_applied(&mut self, answer: SessionDescription) -> bool {
        self.remote_answer = Some(answer);
        self.status.completed_rounds += 1;
        self.status.last_error = None;
        self.finish()
    }

    /// Round failed at any step. The previous remote description stays in
    /// effect. Returns whether a follow-up round is owed.
    pub fn round_failed(&mut self, error: impl Into<String>) -> bool {
        let error = error.into();
        warn!(error = %error, "Negotiation round failed");
        self.status.failed_rounds += 1;
        self.status.last_error = Some(error);
        self.finish()
    }

    fn finish(&mut self) -> bool {
        self.status.phase = NegotiationPhase::Idle;
        let again = self.status.dirty;
        self.publish();
        again
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }
}

impl Default for NegotiationDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_from_idle() {
        let mut driver = NegotiationDriver::new();
        let rx = driver.subscribe();

        assert!(driver.request_round());
        driver.begin_offer();
        assert_eq!(rx.borrow().phase, NegotiationPhase::OfferPending);

        driver.offer_sent(SessionDescription::offer("v=0"));
        assert_eq!(driver.phase(), NegotiationPhase::AwaitingAnswer);

        assert!(!driver.answer_applied(SessionDescription::answer("v=0")));
        let status = rx.borrow().clone();
        assert_eq!(status.phase, NegotiationPhase::Idle);
        assert_eq!(status.completed_rounds, 1);
        assert!(driver.remote_answer().is_some());
    }

    #[test]
    fn test_changes_while_busy_coalesce_into_one_followup() {
        let mut driver = NegotiationDriver::new();
        assert!(driver.request_round());
        driver.begin_offer();
        driver.offer_sent(SessionDescription::offer("v=0"));

        assert!(!driver.request_round());
        assert!(!driver.request_round());
        assert!(!driver.request_round());
        assert!(driver.status().dirty);

        assert!(driver.answer_applied(SessionDescription::answer("v=0")));
        driver.begin_offer();
        assert!(!driver.status().dirty);
        driver.offer_sent(SessionDescription::offer("v=0"));
        assert!(!driver.answer_applied(SessionDescription::answer("v=0")));
    }

    #[test]
    fn test_failure_keeps_previous_answer() {
        let mut driver = NegotiationDriver::new();
        driver.begin_offer();
        driver.offer_sent(SessionDescription::offer("v=0"));
        driver.answer_applied(SessionDescription::answer("first"));

        driver.begin_offer();
        driver.offer_sent(SessionDescription::offer("v=0"));
        assert!(!driver.round_failed("Session description must not be empty"));

        assert_eq!(driver.remote_answer().map(|a| a.sdp.as_str()), Some("first"));
        assert_eq!(driver.status().failed_rounds, 1);
        assert!(driver.status().last_error.is_some());
        assert_eq!(driver.phase(), NegotiationPhase::Idle);
    }

    #[test]
    fn test_failed_offer_still_honours_dirty() {
        let mut driver = NegotiationDriver::new();
        driver.begin_offer();
        assert!(!driver.request_round());
        assert!(driver.round_failed("offer creation failed"));
    }
}
