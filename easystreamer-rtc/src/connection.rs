//! Media connection capability
//!
//! The subscription manager drives a peer connection only through these
//! traits. [`crate::WebRtcConnection`] is the production implementation;
//! [`crate::mock`] provides an in-memory one for tests.

use crate::error::Result;
use crate::track::{TrackEvent, TrackKind};
use async_trait::async_trait;
use easystreamer_core::models::SessionDescription;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A single transceiver owned by the connection
#[async_trait]
pub trait Transceiver: Send + Sync {
    /// Permanently stop the transceiver. It keeps its m-line but carries no media.
    async fn stop(&self) -> Result<()>;
}

#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Add a receive-only transceiver of the given kind
    async fn add_receiver(&self, kind: TrackKind) -> Result<Arc<dyn Transceiver>>;

    /// Create an offer, apply it as the local description and wait for ICE
    /// gathering, returning the final local description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply the server's answer. On failure the previous remote description
    /// stays in effect.
    async fn set_remote_description(&self, answer: &SessionDescription) -> Result<()>;

    /// Take the inbound track event stream (can only be called once)
    fn take_track_events(&self) -> Option<mpsc::UnboundedReceiver<TrackEvent>>;

    async fn close(&self) -> Result<()>;
}
