//! Server API
//!
//! The two capabilities the rest of the client needs from the server are
//! expressed as traits so the subscription manager can run against an
//! in-memory implementation in tests:
//!
//! - [`SignalingChannel`]: offer/answer exchange and resync hints
//! - [`CatalogSource`]: the stream catalog and server stats

mod client;

pub use client::{ApiClient, API_RESYNC, API_SIGNAL, API_STATS, API_STREAMS};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ResyncRequest, SessionDescription, SignalRequest, StatsSnapshot, StreamDefinition};

#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send the local offer with the current selection and return the
    /// server's answer. An empty or malformed answer is an error.
    async fn signal(&self, request: &SignalRequest) -> Result<SessionDescription>;

    /// Ask the server to restart delivery for the given inbound groups.
    async fn resync(&self, request: &ResyncRequest) -> Result<()>;
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_streams(&self) -> Result<Vec<StreamDefinition>>;

    async fn fetch_stats(&self) -> Result<StatsSnapshot>;
}
