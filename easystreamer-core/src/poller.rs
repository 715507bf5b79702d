//! Periodic snapshot pollers for the stream catalog and server stats
//!
//! A poller fetches immediately, then once per interval, and publishes the
//! result on a watch channel: `Some(value)` on success, `None` on any fetch
//! or decode failure. It stops when cancelled, when its [`Poller`] handle is
//! dropped, or when the last receiver goes away.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::CatalogSource;
use crate::error::Result;
use crate::models::{StatsSnapshot, StreamDefinition};

pub type CatalogSnapshot = Option<Vec<StreamDefinition>>;
pub type StatsSnapshotSlot = Option<StatsSnapshot>;

/// Handle to a running poll loop
pub struct Poller {
    name: &'static str,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn spawn<T, F, Fut>(
        name: &'static str,
        period: Duration,
        fetch: F,
    ) -> (Self, watch::Receiver<Option<T>>)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        let (tx, rx) = watch::channel(None);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(poller = name, period_ms = period.as_millis() as u64, "Poller started");

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!(poller = name, "Poller cancelled");
                        break;
                    }
                    () = tx.closed() => {
                        debug!(poller = name, "No observers left, stopping poller");
                        break;
                    }
                    _ = ticker.tick() => {
                        let result = tokio::select! {
                            () = token.cancelled() => {
                                debug!(poller = name, "Poller cancelled mid-fetch");
                                break;
                            }
                            () = tx.closed() => break,
                            result = fetch() => result,
                        };
                        let snapshot = match result {
                            Ok(value) => Some(value),
                            Err(e) => {
                                debug!(poller = name, error = %e, "Poll failed, publishing empty snapshot");
                                None
                            }
                        };
                        tx.send_replace(snapshot);
                    }
                }
            }
        });

        (
            Self {
                name,
                cancel_token,
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Whether the poll loop has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the poll loop and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        debug!(poller = self.name, "Poller stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Poll `GET /api/streams`
pub fn spawn_catalog_poller(
    source: Arc<dyn CatalogSource>,
    period: Duration,
) -> (Poller, watch::Receiver<CatalogSnapshot>) {
    Poller::spawn("catalog", period, move || {
        let source = Arc::clone(&source);
        async move { source.fetch_streams().await }
    })
}

/// Poll `GET /api/stats`
pub fn spawn_stats_poller(
    source: Arc<dyn CatalogSource>,
    period: Duration,
) -> (Poller, watch::Receiver<StatsSnapshotSlot>) {
    Poller::spawn("stats", period, move || {
        let source = Arc::clone(&source);
        async move { source.fetch_stats().await }
    })
}
