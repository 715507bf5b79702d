//! Foreground loop of the client: reacts to catalog, stats, live media and
//! negotiation updates until interrupted

use std::collections::BTreeSet;

use easystreamer_core::models::{StatsSnapshot, StreamDefinition};
use easystreamer_core::poller::{CatalogSnapshot, StatsSnapshotSlot};
use easystreamer_rtc::{LiveHandles, NegotiationStatus, SessionKey, StreamManager};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct Session<'a> {
    manager: &'a StreamManager,
    catalog_rx: watch::Receiver<CatalogSnapshot>,
    stats_rx: Option<watch::Receiver<StatsSnapshotSlot>>,
    live_rx: watch::Receiver<LiveHandles>,
    negotiation_rx: watch::Receiver<NegotiationStatus>,
    /// Still waiting for the first non-empty catalog to select defaults from
    auto_select_pending: bool,
    live: BTreeSet<SessionKey>,
}

impl<'a> Session<'a> {
    pub fn new(
        manager: &'a StreamManager,
        catalog_rx: watch::Receiver<CatalogSnapshot>,
        stats_rx: Option<watch::Receiver<StatsSnapshotSlot>>,
        auto_select: bool,
    ) -> Self {
        Self {
            manager,
            catalog_rx,
            stats_rx,
            live_rx: manager.subscribe_live(),
            negotiation_rx: manager.subscribe_negotiation(),
            auto_select_pending: auto_select,
            live: BTreeSet::new(),
        }
    }

    /// Run until Ctrl+C
    pub async fn run(mut self) {
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    break;
                }
                Ok(()) = self.catalog_rx.changed() => {
                    let catalog = self.catalog_rx.borrow_and_update().clone();
                    self.on_catalog(catalog.as_deref());
                }
                Some(Ok(())) = changed(self.stats_rx.as_mut()) => {
                    let stats = self
                        .stats_rx
                        .as_mut()
                        .and_then(|rx| rx.borrow_and_update().clone());
                    log_stats(stats.as_ref());
                }
                Ok(()) = self.live_rx.changed() => {
                    let live = self.live_rx.borrow_and_update().clone();
                    self.on_live(&live);
                }
                Ok(()) = self.negotiation_rx.changed() => {
                    let status = self.negotiation_rx.borrow_and_update().clone();
                    log_negotiation(&status);
                }
            }
        }
    }

    fn on_catalog(&mut self, catalog: Option<&[StreamDefinition]>) {
        let Some(catalog) = catalog else {
            debug!("Stream catalog unavailable");
            return;
        };
        debug!(streams = catalog.len(), "Stream catalog updated");

        if self.auto_select_pending && !catalog.is_empty() {
            self.auto_select_pending = false;
            let defaults = StreamDefinition::default_ids(catalog);
            info!(streams = defaults.len(), "Selecting default streams");
            for id in defaults {
                self.manager.add(id);
            }
        }
    }

    fn on_live(&mut self, live: &LiveHandles) {
        let current: BTreeSet<SessionKey> = live.keys().cloned().collect();

        for key in current.difference(&self.live) {
            if let Some(handle) = live.get(key) {
                let codecs: Vec<&str> = handle.media.tracks.iter().map(|t| t.codec.as_str()).collect();
                info!(
                    group = %key,
                    video = handle.media.video().count(),
                    audio = handle.media.audio().count(),
                    codecs = ?codecs,
                    "Media is live"
                );
            }
        }
        for key in self.live.difference(&current) {
            info!(group = %key, "Media stopped");
        }
        self.live = current;
    }
}

/// Resolve when the optional receiver changes; never resolves for `None`
async fn changed<T>(
    rx: Option<&mut watch::Receiver<T>>,
) -> Option<Result<(), watch::error::RecvError>> {
    match rx {
        Some(rx) => Some(rx.changed().await),
        None => std::future::pending().await,
    }
}

fn log_stats(stats: Option<&StatsSnapshot>) {
    match stats {
        Some(stats) => info!(
            cpu = %stats.cpu_percent(),
            proc_cpu = %stats.proc_cpu_percent(),
            mem = %stats.mem_percent(),
            proc_mem = %stats.proc_mem_pretty(),
            clients = stats.clients,
            "Server stats"
        ),
        None => debug!("Server stats unavailable"),
    }
}

fn log_negotiation(status: &NegotiationStatus) {
    if let Some(error) = &status.last_error {
        warn!(
            phase = ?status.phase,
            failed_rounds = status.failed_rounds,
            error = %error,
            "Negotiation status"
        );
    } else {
        debug!(
            phase = ?status.phase,
            dirty = status.dirty,
            completed_rounds = status.completed_rounds,
            "Negotiation status"
        );
    }
}
