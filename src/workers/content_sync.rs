//! Background content-sync worker.
//!
//! Periodically runs a sync pass against the third-party feed and keeps the
//! session store trimmed. One failed cycle is logged and the loop continues;
//! the worker only exits on the shutdown signal.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::services::content_sync::ContentSyncService;
use crate::services::session::SessionStore;

#[derive(Debug, Clone)]
pub struct ContentSyncWorkerConfig {
    pub sync_interval: Duration,
}

impl Default for ContentSyncWorkerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl ContentSyncWorkerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.sync_interval = Duration::from_secs(
            std::env::var("CONTENT_SYNC_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.sync_interval.as_secs()),
        );
        cfg
    }
}

pub struct ContentSyncWorker {
    service: Arc<ContentSyncService>,
    sessions: Arc<SessionStore>,
    config: ContentSyncWorkerConfig,
}

impl ContentSyncWorker {
    pub fn new(
        service: Arc<ContentSyncService>,
        sessions: Arc<SessionStore>,
        config: ContentSyncWorkerConfig,
    ) -> Self {
        Self {
            service,
            sessions,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            sync_interval_secs = self.config.sync_interval.as_secs(),
            "content sync worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("content sync worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.sync_interval) => {
                    match self.service.sync_all().await {
                        Ok(report) => info!(
                            inserted = report.inserted,
                            updated = report.updated,
                            "scheduled content sync completed"
                        ),
                        Err(e) => warn!(error = %e, "scheduled content sync failed"),
                    }

                    let purged = self.sessions.purge_expired().await;
                    if purged > 0 {
                        info!(purged, "expired payment sessions purged");
                    }
                }
            }
        }

        info!("content sync worker stopped");
    }
}
