use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use chatcart_agent::{evict_idle_sessions, refresh_catalog};
use chatcart_core::audit::AuditSink;
use chatcart_core::catalog::{CatalogSource, CatalogStore};
use chatcart_core::sessions::SessionStore;

pub struct CatalogRefreshTask {
    pub catalog: Arc<CatalogStore>,
    pub source: Arc<dyn CatalogSource>,
    pub audit: Arc<dyn AuditSink>,
    pub every: Duration,
    pub timeout: Duration,
}

impl CatalogRefreshTask {
    /// Ticks after `every`; the startup load has already happened.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // failures are logged and audited inside; the old view stays live
                        let _ = refresh_catalog(
                            &self.catalog,
                            self.source.as_ref(),
                            self.audit.as_ref(),
                            self.timeout,
                        )
                        .await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
            info!(event_name = "system.catalog_refresh.stopped", "catalog refresh loop stopped");
        })
    }
}

pub struct SessionEvictionTask {
    pub sessions: Arc<dyn SessionStore>,
    pub idle_timeout: Duration,
}

impl SessionEvictionTask {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs((self.idle_timeout.as_secs() / 4).clamp(1, 60))
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let idle_timeout = chrono::Duration::from_std(self.idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));
            let mut ticker = interval(self.sweep_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        evict_idle_sessions(self.sessions.as_ref(), idle_timeout).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
            info!(event_name = "system.session_eviction.stopped", "session eviction loop stopped");
        })
    }
}
