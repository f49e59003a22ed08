//! TTL cache of licensed modules per account.
//!
//! Reads take the shared lock and writes the exclusive one. `get` never
//! removes expired entries; that is left to [`LicenseCache::clean_expired`],
//! normally driven by the sweeper task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct LicenseCacheEntry {
    pub licensed_modules: HashSet<String>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl LicenseCacheEntry {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) > self.ttl
    }
}

#[derive(Debug)]
pub struct LicenseCache {
    entries: RwLock<HashMap<String, LicenseCacheEntry>>,
    ttl: Duration,
}

impl LicenseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Licensed modules for `account_id`, or `None` when absent or expired.
    pub async fn get(&self, account_id: &str) -> Option<HashSet<String>> {
        let entries = self.entries.read().await;
        entries
            .get(account_id)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.licensed_modules.clone())
    }

    /// Replace the entry for `account_id`, restarting its TTL.
    pub async fn set(&self, account_id: impl Into<String>, licensed_modules: HashSet<String>) {
        let entry = LicenseCacheEntry {
            licensed_modules,
            cached_at: Instant::now(),
            ttl: self.ttl,
        };
        self.entries.write().await.insert(account_id.into(), entry);
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn clean_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();

        if removed > 0 {
            metrics::counter!("license_cache_evictions_total").increment(removed as u64);
            tracing::debug!(removed, remaining = entries.len(), "Swept expired license entries");
        }

        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Run [`LicenseCache::clean_expired`] every `every` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                interval_secs = every.as_secs(),
                ttl_secs = cache.ttl.as_secs(),
                "License cache sweeper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("License cache sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        cache.clean_expired().await;
                    }
                }
            }
        })
    }
}
