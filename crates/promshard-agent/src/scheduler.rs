//! Per-kind regeneration tasks
//!
//! Each enabled kind gets its own task. A task regenerates its kind when the
//! kind's dirty flag is raised and at least once per full refresh interval.
//! Kinds never wait on each other.

use crate::config::SchedulerConfig;
use promshard_cache::{CacheError, GenerationReport, GenerationService, Invalidation};
use promshard_core::ConfigKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct GenerationScheduler {
    service: Arc<GenerationService>,
    invalidation: Arc<Invalidation>,
    kinds: Vec<ConfigKind>,
    full_refresh: Duration,
    retry_delay: Duration,
}

impl GenerationScheduler {
    pub fn new(
        service: Arc<GenerationService>,
        invalidation: Arc<Invalidation>,
        config: &SchedulerConfig,
    ) -> Self {
        let mut kinds = config.enabled_kinds.clone();
        kinds.sort();
        kinds.dedup();

        Self {
            service,
            invalidation,
            kinds,
            // tokio intervals must be non-zero
            full_refresh: config.full_refresh_interval().max(Duration::from_secs(1)),
            retry_delay: config.retry_delay(),
        }
    }

    /// Override the delay before an uncommitted cycle is retried
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn kinds(&self) -> &[ConfigKind] {
        &self.kinds
    }

    /// Start one task per kind; the tasks end when `cancel` fires
    pub fn spawn(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        self.kinds
            .iter()
            .map(|kind| {
                let scheduler = self.clone();
                let kind = *kind;
                let cancel = cancel.clone();
                tokio::spawn(async move { scheduler.run_kind(kind, cancel).await })
            })
            .collect()
    }

    /// Regenerate `kind` if its flag is raised, clearing the flag
    pub async fn generate_dirty(
        &self,
        kind: ConfigKind,
        cancel: &CancellationToken,
    ) -> Option<promshard_cache::Result<GenerationReport>> {
        if !self.invalidation.take_dirty(kind) {
            return None;
        }
        Some(self.service.generate(kind, cancel).await)
    }

    async fn run_kind(&self, kind: ConfigKind, cancel: CancellationToken) {
        info!(kind = %kind, refresh_secs = self.full_refresh.as_secs(), "Scheduler started");

        let mut refresh = tokio::time::interval(self.full_refresh);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        refresh.tick().await;

        loop {
            match self.generate_dirty(kind, &cancel).await {
                Some(Err(CacheError::Cancelled { .. })) => break,
                Some(Err(e)) if !e.is_committed() => {
                    warn!(kind = %kind, error = %e, retry_ms = self.retry_delay.as_millis() as u64, "Cycle not committed, will retry");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                    self.invalidation.mark_dirty(kind);
                    continue;
                }
                // Pool failures were logged by the cache
                Some(_) | None => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.invalidation.notified(kind) => {
                    debug!(kind = %kind, "Inventory changed");
                }
                _ = refresh.tick() => {
                    debug!(kind = %kind, "Full refresh due");
                    self.invalidation.mark_dirty(kind);
                }
            }
        }

        info!(kind = %kind, "Scheduler stopped");
    }
}
