//! # promshard-cache
//!
//! Generation cycles and the per-instance document caches.
//!
//! Each artifact kind has its own [`ConfigCache`]. A cycle lists the pools of
//! its kind, renders every pool independently, writes the documents to the
//! configuration directory and then publishes the new generation with a
//! single pointer swap. Readers never see a partially built generation.

pub mod cache;
pub mod invalidation;
pub mod metrics;
pub mod service;
pub mod source;

pub use cache::{ConfigCache, DocumentCache, Generation, GenerationReport, PoolFailure};
pub use invalidation::Invalidation;
pub use metrics::{CycleOutcome, GenerationMetrics};
pub use service::GenerationService;
pub use source::{ArtifactSource, PoolIdentity, RenderedPool, RoutingSource, RuleSource, ScrapeSource};

use promshard_core::ConfigKind;

/// Errors returned by a generation cycle
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store failed; nothing was committed
    #[error("{kind} generation aborted: {source}")]
    Store {
        kind: ConfigKind,
        #[source]
        source: promshard_core::Error,
    },

    /// The generation was committed but some pools or instances failed
    #[error("{kind} generation committed with {count} failed pool(s), first error: {first}", count = .failed_pools.len())]
    Partial {
        kind: ConfigKind,
        failed_pools: Vec<String>,
        first: promshard_core::Error,
        report: GenerationReport,
    },

    /// The cycle was cancelled; nothing was committed
    #[error("{kind} generation cancelled")]
    Cancelled { kind: ConfigKind },

    #[error("Core error: {0}")]
    Core(#[from] promshard_core::Error),
}

impl CacheError {
    /// Whether a new generation was published despite the error.
    ///
    /// A partial cycle overtaken by a newer one is not committed.
    pub fn is_committed(&self) -> bool {
        match self {
            CacheError::Partial { report, .. } => report.committed,
            _ => false,
        }
    }

    /// Report of a committed cycle
    pub fn report(&self) -> Option<&GenerationReport> {
        match self {
            CacheError::Partial { report, .. } => Some(report),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn partial(committed: bool) -> CacheError {
        CacheError::Partial {
            kind: ConfigKind::Scrape,
            failed_pools: vec!["edge".to_string()],
            first: promshard_core::Error::validation("duplicate pool name edge"),
            report: GenerationReport {
                kind: ConfigKind::Scrape,
                cycle: 3,
                pools: 2,
                failed_pools: vec!["edge".to_string()],
                documents: 1,
                carried_over: 0,
                skipped_units: 0,
                elapsed: Duration::ZERO,
                committed,
            },
        }
    }

    #[test]
    fn test_superseded_partial_is_not_committed() {
        assert!(partial(true).is_committed());
        assert!(!partial(false).is_committed());
        assert!(partial(false).report().is_some());
        assert!(!CacheError::Cancelled { kind: ConfigKind::Scrape }.is_committed());
    }
}
