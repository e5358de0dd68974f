//! Entry points other services call
//!
//! [`GenerationService`] owns one cache per artifact kind over a shared
//! inventory store and answers the by-instance lookups from the current
//! generations.

use crate::cache::{ConfigCache, Generation, GenerationReport};
use crate::metrics::GenerationMetrics;
use crate::source::{RoutingSource, RuleSource, ScrapeSource};
use crate::Result;
use promshard_core::{ConfigKind, GeneratorConfig, InventoryStore, RuleKind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The four caches behind the generation API
pub struct GenerationService {
    scrape: ConfigCache<ScrapeSource>,
    routing: ConfigCache<RoutingSource>,
    alert_rules: ConfigCache<RuleSource>,
    record_rules: ConfigCache<RuleSource>,
    metrics: Arc<GenerationMetrics>,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        config: GeneratorConfig,
        metrics: Arc<GenerationMetrics>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            scrape: ConfigCache::new(
                ScrapeSource::new(store.clone()),
                config.clone(),
                metrics.clone(),
            ),
            routing: ConfigCache::new(
                RoutingSource::new(store.clone()),
                config.clone(),
                metrics.clone(),
            ),
            alert_rules: ConfigCache::new(
                RuleSource::new(store.clone(), RuleKind::Alert),
                config.clone(),
                metrics.clone(),
            ),
            record_rules: ConfigCache::new(
                RuleSource::new(store, RuleKind::Record),
                config,
                metrics.clone(),
            ),
            metrics,
        }
    }

    /// Run one generation cycle of `kind`
    pub async fn generate(
        &self,
        kind: ConfigKind,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport> {
        match kind {
            ConfigKind::Scrape => self.scrape.generate(cancel).await,
            ConfigKind::AlertRouting => self.routing.generate(cancel).await,
            ConfigKind::AlertRules => self.alert_rules.generate(cancel).await,
            ConfigKind::RecordRules => self.record_rules.generate(cancel).await,
        }
    }

    /// Run one cycle of every kind concurrently
    pub async fn generate_all(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<(ConfigKind, Result<GenerationReport>)> {
        let (scrape, routing, alert_rules, record_rules) = tokio::join!(
            self.scrape.generate(cancel),
            self.routing.generate(cancel),
            self.alert_rules.generate(cancel),
            self.record_rules.generate(cancel),
        );
        vec![
            (ConfigKind::Scrape, scrape),
            (ConfigKind::AlertRouting, routing),
            (ConfigKind::AlertRules, alert_rules),
            (ConfigKind::RecordRules, record_rules),
        ]
    }

    /// Collector configuration of `instance`, empty when it has none
    pub fn get_scrape_config_by_instance(&self, instance: &str) -> String {
        self.scrape.get_by_instance(instance)
    }

    /// Alert-router configuration of `instance`, empty when it has none
    pub fn get_alert_routing_config_by_instance(&self, instance: &str) -> String {
        self.routing.get_by_instance(instance)
    }

    /// Rule file of `instance`, empty when it has none
    pub fn get_rule_document_by_instance(&self, instance: &str, kind: RuleKind) -> String {
        self.get_document(kind.config_kind(), instance)
    }

    pub fn get_document(&self, kind: ConfigKind, instance: &str) -> String {
        match kind {
            ConfigKind::Scrape => self.scrape.get_by_instance(instance),
            ConfigKind::AlertRouting => self.routing.get_by_instance(instance),
            ConfigKind::AlertRules => self.alert_rules.get_by_instance(instance),
            ConfigKind::RecordRules => self.record_rules.get_by_instance(instance),
        }
    }

    /// Current generation of `kind`
    pub fn snapshot(&self, kind: ConfigKind) -> Arc<Generation> {
        match kind {
            ConfigKind::Scrape => self.scrape.snapshot(),
            ConfigKind::AlertRouting => self.routing.snapshot(),
            ConfigKind::AlertRules => self.alert_rules.snapshot(),
            ConfigKind::RecordRules => self.record_rules.snapshot(),
        }
    }

    pub fn metrics(&self) -> &Arc<GenerationMetrics> {
        &self.metrics
    }
}
