//! Per-kind adapters between the inventory store and the builders

use async_trait::async_trait;
use promshard_core::{
    AlertManagerPool, ConfigKind, ErrorContext, GeneratorConfig, InventoryStore, RecordId, Result,
    RuleKind, ScrapePool,
};
use promshard_render::routing::AlertRoutingBuilder;
use promshard_render::sharding::dedup_instances;
use promshard_render::{RuleFileBuilder, ScrapeConfigBuilder, SideFile};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A pool as seen by the cache: its id, a unique name and its replica addresses
pub trait PoolIdentity {
    fn id(&self) -> RecordId;
    fn name(&self) -> &str;
    fn instances(&self) -> &[String];
}

impl PoolIdentity for ScrapePool {
    fn id(&self) -> RecordId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn instances(&self) -> &[String] {
        &self.collector_instances
    }
}

impl PoolIdentity for AlertManagerPool {
    fn id(&self) -> RecordId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn instances(&self) -> &[String] {
        &self.instances
    }
}

/// Documents rendered for one pool
#[derive(Debug, Default)]
pub struct RenderedPool {
    /// Serialized document per replica address
    pub documents: BTreeMap<String, Result<String>>,
    /// Files that must exist before the documents are usable
    pub side_files: Vec<SideFile>,
    /// Jobs or rules left out of the documents
    pub skipped_units: usize,
}

/// Where one artifact kind gets its pools and how it renders them
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    type Pool: PoolIdentity + Send + Sync;

    fn kind(&self) -> ConfigKind;

    /// List every pool that produces this kind. Errors abort the cycle.
    async fn list_pools(&self) -> Result<Vec<Self::Pool>>;

    /// Render the documents of one pool.
    ///
    /// Store errors abort the cycle; any other error fails this pool only.
    async fn render_pool(&self, pool: &Self::Pool, config: &GeneratorConfig)
        -> Result<RenderedPool>;
}

/// Collector configuration
pub struct ScrapeSource {
    store: Arc<dyn InventoryStore>,
}

impl ScrapeSource {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ArtifactSource for ScrapeSource {
    type Pool = ScrapePool;

    fn kind(&self) -> ConfigKind {
        ConfigKind::Scrape
    }

    async fn list_pools(&self) -> Result<Vec<ScrapePool>> {
        self.store
            .list_scrape_pools()
            .await
            .with_context("listing scrape pools")
    }

    async fn render_pool(&self, pool: &ScrapePool, config: &GeneratorConfig) -> Result<RenderedPool> {
        let jobs = self
            .store
            .list_jobs_by_pool(pool.id)
            .await
            .with_context_fn(|| format!("listing jobs of scrape pool {}", pool.name))?;

        let (build, documents) = ScrapeConfigBuilder::new(config).render(pool, &jobs)?;
        Ok(RenderedPool {
            documents,
            side_files: Vec::new(),
            skipped_units: build.skipped_jobs.len(),
        })
    }
}

/// Alert-router configuration
pub struct RoutingSource {
    store: Arc<dyn InventoryStore>,
}

impl RoutingSource {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ArtifactSource for RoutingSource {
    type Pool = AlertManagerPool;

    fn kind(&self) -> ConfigKind {
        ConfigKind::AlertRouting
    }

    async fn list_pools(&self) -> Result<Vec<AlertManagerPool>> {
        self.store
            .list_alert_manager_pools()
            .await
            .with_context("listing alert manager pools")
    }

    async fn render_pool(
        &self,
        pool: &AlertManagerPool,
        config: &GeneratorConfig,
    ) -> Result<RenderedPool> {
        let send_groups = self
            .store
            .list_send_groups_by_pool(pool.id)
            .await
            .with_context_fn(|| format!("listing send groups of alert manager pool {}", pool.name))?;

        let fallback = if AlertRoutingBuilder::needs_fallback_lookup(pool, &send_groups) {
            debug!(pool = %pool.name, receiver = %pool.fallback_receiver, "Resolving fallback receiver by name");
            self.store
                .find_send_group_by_name(&pool.fallback_receiver)
                .await
                .with_context_fn(|| {
                    format!("looking up fallback receiver {}", pool.fallback_receiver)
                })?
        } else {
            None
        };

        let (build, yaml) =
            AlertRoutingBuilder::new(config).render(pool, &send_groups, fallback.as_ref())?;

        // Routing is not sharded; every replica gets the same tree
        let documents = dedup_instances(&pool.instances)
            .into_iter()
            .map(|address| (address, Ok(yaml.clone())))
            .collect();

        Ok(RenderedPool {
            documents,
            side_files: build.side_files,
            skipped_units: 0,
        })
    }
}

/// Alerting or recording rule files
pub struct RuleSource {
    store: Arc<dyn InventoryStore>,
    kind: RuleKind,
}

impl RuleSource {
    pub fn new(store: Arc<dyn InventoryStore>, kind: RuleKind) -> Self {
        Self { store, kind }
    }
}

#[async_trait]
impl ArtifactSource for RuleSource {
    type Pool = ScrapePool;

    fn kind(&self) -> ConfigKind {
        self.kind.config_kind()
    }

    async fn list_pools(&self) -> Result<Vec<ScrapePool>> {
        let pools = self
            .store
            .list_scrape_pools()
            .await
            .with_context("listing scrape pools")?;
        Ok(pools
            .into_iter()
            .filter(|pool| RuleFileBuilder::supports(pool, self.kind))
            .collect())
    }

    async fn render_pool(&self, pool: &ScrapePool, config: &GeneratorConfig) -> Result<RenderedPool> {
        let builder = RuleFileBuilder::new(config);
        let documents = match self.kind {
            RuleKind::Alert => {
                let rules = self
                    .store
                    .list_alert_rules_by_pool(pool.id)
                    .await
                    .with_context_fn(|| format!("listing alert rules of scrape pool {}", pool.name))?;
                builder.render(pool, &rules)
            }
            RuleKind::Record => {
                let rules = self
                    .store
                    .list_record_rules_by_pool(pool.id)
                    .await
                    .with_context_fn(|| {
                        format!("listing record rules of scrape pool {}", pool.name)
                    })?;
                builder.render(pool, &rules)
            }
        };

        Ok(RenderedPool {
            documents,
            side_files: Vec::new(),
            skipped_units: 0,
        })
    }
}
