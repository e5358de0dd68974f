//! Immutable document generations and the cycle that builds them

use crate::metrics::{CycleOutcome, GenerationMetrics};
use crate::source::{ArtifactSource, PoolIdentity};
use crate::{CacheError, Result};
use parking_lot::RwLock;
use promshard_core::claims::{self, Claim};
use promshard_core::{ConfigKind, Error, GeneratorConfig};
use promshard_render::sharding::dedup_instances;
use promshard_render::SideFile;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One complete, immutable set of documents keyed by instance address
#[derive(Debug, Default)]
pub struct Generation {
    /// Cycle number, 0 for the empty generation a cache starts with
    pub cycle: u64,
    pub generated_at: Option<SystemTime>,
    documents: HashMap<String, String>,
}

impl Generation {
    pub fn get(&self, instance: &str) -> Option<&str> {
        self.documents.get(instance).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Instance addresses, sorted
    pub fn instances(&self) -> Vec<&str> {
        let mut instances: Vec<&str> = self.documents.keys().map(String::as_str).collect();
        instances.sort_unstable();
        instances
    }
}

/// Holder of the current generation.
///
/// The lock only guards the pointer: readers clone the `Arc`, the writer
/// replaces it. A reader holding a snapshot keeps seeing that generation.
#[derive(Debug, Default)]
pub struct DocumentCache {
    current: RwLock<Arc<Generation>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Generation> {
        self.current.read().clone()
    }

    /// Document for `instance`, or an empty string when there is none
    pub fn get(&self, instance: &str) -> String {
        self.snapshot()
            .get(instance)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Replace the current generation unless a later cycle already did.
    ///
    /// Returns whether `generation` became current.
    pub fn publish(&self, generation: Generation) -> bool {
        let generation = Arc::new(generation);
        let mut current = self.current.write();
        if current.cycle > generation.cycle {
            return false;
        }
        *current = generation;
        true
    }
}

/// A pool, or some instances of it, that produced no fresh document
#[derive(Debug)]
pub struct PoolFailure {
    pub pool: String,
    /// Instances whose documents were not refreshed
    pub instances: Vec<String>,
    pub error: Error,
}

/// Summary of a committed cycle
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub kind: ConfigKind,
    pub cycle: u64,
    /// Pools listed at the start of the cycle
    pub pools: usize,
    /// Names of pools with at least one failure
    pub failed_pools: Vec<String>,
    /// Documents in the new generation, carried-over ones included
    pub documents: usize,
    /// Documents kept from the previous generation for failed instances
    pub carried_over: usize,
    /// Jobs left out of otherwise successful pools
    pub skipped_units: usize,
    pub elapsed: Duration,
    /// False when a concurrent, later cycle published first
    pub committed: bool,
}

/// Generation cycle and document cache for one artifact kind
pub struct ConfigCache<S> {
    source: S,
    config: Arc<GeneratorConfig>,
    documents: DocumentCache,
    metrics: Arc<GenerationMetrics>,
    cycles: AtomicU64,
}

impl<S: ArtifactSource> ConfigCache<S> {
    pub fn new(source: S, config: Arc<GeneratorConfig>, metrics: Arc<GenerationMetrics>) -> Self {
        Self {
            source,
            config,
            documents: DocumentCache::new(),
            metrics,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> ConfigKind {
        self.source.kind()
    }

    /// Current document of `instance`, or an empty string
    pub fn get_by_instance(&self, instance: &str) -> String {
        self.documents.get(instance)
    }

    pub fn snapshot(&self) -> Arc<Generation> {
        self.documents.snapshot()
    }

    /// Run one generation cycle.
    ///
    /// Pool failures do not stop the cycle: the new generation is published
    /// and [`CacheError::Partial`] names the failed pools. Store failures and
    /// cancellation return before anything is published.
    pub async fn generate(&self, cancel: &CancellationToken) -> Result<GenerationReport> {
        let started = Instant::now();
        let kind = self.kind();
        let result = self.run_cycle(cancel, started).await;

        let outcome = match &result {
            Ok(_) => CycleOutcome::Success,
            Err(CacheError::Partial { .. }) => CycleOutcome::Partial,
            Err(CacheError::Cancelled { .. }) => CycleOutcome::Cancelled,
            Err(_) => CycleOutcome::Aborted,
        };
        self.metrics.record_cycle(kind, outcome, started.elapsed());

        match &result {
            Ok(report) => info!(
                kind = %kind,
                cycle = report.cycle,
                pools = report.pools,
                documents = report.documents,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Generation committed"
            ),
            Err(CacheError::Partial { failed_pools, report, .. }) => warn!(
                kind = %kind,
                cycle = report.cycle,
                failed = ?failed_pools,
                documents = report.documents,
                carried_over = report.carried_over,
                "Generation committed with failures"
            ),
            Err(e) => warn!(kind = %kind, error = %e, "Generation not committed"),
        }

        result
    }

    async fn run_cycle(
        &self,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<GenerationReport> {
        let kind = self.kind();
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled { kind });
        }
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let pools = self.source.list_pools().await.map_err(|e| abort(kind, e))?;
        let previous = self.documents.snapshot();

        let mut rejected = rejected_pools(&pools);

        if self.config.write_files {
            if let Err(e) = tokio::fs::create_dir_all(&self.config.config_dir).await {
                let error = Error::store(format!(
                    "cannot create {}: {}",
                    self.config.config_dir.display(),
                    e
                ));
                return Err(abort(kind, error));
            }
        }

        let mut documents = HashMap::new();
        let mut failures: Vec<PoolFailure> = Vec::new();
        let mut skipped_units = 0;

        for (index, pool) in pools.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CacheError::Cancelled { kind });
            }

            let name = pool.name();
            let instances = dedup_instances(pool.instances());

            if let Some(error) = rejected.remove(&index) {
                warn!(kind = %kind, pool = %name, error = %error, "Skipping pool");
                failures.push(PoolFailure {
                    pool: name.to_string(),
                    instances,
                    error,
                });
                continue;
            }

            if instances.is_empty() {
                warn!(kind = %kind, pool = %name, "Pool has no instances, skipping");
                continue;
            }

            let rendered = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CacheError::Cancelled { kind }),
                rendered = self.source.render_pool(pool, &self.config) => rendered,
            };

            let rendered = match rendered {
                Ok(rendered) => rendered,
                Err(error) if error.aborts_cycle() => return Err(abort(kind, error)),
                Err(error) => {
                    warn!(kind = %kind, pool = %name, error = %error, "Skipping pool");
                    failures.push(PoolFailure {
                        pool: name.to_string(),
                        instances,
                        error,
                    });
                    continue;
                }
            };
            skipped_units += rendered.skipped_units;

            if let Err(error) = self.write_side_files(&rendered.side_files).await {
                warn!(kind = %kind, pool = %name, error = %error, "Skipping pool");
                failures.push(PoolFailure {
                    pool: name.to_string(),
                    instances,
                    error,
                });
                continue;
            }

            for (instance, document) in rendered.documents {
                let yaml = match document {
                    Ok(yaml) => yaml,
                    Err(error) => {
                        warn!(kind = %kind, pool = %name, instance = %instance, error = %error, "Skipping instance");
                        failures.push(PoolFailure {
                            pool: name.to_string(),
                            instances: vec![instance],
                            error,
                        });
                        continue;
                    }
                };

                if let Err(error) = self.write_document(kind, name, &instance, &yaml).await {
                    warn!(kind = %kind, pool = %name, instance = %instance, error = %error, "Failed to write document");
                    failures.push(PoolFailure {
                        pool: name.to_string(),
                        instances: vec![instance.clone()],
                        error,
                    });
                }
                debug!(kind = %kind, pool = %name, instance = %instance, bytes = yaml.len(), "Generated document");
                documents.insert(instance, yaml);
            }
        }

        // A failed instance keeps serving what it had
        let mut carried_over = 0;
        for failure in &failures {
            for instance in &failure.instances {
                if documents.contains_key(instance) {
                    continue;
                }
                if let Some(document) = previous.get(instance) {
                    documents.insert(instance.clone(), document.to_string());
                    carried_over += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled { kind });
        }

        let generated_at = SystemTime::now();
        let document_count = documents.len();
        let committed = self.documents.publish(Generation {
            cycle,
            generated_at: Some(generated_at),
            documents,
        });
        if committed {
            self.metrics.record_commit(kind, document_count, generated_at);
        } else {
            debug!(kind = %kind, cycle, "Generation superseded by a later cycle");
        }

        let mut failed_pools: Vec<String> = Vec::new();
        for failure in &failures {
            self.metrics.record_pool_failure(kind, failure.error.category());
            if !failed_pools.contains(&failure.pool) {
                failed_pools.push(failure.pool.clone());
            }
        }

        let report = GenerationReport {
            kind,
            cycle,
            pools: pools.len(),
            failed_pools: failed_pools.clone(),
            documents: document_count,
            carried_over,
            skipped_units,
            elapsed: started.elapsed(),
            committed,
        };

        match failures.into_iter().next() {
            None => Ok(report),
            Some(first) => Err(CacheError::Partial {
                kind,
                failed_pools,
                first: first.error,
                report,
            }),
        }
    }

    async fn write_document(
        &self,
        kind: ConfigKind,
        pool: &str,
        instance: &str,
        yaml: &str,
    ) -> promshard_core::Result<()> {
        if !self.config.write_files {
            return Ok(());
        }
        let path = self.config.artifact_path(kind, pool, instance);
        write_atomic(&path, yaml).await
    }

    async fn write_side_files(&self, side_files: &[SideFile]) -> promshard_core::Result<()> {
        if !self.config.write_files {
            return Ok(());
        }
        for file in side_files {
            write_atomic(&file.path, &file.contents).await?;
        }
        Ok(())
    }
}

fn abort(kind: ConfigKind, error: Error) -> CacheError {
    if error.aborts_cycle() {
        CacheError::Store {
            kind,
            source: error,
        }
    } else {
        CacheError::Core(error)
    }
}

/// Validation errors of pools that lose a name or an address, by list position.
///
/// The first pool in list order keeps a name and its addresses. A rejected
/// pool claims nothing.
fn rejected_pools<P: PoolIdentity>(pools: &[P]) -> HashMap<usize, Error> {
    let mut names = HashSet::new();
    let mut accepted: Vec<Claim<'_>> = Vec::new();
    let mut rejected = HashMap::new();

    for (index, pool) in pools.iter().enumerate() {
        if !names.insert(pool.name()) {
            rejected.insert(
                index,
                Error::validation(format!(
                    "duplicate pool name {} (rejected pool {})",
                    pool.name(),
                    pool.id()
                )),
            );
            continue;
        }
        let claim = Claim::new(pool.id(), pool.name(), pool.instances());
        match claims::ensure_unclaimed(accepted.iter().copied(), claim) {
            Ok(()) => accepted.push(claim),
            Err(error) => {
                rejected.insert(index, error);
            }
        }
    }

    rejected
}

/// Write through a temporary file so that readers never see a partial file
async fn write_atomic(path: &Path, contents: &str) -> promshard_core::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RoutingSource, RuleSource, ScrapeSource};
    use promshard_core::{
        AlertManagerPool, AlertRule, InventoryStore, MemoryStore, RuleKind, ScrapeJob, ScrapePool,
        SendGroup,
    };
    use promshard_render::relabel;
    use promshard_render::schema::PrometheusConfig;
    use promshard_core::LabelSet;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Arc<GeneratorConfig> {
        Arc::new(GeneratorConfig {
            config_dir: dir.path().to_path_buf(),
            http_sd_api_base: Some("http://cmdb.local/api/v1/sd".to_string()),
            ..Default::default()
        })
    }

    fn metrics() -> Arc<GenerationMetrics> {
        Arc::new(GenerationMetrics::new().unwrap())
    }

    fn scrape_pool(id: i64, name: &str, instances: &[&str]) -> ScrapePool {
        ScrapePool {
            id,
            name: name.to_string(),
            collector_instances: instances.iter().map(|s| s.to_string()).collect(),
            alertmanager_instances: vec![],
            scrape_interval: 30,
            scrape_timeout: 10,
            external_labels: vec![],
            support_alert: true,
            support_record: false,
            remote_read_url: None,
            remote_write_url: None,
            remote_timeout_seconds: 0,
            rule_file_path: None,
            record_file_path: None,
        }
    }

    fn job(id: i64, pool_id: i64, name: &str) -> ScrapeJob {
        ScrapeJob {
            id,
            pool_id,
            name: name.to_string(),
            scheme: "http".to_string(),
            metrics_path: "/metrics".to_string(),
            scrape_interval: 0,
            scrape_timeout: 0,
            sd_type: "http".to_string(),
            port: 9100,
            tree_node_ids: vec![1],
            kube_config_file_path: None,
            tls_ca_file_path: None,
            bearer_token: None,
            kubernetes_sd_role: None,
            relabel_config_yaml: None,
            refresh_interval: 0,
            enabled: true,
        }
    }

    fn am_pool(id: i64, fallback: &str) -> AlertManagerPool {
        AlertManagerPool {
            id,
            name: format!("am-{}", id),
            instances: vec!["10.0.1.1".to_string(), "10.0.1.2".to_string()],
            resolve_timeout: "5m".to_string(),
            group_wait: "30s".to_string(),
            group_interval: "5m".to_string(),
            repeat_interval: "4h".to_string(),
            group_by: vec![],
            fallback_receiver: fallback.to_string(),
        }
    }

    fn send_group(id: i64, pool_id: i64, name: &str) -> SendGroup {
        SendGroup {
            id,
            pool_id,
            name: name.to_string(),
            repeat_interval: None,
            send_resolved: true,
        }
    }

    fn scrape_cache(store: Arc<MemoryStore>, config: Arc<GeneratorConfig>) -> ConfigCache<ScrapeSource> {
        let store: Arc<dyn InventoryStore> = store;
        ConfigCache::new(ScrapeSource::new(store), config, metrics())
    }

    fn kept_targets(document: &str, targets: &[String]) -> HashSet<String> {
        let parsed: PrometheusConfig = serde_yaml::from_str(document).unwrap();
        let chain = &parsed.scrape_configs[0].relabel_configs;
        targets
            .iter()
            .filter(|address| {
                let labels = LabelSet::new().with_label("__address__", address.as_str());
                relabel::process(&labels, chain).unwrap().is_some()
            })
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_two_instances_cover_targets_exactly_once() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_scrape_pool(scrape_pool(1, "edge-1", &["10.0.0.1", "10.0.0.2"]))
            .unwrap();
        store.upsert_scrape_job(job(1, 1, "node"));

        let cache = scrape_cache(store, config(&dir));
        let report = cache.generate(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.documents, 2);

        let first = cache.get_by_instance("10.0.0.1");
        let second = cache.get_by_instance("10.0.0.2");
        assert!(!first.is_empty());
        assert_ne!(first, second);

        let targets: Vec<String> = (0..100).map(|i| format!("10.20.{}.{}:9100", i / 10, i)).collect();
        let kept_first = kept_targets(&first, &targets);
        let kept_second = kept_targets(&second, &targets);
        assert!(kept_first.is_disjoint(&kept_second));
        assert_eq!(kept_first.len() + kept_second.len(), targets.len());

        let path = dir.path().join("prometheus_edge-1_10.0.0.1.yaml");
        assert_eq!(std::fs::read_to_string(path).unwrap(), first);
    }

    #[tokio::test]
    async fn test_failed_pool_does_not_block_siblings() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_scrape_pool(scrape_pool(1, "a", &["10.0.0.1"])).unwrap();
        store.upsert_scrape_pool(scrape_pool(2, "b", &["10.0.0.2"])).unwrap();
        store.upsert_scrape_pool(scrape_pool(3, "c", &["10.0.0.3"])).unwrap();
        store.upsert_scrape_job(job(1, 1, "node"));
        let mut slow = job(2, 2, "slow");
        slow.scrape_interval = 15;
        slow.scrape_timeout = 30;
        store.upsert_scrape_job(slow);
        store.upsert_scrape_job(job(3, 3, "node"));

        let cache = scrape_cache(store, config(&dir));
        let err = cache.generate(&CancellationToken::new()).await.unwrap_err();

        match &err {
            CacheError::Partial { failed_pools, first, report, .. } => {
                assert_eq!(failed_pools, &vec!["b".to_string()]);
                assert_eq!(first.category(), "validation");
                assert!(first.to_string().contains("pool b"));
                assert_eq!(report.documents, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.is_committed());
        assert!(!cache.get_by_instance("10.0.0.1").is_empty());
        assert!(cache.get_by_instance("10.0.0.2").is_empty());
        assert!(!cache.get_by_instance("10.0.0.3").is_empty());
    }

    #[tokio::test]
    async fn test_failed_pool_keeps_previous_documents() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_scrape_pool(scrape_pool(1, "a", &["10.0.0.1"])).unwrap();
        store.upsert_scrape_job(job(1, 1, "node"));

        let cache = scrape_cache(store.clone(), config(&dir));
        cache.generate(&CancellationToken::new()).await.unwrap();
        let before = cache.get_by_instance("10.0.0.1");

        let mut broken = scrape_pool(1, "a", &["10.0.0.1"]);
        broken.scrape_timeout = 60;
        store.upsert_scrape_pool(broken).unwrap();

        let err = cache.generate(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.report().unwrap().carried_over, 1);
        assert_eq!(cache.get_by_instance("10.0.0.1"), before);
        assert_eq!(cache.snapshot().cycle, 2);
    }

    #[tokio::test]
    async fn test_store_outage_commits_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_scrape_pool(scrape_pool(1, "a", &["10.0.0.1"])).unwrap();
        store.upsert_scrape_job(job(1, 1, "node"));

        let cache = scrape_cache(store.clone(), config(&dir));
        cache.generate(&CancellationToken::new()).await.unwrap();
        let before = cache.snapshot();

        store.set_unavailable(true);
        let err = cache.generate(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CacheError::Store { .. }));
        assert!(!err.is_committed());
        assert!(Arc::ptr_eq(&before, &cache.snapshot()));
    }

    #[tokio::test]
    async fn test_cancelled_cycle_commits_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_scrape_pool(scrape_pool(1, "a", &["10.0.0.1"])).unwrap();

        let cache = scrape_cache(store, config(&dir));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cache.generate(&cancel).await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled { .. }));
        assert_eq!(cache.snapshot().cycle, 0);
        assert!(cache.get_by_instance("10.0.0.1").is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_claim_rejects_later_pool() {
        let dir = TempDir::new().unwrap();
        let inventory = promshard_core::Inventory {
            scrape_pools: vec![
                scrape_pool(1, "a", &["10.0.0.1"]),
                scrape_pool(2, "b", &["10.0.0.1", "10.0.0.2"]),
            ],
            scrape_jobs: vec![job(1, 1, "node"), job(2, 2, "node")],
            ..Default::default()
        };
        // Bypasses validation, as an externally edited inventory would
        let store = Arc::new(MemoryStore::from_inventory(inventory));

        let cache = scrape_cache(store, config(&dir));
        let err = cache.generate(&CancellationToken::new()).await.unwrap_err();
        match err {
            CacheError::Partial { failed_pools, first, .. } => {
                assert_eq!(failed_pools, vec!["b".to_string()]);
                assert!(first.to_string().contains("10.0.0.1"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!cache.get_by_instance("10.0.0.1").is_empty());
        assert!(cache.get_by_instance("10.0.0.2").is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_pool_name_cannot_take_address() {
        let dir = TempDir::new().unwrap();
        let mut renamed = scrape_pool(2, "edge", &["10.0.0.1"]);
        renamed.scrape_interval = 60;
        let inventory = promshard_core::Inventory {
            scrape_pools: vec![scrape_pool(1, "edge", &["10.0.0.1"]), renamed],
            scrape_jobs: vec![job(1, 1, "node"), job(2, 2, "node")],
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::from_inventory(inventory));

        let cache = scrape_cache(store, config(&dir));
        let err = cache.generate(&CancellationToken::new()).await.unwrap_err();
        match err {
            CacheError::Partial { failed_pools, first, report, .. } => {
                assert_eq!(failed_pools, vec!["edge".to_string()]);
                assert_eq!(first.category(), "validation");
                assert_eq!(report.documents, 1);
            }
            other => panic!("unexpected error: {}", other),
        }

        let served = cache.get_by_instance("10.0.0.1");
        assert!(served.contains("scrape_interval: 30s"));
        let written =
            std::fs::read_to_string(dir.path().join("prometheus_edge_10.0.0.1.yaml")).unwrap();
        assert_eq!(written, served);
    }

    #[tokio::test]
    async fn test_rejected_pool_claims_nothing() {
        let dir = TempDir::new().unwrap();
        let inventory = promshard_core::Inventory {
            scrape_pools: vec![
                scrape_pool(1, "a", &["10.0.0.1"]),
                scrape_pool(2, "b", &["10.0.0.1", "10.0.0.2"]),
                scrape_pool(3, "c", &["10.0.0.2"]),
            ],
            scrape_jobs: vec![job(1, 1, "node"), job(2, 2, "node"), job(3, 3, "node")],
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::from_inventory(inventory));

        let cache = scrape_cache(store, config(&dir));
        let err = cache.generate(&CancellationToken::new()).await.unwrap_err();
        match err {
            CacheError::Partial { failed_pools, .. } => {
                assert_eq!(failed_pools, vec!["b".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!cache.get_by_instance("10.0.0.2").is_empty());
    }

    #[tokio::test]
    async fn test_pool_without_instances_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_scrape_pool(scrape_pool(1, "empty", &[])).unwrap();
        store.upsert_scrape_job(job(1, 1, "node"));

        let cache = scrape_cache(store, config(&dir));
        let report = cache.generate(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.documents, 0);
        assert!(report.failed_pools.is_empty());
    }

    #[tokio::test]
    async fn test_routing_cache_writes_webhook_files() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_alert_manager_pool(am_pool(1, "ops-default")).unwrap();
        store.upsert_send_group(send_group(5, 1, "ops-default"));

        let store: Arc<dyn InventoryStore> = store;
        let cache = ConfigCache::new(RoutingSource::new(store), config(&dir), metrics());
        cache.generate(&CancellationToken::new()).await.unwrap();

        let first = cache.get_by_instance("10.0.1.1");
        assert_eq!(first, cache.get_by_instance("10.0.1.2"));
        let parsed: promshard_render::schema::AlertmanagerConfig =
            serde_yaml::from_str(&first).unwrap();
        assert_eq!(parsed.receivers.len(), 1);
        assert_eq!(parsed.receivers[0].name, "ops-default");

        let url = std::fs::read_to_string(dir.path().join("webhook_url_5.txt")).unwrap();
        assert!(url.ends_with("send_group_id=5"));
        assert!(dir.path().join("alertmanager_am-1_10.0.1.1.yaml").exists());
    }

    #[tokio::test]
    async fn test_missing_fallback_fails_only_that_pool() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_alert_manager_pool(am_pool(1, "ghost")).unwrap();
        let mut healthy = am_pool(2, "ops");
        healthy.instances = vec!["10.0.2.1".to_string()];
        store.upsert_alert_manager_pool(healthy).unwrap();
        store.upsert_send_group(send_group(5, 2, "ops"));

        let store: Arc<dyn InventoryStore> = store;
        let cache = ConfigCache::new(RoutingSource::new(store), config(&dir), metrics());
        let err = cache.generate(&CancellationToken::new()).await.unwrap_err();
        match err {
            CacheError::Partial { failed_pools, first, .. } => {
                assert_eq!(failed_pools, vec!["am-1".to_string()]);
                assert_eq!(first.category(), "lookup");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!cache.get_by_instance("10.0.2.1").is_empty());
    }

    #[tokio::test]
    async fn test_rule_cache_balances_rules() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_scrape_pool(scrape_pool(1, "a", &["10.0.0.1", "10.0.0.2", "10.0.0.3"]))
            .unwrap();
        for id in 0..7 {
            store.upsert_alert_rule(AlertRule {
                id,
                pool_id: 1,
                name: format!("rule{}", id),
                expr: "up == 0".to_string(),
                for_duration: "1m".to_string(),
                severity: String::new(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
                enabled: true,
            });
        }

        let store: Arc<dyn InventoryStore> = store;
        let cache = ConfigCache::new(
            RuleSource::new(store.clone(), RuleKind::Alert),
            config(&dir),
            metrics(),
        );
        cache.generate(&CancellationToken::new()).await.unwrap();

        let mut total = 0;
        for instance in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            let file: promshard_render::schema::RuleFile =
                serde_yaml::from_str(&cache.get_by_instance(instance)).unwrap();
            assert!(file.groups.len() == 2 || file.groups.len() == 3);
            total += file.groups.len();
        }
        assert_eq!(total, 7);

        // Record rules are not generated for pools without recording support
        let records = ConfigCache::new(RuleSource::new(store, RuleKind::Record), config(&dir), metrics());
        let report = records.generate(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.pools, 0);
    }

    #[test]
    fn test_stale_generation_is_not_published() {
        let cache = DocumentCache::new();
        assert!(cache.publish(Generation {
            cycle: 2,
            ..Default::default()
        }));
        assert!(!cache.publish(Generation {
            cycle: 1,
            ..Default::default()
        }));
        assert_eq!(cache.snapshot().cycle, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_partial_generation() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_scrape_pool(scrape_pool(1, "edge-1", &["10.0.0.1", "10.0.0.2"]))
            .unwrap();
        for id in 0..20 {
            store.upsert_scrape_job(job(id, 1, &format!("job{}", id)));
        }

        let cache = Arc::new(scrape_cache(store.clone(), config(&dir)));
        cache.generate(&CancellationToken::new()).await.unwrap();

        let done = CancellationToken::new();
        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let done = done.clone();
            readers.push(tokio::spawn(async move {
                let mut reads = 0u64;
                while !done.is_cancelled() {
                    let document = cache.get_by_instance("10.0.0.1");
                    assert!(!document.is_empty());
                    let parsed: PrometheusConfig = serde_yaml::from_str(&document).unwrap();
                    assert_eq!(parsed.scrape_configs.len(), 20);
                    reads += 1;
                    tokio::task::yield_now().await;
                }
                reads
            }));
        }

        for _ in 0..10 {
            cache.generate(&CancellationToken::new()).await.unwrap();
        }
        done.cancel();

        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
    }
}
