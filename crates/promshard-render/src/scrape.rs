//! Collector configuration builder
//!
//! Builds the pool-wide base document (global section, remote endpoints,
//! alerting, rule files) and one scrape block per job, then shards the blocks
//! across the pool's collector replicas.

use crate::duration::PromDuration;
use crate::relabel;
use crate::schema::{
    AlertingConfig, AlertmanagerEndpoints, GlobalConfig, HttpSdConfig, KubernetesSdConfig,
    PrometheusConfig, RelabelConfig, RemoteEndpointConfig, ScrapeConfig, StaticConfig, TlsConfig,
};
use crate::sharding;
use promshard_core::{
    Error, ErrorContext, GeneratorConfig, LabelSet, Result, ScrapeJob, ScrapePool,
    ServiceDiscoveryKind,
};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

const DEFAULT_KUBERNETES_ROLE: &str = "node";

/// A job left out of the pool's documents
#[derive(Debug)]
pub struct SkippedJob {
    pub job: String,
    pub error: Error,
}

/// Output of [`ScrapeConfigBuilder::build`]
#[derive(Debug)]
pub struct ScrapeBuild {
    /// Pool-wide document without scrape blocks
    pub base: PrometheusConfig,
    /// Unsharded scrape blocks, one per surviving job
    pub jobs: Vec<ScrapeConfig>,
    pub skipped_jobs: Vec<SkippedJob>,
}

impl ScrapeBuild {
    /// One complete document per collector replica
    pub fn instance_configs(&self, instances: &[String]) -> BTreeMap<String, PrometheusConfig> {
        sharding::shard_hashmod(&self.jobs, instances)
            .into_iter()
            .map(|(address, blocks)| {
                let mut config = self.base.clone();
                config.scrape_configs = blocks;
                (address, config)
            })
            .collect()
    }
}

/// Builds collector configuration for one scrape pool
pub struct ScrapeConfigBuilder<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> ScrapeConfigBuilder<'a> {
    pub fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    /// Build the base document and the scrape blocks of `pool`.
    ///
    /// Fails for invalid pool timing, an invalid remote URL, or a job whose
    /// effective timing is invalid. Other job problems skip only that job.
    pub fn build(&self, pool: &ScrapePool, jobs: &[ScrapeJob]) -> Result<ScrapeBuild> {
        check_timing(pool.scrape_interval, pool.scrape_timeout)
            .with_context_fn(|| format!("scrape pool {}", pool.name))?;

        let base = self.base_config(pool)?;

        let mut blocks = Vec::new();
        let mut skipped_jobs = Vec::new();
        let mut names = HashSet::new();

        for job in jobs {
            if !job.enabled {
                debug!(pool = %pool.name, job = %job.name, "Skipping disabled job");
                continue;
            }

            let interval = effective(job.scrape_interval, pool.scrape_interval);
            let timeout = effective(job.scrape_timeout, pool.scrape_timeout);
            check_timing(interval, timeout)
                .with_context_fn(|| format!("scrape pool {} job {}", pool.name, job.name))?;

            let result = if names.contains(job.name.as_str()) {
                Err(Error::validation(format!("duplicate job name {}", job.name)))
            } else {
                self.scrape_block(pool, job, interval, timeout)
            };

            match result {
                Ok(block) => {
                    names.insert(job.name.as_str());
                    blocks.push(block);
                }
                Err(error) => {
                    warn!(pool = %pool.name, job = %job.name, error = %error, "Skipping scrape job");
                    skipped_jobs.push(SkippedJob {
                        job: job.name.clone(),
                        error,
                    });
                }
            }
        }

        Ok(ScrapeBuild {
            base,
            jobs: blocks,
            skipped_jobs,
        })
    }

    /// Build and serialize one document per collector replica.
    ///
    /// Serialization failures are reported per replica.
    pub fn render(
        &self,
        pool: &ScrapePool,
        jobs: &[ScrapeJob],
    ) -> Result<(ScrapeBuild, BTreeMap<String, Result<String>>)> {
        let build = self.build(pool, jobs)?;
        let documents = build
            .instance_configs(&pool.collector_instances)
            .into_iter()
            .map(|(address, config)| {
                let yaml = serde_yaml::to_string(&config).map_err(|e| {
                    Error::serialization(format!(
                        "collector config of pool {} for {}: {}",
                        pool.name, address, e
                    ))
                });
                (address, yaml)
            })
            .collect();
        Ok((build, documents))
    }

    fn base_config(&self, pool: &ScrapePool) -> Result<PrometheusConfig> {
        let interval = PromDuration::from_secs(pool.scrape_interval);
        let remote_timeout = PromDuration::from_secs(effective(
            pool.remote_timeout_seconds,
            self.config.default_remote_timeout_seconds,
        ));

        let mut config = PrometheusConfig {
            global: GlobalConfig {
                scrape_interval: interval,
                scrape_timeout: PromDuration::from_secs(pool.scrape_timeout),
                evaluation_interval: interval,
                external_labels: LabelSet::parse_pairs(&pool.external_labels),
            },
            ..Default::default()
        };

        if let Some(url) = non_empty(&pool.remote_write_url) {
            config.remote_write.push(RemoteEndpointConfig {
                url: parse_url(url).with_context_fn(|| {
                    format!("remote write url of pool {}", pool.name)
                })?,
                remote_timeout,
            });
        }
        if let Some(url) = non_empty(&pool.remote_read_url) {
            config.remote_read.push(RemoteEndpointConfig {
                url: parse_url(url)
                    .with_context_fn(|| format!("remote read url of pool {}", pool.name))?,
                remote_timeout,
            });
        }

        if pool.support_alert {
            let targets = sharding::dedup_instances(&pool.alertmanager_instances);
            if targets.is_empty() {
                warn!(pool = %pool.name, "Alerting enabled but no alert routers configured");
            } else {
                config.alerting = Some(AlertingConfig {
                    alertmanagers: vec![AlertmanagerEndpoints {
                        static_configs: vec![StaticConfig {
                            targets,
                            labels: LabelSet::new(),
                        }],
                        ..Default::default()
                    }],
                });
            }
            if let Some(path) = non_empty(&pool.rule_file_path) {
                config.rule_files.push(path.to_string());
            }
        }

        if pool.support_record {
            if let Some(path) = non_empty(&pool.record_file_path) {
                config.rule_files.push(path.to_string());
            }
        }

        Ok(config)
    }

    fn scrape_block(
        &self,
        pool: &ScrapePool,
        job: &ScrapeJob,
        interval: u64,
        timeout: u64,
    ) -> Result<ScrapeConfig> {
        let relabel_configs = match non_empty(&job.relabel_config_yaml) {
            Some(raw) => parse_relabel_configs(raw)?,
            None => Vec::new(),
        };

        let mut block = ScrapeConfig {
            job_name: job.name.clone(),
            scheme: job.scheme.clone(),
            metrics_path: job.metrics_path.clone(),
            scrape_interval: PromDuration::from_secs(interval),
            scrape_timeout: PromDuration::from_secs(timeout),
            bearer_token: None,
            tls_config: None,
            http_sd_configs: Vec::new(),
            kubernetes_sd_configs: Vec::new(),
            relabel_configs,
        };

        match job.sd_kind()? {
            ServiceDiscoveryKind::Http => {
                block.http_sd_configs.push(HttpSdConfig {
                    url: self.http_sd_url(job)?,
                    refresh_interval: PromDuration::from_secs(effective(
                        job.refresh_interval,
                        self.config.default_refresh_interval_seconds,
                    )),
                });
            }
            ServiceDiscoveryKind::K8s => {
                block.bearer_token = non_empty(&job.bearer_token).map(str::to_string);
                block.tls_config = non_empty(&job.tls_ca_file_path).map(|ca| TlsConfig {
                    ca_file: Some(ca.to_string()),
                    insecure_skip_verify: false,
                });
                block.kubernetes_sd_configs.push(KubernetesSdConfig {
                    role: non_empty(&job.kubernetes_sd_role)
                        .unwrap_or(DEFAULT_KUBERNETES_ROLE)
                        .to_string(),
                    kubeconfig_file: non_empty(&job.kube_config_file_path).map(str::to_string),
                });
            }
        }

        debug!(pool = %pool.name, job = %job.name, "Built scrape block");
        Ok(block)
    }

    /// Discovery URL for a job: the API base plus `port` and `tree_node_ids`
    fn http_sd_url(&self, job: &ScrapeJob) -> Result<String> {
        let base = self
            .config
            .http_sd_api_base
            .as_deref()
            .ok_or_else(|| Error::validation("http_sd_api_base is not configured"))?;
        let mut url = url::Url::parse(base).with_context("http_sd_api_base")?;

        let node_ids = job
            .tree_node_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        url.query_pairs_mut()
            .append_pair("port", &job.port.to_string())
            .append_pair("tree_node_ids", &node_ids);

        Ok(url.into())
    }
}

/// Parse a stored relabel document into rules that can be evaluated
pub fn parse_relabel_configs(raw: &str) -> Result<Vec<RelabelConfig>> {
    let rules: Vec<RelabelConfig> =
        serde_yaml::from_str(raw).with_context("relabel config is not a valid rule list")?;
    relabel::validate_all(&rules)?;
    Ok(rules)
}

fn check_timing(interval: u64, timeout: u64) -> Result<()> {
    if timeout == 0 || timeout > interval {
        return Err(Error::validation(format!(
            "scrape timeout {}s must be greater than 0 and not exceed scrape interval {}s",
            timeout, interval
        )));
    }
    Ok(())
}

fn effective(value: u64, inherited: u64) -> u64 {
    if value == 0 {
        inherited
    } else {
        value
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_url(raw: &str) -> Result<String> {
    Ok(url::Url::parse(raw)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RelabelAction;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            http_sd_api_base: Some("http://cmdb.local/api/v1/sd".to_string()),
            ..Default::default()
        }
    }

    fn pool() -> ScrapePool {
        ScrapePool {
            id: 1,
            name: "edge-1".to_string(),
            collector_instances: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            alertmanager_instances: vec!["10.0.1.1:9093".to_string()],
            scrape_interval: 30,
            scrape_timeout: 10,
            external_labels: vec!["region=eu".to_string(), "broken".to_string()],
            support_alert: true,
            support_record: true,
            remote_read_url: None,
            remote_write_url: Some("http://tsdb.local/api/v1/write".to_string()),
            remote_timeout_seconds: 0,
            rule_file_path: Some("/etc/prometheus/alert_rules.yaml".to_string()),
            record_file_path: Some("/etc/prometheus/record_rules.yaml".to_string()),
        }
    }

    fn job(id: i64, name: &str) -> ScrapeJob {
        ScrapeJob {
            id,
            pool_id: 1,
            name: name.to_string(),
            scheme: "http".to_string(),
            metrics_path: "/metrics".to_string(),
            scrape_interval: 0,
            scrape_timeout: 0,
            sd_type: "http".to_string(),
            port: 9100,
            tree_node_ids: vec![4, 7],
            kube_config_file_path: None,
            tls_ca_file_path: None,
            bearer_token: None,
            kubernetes_sd_role: None,
            relabel_config_yaml: None,
            refresh_interval: 0,
            enabled: true,
        }
    }

    #[test]
    fn test_base_config() {
        let config = config();
        let build = ScrapeConfigBuilder::new(&config)
            .build(&pool(), &[])
            .unwrap();

        assert_eq!(build.base.global.scrape_interval, PromDuration::from_secs(30));
        assert_eq!(build.base.global.external_labels.len(), 1);
        assert_eq!(build.base.remote_write.len(), 1);
        assert_eq!(
            build.base.remote_write[0].remote_timeout,
            PromDuration::from_secs(30)
        );
        assert!(build.base.alerting.is_some());
        assert_eq!(build.base.rule_files.len(), 2);
    }

    #[test]
    fn test_invalid_pool_timing_fails() {
        let config = config();
        let mut pool = pool();
        pool.scrape_timeout = 60;
        let err = ScrapeConfigBuilder::new(&config).build(&pool, &[]).unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("edge-1"));

        pool.scrape_timeout = 0;
        assert!(ScrapeConfigBuilder::new(&config).build(&pool, &[]).is_err());
    }

    #[test]
    fn test_invalid_job_timing_fails_pool() {
        let config = config();
        let mut slow = job(1, "slow");
        slow.scrape_interval = 15;
        slow.scrape_timeout = 30;
        let err = ScrapeConfigBuilder::new(&config)
            .build(&pool(), &[job(2, "node"), slow])
            .unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("slow"));
    }

    #[test]
    fn test_bad_remote_url_fails_pool() {
        let config = config();
        let mut pool = pool();
        pool.remote_write_url = Some("not a url".to_string());
        let err = ScrapeConfigBuilder::new(&config).build(&pool, &[]).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_http_sd_url() {
        let config = config();
        let build = ScrapeConfigBuilder::new(&config)
            .build(&pool(), &[job(1, "node")])
            .unwrap();

        let sd = &build.jobs[0].http_sd_configs[0];
        assert_eq!(
            sd.url,
            "http://cmdb.local/api/v1/sd?port=9100&tree_node_ids=4%2C7"
        );
        assert_eq!(sd.refresh_interval, PromDuration::from_secs(60));
        assert_eq!(build.jobs[0].scrape_timeout, PromDuration::from_secs(10));
    }

    #[test]
    fn test_job_level_failures_skip_only_that_job() {
        let config = GeneratorConfig::default();
        let mut k8s = job(1, "pods");
        k8s.sd_type = "k8s".to_string();
        k8s.kubernetes_sd_role = Some("pod".to_string());
        k8s.bearer_token = Some("secret".to_string());
        k8s.tls_ca_file_path = Some("/etc/ca.pem".to_string());

        let mut consul = job(2, "consul");
        consul.sd_type = "consul".to_string();

        let mut broken = job(3, "broken");
        broken.sd_type = "k8s".to_string();
        broken.relabel_config_yaml = Some("- action: [unclosed".to_string());

        // No discovery API configured, so the http job is skipped too
        let http = job(4, "node");

        let build = ScrapeConfigBuilder::new(&config)
            .build(&pool(), &[k8s, consul, broken, http, job(5, "pods")])
            .unwrap();

        assert_eq!(build.jobs.len(), 1);
        assert_eq!(build.jobs[0].job_name, "pods");
        assert_eq!(build.jobs[0].kubernetes_sd_configs[0].role, "pod");
        assert_eq!(build.jobs[0].bearer_token.as_deref(), Some("secret"));
        let skipped: Vec<&str> = build.skipped_jobs.iter().map(|s| s.job.as_str()).collect();
        assert_eq!(skipped, vec!["consul", "broken", "node", "pods"]);
    }

    #[test]
    fn test_disabled_jobs_are_omitted() {
        let config = config();
        let mut disabled = job(1, "node");
        disabled.enabled = false;
        let build = ScrapeConfigBuilder::new(&config)
            .build(&pool(), &[disabled])
            .unwrap();
        assert!(build.jobs.is_empty());
        assert!(build.skipped_jobs.is_empty());
    }

    #[test]
    fn test_render_appends_hashmod_rules_per_instance() {
        let config = config();
        let mut node = job(1, "node");
        node.relabel_config_yaml =
            Some("- source_labels: [__meta_env]\n  regex: prod\n  action: keep\n".to_string());

        let (_, documents) = ScrapeConfigBuilder::new(&config)
            .render(&pool(), &[node])
            .unwrap();
        assert_eq!(documents.len(), 2);

        let first = documents["10.0.0.1"].as_ref().unwrap();
        let second = documents["10.0.0.2"].as_ref().unwrap();
        assert_ne!(first, second);

        let parsed: PrometheusConfig = serde_yaml::from_str(first).unwrap();
        let chain = &parsed.scrape_configs[0].relabel_configs;
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].action, RelabelAction::HashMod);
        assert_eq!(chain[2].regex.as_deref(), Some("^0$"));
    }
}
