//! Core record definitions for promshard
//!
//! These mirror the rows the administrative service persists. The generator
//! only ever reads them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a persisted record
pub type RecordId = i64;

/// A group of metrics-collector replicas sharing one configuration template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapePool {
    pub id: RecordId,

    /// Unique pool name, also used in artifact file names
    pub name: String,

    /// Ordered collector replica addresses; position is the shard index
    #[serde(default)]
    pub collector_instances: Vec<String>,

    /// Alert-router addresses the collectors push alerts to
    #[serde(default)]
    pub alertmanager_instances: Vec<String>,

    /// Global scrape interval in seconds
    pub scrape_interval: u64,

    /// Global scrape timeout in seconds (must not exceed the interval)
    pub scrape_timeout: u64,

    /// External labels as `key=value` pairs
    #[serde(default)]
    pub external_labels: Vec<String>,

    #[serde(default)]
    pub support_alert: bool,

    #[serde(default)]
    pub support_record: bool,

    #[serde(default)]
    pub remote_read_url: Option<String>,

    #[serde(default)]
    pub remote_write_url: Option<String>,

    /// Remote read/write timeout in seconds (0 uses the configured default)
    #[serde(default)]
    pub remote_timeout_seconds: u64,

    /// Path the collectors load alert rules from
    #[serde(default)]
    pub rule_file_path: Option<String>,

    /// Path the collectors load recording rules from
    #[serde(default)]
    pub record_file_path: Option<String>,
}

/// Service discovery mechanism of a scrape job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceDiscoveryKind {
    /// Targets come from the discovery API over HTTP
    Http,
    /// Targets come from a Kubernetes API server
    K8s,
}

impl std::str::FromStr for ServiceDiscoveryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(ServiceDiscoveryKind::Http),
            "k8s" | "kubernetes" => Ok(ServiceDiscoveryKind::K8s),
            _ => Err(format!("Unknown service discovery type: {}", s)),
        }
    }
}

impl fmt::Display for ServiceDiscoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceDiscoveryKind::Http => write!(f, "http"),
            ServiceDiscoveryKind::K8s => write!(f, "k8s"),
        }
    }
}

/// One scrape target definition belonging to a scrape pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: RecordId,
    pub pool_id: RecordId,
    pub name: String,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Seconds; 0 inherits the pool's global interval
    #[serde(default)]
    pub scrape_interval: u64,

    /// Seconds; 0 inherits the pool's global timeout
    #[serde(default)]
    pub scrape_timeout: u64,

    /// Raw service discovery type as stored (`http` or `k8s`)
    pub sd_type: String,

    /// Port the discovered targets expose metrics on (HTTP discovery)
    #[serde(default)]
    pub port: u16,

    /// Resource-tree nodes whose hosts are discovered (HTTP discovery)
    #[serde(default)]
    pub tree_node_ids: Vec<RecordId>,

    #[serde(default)]
    pub kube_config_file_path: Option<String>,

    #[serde(default)]
    pub tls_ca_file_path: Option<String>,

    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Kubernetes discovery role (node, pod, service, ...)
    #[serde(default)]
    pub kubernetes_sd_role: Option<String>,

    /// Raw YAML list of relabel rules
    #[serde(default)]
    pub relabel_config_yaml: Option<String>,

    /// Discovery refresh interval in seconds (0 uses the configured default)
    #[serde(default)]
    pub refresh_interval: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ScrapeJob {
    /// Parse the stored discovery type
    pub fn sd_kind(&self) -> crate::Result<ServiceDiscoveryKind> {
        self.sd_type
            .parse()
            .map_err(|e: String| crate::Error::validation(e))
    }
}

/// A group of alert-router replicas sharing one routing tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertManagerPool {
    pub id: RecordId,
    pub name: String,

    #[serde(default)]
    pub instances: Vec<String>,

    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout: String,

    #[serde(default = "default_group_wait")]
    pub group_wait: String,

    #[serde(default = "default_group_interval")]
    pub group_interval: String,

    #[serde(default = "default_repeat_interval")]
    pub repeat_interval: String,

    #[serde(default)]
    pub group_by: Vec<String>,

    /// Receiver of the default route
    pub fallback_receiver: String,
}

/// A named alert destination (webhook) belonging to a router pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendGroup {
    pub id: RecordId,
    pub pool_id: RecordId,
    pub name: String,

    /// Overrides the pool's repeat interval for this route
    #[serde(default)]
    pub repeat_interval: Option<String>,

    #[serde(default = "default_enabled")]
    pub send_resolved: bool,
}

/// An alerting rule evaluated by the collectors of one scrape pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: RecordId,
    pub pool_id: RecordId,
    pub name: String,
    pub expr: String,

    #[serde(default)]
    pub for_duration: String,

    #[serde(default)]
    pub severity: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A recording rule evaluated by the collectors of one scrape pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRule {
    pub id: RecordId,
    pub pool_id: RecordId,
    pub name: String,
    pub expr: String,

    #[serde(default)]
    pub for_duration: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Artifact kinds produced by a generation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKind {
    /// Collector configuration (one per collector replica)
    Scrape,
    /// Alert-router configuration (one per router replica)
    AlertRouting,
    /// Alerting rule file (one per collector replica)
    AlertRules,
    /// Recording rule file (one per collector replica)
    RecordRules,
}

impl ConfigKind {
    /// All kinds, in a stable order
    pub const ALL: [ConfigKind; 4] = [
        ConfigKind::Scrape,
        ConfigKind::AlertRouting,
        ConfigKind::AlertRules,
        ConfigKind::RecordRules,
    ];

    /// Prefix of the artifact files written for this kind
    pub fn artifact_prefix(&self) -> &'static str {
        match self {
            ConfigKind::Scrape => "prometheus",
            ConfigKind::AlertRouting => "alertmanager",
            ConfigKind::AlertRules => "alert_rules",
            ConfigKind::RecordRules => "record_rules",
        }
    }

    /// Position in [`ConfigKind::ALL`]
    pub fn index(&self) -> usize {
        match self {
            ConfigKind::Scrape => 0,
            ConfigKind::AlertRouting => 1,
            ConfigKind::AlertRules => 2,
            ConfigKind::RecordRules => 3,
        }
    }
}

impl std::str::FromStr for ConfigKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "scrape" | "prometheus" => Ok(ConfigKind::Scrape),
            "alert_routing" | "alertmanager" => Ok(ConfigKind::AlertRouting),
            "alert_rules" => Ok(ConfigKind::AlertRules),
            "record_rules" => Ok(ConfigKind::RecordRules),
            _ => Err(format!("Unknown config kind: {}", s)),
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKind::Scrape => write!(f, "scrape"),
            ConfigKind::AlertRouting => write!(f, "alert_routing"),
            ConfigKind::AlertRules => write!(f, "alert_rules"),
            ConfigKind::RecordRules => write!(f, "record_rules"),
        }
    }
}

/// Which rule file a rule document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Alert,
    Record,
}

impl RuleKind {
    /// The cache kind holding documents of this rule kind
    pub fn config_kind(&self) -> ConfigKind {
        match self {
            RuleKind::Alert => ConfigKind::AlertRules,
            RuleKind::Record => ConfigKind::RecordRules,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Alert => write!(f, "alert"),
            RuleKind::Record => write!(f, "record"),
        }
    }
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_resolve_timeout() -> String {
    "5m".to_string()
}

fn default_group_wait() -> String {
    "30s".to_string()
}

fn default_group_interval() -> String {
    "5m".to_string()
}

fn default_repeat_interval() -> String {
    "4h".to_string()
}
