//! Collector configuration document

use crate::duration::PromDuration;
use promshard_core::LabelSet;
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Top-level collector configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusConfig {
    pub global: GlobalConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerting: Option<AlertingConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scrape_configs: Vec<ScrapeConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_write: Vec<RemoteEndpointConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_read: Vec<RemoteEndpointConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub scrape_interval: PromDuration,
    pub scrape_timeout: PromDuration,
    pub evaluation_interval: PromDuration,

    #[serde(default, skip_serializing_if = "LabelSet::is_empty")]
    pub external_labels: LabelSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertingConfig {
    pub alertmanagers: Vec<AlertmanagerEndpoints>,
}

/// One alert-router discovery block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,

    pub static_configs: Vec<StaticConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,

    #[serde(default, skip_serializing_if = "LabelSet::is_empty")]
    pub labels: LabelSet,
}

/// Remote write or remote read endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEndpointConfig {
    pub url: String,
    pub remote_timeout: PromDuration,
}

/// One scrape block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub job_name: String,
    pub scheme: String,
    pub metrics_path: String,
    pub scrape_interval: PromDuration,
    pub scrape_timeout: PromDuration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TlsConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_sd_configs: Vec<HttpSdConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kubernetes_sd_configs: Vec<KubernetesSdConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relabel_configs: Vec<RelabelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSdConfig {
    pub url: String,
    pub refresh_interval: PromDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesSdConfig {
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_skip_verify: bool,
}

/// Relabel action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelabelAction {
    #[default]
    Replace,
    Keep,
    Drop,
    HashMod,
    LabelKeep,
    LabelDrop,
}

/// One relabel rule.
///
/// Unknown keys are rejected so that a typo in a stored relabel document
/// fails the job instead of silently changing its targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelabelConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,

    #[serde(default)]
    pub action: RelabelAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relabel_action_names() {
        let parsed: Vec<RelabelAction> =
            serde_yaml::from_str("[replace, keep, drop, hashmod, labelkeep, labeldrop]").unwrap();
        assert_eq!(
            parsed,
            vec![
                RelabelAction::Replace,
                RelabelAction::Keep,
                RelabelAction::Drop,
                RelabelAction::HashMod,
                RelabelAction::LabelKeep,
                RelabelAction::LabelDrop,
            ]
        );
    }

    #[test]
    fn test_relabel_rejects_unknown_keys() {
        let result: Result<Vec<RelabelConfig>, _> =
            serde_yaml::from_str("- source_labels: [job]\n  acton: keep\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let config = PrometheusConfig {
            global: GlobalConfig {
                scrape_interval: PromDuration::from_secs(30),
                scrape_timeout: PromDuration::from_secs(10),
                evaluation_interval: PromDuration::from_secs(30),
                external_labels: LabelSet::new(),
            },
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(
            yaml,
            "global:\n  scrape_interval: 30s\n  scrape_timeout: 10s\n  evaluation_interval: 30s\n"
        );
    }
}
