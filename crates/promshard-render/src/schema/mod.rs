//! Typed documents for the collector, the alert router and rule files
//!
//! Field order in these structs is the field order of the generated YAML.

pub mod alertmanager;
pub mod prometheus;
pub mod rules;

pub use alertmanager::{AlertmanagerConfig, AlertmanagerGlobal, Receiver, Route, WebhookConfig};
pub use prometheus::{
    AlertingConfig, AlertmanagerEndpoints, GlobalConfig, HttpSdConfig, KubernetesSdConfig, PrometheusConfig,
    RelabelAction, RelabelConfig, RemoteEndpointConfig, ScrapeConfig, StaticConfig, TlsConfig,
};
pub use rules::{Rule, RuleFile, RuleGroup};
