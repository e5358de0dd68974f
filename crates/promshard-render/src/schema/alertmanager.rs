//! Alert-router configuration document

use crate::duration::PromDuration;
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerConfig {
    pub global: AlertmanagerGlobal,
    pub route: Route,
    pub receivers: Vec<Receiver>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerGlobal {
    pub resolve_timeout: PromDuration,
}

/// A node of the routing tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait: Option<PromDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval: Option<PromDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<PromDuration>,

    /// Matchers in `name="value"` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<String>,

    #[serde(rename = "continue", default, skip_serializing_if = "is_false")]
    pub continue_matching: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhook_configs: Vec<WebhookConfig>,
}

/// Webhook whose URL is read from a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url_file: String,
    pub send_resolved: bool,
}
