//! Alert-router configuration builder
//!
//! Every router replica of a pool receives the same routing tree: a default
//! route to the pool's fallback receiver and one `continue` route per send
//! group, matched on the `alert_send_group` label. Webhook URLs are written to
//! side files and referenced through `url_file`.

use crate::duration::PromDuration;
use crate::schema::{AlertmanagerConfig, AlertmanagerGlobal, Receiver, Route, WebhookConfig};
use promshard_core::{AlertManagerPool, Error, ErrorContext, GeneratorConfig, Result, SendGroup};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Label carried by alerts that selects their send group
pub const SEND_GROUP_LABEL: &str = "alert_send_group";

/// A file the router reads besides its configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Output of [`AlertRoutingBuilder::build`]
#[derive(Debug, Clone)]
pub struct RoutingBuild {
    pub config: AlertmanagerConfig,
    pub side_files: Vec<SideFile>,
}

/// Builds alert-router configuration for one alert-manager pool
pub struct AlertRoutingBuilder<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> AlertRoutingBuilder<'a> {
    pub fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    /// Whether the fallback receiver must be looked up outside the pool's
    /// own send groups
    pub fn needs_fallback_lookup(pool: &AlertManagerPool, send_groups: &[SendGroup]) -> bool {
        !send_groups
            .iter()
            .any(|group| group.name == pool.fallback_receiver)
    }

    /// Build the routing tree of `pool`.
    ///
    /// `fallback` is the send group resolved by name when the fallback
    /// receiver is not one of `send_groups`; it is ignored otherwise.
    pub fn build(
        &self,
        pool: &AlertManagerPool,
        send_groups: &[SendGroup],
        fallback: Option<&SendGroup>,
    ) -> Result<RoutingBuild> {
        if pool.fallback_receiver.trim().is_empty() {
            return Err(Error::validation(format!(
                "alert manager pool {} has no fallback receiver",
                pool.name
            )));
        }

        let fallback_duration = self.config.fallback_duration();
        let duration = |value: &str, field: &str| PromDuration::parse_or(value, fallback_duration, field);

        let mut config = AlertmanagerConfig {
            global: AlertmanagerGlobal {
                resolve_timeout: duration(&pool.resolve_timeout, "resolve_timeout"),
            },
            route: Route {
                receiver: Some(pool.fallback_receiver.clone()),
                group_by: pool.group_by.clone(),
                group_wait: Some(duration(&pool.group_wait, "group_wait")),
                group_interval: Some(duration(&pool.group_interval, "group_interval")),
                repeat_interval: Some(duration(&pool.repeat_interval, "repeat_interval")),
                ..Default::default()
            },
            receivers: Vec::new(),
        };
        let mut side_files = Vec::new();
        let mut names = HashSet::new();

        for group in send_groups {
            if !names.insert(group.name.as_str()) {
                return Err(Error::validation(format!(
                    "alert manager pool {} has two send groups named {}",
                    pool.name, group.name
                )));
            }

            let (receiver, side_file) = self.receiver(group)?;
            config.receivers.push(receiver);
            side_files.push(side_file);

            config.route.routes.push(Route {
                receiver: Some(group.name.clone()),
                matchers: vec![format!("{}=\"{}\"", SEND_GROUP_LABEL, group.id)],
                repeat_interval: group
                    .repeat_interval
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| duration(v, "send_group.repeat_interval")),
                continue_matching: true,
                ..Default::default()
            });
        }

        // The default route already points at the fallback; it only needs a
        // receiver entry when no send group provides one.
        if !names.contains(pool.fallback_receiver.as_str()) {
            let group = fallback
                .filter(|group| group.name == pool.fallback_receiver)
                .ok_or_else(|| {
                    Error::lookup(format!(
                        "fallback receiver {} of alert manager pool {} not found",
                        pool.fallback_receiver, pool.name
                    ))
                })?;
            let (receiver, side_file) = self.receiver(group)?;
            config.receivers.push(receiver);
            side_files.push(side_file);
        }

        debug!(
            pool = %pool.name,
            receivers = config.receivers.len(),
            "Built alert routing tree"
        );

        Ok(RoutingBuild { config, side_files })
    }

    /// Build and serialize the routing document shared by every replica
    pub fn render(
        &self,
        pool: &AlertManagerPool,
        send_groups: &[SendGroup],
        fallback: Option<&SendGroup>,
    ) -> Result<(RoutingBuild, String)> {
        let build = self.build(pool, send_groups, fallback)?;
        let yaml = serde_yaml::to_string(&build.config).map_err(|e| {
            Error::serialization(format!("router config of pool {}: {}", pool.name, e))
        })?;
        Ok((build, yaml))
    }

    /// Callback URL that identifies `group` to the alert intake
    pub fn webhook_url(&self, group: &SendGroup) -> Result<String> {
        let mut url = url::Url::parse(&self.config.webhook_callback_base)
            .with_context("webhook_callback_base")?;
        url.query_pairs_mut()
            .append_pair("send_group_id", &group.id.to_string());
        Ok(url.into())
    }

    fn receiver(&self, group: &SendGroup) -> Result<(Receiver, SideFile)> {
        let path = self.config.webhook_url_path(group.id);
        let receiver = Receiver {
            name: group.name.clone(),
            webhook_configs: vec![WebhookConfig {
                url_file: path.to_string_lossy().into_owned(),
                send_resolved: group.send_resolved,
            }],
        };
        let side_file = SideFile {
            path,
            contents: self.webhook_url(group)?,
        };
        Ok((receiver, side_file))
    }
}
