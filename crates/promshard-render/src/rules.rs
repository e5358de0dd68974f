//! Rule file builder
//!
//! Each rule becomes its own group. Groups are dealt round-robin across the
//! pool's collector replicas and every replica gets a file, even an empty one,
//! so that a replica never keeps stale rules it no longer owns.

use crate::duration::PromDuration;
use crate::schema::{Rule, RuleFile, RuleGroup};
use crate::sharding;
use promshard_core::{
    AlertRule, Error, GeneratorConfig, LabelSet, RecordId, RecordRule, Result, RuleKind,
    ScrapePool,
};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// A stored rule that can be rendered into a rule group
pub trait RuleDefinition {
    const KIND: RuleKind;

    fn id(&self) -> RecordId;
    fn name(&self) -> &str;
    fn enabled(&self) -> bool;
    fn to_rule(&self, fallback: Duration) -> Rule;
}

/// Parse an optional `for` duration; empty means unset
fn for_duration(raw: &str, fallback: Duration) -> Option<PromDuration> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(PromDuration::parse_or(raw, fallback, "for"))
    }
}

impl RuleDefinition for AlertRule {
    const KIND: RuleKind = RuleKind::Alert;

    fn id(&self) -> RecordId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn to_rule(&self, fallback: Duration) -> Rule {
        let mut labels = LabelSet::from(self.labels.clone());
        if !self.severity.trim().is_empty() {
            labels.insert("severity", self.severity.trim());
        }
        Rule {
            alert: Some(self.name.clone()),
            record: None,
            expr: self.expr.clone(),
            for_duration: for_duration(&self.for_duration, fallback),
            labels,
            annotations: self.annotations.clone(),
        }
    }
}

impl RuleDefinition for RecordRule {
    const KIND: RuleKind = RuleKind::Record;

    fn id(&self) -> RecordId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    // Recording rules have no `for` in the rule file format
    fn to_rule(&self, _fallback: Duration) -> Rule {
        Rule {
            alert: None,
            record: Some(self.name.clone()),
            expr: self.expr.clone(),
            for_duration: None,
            labels: LabelSet::from(self.labels.clone()),
            annotations: BTreeMap::new(),
        }
    }
}

/// Builds sharded rule files for one scrape pool
pub struct RuleFileBuilder<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> RuleFileBuilder<'a> {
    pub fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    /// Whether `pool` evaluates rules of `kind` at all
    pub fn supports(pool: &ScrapePool, kind: RuleKind) -> bool {
        match kind {
            RuleKind::Alert => pool.support_alert,
            RuleKind::Record => pool.support_record,
        }
    }

    /// One rule file per collector replica of `pool`
    pub fn build<R: RuleDefinition>(
        &self,
        pool: &ScrapePool,
        rules: &[R],
    ) -> BTreeMap<String, RuleFile> {
        let fallback = self.config.fallback_duration();
        let mut names = HashSet::new();

        let groups: Vec<RuleGroup> = rules
            .iter()
            .filter(|rule| rule.enabled())
            .map(|rule| {
                let mut name = rule.name().to_string();
                while !names.insert(name.clone()) {
                    name = format!("{}_{}", name, rule.id());
                }
                RuleGroup {
                    name,
                    rules: vec![rule.to_rule(fallback)],
                }
            })
            .collect();

        debug!(
            pool = %pool.name,
            kind = %R::KIND,
            groups = groups.len(),
            "Sharding rule groups"
        );

        sharding::shard_round_robin(&groups, &pool.collector_instances)
            .into_iter()
            .map(|(address, groups)| (address, RuleFile { groups }))
            .collect()
    }

    /// Build and serialize one rule file per collector replica.
    ///
    /// Serialization failures are reported per replica.
    pub fn render<R: RuleDefinition>(
        &self,
        pool: &ScrapePool,
        rules: &[R],
    ) -> BTreeMap<String, Result<String>> {
        self.build(pool, rules)
            .into_iter()
            .map(|(address, file)| {
                let yaml = serde_yaml::to_string(&file).map_err(|e| {
                    Error::serialization(format!(
                        "{} rules of pool {} for {}: {}",
                        R::KIND,
                        pool.name,
                        address,
                        e
                    ))
                });
                (address, yaml)
            })
            .collect()
    }
}
