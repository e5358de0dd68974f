//! Rule file document

use crate::duration::PromDuration;
use promshard_core::LabelSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rule file; an instance without rules still gets `groups: []`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// An alerting rule (`alert` set) or a recording rule (`record` set)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,

    pub expr: String,

    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<PromDuration>,

    #[serde(default, skip_serializing_if = "LabelSet::is_empty")]
    pub labels: LabelSet,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}
