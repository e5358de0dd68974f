//! Label sets for generated configuration
//!
//! Labels attach to every series a collector ships (external labels) and to
//! alerting rules. They are kept ordered so that generated documents are
//! byte-identical across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// An ordered set of label name/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parse `key=value` pairs, dropping malformed entries.
    ///
    /// A pair is malformed when it has no `=`, an empty value, or a name that
    /// is not a valid label name. Later duplicates override earlier ones.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Self {
        let mut labels = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            match pair.split_once('=') {
                Some((name, value)) => {
                    let name = name.trim();
                    let value = value.trim();
                    if !is_valid_label_name(name) || value.is_empty() {
                        warn!(pair = %pair, "Dropping malformed label pair");
                        continue;
                    }
                    labels.0.insert(name.to_string(), value.to_string());
                }
                None => warn!(pair = %pair, "Dropping label pair without '='"),
            }
        }
        labels
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a label
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Keep only labels whose name satisfies the predicate
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.0.retain(|name, _| f(name));
    }

    /// Check whether every label in `selector` is present with the same value
    pub fn matches(&self, selector: &LabelSet) -> bool {
        selector
            .iter()
            .all(|(name, value)| self.0.get(name) == Some(value))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Check a label name against `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
