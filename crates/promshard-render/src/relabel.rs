//! Relabel rule evaluation
//!
//! Applies relabel rules to a target's label set with the collector's
//! semantics: regexes are fully anchored, source values are joined with `;`
//! and `hashmod` reduces the MD5 digest of the joined value. Used to preview
//! and verify which targets a replica keeps.

use crate::schema::{RelabelAction, RelabelConfig};
use promshard_core::labels::is_valid_label_name;
use promshard_core::LabelSet;
use regex::Regex;

const DEFAULT_SEPARATOR: &str = ";";
const DEFAULT_REGEX: &str = "(.*)";
const DEFAULT_REPLACEMENT: &str = "$1";

/// Result type for relabel evaluation
pub type Result<T> = std::result::Result<T, RelabelError>;

#[derive(Debug, thiserror::Error)]
pub enum RelabelError {
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{action:?} requires a target_label")]
    MissingTargetLabel { action: RelabelAction },

    #[error("invalid target_label '{0}'")]
    InvalidTargetLabel(String),

    #[error("hashmod requires a modulus greater than zero")]
    MissingModulus,
}

impl From<RelabelError> for promshard_core::Error {
    fn from(err: RelabelError) -> Self {
        promshard_core::Error::validation(format!("relabel rule: {}", err))
    }
}

/// Compile a rule's regex anchored at both ends
fn compile(rule: &RelabelConfig) -> Result<Regex> {
    let pattern = rule.regex.as_deref().unwrap_or(DEFAULT_REGEX);
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| RelabelError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Check that a rule can be evaluated
pub fn validate(rule: &RelabelConfig) -> Result<()> {
    compile(rule)?;
    match rule.action {
        RelabelAction::Replace | RelabelAction::HashMod => {
            let target = rule
                .target_label
                .as_deref()
                .ok_or(RelabelError::MissingTargetLabel {
                    action: rule.action,
                })?;
            // Replacement references like `${1}` are resolved at evaluation time
            if !target.contains('$') && !is_valid_label_name(target) {
                return Err(RelabelError::InvalidTargetLabel(target.to_string()));
            }
        }
        _ => {}
    }
    if rule.action == RelabelAction::HashMod && rule.modulus.unwrap_or(0) == 0 {
        return Err(RelabelError::MissingModulus);
    }
    Ok(())
}

/// Check every rule of a chain
pub fn validate_all(rules: &[RelabelConfig]) -> Result<()> {
    rules.iter().try_for_each(validate)
}

/// Hash `value` into `0..modulus` the way the collector's `hashmod` does
pub fn hashmod(value: &str, modulus: u64) -> u64 {
    let digest = md5::compute(value.as_bytes());
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest.0[8..]);
    u64::from_be_bytes(tail) % modulus
}

/// Apply `rules` in order. Returns `None` when the target is dropped.
pub fn process(labels: &LabelSet, rules: &[RelabelConfig]) -> Result<Option<LabelSet>> {
    let mut labels = labels.clone();
    for rule in rules {
        if !apply(&mut labels, rule)? {
            return Ok(None);
        }
    }
    Ok(Some(labels))
}

fn apply(labels: &mut LabelSet, rule: &RelabelConfig) -> Result<bool> {
    let regex = compile(rule)?;
    let separator = rule.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR);
    let value = rule
        .source_labels
        .iter()
        .map(|name| labels.get(name).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(separator);

    match rule.action {
        RelabelAction::Keep => return Ok(regex.is_match(&value)),
        RelabelAction::Drop => return Ok(!regex.is_match(&value)),
        RelabelAction::Replace => {
            let target = rule
                .target_label
                .as_deref()
                .ok_or(RelabelError::MissingTargetLabel {
                    action: rule.action,
                })?;
            let Some(captures) = regex.captures(&value) else {
                return Ok(true);
            };
            let replacement = rule.replacement.as_deref().unwrap_or(DEFAULT_REPLACEMENT);
            let mut name = String::new();
            captures.expand(target, &mut name);
            if !is_valid_label_name(&name) {
                return Ok(true);
            }
            let mut expanded = String::new();
            captures.expand(replacement, &mut expanded);
            if expanded.is_empty() {
                labels.remove(&name);
            } else {
                labels.insert(name, expanded);
            }
        }
        RelabelAction::HashMod => {
            let target = rule
                .target_label
                .as_deref()
                .ok_or(RelabelError::MissingTargetLabel {
                    action: rule.action,
                })?;
            let modulus = match rule.modulus {
                Some(m) if m > 0 => m,
                _ => return Err(RelabelError::MissingModulus),
            };
            labels.insert(target, hashmod(&value, modulus).to_string());
        }
        RelabelAction::LabelKeep => labels.retain(|name| regex.is_match(name)),
        RelabelAction::LabelDrop => labels.retain(|name| !regex.is_match(name)),
    }
    Ok(true)
}
