//! Distribution of configuration units across the replicas of a pool
//!
//! Two policies exist:
//!
//! - **hash-mod**: every replica receives every scrape block with two relabel
//!   rules appended. The first hashes `__address__` into
//!   `0..replica_count`, the second keeps only targets whose bucket equals the
//!   replica's index. The collectors discover the same targets, so the union
//!   of what they keep is the full target set and no target is kept twice.
//! - **round-robin**: unit `j` goes to replica `j mod replica_count`. Used for
//!   rule groups, where the goal is to balance evaluation load.
//!
//! A pool without replicas yields an empty assignment.

use crate::schema::{RelabelAction, RelabelConfig, ScrapeConfig};
use std::collections::{BTreeMap, HashSet};

/// Label hashed to pick the replica of a target
pub const HASH_SOURCE_LABEL: &str = "__address__";

/// Temporary label receiving the bucket of a target
pub const HASH_TARGET_LABEL: &str = "__tmp_hash";

/// Per-replica assignment, keyed by replica address
pub type Assignment<U> = BTreeMap<String, Vec<U>>;

/// Units whose relabel chain the hash-mod policy can extend
pub trait RelabelChain: Clone {
    fn relabel_chain_mut(&mut self) -> &mut Vec<RelabelConfig>;
}

impl RelabelChain for ScrapeConfig {
    fn relabel_chain_mut(&mut self) -> &mut Vec<RelabelConfig> {
        &mut self.relabel_configs
    }
}

/// Drop repeated addresses, keeping first-occurrence order.
///
/// Position in the returned list is the replica's shard index.
pub fn dedup_instances(instances: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    instances
        .iter()
        .filter(|address| seen.insert(address.as_str()))
        .cloned()
        .collect()
}

/// The two rules that restrict a replica to its own bucket
pub fn hashmod_rules(index: usize, modulus: usize) -> [RelabelConfig; 2] {
    [
        RelabelConfig {
            source_labels: vec![HASH_SOURCE_LABEL.to_string()],
            modulus: Some(modulus as u64),
            target_label: Some(HASH_TARGET_LABEL.to_string()),
            action: RelabelAction::HashMod,
            ..Default::default()
        },
        RelabelConfig {
            source_labels: vec![HASH_TARGET_LABEL.to_string()],
            regex: Some(format!("^{}$", index)),
            action: RelabelAction::Keep,
            ..Default::default()
        },
    ]
}

/// Give every replica a copy of `units` restricted to its hash bucket
pub fn shard_hashmod<U: RelabelChain>(units: &[U], instances: &[String]) -> Assignment<U> {
    let instances = dedup_instances(instances);
    let modulus = instances.len();

    instances
        .into_iter()
        .enumerate()
        .map(|(index, address)| {
            let rules = hashmod_rules(index, modulus);
            let units = units
                .iter()
                .map(|unit| {
                    let mut unit = unit.clone();
                    unit.relabel_chain_mut().extend(rules.iter().cloned());
                    unit
                })
                .collect();
            (address, units)
        })
        .collect()
}

/// Assign unit `j` to replica `j mod replica_count`.
///
/// Every replica appears in the result, possibly with no units.
pub fn shard_round_robin<U: Clone>(units: &[U], instances: &[String]) -> Assignment<U> {
    let instances = dedup_instances(instances);
    if instances.is_empty() {
        return Assignment::new();
    }

    let mut buckets: Vec<Vec<U>> = vec![Vec::new(); instances.len()];
    for (position, unit) in units.iter().enumerate() {
        buckets[position % instances.len()].push(unit.clone());
    }

    instances.into_iter().zip(buckets).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::PromDuration;
    use crate::relabel;
    use promshard_core::LabelSet;
    use std::collections::HashSet;

    fn addresses(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn scrape_block(name: &str) -> ScrapeConfig {
        ScrapeConfig {
            job_name: name.to_string(),
            scheme: "http".to_string(),
            metrics_path: "/metrics".to_string(),
            scrape_interval: PromDuration::from_secs(30),
            scrape_timeout: PromDuration::from_secs(10),
            bearer_token: None,
            tls_config: None,
            http_sd_configs: vec![],
            kubernetes_sd_configs: vec![],
            relabel_configs: vec![],
        }
    }

    fn kept_targets(block: &ScrapeConfig, targets: &[String]) -> HashSet<String> {
        targets
            .iter()
            .filter(|address| {
                let labels = LabelSet::new().with_label(HASH_SOURCE_LABEL, address.as_str());
                relabel::process(&labels, &block.relabel_configs)
                    .unwrap()
                    .is_some()
            })
            .cloned()
            .collect()
    }

    #[test]
    fn test_zero_instances_yield_empty_map() {
        let units = vec![scrape_block("node")];
        assert!(shard_hashmod(&units, &[]).is_empty());
        assert!(shard_round_robin(&units, &[]).is_empty());
    }

    #[test]
    fn test_single_instance_keeps_everything() {
        let instances = addresses(&["10.0.0.1"]);
        let assignment = shard_hashmod(&[scrape_block("node")], &instances);
        let block = &assignment["10.0.0.1"][0];

        let targets: Vec<String> = (0..50).map(|i| format!("10.9.0.{}:9100", i)).collect();
        assert_eq!(kept_targets(block, &targets).len(), targets.len());
    }

    #[test]
    fn test_hashmod_is_complete_and_disjoint() {
        let targets: Vec<String> = (0..200)
            .map(|i| format!("10.{}.{}.{}:9100", i % 7, i % 13, i))
            .collect();

        for replicas in 1..=5 {
            let instances: Vec<String> = (0..replicas).map(|i| format!("10.0.0.{}", i + 1)).collect();
            let assignment = shard_hashmod(&[scrape_block("node")], &instances);
            assert_eq!(assignment.len(), replicas);

            let mut union = HashSet::new();
            let mut total = 0;
            for blocks in assignment.values() {
                let kept = kept_targets(&blocks[0], &targets);
                total += kept.len();
                union.extend(kept);
            }
            assert_eq!(total, targets.len(), "a target was kept twice");
            assert_eq!(union.len(), targets.len(), "a target was not kept");
        }
    }

    #[test]
    fn test_hashmod_is_deterministic() {
        let instances = addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let units = vec![scrape_block("node"), scrape_block("blackbox")];
        let first = shard_hashmod(&units, &instances);
        let second = shard_hashmod(&units, &instances);
        assert_eq!(first, second);
        assert_eq!(
            serde_yaml::to_string(&first).unwrap(),
            serde_yaml::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_hashmod_rules_layout() {
        let [hash, keep] = hashmod_rules(1, 3);
        assert_eq!(hash.action, RelabelAction::HashMod);
        assert_eq!(hash.modulus, Some(3));
        assert_eq!(hash.target_label.as_deref(), Some(HASH_TARGET_LABEL));
        assert_eq!(keep.action, RelabelAction::Keep);
        assert_eq!(keep.regex.as_deref(), Some("^1$"));
    }

    #[test]
    fn test_round_robin_is_balanced() {
        for (units, replicas) in [(10usize, 3usize), (3, 5), (12, 4), (0, 2), (7, 1)] {
            let items: Vec<usize> = (0..units).collect();
            let instances: Vec<String> = (0..replicas).map(|i| format!("10.0.0.{}", i)).collect();
            let assignment = shard_round_robin(&items, &instances);
            assert_eq!(assignment.len(), replicas);

            let floor = units / replicas;
            let ceil = (units + replicas - 1) / replicas;
            let mut seen: Vec<usize> = Vec::new();
            for assigned in assignment.values() {
                assert!(assigned.len() == floor || assigned.len() == ceil);
                seen.extend(assigned);
            }
            seen.sort_unstable();
            assert_eq!(seen, items);
        }
    }

    #[test]
    fn test_duplicate_instances_are_collapsed() {
        let instances = addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.1"]);
        assert_eq!(dedup_instances(&instances), addresses(&["10.0.0.1", "10.0.0.2"]));

        let assignment = shard_hashmod(&[scrape_block("node")], &instances);
        assert_eq!(assignment.len(), 2);
        assert_eq!(
            assignment["10.0.0.2"][0].relabel_configs[0].modulus,
            Some(2)
        );
    }
}
