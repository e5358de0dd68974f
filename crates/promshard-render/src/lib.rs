//! # promshard-render
//!
//! Turns pool, job, rule and send-group records into the documents the
//! metrics collector and its alert router read.
//!
//! - [`sharding`]: hash-mod and round-robin distribution across replicas
//! - [`scrape`]: collector configuration per collector replica
//! - [`routing`]: alert-router configuration per router replica
//! - [`rules`]: alerting and recording rule files per collector replica
//! - [`relabel`]: evaluation of relabel rules, for previews and verification
//!
//! Builders are pure: they read a [`promshard_core::GeneratorConfig`] and
//! records, and return typed documents or serialized YAML. Writing files and
//! caching is left to the caller.

pub mod duration;
pub mod relabel;
pub mod routing;
pub mod rules;
pub mod schema;
pub mod scrape;
pub mod sharding;

pub use duration::PromDuration;
pub use relabel::RelabelError;
pub use routing::{AlertRoutingBuilder, RoutingBuild, SideFile};
pub use rules::{RuleDefinition, RuleFileBuilder};
pub use scrape::{ScrapeBuild, ScrapeConfigBuilder, SkippedJob};
pub use sharding::{shard_hashmod, shard_round_robin, Assignment};
