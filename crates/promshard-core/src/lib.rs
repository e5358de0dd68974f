//! # promshard-core
//!
//! Core types, traits, and utilities for promshard - a sharded monitoring
//! configuration generator.
//!
//! This crate provides the records and interfaces shared by the builders, the
//! generation caches and the daemon. It includes:
//!
//! - Records for scrape pools, jobs, alert-router pools, send groups and rules
//! - Read-only store traits and an in-memory implementation
//! - Generator configuration with layered loading
//! - Instance-claim validation and change events
//! - Error handling types and utilities

pub mod claims;
pub mod config;
pub mod error;
pub mod events;
pub mod labels;
pub mod memory;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use claims::{Claim, ClaimConflict};
pub use config::GeneratorConfig;
pub use error::{Error, ErrorContext, Result};
pub use events::{ChangeEvent, ChangeSink, EntityKind, NoopSink};
pub use labels::LabelSet;
pub use memory::{Inventory, MemoryStore};
pub use traits::{InventoryStore, JobStore, PoolStore, RuleStore, SendGroupStore};
pub use types::{
    AlertManagerPool, AlertRule, ConfigKind, RecordId, RecordRule, RuleKind, ScrapeJob,
    ScrapePool, SendGroup, ServiceDiscoveryKind,
};
