//! Read-only store interfaces consumed by the generator
//!
//! The administrative service owns persistence; the generator only lists.
//! Every listing returns an empty vector, not an error, when a pool has no
//! children. Errors from these traits are [`crate::Error::Store`] and abort
//! the generation cycle that issued them.

use crate::{
    AlertManagerPool, AlertRule, RecordId, RecordRule, Result, ScrapeJob, ScrapePool, SendGroup,
};
use async_trait::async_trait;

/// Access to scrape pools and alert-manager pools
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// List every scrape pool
    async fn list_scrape_pools(&self) -> Result<Vec<ScrapePool>>;

    /// List every alert-manager pool
    async fn list_alert_manager_pools(&self) -> Result<Vec<AlertManagerPool>>;
}

/// Access to scrape jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    /// List the jobs of one scrape pool
    async fn list_jobs_by_pool(&self, pool_id: RecordId) -> Result<Vec<ScrapeJob>>;
}

/// Access to alerting and recording rules
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// List the alerting rules of one scrape pool
    async fn list_alert_rules_by_pool(&self, pool_id: RecordId) -> Result<Vec<AlertRule>>;

    /// List the recording rules of one scrape pool
    async fn list_record_rules_by_pool(&self, pool_id: RecordId) -> Result<Vec<RecordRule>>;
}

/// Access to send groups
#[async_trait]
pub trait SendGroupStore: Send + Sync {
    /// List the send groups of one alert-manager pool
    async fn list_send_groups_by_pool(&self, pool_id: RecordId) -> Result<Vec<SendGroup>>;

    /// Find a send group by name across all pools
    async fn find_send_group_by_name(&self, name: &str) -> Result<Option<SendGroup>>;
}

/// Everything a generation cycle reads
pub trait InventoryStore: PoolStore + JobStore + RuleStore + SendGroupStore {}

impl<T> InventoryStore for T where T: PoolStore + JobStore + RuleStore + SendGroupStore {}
