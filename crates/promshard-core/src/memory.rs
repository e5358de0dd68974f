//! In-memory inventory store
//!
//! Backs the file inventory of the daemon and every test. Mutations validate
//! instance claims and publish change events.

use crate::claims::{self, Claim};
use crate::events::{ChangeEvent, ChangeSink, EntityKind, NoopSink};
use crate::traits::{JobStore, PoolStore, RuleStore, SendGroupStore};
use crate::{
    AlertManagerPool, AlertRule, Error, RecordId, RecordRule, Result, ScrapeJob, ScrapePool,
    SendGroup,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Every record the generator reads, as one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub scrape_pools: Vec<ScrapePool>,
    pub scrape_jobs: Vec<ScrapeJob>,
    pub alert_manager_pools: Vec<AlertManagerPool>,
    pub send_groups: Vec<SendGroup>,
    pub alert_rules: Vec<AlertRule>,
    pub record_rules: Vec<RecordRule>,
}

impl Inventory {
    /// Check pool name uniqueness, instance claims and foreign keys
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let mut names = HashSet::new();
        for pool in &self.scrape_pools {
            if !names.insert(pool.name.as_str()) {
                problems.push(format!("duplicate scrape pool name {}", pool.name));
            }
        }
        let mut names = HashSet::new();
        for pool in &self.alert_manager_pools {
            if !names.insert(pool.name.as_str()) {
                problems.push(format!("duplicate alert manager pool name {}", pool.name));
            }
        }

        let conflicts = claims::find_conflicts(
            self.scrape_pools
                .iter()
                .map(|p| Claim::new(p.id, &p.name, &p.collector_instances)),
        )
        .into_iter()
        .chain(claims::find_conflicts(
            self.alert_manager_pools
                .iter()
                .map(|p| Claim::new(p.id, &p.name, &p.instances)),
        ));
        problems.extend(conflicts.map(|c| c.to_string()));

        let scrape_ids: HashSet<RecordId> = self.scrape_pools.iter().map(|p| p.id).collect();
        let am_ids: HashSet<RecordId> = self.alert_manager_pools.iter().map(|p| p.id).collect();
        for job in &self.scrape_jobs {
            if !scrape_ids.contains(&job.pool_id) {
                problems.push(format!("job {} references unknown pool {}", job.name, job.pool_id));
            }
        }
        for rule in &self.alert_rules {
            if !scrape_ids.contains(&rule.pool_id) {
                problems.push(format!("alert rule {} references unknown pool {}", rule.name, rule.pool_id));
            }
        }
        for rule in &self.record_rules {
            if !scrape_ids.contains(&rule.pool_id) {
                problems.push(format!("record rule {} references unknown pool {}", rule.name, rule.pool_id));
            }
        }
        for group in &self.send_groups {
            if !am_ids.contains(&group.pool_id) {
                problems.push(format!("send group {} references unknown pool {}", group.name, group.pool_id));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(problems.join("; ")))
        }
    }
}

/// Records addressable by id
trait Record {
    fn record_id(&self) -> RecordId;
}

macro_rules! impl_record {
    ($($ty:ty),*) => {
        $(impl Record for $ty {
            fn record_id(&self) -> RecordId {
                self.id
            }
        })*
    };
}

impl_record!(ScrapePool, ScrapeJob, AlertManagerPool, SendGroup, AlertRule, RecordRule);

fn upsert<T: Record>(records: &mut Vec<T>, record: T) {
    match records.iter_mut().find(|r| r.record_id() == record.record_id()) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Reject `name` if a pool with a different id already uses it
fn ensure_unique_name<'a>(
    kind: &str,
    existing: impl IntoIterator<Item = (RecordId, &'a str)>,
    id: RecordId,
    name: &str,
) -> Result<()> {
    match existing.into_iter().find(|(other, n)| *other != id && *n == name) {
        Some((other, _)) => Err(Error::validation(format!(
            "duplicate {} pool name {} (already used by pool {})",
            kind, name, other
        ))),
        None => Ok(()),
    }
}

fn remove<T: Record>(records: &mut Vec<T>, id: RecordId) -> bool {
    let before = records.len();
    records.retain(|r| r.record_id() != id);
    records.len() != before
}

/// Thread-safe in-memory implementation of every store trait
pub struct MemoryStore {
    inventory: RwLock<Inventory>,
    sink: Arc<dyn ChangeSink>,
    unavailable: AtomicBool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("inventory", &*self.inventory.read())
            .field("unavailable", &self.unavailable.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::from_inventory(Inventory::default())
    }

    /// Create a store holding `inventory` as-is
    pub fn from_inventory(inventory: Inventory) -> Self {
        Self {
            inventory: RwLock::new(inventory),
            sink: Arc::new(NoopSink),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Publish change events to `sink`
    pub fn with_change_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Simulate an unreachable backend; every listing fails with a store error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Copy of the current inventory
    pub fn inventory(&self) -> Inventory {
        self.inventory.read().clone()
    }

    /// Replace the whole inventory after validating it
    pub fn replace_inventory(&self, inventory: Inventory) -> Result<()> {
        inventory.validate()?;
        *self.inventory.write() = inventory;
        for entity in [
            EntityKind::ScrapePool,
            EntityKind::ScrapeJob,
            EntityKind::AlertManagerPool,
            EntityKind::SendGroup,
            EntityKind::AlertRule,
            EntityKind::RecordRule,
        ] {
            self.sink.publish(ChangeEvent::bulk(entity));
        }
        debug!("Replaced inventory");
        Ok(())
    }

    /// Create or update a scrape pool, rejecting addresses owned by another pool
    pub fn upsert_scrape_pool(&self, pool: ScrapePool) -> Result<()> {
        let id = pool.id;
        {
            let mut inventory = self.inventory.write();
            ensure_unique_name(
                "scrape",
                inventory.scrape_pools.iter().map(|p| (p.id, p.name.as_str())),
                pool.id,
                &pool.name,
            )?;
            claims::ensure_unclaimed(
                inventory
                    .scrape_pools
                    .iter()
                    .map(|p| Claim::new(p.id, &p.name, &p.collector_instances)),
                Claim::new(pool.id, &pool.name, &pool.collector_instances),
            )?;
            upsert(&mut inventory.scrape_pools, pool);
        }
        self.sink.publish(ChangeEvent::new(EntityKind::ScrapePool, id));
        Ok(())
    }

    /// Delete a scrape pool together with its jobs and rules
    pub fn delete_scrape_pool(&self, id: RecordId) -> bool {
        let removed = {
            let mut inventory = self.inventory.write();
            let removed = remove(&mut inventory.scrape_pools, id);
            inventory.scrape_jobs.retain(|j| j.pool_id != id);
            inventory.alert_rules.retain(|r| r.pool_id != id);
            inventory.record_rules.retain(|r| r.pool_id != id);
            removed
        };
        if removed {
            self.sink.publish(ChangeEvent::new(EntityKind::ScrapePool, id));
        }
        removed
    }

    pub fn upsert_scrape_job(&self, job: ScrapeJob) {
        let id = job.id;
        upsert(&mut self.inventory.write().scrape_jobs, job);
        self.sink.publish(ChangeEvent::new(EntityKind::ScrapeJob, id));
    }

    pub fn delete_scrape_job(&self, id: RecordId) -> bool {
        let removed = remove(&mut self.inventory.write().scrape_jobs, id);
        if removed {
            self.sink.publish(ChangeEvent::new(EntityKind::ScrapeJob, id));
        }
        removed
    }

    /// Create or update an alert-manager pool, rejecting addresses owned by another pool
    pub fn upsert_alert_manager_pool(&self, pool: AlertManagerPool) -> Result<()> {
        let id = pool.id;
        {
            let mut inventory = self.inventory.write();
            ensure_unique_name(
                "alert manager",
                inventory.alert_manager_pools.iter().map(|p| (p.id, p.name.as_str())),
                pool.id,
                &pool.name,
            )?;
            claims::ensure_unclaimed(
                inventory
                    .alert_manager_pools
                    .iter()
                    .map(|p| Claim::new(p.id, &p.name, &p.instances)),
                Claim::new(pool.id, &pool.name, &pool.instances),
            )?;
            upsert(&mut inventory.alert_manager_pools, pool);
        }
        self.sink
            .publish(ChangeEvent::new(EntityKind::AlertManagerPool, id));
        Ok(())
    }

    /// Delete an alert-manager pool together with its send groups
    pub fn delete_alert_manager_pool(&self, id: RecordId) -> bool {
        let removed = {
            let mut inventory = self.inventory.write();
            let removed = remove(&mut inventory.alert_manager_pools, id);
            inventory.send_groups.retain(|g| g.pool_id != id);
            removed
        };
        if removed {
            self.sink
                .publish(ChangeEvent::new(EntityKind::AlertManagerPool, id));
        }
        removed
    }

    pub fn upsert_send_group(&self, group: SendGroup) {
        let id = group.id;
        upsert(&mut self.inventory.write().send_groups, group);
        self.sink.publish(ChangeEvent::new(EntityKind::SendGroup, id));
    }

    pub fn delete_send_group(&self, id: RecordId) -> bool {
        let removed = remove(&mut self.inventory.write().send_groups, id);
        if removed {
            self.sink.publish(ChangeEvent::new(EntityKind::SendGroup, id));
        }
        removed
    }

    pub fn upsert_alert_rule(&self, rule: AlertRule) {
        let id = rule.id;
        upsert(&mut self.inventory.write().alert_rules, rule);
        self.sink.publish(ChangeEvent::new(EntityKind::AlertRule, id));
    }

    pub fn delete_alert_rule(&self, id: RecordId) -> bool {
        let removed = remove(&mut self.inventory.write().alert_rules, id);
        if removed {
            self.sink.publish(ChangeEvent::new(EntityKind::AlertRule, id));
        }
        removed
    }

    pub fn upsert_record_rule(&self, rule: RecordRule) {
        let id = rule.id;
        upsert(&mut self.inventory.write().record_rules, rule);
        self.sink.publish(ChangeEvent::new(EntityKind::RecordRule, id));
    }

    pub fn delete_record_rule(&self, id: RecordId) -> bool {
        let removed = remove(&mut self.inventory.write().record_rules, id);
        if removed {
            self.sink.publish(ChangeEvent::new(EntityKind::RecordRule, id));
        }
        removed
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Error::store("inventory store unavailable"));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn list_scrape_pools(&self) -> Result<Vec<ScrapePool>> {
        self.check_available()?;
        Ok(self.inventory.read().scrape_pools.clone())
    }

    async fn list_alert_manager_pools(&self) -> Result<Vec<AlertManagerPool>> {
        self.check_available()?;
        Ok(self.inventory.read().alert_manager_pools.clone())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn list_jobs_by_pool(&self, pool_id: RecordId) -> Result<Vec<ScrapeJob>> {
        self.check_available()?;
        Ok(self
            .inventory
            .read()
            .scrape_jobs
            .iter()
            .filter(|j| j.pool_id == pool_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn list_alert_rules_by_pool(&self, pool_id: RecordId) -> Result<Vec<AlertRule>> {
        self.check_available()?;
        Ok(self
            .inventory
            .read()
            .alert_rules
            .iter()
            .filter(|r| r.pool_id == pool_id)
            .cloned()
            .collect())
    }

    async fn list_record_rules_by_pool(&self, pool_id: RecordId) -> Result<Vec<RecordRule>> {
        self.check_available()?;
        Ok(self
            .inventory
            .read()
            .record_rules
            .iter()
            .filter(|r| r.pool_id == pool_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SendGroupStore for MemoryStore {
    async fn list_send_groups_by_pool(&self, pool_id: RecordId) -> Result<Vec<SendGroup>> {
        self.check_available()?;
        Ok(self
            .inventory
            .read()
            .send_groups
            .iter()
            .filter(|g| g.pool_id == pool_id)
            .cloned()
            .collect())
    }

    async fn find_send_group_by_name(&self, name: &str) -> Result<Option<SendGroup>> {
        self.check_available()?;
        Ok(self
            .inventory
            .read()
            .send_groups
            .iter()
            .find(|g| g.name == name)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ChangeEvent>>,
    }

    impl ChangeSink for RecordingSink {
        fn publish(&self, event: ChangeEvent) {
            self.events.lock().push(event);
        }
    }

    fn pool(id: RecordId, name: &str, instances: &[&str]) -> ScrapePool {
        ScrapePool {
            id,
            name: name.to_string(),
            collector_instances: instances.iter().map(|s| s.to_string()).collect(),
            alertmanager_instances: vec![],
            scrape_interval: 30,
            scrape_timeout: 10,
            external_labels: vec![],
            support_alert: false,
            support_record: false,
            remote_read_url: None,
            remote_write_url: None,
            remote_timeout_seconds: 0,
            rule_file_path: None,
            record_file_path: None,
        }
    }

    fn job(id: RecordId, pool_id: RecordId) -> ScrapeJob {
        serde_yaml::from_str(&format!(
            "id: {}\npool_id: {}\nname: job{}\nsd_type: http\nport: 9100\n",
            id, pool_id, id
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_listing_filters_by_pool() {
        let store = MemoryStore::new();
        store.upsert_scrape_pool(pool(1, "a", &["10.0.0.1"])).unwrap();
        store.upsert_scrape_pool(pool(2, "b", &["10.0.0.2"])).unwrap();
        store.upsert_scrape_job(job(10, 1));
        store.upsert_scrape_job(job(11, 2));
        store.upsert_scrape_job(job(12, 2));

        assert_eq!(store.list_scrape_pools().await.unwrap().len(), 2);
        assert_eq!(store.list_jobs_by_pool(1).await.unwrap().len(), 1);
        assert_eq!(store.list_jobs_by_pool(2).await.unwrap().len(), 2);
        assert!(store.list_jobs_by_pool(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claimed_address_is_rejected() {
        let store = MemoryStore::new();
        store.upsert_scrape_pool(pool(1, "a", &["10.0.0.1"])).unwrap();

        let err = store
            .upsert_scrape_pool(pool(2, "b", &["10.0.0.1"]))
            .unwrap_err();
        assert_eq!(err.category(), "validation");
        assert_eq!(store.list_scrape_pools().await.unwrap().len(), 1);

        // Re-saving the owner is allowed
        store
            .upsert_scrape_pool(pool(1, "a", &["10.0.0.1", "10.0.0.5"]))
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_pool_name_is_rejected() {
        let store = MemoryStore::new();
        store.upsert_scrape_pool(pool(1, "edge", &["10.0.0.1"])).unwrap();

        let err = store
            .upsert_scrape_pool(pool(2, "edge", &["10.0.0.1"]))
            .unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("edge"));

        // Same name, disjoint addresses: still rejected
        assert!(store
            .upsert_scrape_pool(pool(3, "edge", &["10.0.0.9"]))
            .is_err());

        let pools = store.list_scrape_pools().await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].id, 1);

        // Renaming the owner keeps its addresses
        store
            .upsert_scrape_pool(pool(1, "edge-renamed", &["10.0.0.1"]))
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_alert_manager_pool_name_is_rejected() {
        let am = |id: RecordId, instance: &str| AlertManagerPool {
            id,
            name: "alerting".to_string(),
            instances: vec![instance.to_string()],
            ..serde_yaml::from_str("id: 0\nname: x\nfallback_receiver: ops\n").unwrap()
        };
        let store = MemoryStore::new();
        store.upsert_alert_manager_pool(am(1, "10.1.0.1")).unwrap();

        let err = store.upsert_alert_manager_pool(am(2, "10.1.0.2")).unwrap_err();
        assert_eq!(err.category(), "validation");
        assert_eq!(store.list_alert_manager_pools().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_with_store_error() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.list_scrape_pools().await.unwrap_err();
        assert!(err.aborts_cycle());

        store.set_unavailable(false);
        assert!(store.list_scrape_pools().await.is_ok());
    }

    #[test]
    fn test_mutations_publish_events() {
        let sink = Arc::new(RecordingSink::default());
        let store = MemoryStore::new().with_change_sink(sink.clone());

        store.upsert_scrape_pool(pool(1, "a", &["10.0.0.1"])).unwrap();
        store.upsert_scrape_job(job(10, 1));
        assert!(store.delete_scrape_pool(1));
        assert!(!store.delete_scrape_pool(1));

        let events = sink.events.lock();
        assert_eq!(
            *events,
            vec![
                ChangeEvent::new(EntityKind::ScrapePool, 1),
                ChangeEvent::new(EntityKind::ScrapeJob, 10),
                ChangeEvent::new(EntityKind::ScrapePool, 1),
            ]
        );
        assert!(store.inventory().scrape_jobs.is_empty());
    }

    #[test]
    fn test_inventory_validation() {
        let mut inventory = Inventory {
            scrape_pools: vec![pool(1, "a", &["10.0.0.1"]), pool(2, "b", &["10.0.0.1"])],
            ..Default::default()
        };
        let err = inventory.validate().unwrap_err();
        assert!(err.to_string().contains("10.0.0.1"));

        inventory.scrape_pools[1].collector_instances = vec!["10.0.0.2".to_string()];
        assert!(inventory.validate().is_ok());

        inventory.scrape_jobs.push(job(10, 99));
        assert!(inventory.validate().is_err());
    }
}
