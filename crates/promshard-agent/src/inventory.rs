//! File-backed inventory
//!
//! The inventory is one YAML document holding every pool, job, rule and send
//! group. It is loaded into a [`MemoryStore`] and reloaded when the file's
//! modification time changes. A document that fails to parse or validate is
//! ignored and the previous inventory stays in place.

use crate::{AgentError, Result};
use parking_lot::Mutex;
use promshard_core::{ChangeSink, Inventory, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Modification time and validated contents of an inventory file
fn load_inventory(path: &Path) -> Result<(SystemTime, Inventory)> {
    let failed = |what: &str, e: &dyn std::fmt::Display| {
        AgentError::Inventory(format!("Failed to {} {}: {}", what, path.display(), e))
    };

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| failed("stat", &e))?;
    let content = std::fs::read_to_string(path).map_err(|e| failed("read", &e))?;
    let inventory: Inventory = serde_yaml::from_str(&content).map_err(|e| failed("parse", &e))?;

    inventory.validate()?;
    Ok((modified, inventory))
}

/// An inventory file and the store it feeds
pub struct FileInventory {
    path: PathBuf,
    store: Arc<MemoryStore>,
    modified: Mutex<Option<SystemTime>>,
}

impl FileInventory {
    /// Load `path`; every later reload publishes change events to `sink`
    pub fn open(path: impl Into<PathBuf>, sink: Arc<dyn ChangeSink>) -> Result<Self> {
        let path = path.into();
        let (modified, inventory) = load_inventory(&path)?;

        info!(
            path = %path.display(),
            scrape_pools = inventory.scrape_pools.len(),
            alert_manager_pools = inventory.alert_manager_pools.len(),
            "Loaded inventory"
        );

        Ok(Self {
            store: Arc::new(MemoryStore::from_inventory(inventory).with_change_sink(sink)),
            path,
            modified: Mutex::new(Some(modified)),
        })
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    /// Reload the file if it changed since the last load.
    ///
    /// Returns whether a new inventory was installed.
    pub fn reload_if_changed(&self) -> Result<bool> {
        let current = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if current.is_some() && *self.modified.lock() == current {
            return Ok(false);
        }

        let (modified, inventory) = load_inventory(&self.path)?;
        self.store.replace_inventory(inventory)?;
        *self.modified.lock() = Some(modified);

        info!(path = %self.path.display(), "Reloaded inventory");
        Ok(true)
    }

    /// Poll the file every `interval` until `cancel` fires
    pub async fn watch(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Inventory watcher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reload_if_changed() {
                        warn!(path = %self.path.display(), error = %e, "Keeping previous inventory");
                    }
                }
            }
        }
    }
}
