//! Dirty flags raised by inventory mutations
//!
//! One flag per artifact kind. Store writers raise flags through the
//! [`ChangeSink`] implementation; the scheduler clears a flag right before it
//! regenerates that kind. Raising a flag also wakes the kind's scheduler task.

use promshard_core::{ChangeEvent, ChangeSink, ConfigKind};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug)]
struct Flag {
    dirty: AtomicBool,
    notify: Notify,
}

impl Flag {
    fn new(dirty: bool) -> Self {
        Self {
            dirty: AtomicBool::new(dirty),
            notify: Notify::new(),
        }
    }
}

/// Per-kind dirty flags
#[derive(Debug)]
pub struct Invalidation {
    flags: [Flag; 4],
}

impl Invalidation {
    /// Every kind starts dirty so that the first cycle always runs
    pub fn new() -> Self {
        Self {
            flags: [Flag::new(true), Flag::new(true), Flag::new(true), Flag::new(true)],
        }
    }

    fn flag(&self, kind: ConfigKind) -> &Flag {
        &self.flags[kind.index()]
    }

    pub fn mark_dirty(&self, kind: ConfigKind) {
        let flag = self.flag(kind);
        flag.dirty.store(true, Ordering::Release);
        flag.notify.notify_one();
    }

    pub fn is_dirty(&self, kind: ConfigKind) -> bool {
        self.flag(kind).dirty.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set
    pub fn take_dirty(&self, kind: ConfigKind) -> bool {
        self.flag(kind).dirty.swap(false, Ordering::AcqRel)
    }

    /// Wait until the flag of `kind` is raised.
    ///
    /// Returns immediately if it was raised since the last wait.
    pub async fn notified(&self, kind: ConfigKind) {
        self.flag(kind).notify.notified().await;
    }
}

impl Default for Invalidation {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSink for Invalidation {
    fn publish(&self, event: ChangeEvent) {
        trace!(entity = ?event.entity, id = ?event.id, "Inventory changed");
        for kind in event.entity.affected_kinds() {
            self.mark_dirty(*kind);
        }
    }
}
