//! Change events published when inventory records are mutated
//!
//! The generator does not watch the store. Writers publish a [`ChangeEvent`]
//! through a [`ChangeSink`] and the scheduler consults the resulting dirty
//! flags before the next cycle.

use crate::{ConfigKind, RecordId};

/// Entity classes whose mutation invalidates generated artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    ScrapePool,
    ScrapeJob,
    AlertManagerPool,
    SendGroup,
    AlertRule,
    RecordRule,
}

impl EntityKind {
    /// Artifact kinds that must be regenerated after a mutation
    pub fn affected_kinds(&self) -> &'static [ConfigKind] {
        match self {
            // Pool membership drives every collector-side artifact
            EntityKind::ScrapePool => &[
                ConfigKind::Scrape,
                ConfigKind::AlertRules,
                ConfigKind::RecordRules,
            ],
            EntityKind::ScrapeJob => &[ConfigKind::Scrape],
            EntityKind::AlertManagerPool | EntityKind::SendGroup => &[ConfigKind::AlertRouting],
            EntityKind::AlertRule => &[ConfigKind::AlertRules],
            EntityKind::RecordRule => &[ConfigKind::RecordRules],
        }
    }
}

/// A record was created, updated or deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    /// `None` when every record of the entity kind may have changed
    pub id: Option<RecordId>,
}

impl ChangeEvent {
    pub fn new(entity: EntityKind, id: RecordId) -> Self {
        Self {
            entity,
            id: Some(id),
        }
    }

    /// Event for a bulk replacement of every record of one kind
    pub fn bulk(entity: EntityKind) -> Self {
        Self { entity, id: None }
    }
}

/// Receiver of change events
pub trait ChangeSink: Send + Sync {
    fn publish(&self, event: ChangeEvent);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ChangeSink for NoopSink {
    fn publish(&self, _event: ChangeEvent) {}
}
