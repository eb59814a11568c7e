//! Entity descriptors and request parameters.
//!
//! The host resolves an incoming request into an [`EntityDescriptor`] and
//! passes it, together with the caller, into every facade operation.

use crate::error::{HistoryError, HistoryResult};
use jobhistory_snapshot::{Author, EntityId, Timestamp};
use std::collections::HashMap;

/// Kind of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityKind {
    /// A standalone job or item.
    #[default]
    Plain,
    /// A module nested in a multi-module parent; tracked only when enabled.
    Module,
}

/// What the facade needs to know about an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Whether changes to this entity are recorded at all.
    pub history_enabled: bool,
}

impl EntityDescriptor {
    /// Describe an entity; modules only have history when `save_modules` is set.
    pub fn new(id: EntityId, kind: EntityKind, save_modules: bool) -> Self {
        let history_enabled = match kind {
            EntityKind::Plain => true,
            EntityKind::Module => save_modules,
        };
        Self {
            id,
            kind,
            history_enabled,
        }
    }

    /// A plain entity, always tracked.
    pub fn plain(id: EntityId) -> Self {
        Self::new(id, EntityKind::Plain, false)
    }
}

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub display_name: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Caller for changes made by the host itself.
    pub fn system() -> Self {
        let author = Author::system();
        Self::new(author.user_id, author.display_name)
    }

    /// How this caller is recorded in snapshot metadata.
    pub fn author(&self) -> Author {
        Author::new(&self.user_id, &self.display_name)
    }
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_id)
    }
}

/// Parameters of one incoming history request, already extracted by the host.
#[derive(Debug, Clone, Default)]
pub struct HistoryRequest {
    /// Full name of the item the request targets.
    pub item: String,
    pub kind: EntityKind,
    pub params: HashMap<String, String>,
}

impl HistoryRequest {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Read a required timestamp parameter such as `timestamp`.
    pub fn timestamp_param(&self, name: &str) -> HistoryResult<Timestamp> {
        let raw = self
            .param(name)
            .ok_or_else(|| HistoryError::InvalidRequest(format!("missing parameter {name:?}")))?;
        Ok(Timestamp::parse(raw)?)
    }
}
