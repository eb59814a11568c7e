//! Snapshot data structures.

use crate::{SnapshotError, SnapshotResult};
use chrono::{Duration, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory-name format of a snapshot timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Path-like identifier of a tracked entity, e.g. `folder/job`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Parse an entity identifier, validating every `/`-separated segment.
    pub fn parse(id: impl Into<String>) -> SnapshotResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SnapshotError::InvalidEntity("empty identifier".to_string()));
        }
        if let Some(bad) = id
            .split('/')
            .find(|s| !jobhistory_util::path::is_safe_component(s))
        {
            return Err(SnapshotError::InvalidEntity(format!(
                "{id:?} has invalid segment {bad:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segments from the outermost parent down to the entity itself.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment of the identifier.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Identifier of the enclosing scope, if the entity is nested.
    pub fn parent(&self) -> Option<EntityId> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| EntityId(parent.to_string()))
    }
}

impl TryFrom<String> for EntityId {
    type Error = SnapshotError;

    fn try_from(value: String) -> SnapshotResult<Self> {
        Self::parse(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Second-resolution snapshot timestamp, named like `2012-11-21_11-40-28` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Current local time truncated to whole seconds.
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// Wrap a datetime, dropping sub-second precision.
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        let truncated = datetime.with_nanosecond(0).unwrap_or(datetime);
        Self(truncated)
    }

    /// Parse a directory name. Only the exact canonical form is accepted.
    pub fn parse(s: &str) -> SnapshotResult<Self> {
        let parsed = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .map_err(|e| SnapshotError::InvalidTimestamp(format!("{s:?}: {e}")))?;
        let ts = Self(parsed);
        if ts.to_string() != s {
            return Err(SnapshotError::InvalidTimestamp(format!(
                "{s:?} is not in canonical form"
            )));
        }
        Ok(ts)
    }

    /// The next distinguishable instant.
    pub fn next(&self) -> Self {
        Self(self.0 + Duration::seconds(1))
    }

    /// The underlying datetime.
    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl TryFrom<String> for Timestamp {
    type Error = SnapshotError;

    fn try_from(value: String) -> SnapshotResult<Self> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

/// What kind of change a snapshot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Created,
    Changed,
    Deleted,
    Renamed,
    Restored,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Created => "Created",
            Operation::Changed => "Changed",
            Operation::Deleted => "Deleted",
            Operation::Renamed => "Renamed",
            Operation::Restored => "Restored",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who made a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub user_id: String,
    pub display_name: String,
}

impl Author {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Author recorded for changes without an authenticated caller.
    pub fn system() -> Self {
        Self::new("SYSTEM", "SYSTEM")
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::system()
    }
}

/// Describes a snapshot that is about to be written.
#[derive(Debug, Clone)]
pub struct SnapshotOrigin {
    pub operation: Operation,
    pub author: Author,
    pub restored_from: Option<Timestamp>,
    pub renamed_from: Option<EntityId>,
}

impl SnapshotOrigin {
    pub fn new(operation: Operation, author: Author) -> Self {
        Self {
            operation,
            author,
            restored_from: None,
            renamed_from: None,
        }
    }

    /// Mark this snapshot as a restore of the snapshot taken at `source`.
    pub fn restored_from(mut self, source: Timestamp) -> Self {
        self.restored_from = Some(source);
        self
    }

    /// Record the identifier the entity had before a rename.
    pub fn renamed_from(mut self, old: EntityId) -> Self {
        self.renamed_from = Some(old);
        self
    }

    /// Metadata for a snapshot written at `timestamp`.
    pub fn into_metadata(self, timestamp: Timestamp) -> SnapshotMetadata {
        SnapshotMetadata {
            operation: self.operation,
            user: self.author.display_name,
            user_id: self.author.user_id,
            timestamp,
            restored_from: self.restored_from,
            renamed_from: self.renamed_from,
        }
    }
}

/// Contents of a snapshot's metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub operation: Operation,
    pub user: String,
    pub user_id: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<EntityId>,
}

/// Handle to one snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub entity: EntityId,
    pub timestamp: Timestamp,
    dir: PathBuf,
}

impl SnapshotRef {
    pub(crate) fn new(entity: EntityId, timestamp: Timestamp, dir: PathBuf) -> Self {
        Self {
            entity,
            timestamp,
            dir,
        }
    }

    /// Directory holding the content and metadata files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Summary of one snapshot, without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigInfo {
    pub entity: EntityId,
    pub timestamp: Timestamp,
    pub operation: Operation,
    pub user: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<Timestamp>,
}
