//! Snapshot storage implementation.

use crate::{
    metadata, EntityId, MetadataReader, SnapshotError, SnapshotOrigin, SnapshotRef,
    SnapshotResult, Timestamp,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Directory that separates a parent scope from its nested entities.
pub const JOBS_DIR: &str = "jobs";

/// Name of the per-snapshot metadata file.
pub const METADATA_FILE: &str = "history.json";

/// Configuration for snapshot storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// File name of the configuration content inside a snapshot directory.
    pub content_file: String,

    /// How many timestamps a write may try before giving up.
    pub max_write_attempts: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            content_file: "config.xml".to_string(),
            max_write_attempts: 10,
        }
    }
}

/// Which snapshots [`HistoryStore::purge`] removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgePolicy {
    /// Keep at most this many of the newest snapshots.
    pub max_entries: Option<usize>,
    /// Drop snapshots older than this many days.
    pub max_age_days: Option<u32>,
}

impl PurgePolicy {
    pub fn is_noop(&self) -> bool {
        self.max_entries.is_none() && self.max_age_days.is_none()
    }
}

/// Storage for configuration snapshots.
///
/// Each entity has its own history directory; nested entities live under
/// their parent's:
/// ```text
/// root/
///   jobs/
///     <name>/
///       2012-11-21_11-40-28/
///         config.xml       # Raw configuration content
///         history.json     # Snapshot metadata
///       jobs/
///         <nested name>/
///           ...
/// ```
///
/// The history directory is only created when the first snapshot is written.
#[derive(Debug)]
pub struct HistoryStore {
    /// Root of all history directories.
    root: PathBuf,

    /// Configuration.
    config: SnapshotConfig,
}

impl HistoryStore {
    /// Create a new history store. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>, config: SnapshotConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Root of all history directories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Metadata access for snapshots in this store.
    pub fn metadata(&self) -> MetadataReader<'_> {
        MetadataReader::new(self)
    }

    /// Path of an entity's history directory, whether or not it exists.
    pub fn history_dir_for(&self, entity: &EntityId) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in entity.segments() {
            dir.push(JOBS_DIR);
            dir.push(segment);
        }
        dir
    }

    /// Resolve an entity's history directory.
    ///
    /// Returns `None` if the entity has no history yet.
    pub async fn history_root_for(&self, entity: &EntityId) -> SnapshotResult<Option<PathBuf>> {
        let dir = self.history_dir_for(entity);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Some(dir)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }

    /// List the snapshot directories of an entity, oldest first.
    ///
    /// Directories whose name is not a timestamp or that have no content file
    /// are skipped, as are entries removed while listing.
    pub async fn list_snapshot_dirs(&self, entity: &EntityId) -> SnapshotResult<Vec<SnapshotRef>> {
        let dir = self.history_dir_for(entity);
        let mut refs = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(refs),
            Err(e) => return Err(SnapshotError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Ok(timestamp) = Timestamp::parse(name) else {
                // nested entities and stray files live alongside the snapshots
                if name != JOBS_DIR {
                    debug!(entity = %entity, name, "Skipping non-snapshot entry");
                }
                continue;
            };

            let path = entry.path();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => {
                    warn!(
                        entity = %entity,
                        path = %path.display(),
                        "Skipping snapshot entry that is not a directory"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        entity = %entity,
                        path = %path.display(),
                        "Skipping unreadable snapshot entry: {}",
                        e
                    );
                    continue;
                }
            }
            match is_file(&path.join(&self.config.content_file)).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        entity = %entity,
                        path = %path.display(),
                        "Skipping snapshot without content file"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        entity = %entity,
                        path = %path.display(),
                        "Skipping unreadable snapshot: {}",
                        e
                    );
                    continue;
                }
            }

            refs.push(SnapshotRef::new(entity.clone(), timestamp, path));
        }

        refs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(refs)
    }

    /// Find the snapshot taken at exactly `timestamp`.
    pub async fn find(
        &self,
        entity: &EntityId,
        timestamp: &Timestamp,
    ) -> SnapshotResult<SnapshotRef> {
        let dir = self.history_dir_for(entity).join(timestamp.to_string());
        if !is_dir(&dir).await? || !is_file(&dir.join(&self.config.content_file)).await? {
            return Err(SnapshotError::not_found(format!("{entity}@{timestamp}")));
        }
        Ok(SnapshotRef::new(entity.clone(), *timestamp, dir))
    }

    /// Most recent snapshot of an entity.
    pub async fn latest(&self, entity: &EntityId) -> SnapshotResult<Option<SnapshotRef>> {
        Ok(self.list_snapshot_dirs(entity).await?.pop())
    }

    /// Read a snapshot's raw configuration content.
    pub async fn read_content(&self, snapshot: &SnapshotRef) -> SnapshotResult<String> {
        let path = snapshot.dir().join(&self.config.content_file);
        read_or_not_found(&path, snapshot).await
    }

    /// Read a snapshot's metadata file without interpreting it.
    pub(crate) async fn read_metadata_file(
        &self,
        snapshot: &SnapshotRef,
    ) -> SnapshotResult<String> {
        read_or_not_found(&snapshot.dir().join(METADATA_FILE), snapshot).await
    }

    /// Write a new snapshot timestamped now.
    pub async fn write_snapshot(
        &self,
        entity: &EntityId,
        content: &str,
        origin: SnapshotOrigin,
    ) -> SnapshotResult<SnapshotRef> {
        self.write_snapshot_at(entity, content, origin, Timestamp::now())
            .await
    }

    /// Write a new snapshot at `at`, or the first free second after it.
    ///
    /// The timestamp directory is claimed with an exclusive `create_dir`, so
    /// concurrent writers in the same second end up in distinct directories.
    pub async fn write_snapshot_at(
        &self,
        entity: &EntityId,
        content: &str,
        origin: SnapshotOrigin,
        at: Timestamp,
    ) -> SnapshotResult<SnapshotRef> {
        let history_dir = self.history_dir_for(entity);
        fs::create_dir_all(&history_dir).await?;

        let mut timestamp = at;
        let mut attempts = 0;
        let dir = loop {
            attempts += 1;
            match claim(&history_dir, &timestamp).await {
                Ok(dir) => break dir,
                Err(SnapshotError::WriteCollision(name)) => {
                    if attempts >= self.config.max_write_attempts {
                        return Err(SnapshotError::write_failed(format!(
                            "{entity}: no free timestamp in {attempts} attempts (last {name})"
                        )));
                    }
                    debug!(
                        entity = %entity,
                        timestamp = %name,
                        "Snapshot timestamp taken, retrying"
                    );
                    timestamp = timestamp.next();
                }
                Err(e) => return Err(e),
            }
        };

        let metadata = origin.into_metadata(timestamp);
        let operation = metadata.operation;
        let result = async {
            // content last: a directory only counts as a snapshot once it exists
            write_atomic(&dir.join(METADATA_FILE), &metadata::encode(&metadata)?).await?;
            write_atomic(&dir.join(&self.config.content_file), content).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_dir_all(&dir).await {
                warn!(path = %dir.display(), "Failed to remove incomplete snapshot: {}", cleanup);
            }
            return Err(SnapshotError::write_failed(format!("{entity}@{timestamp}: {e}")));
        }

        info!(
            entity = %entity,
            timestamp = %timestamp,
            operation = %operation,
            "Recorded snapshot"
        );
        Ok(SnapshotRef::new(entity.clone(), timestamp, dir))
    }

    /// Move an entity's history to a new identifier.
    ///
    /// Returns `false` when the entity had no history to move.
    pub async fn move_history(&self, from: &EntityId, to: &EntityId) -> SnapshotResult<bool> {
        let Some(src) = self.history_root_for(from).await? else {
            return Ok(false);
        };
        let dst = self.history_dir_for(to);
        if fs::try_exists(&dst).await? {
            return Err(SnapshotError::write_failed(format!(
                "cannot move history of {from}: {to} already has history"
            )));
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&src, &dst).await?;

        info!(from = %from, to = %to, "Moved history");
        Ok(true)
    }

    /// Delete a single snapshot directory.
    pub async fn delete_snapshot(&self, snapshot: &SnapshotRef) -> SnapshotResult<()> {
        match fs::remove_dir_all(snapshot.dir()).await {
            Ok(()) => {
                debug!(
                    entity = %snapshot.entity,
                    timestamp = %snapshot.timestamp,
                    "Deleted snapshot"
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SnapshotError::not_found(format!(
                "{}@{}",
                snapshot.entity, snapshot.timestamp
            ))),
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }

    /// Remove old snapshots according to `policy`.
    ///
    /// The newest snapshot is always kept. Returns the number deleted.
    pub async fn purge(
        &self,
        entity: &EntityId,
        policy: &PurgePolicy,
        now: Timestamp,
    ) -> SnapshotResult<usize> {
        if policy.is_noop() {
            return Ok(0);
        }

        let mut snapshots = self.list_snapshot_dirs(entity).await?;
        // never purge the current configuration
        snapshots.pop();

        let keep_older = policy
            .max_entries
            .map(|max| max.saturating_sub(1))
            .unwrap_or(usize::MAX);
        let excess = snapshots.len().saturating_sub(keep_older);
        let cutoff = policy
            .max_age_days
            .map(|days| now.datetime() - Duration::days(i64::from(days)));

        let mut deleted = 0;
        for (idx, snapshot) in snapshots.iter().enumerate() {
            let too_many = idx < excess;
            let too_old = cutoff.is_some_and(|cutoff| snapshot.timestamp.datetime() < cutoff);
            if !(too_many || too_old) {
                continue;
            }
            match self.delete_snapshot(snapshot).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!("Failed to purge snapshot {}: {}", snapshot.dir().display(), e),
            }
        }

        if deleted > 0 {
            info!(entity = %entity, deleted, "Purged snapshots");
        }

        Ok(deleted)
    }
}

/// Exclusively create the directory for `timestamp`.
async fn claim(history_dir: &Path, timestamp: &Timestamp) -> SnapshotResult<PathBuf> {
    let name = timestamp.to_string();
    let dir = history_dir.join(&name);
    match fs::create_dir(&dir).await {
        Ok(()) => Ok(dir),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(SnapshotError::WriteCollision(name)),
        Err(e) => Err(SnapshotError::Io(e)),
    }
}

/// Write via a temporary sibling and rename, so readers never see partial content.
async fn write_atomic(path: &Path, content: &str) -> SnapshotResult<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, content).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

async fn is_dir(path: &Path) -> SnapshotResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SnapshotError::Io(e)),
    }
}

async fn is_file(path: &Path) -> SnapshotResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SnapshotError::Io(e)),
    }
}

async fn read_or_not_found(path: &Path, snapshot: &SnapshotRef) -> SnapshotResult<String> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(SnapshotError::not_found(format!(
            "{}@{} ({})",
            snapshot.entity,
            snapshot.timestamp,
            path.display()
        ))),
        Err(e) => Err(SnapshotError::Io(e)),
    }
}
