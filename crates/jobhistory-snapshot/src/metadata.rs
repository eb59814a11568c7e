//! Snapshot metadata parsing and history summaries.

use crate::{
    ConfigInfo, EntityId, HistoryStore, SnapshotError, SnapshotMetadata, SnapshotRef,
    SnapshotResult,
};
use tokio::fs;
use tracing::warn;

/// Reads the metadata files of a [`HistoryStore`].
pub struct MetadataReader<'a> {
    store: &'a HistoryStore,
}

impl<'a> MetadataReader<'a> {
    pub(crate) fn new(store: &'a HistoryStore) -> Self {
        Self { store }
    }

    /// Parse the metadata of one snapshot.
    ///
    /// A missing or unparsable file is reported as `CorruptMetadata`; a
    /// snapshot directory that vanished entirely is `NotFound`.
    pub async fn read_metadata(&self, snapshot: &SnapshotRef) -> SnapshotResult<SnapshotMetadata> {
        let raw = match self.store.read_metadata_file(snapshot).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                let dir_exists = fs::metadata(snapshot.dir())
                    .await
                    .is_ok_and(|meta| meta.is_dir());
                if !dir_exists {
                    return Err(e);
                }
                return Err(SnapshotError::corrupt_metadata(
                    snapshot.dir().display().to_string(),
                    "metadata file is missing",
                ));
            }
            Err(e) => return Err(e),
        };
        decode(&raw).map_err(|e| {
            SnapshotError::corrupt_metadata(snapshot.dir().display().to_string(), e.to_string())
        })
    }

    /// One summary per readable snapshot of `entity`, oldest first.
    ///
    /// Snapshots whose metadata cannot be read are logged and left out.
    pub async fn summarize(&self, entity: &EntityId) -> SnapshotResult<Vec<ConfigInfo>> {
        let snapshots = self.store.list_snapshot_dirs(entity).await?;
        let mut infos = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            match self.read_metadata(&snapshot).await {
                Ok(metadata) => infos.push(ConfigInfo {
                    entity: snapshot.entity,
                    // the directory name is authoritative
                    timestamp: snapshot.timestamp,
                    operation: metadata.operation,
                    user: metadata.user,
                    user_id: metadata.user_id,
                    restored_from: metadata.restored_from,
                }),
                Err(e) => warn!(
                    entity = %entity,
                    timestamp = %snapshot.timestamp,
                    "Skipping snapshot: {}",
                    e
                ),
            }
        }

        Ok(infos)
    }
}

pub(crate) fn encode(metadata: &SnapshotMetadata) -> SnapshotResult<String> {
    Ok(serde_json::to_string_pretty(metadata)?)
}

pub(crate) fn decode(raw: &str) -> SnapshotResult<SnapshotMetadata> {
    Ok(serde_json::from_str(raw)?)
}
