//! Test fixtures for creating history roots on disk.
//!
//! Snapshots are written directly with `std::fs` in the store's layout, so
//! tests of the store do not depend on the code under test to set them up.

use jobhistory_snapshot::{
    Author, EntityId, HistoryStore, Operation, SnapshotConfig, SnapshotOrigin, Timestamp,
    JOBS_DIR, METADATA_FILE,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory name of the history root inside the fixture.
pub const HISTORY_DIR: &str = "config-history";

/// Timestamps of the snapshots written by [`HistoryFixture::with_sample_history`].
pub const SAMPLE_TIMESTAMPS: [&str; 5] = [
    "2012-11-21_11-40-28",
    "2012-11-21_11-41-14",
    "2012-11-21_11-42-05",
    "2012-11-22_09-15-03",
    "2012-11-22_09-20-47",
];

/// Content of sample snapshot `revision` of `entity`.
pub fn sample_config(entity: &str, revision: usize) -> String {
    format!(
        "<?xml version='1.0' encoding='UTF-8'?>\n\
         <project>\n  \
         <description>{entity} revision {revision}</description>\n  \
         <keepDependencies>false</keepDependencies>\n  \
         <builders/>\n\
         </project>"
    )
}

struct PendingSnapshot {
    entity: String,
    timestamp: String,
    content: Option<String>,
    metadata: Option<String>,
}

/// A temporary history root with configurable snapshots.
///
/// # Example
///
/// ```rust
/// use jobhistory_test_utils::fixtures::HistoryFixture;
///
/// let fixture = HistoryFixture::new()
///     .with_sample_history("Test1")
///     .with_snapshot("folder/Job", "2013-01-01_00-00-00", "<project/>")
///     .build();
///
/// assert!(fixture.root().join("jobs/Test1/2012-11-21_11-40-28/config.xml").exists());
/// ```
pub struct HistoryFixture {
    temp_dir: TempDir,
    snapshots: Vec<PendingSnapshot>,
    files: Vec<(PathBuf, String)>,
}

impl HistoryFixture {
    /// Create a new fixture builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            snapshots: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Add a `Changed` snapshot by `jdoe`.
    pub fn with_snapshot(
        self,
        entity: &str,
        timestamp: &str,
        content: impl Into<String>,
    ) -> Self {
        self.with_snapshot_by(entity, timestamp, content, Operation::Changed)
    }

    /// Add a snapshot recording `operation`.
    pub fn with_snapshot_by(
        mut self,
        entity: &str,
        timestamp: &str,
        content: impl Into<String>,
        operation: Operation,
    ) -> Self {
        let metadata = metadata_json(timestamp, operation);
        self.snapshots.push(PendingSnapshot {
            entity: entity.to_string(),
            timestamp: timestamp.to_string(),
            content: Some(content.into()),
            metadata: Some(metadata),
        });
        self
    }

    /// Add a snapshot directory with arbitrary, possibly broken, files.
    pub fn with_raw_snapshot(
        mut self,
        entity: &str,
        name: &str,
        content: Option<&str>,
        metadata: Option<&str>,
    ) -> Self {
        self.snapshots.push(PendingSnapshot {
            entity: entity.to_string(),
            timestamp: name.to_string(),
            content: content.map(str::to_string),
            metadata: metadata.map(str::to_string),
        });
        self
    }

    /// Five valid snapshots of `entity` plus two directories the store must skip.
    pub fn with_sample_history(self, entity: &str) -> Self {
        let mut fixture = self;
        for (revision, timestamp) in SAMPLE_TIMESTAMPS.iter().enumerate() {
            let operation = if revision == 0 {
                Operation::Created
            } else {
                Operation::Changed
            };
            let content = sample_config(entity, revision);
            fixture = fixture.with_snapshot_by(entity, timestamp, content, operation);
        }
        fixture
            .with_raw_snapshot(entity, "not-a-timestamp", Some("<project/>"), None)
            .with_raw_snapshot(
                entity,
                "2012-11-20_10-00-00",
                None,
                Some(&metadata_json("2012-11-20_10-00-00", Operation::Changed)),
            )
    }

    /// Add a file relative to the history root.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.files.push((path.as_ref().to_path_buf(), contents.into()));
        self
    }

    /// Create everything on disk.
    pub fn build(self) -> BuiltHistoryFixture {
        let root = self.temp_dir.path().join(HISTORY_DIR);

        for snapshot in &self.snapshots {
            let dir = entity_dir(&root, &snapshot.entity).join(&snapshot.timestamp);
            create_dir(&dir);
            if let Some(metadata) = &snapshot.metadata {
                write(&dir.join(METADATA_FILE), metadata);
            }
            if let Some(content) = &snapshot.content {
                write(&dir.join(SnapshotConfig::default().content_file), content);
            }
        }

        for (path, contents) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                create_dir(parent);
            }
            write(&full_path, contents);
        }

        BuiltHistoryFixture {
            temp_dir: self.temp_dir,
            root,
        }
    }
}

impl Default for HistoryFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A history root on disk, removed when dropped.
pub struct BuiltHistoryFixture {
    temp_dir: TempDir,
    root: PathBuf,
}

impl BuiltHistoryFixture {
    /// The history root (`config-history`).
    pub fn root(&self) -> PathBuf {
        self.root.clone()
    }

    /// The temporary directory holding the history root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A store over this fixture with default settings.
    pub fn store(&self) -> HistoryStore {
        HistoryStore::new(self.root(), SnapshotConfig::default())
    }

    /// Timestamps of the sample history, oldest first.
    pub fn sample_timestamps(&self) -> Vec<Timestamp> {
        SAMPLE_TIMESTAMPS
            .iter()
            .map(|s| Timestamp::parse(s).expect("sample timestamps are canonical"))
            .collect()
    }

    /// Content of sample snapshot `revision` of `entity`.
    pub fn sample_content(&self, entity: &str, revision: usize) -> String {
        sample_config(entity, revision)
    }

    /// Directory of an entity's history.
    pub fn entity_dir(&self, entity: &str) -> PathBuf {
        entity_dir(&self.root, entity)
    }
}

fn entity_dir(root: &Path, entity: &str) -> PathBuf {
    let id = EntityId::parse(entity)
        .unwrap_or_else(|e| panic!("Invalid fixture entity {entity:?}: {e}"));
    let mut dir = root.to_path_buf();
    for segment in id.segments() {
        dir.push(JOBS_DIR);
        dir.push(segment);
    }
    dir
}

fn metadata_json(timestamp: &str, operation: Operation) -> String {
    let timestamp = Timestamp::parse(timestamp)
        .unwrap_or_else(|e| panic!("Invalid fixture timestamp {timestamp:?}: {e}"));
    let metadata = SnapshotOrigin::new(operation, Author::new("jdoe", "John Doe"))
        .into_metadata(timestamp);
    serde_json::to_string_pretty(&metadata).expect("Failed to serialize metadata")
}

fn create_dir(path: &Path) {
    fs::create_dir_all(path)
        .unwrap_or_else(|e| panic!("Failed to create directory {}: {}", path.display(), e));
}

fn write(path: &Path, contents: &str) {
    fs::write(path, contents)
        .unwrap_or_else(|e| panic!("Failed to write file {}: {}", path.display(), e));
}
