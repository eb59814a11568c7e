//! Configuration snapshot storage for jobhistory.
//!
//! This crate owns the on-disk history of tracked entities:
//! - One history directory per entity, one timestamp-named directory per snapshot
//! - Metadata parsing and chronological summaries
//! - Line-level diffs between snapshot contents
//!
//! # Example
//!
//! ```no_run
//! use jobhistory_snapshot::{
//!     diff, Author, EntityId, HistoryStore, Operation, SnapshotConfig, SnapshotOrigin,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = HistoryStore::new("/var/lib/jobhistory/config-history", SnapshotConfig::default());
//! let job = EntityId::parse("folder/Test1")?;
//!
//! let origin = SnapshotOrigin::new(Operation::Changed, Author::new("jdoe", "John Doe"));
//! store.write_snapshot(&job, "<project/>", origin).await?;
//!
//! let history = store.metadata().summarize(&job).await?;
//! if let [.., previous, latest] = history.as_slice() {
//!     let old = store.read_content(&store.find(&job, &previous.timestamp).await?).await?;
//!     let new = store.read_content(&store.find(&job, &latest.timestamp).await?).await?;
//!     println!("{} lines added", diff(&old, &new).added_count());
//! }
//! # Ok(())
//! # }
//! ```

mod diff;
mod error;
mod metadata;
mod snapshot;
mod store;

pub use diff::{diff, DiffLine, DiffResult, LineTag};
pub use error::{SnapshotError, SnapshotResult};
pub use metadata::MetadataReader;
pub use snapshot::{
    Author, ConfigInfo, EntityId, Operation, SnapshotMetadata, SnapshotOrigin, SnapshotRef,
    Timestamp, TIMESTAMP_FORMAT,
};
pub use store::{HistoryStore, PurgePolicy, SnapshotConfig, JOBS_DIR, METADATA_FILE};
