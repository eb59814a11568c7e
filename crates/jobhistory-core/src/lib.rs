//! Per-entity configuration history for jobhistory.
//!
//! This crate is what a host application talks to:
//! - Configuration management (multi-source, JSONC support)
//! - Entity descriptors and request parameters
//! - Host interfaces for permissions and applying configurations
//! - The [`ConfigHistory`] facade: listing, reading, diffing, recording and restoring
//!
//! # Example
//!
//! ```no_run
//! use jobhistory_core::{Caller, ConfigHistory, EntityDescriptor, StaticAccess};
//! use jobhistory_snapshot::{EntityId, Operation};
//! # use std::sync::Arc;
//! # struct Host;
//! # #[async_trait::async_trait]
//! # impl jobhistory_core::ConfigApplier for Host {
//! #     async fn apply_configuration(&self, _: &EntityId, _: &str) -> anyhow::Result<()> {
//! #         Ok(())
//! #     }
//! # }
//!
//! # async fn example() -> jobhistory_core::HistoryResult<()> {
//! let history = ConfigHistory::open(None, Arc::new(StaticAccess(true)), Arc::new(Host)).await?;
//! let caller = Caller::new("jdoe", "John Doe");
//! let job = EntityDescriptor::plain(EntityId::parse("Test1")?);
//!
//! history.record_change(&caller, &job, "<project/>", Operation::Created).await?;
//! for config in history.get_job_configs(&caller, &job).await? {
//!     println!("{} {} by {}", config.timestamp, config.operation, config.user);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod history;
pub mod host;

pub use config::HistoryConfig;
pub use entity::{Caller, EntityDescriptor, EntityKind, HistoryRequest};
pub use error::{ConfigError, HistoryError, HistoryResult};
pub use history::ConfigHistory;
pub use host::{AccessControl, ConfigApplier, ConfigEntityResolver, EntityResolver, StaticAccess};
