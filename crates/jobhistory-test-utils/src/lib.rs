//! Testing fixtures and doubles for jobhistory.
//!
//! - **Fixtures**: temporary history roots laid out the way the store writes them
//! - **Mocks**: host implementations that record what they were asked to do
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use jobhistory_test_utils::{HistoryFixture, RecordingApplier};
//!
//! #[tokio::test]
//! async fn test_listing() {
//!     let fixture = HistoryFixture::new().with_sample_history("Test1").build();
//!     let store = fixture.store();
//!
//!     let id = jobhistory_snapshot::EntityId::parse("Test1").unwrap();
//!     assert_eq!(store.list_snapshot_dirs(&id).await.unwrap().len(), 5);
//! }
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::{BuiltHistoryFixture, HistoryFixture, SAMPLE_TIMESTAMPS};
pub use mocks::RecordingApplier;
