//! The configuration history facade.
//!
//! [`ConfigHistory`] is built once at startup and shared. Every operation
//! takes the caller and the resolved entity explicitly. For entities whose
//! history is disabled, operations return an empty result without checking
//! permissions or touching storage; otherwise the configure permission is
//! checked before anything is read or written.

use crate::config::HistoryConfig;
use crate::entity::{Caller, EntityDescriptor};
use crate::error::{HistoryError, HistoryResult};
use crate::host::{AccessControl, ConfigApplier};
use jobhistory_snapshot::{
    diff, ConfigInfo, DiffResult, EntityId, HistoryStore, Operation, PurgePolicy, SnapshotOrigin,
    SnapshotRef, Timestamp,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress of a restore, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreStage {
    Requested,
    PermissionChecked,
    HistoricalContentLoaded,
    LiveConfigurationApplied,
    SnapshotRecorded,
}

impl std::fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RestoreStage::Requested => "requested",
            RestoreStage::PermissionChecked => "permission-checked",
            RestoreStage::HistoricalContentLoaded => "content-loaded",
            RestoreStage::LiveConfigurationApplied => "applied",
            RestoreStage::SnapshotRecorded => "recorded",
        };
        f.write_str(name)
    }
}

/// Entry point for listing, reading, diffing, recording and restoring history.
pub struct ConfigHistory {
    store: Arc<HistoryStore>,
    access: Arc<dyn AccessControl>,
    applier: Arc<dyn ConfigApplier>,
    skip_duplicates: bool,
    purge_policy: PurgePolicy,
}

impl ConfigHistory {
    pub fn new(
        store: Arc<HistoryStore>,
        access: Arc<dyn AccessControl>,
        applier: Arc<dyn ConfigApplier>,
        config: &HistoryConfig,
    ) -> Self {
        Self {
            store,
            access,
            applier,
            skip_duplicates: config.skip_duplicate_history(),
            purge_policy: config.purge_policy(),
        }
    }

    /// Validate `config` and build the store it describes.
    pub fn from_config(
        config: &HistoryConfig,
        access: Arc<dyn AccessControl>,
        applier: Arc<dyn ConfigApplier>,
    ) -> HistoryResult<Self> {
        config.validate()?;
        let store = HistoryStore::new(config.history_root(), config.snapshot_config());
        Ok(Self::new(Arc::new(store), access, applier, config))
    }

    /// Load configuration for `project_dir`, set up logging and build the facade.
    pub async fn open(
        project_dir: Option<&Path>,
        access: Arc<dyn AccessControl>,
        applier: Arc<dyn ConfigApplier>,
    ) -> HistoryResult<Self> {
        let (config, sources) = HistoryConfig::load(project_dir).await?;
        jobhistory_util::log::init(config.log_config());
        debug!(sources = ?sources, root = %config.history_root().display(), "Opening history");
        Self::from_config(&config, access, applier)
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn has_configure_permission(&self, caller: &Caller, entity: &EntityDescriptor) -> bool {
        self.access.has_modify_permission(caller, &entity.id)
    }

    pub fn check_configure_permission(
        &self,
        caller: &Caller,
        entity: &EntityDescriptor,
    ) -> HistoryResult<()> {
        self.access.require_modify_permission(caller, &entity.id)
    }

    /// Whether the history of `entity` should be offered to `caller` at all.
    pub fn is_history_visible(&self, caller: &Caller, entity: &EntityDescriptor) -> bool {
        self.has_configure_permission(caller, entity) && entity.history_enabled
    }

    /// Snapshot summaries of `entity`, oldest first.
    ///
    /// An entity without history yields an empty list.
    pub async fn get_job_configs(
        &self,
        caller: &Caller,
        entity: &EntityDescriptor,
    ) -> HistoryResult<Vec<ConfigInfo>> {
        if !self.gate(caller, entity)? {
            return Ok(Vec::new());
        }
        Ok(self.store.metadata().summarize(&entity.id).await?)
    }

    /// Raw content of the snapshot taken at `timestamp`.
    pub async fn get_snapshot_content(
        &self,
        caller: &Caller,
        entity: &EntityDescriptor,
        timestamp: &Timestamp,
    ) -> HistoryResult<Option<String>> {
        if !self.gate(caller, entity)? {
            return Ok(None);
        }
        self.read_at(&entity.id, timestamp).await.map(Some)
    }

    /// Line diff from the snapshot at `older` to the one at `newer`.
    pub async fn get_diff(
        &self,
        caller: &Caller,
        entity: &EntityDescriptor,
        older: &Timestamp,
        newer: &Timestamp,
    ) -> HistoryResult<Option<DiffResult>> {
        if !self.gate(caller, entity)? {
            return Ok(None);
        }
        let old = self.read_at(&entity.id, older).await?;
        let new = self.read_at(&entity.id, newer).await?;
        Ok(Some(diff(&old, &new)))
    }

    /// Make the snapshot at `timestamp` the live configuration again.
    ///
    /// The restore is recorded as a new `Restored` snapshot. If applying
    /// fails nothing is recorded. If recording fails after the configuration
    /// was applied, the applied configuration stays in place and
    /// `RestoreNotRecorded` is returned.
    pub async fn restore(
        &self,
        caller: &Caller,
        entity: &EntityDescriptor,
        timestamp: &Timestamp,
    ) -> HistoryResult<Option<SnapshotRef>> {
        let id = &entity.id;
        let mut stage = RestoreStage::Requested;
        debug!(entity = %id, source = %timestamp, %stage, "Restore");

        if !self.gate(caller, entity)? {
            return Ok(None);
        }
        stage = RestoreStage::PermissionChecked;
        debug!(entity = %id, %stage, "Restore");

        let content = self.read_at(id, timestamp).await?;
        stage = RestoreStage::HistoricalContentLoaded;
        debug!(entity = %id, %stage, bytes = content.len(), "Restore");

        self.applier
            .apply_configuration(id, &content)
            .await
            .map_err(|e| HistoryError::ApplyFailed {
                entity: id.to_string(),
                message: format!("{e:#}"),
            })?;
        stage = RestoreStage::LiveConfigurationApplied;
        debug!(entity = %id, %stage, "Restore");

        let origin =
            SnapshotOrigin::new(Operation::Restored, caller.author()).restored_from(*timestamp);
        let snapshot = match self.store.write_snapshot(id, &content, origin).await {
            Ok(snapshot) => snapshot,
            Err(source) => {
                warn!(entity = %id, %stage, "Restore applied but not recorded: {}", source);
                return Err(HistoryError::RestoreNotRecorded {
                    entity: id.to_string(),
                    restored_from: timestamp.to_string(),
                    source,
                });
            }
        };
        stage = RestoreStage::SnapshotRecorded;
        debug!(entity = %id, %stage, "Restore");

        self.purge(id).await;
        info!(
            entity = %id,
            source = %timestamp,
            recorded = %snapshot.timestamp,
            user = %caller,
            "Restored configuration"
        );
        Ok(Some(snapshot))
    }

    /// Record a new configuration of `entity`.
    ///
    /// With duplicate skipping enabled, content equal to the latest snapshot
    /// is not recorded again.
    pub async fn record_change(
        &self,
        caller: &Caller,
        entity: &EntityDescriptor,
        content: &str,
        operation: Operation,
    ) -> HistoryResult<Option<SnapshotRef>> {
        if !entity.history_enabled {
            return Ok(None);
        }
        let id = &entity.id;

        if self.skip_duplicates && operation == Operation::Changed {
            if let Some(latest) = self.store.latest(id).await? {
                match self.store.read_content(&latest).await {
                    Ok(previous) if diff(&previous, content).is_unchanged() => {
                        debug!(
                            entity = %id,
                            latest = %latest.timestamp,
                            "Skipping duplicate history"
                        );
                        return Ok(None);
                    }
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let origin = SnapshotOrigin::new(operation, caller.author());
        let snapshot = self.store.write_snapshot(id, content, origin).await?;
        self.purge(id).await;
        Ok(Some(snapshot))
    }

    /// Carry history over from `old_id` to a renamed entity and record the rename.
    pub async fn record_rename(
        &self,
        caller: &Caller,
        old_id: &EntityId,
        entity: &EntityDescriptor,
        content: &str,
    ) -> HistoryResult<Option<SnapshotRef>> {
        if !entity.history_enabled {
            return Ok(None);
        }
        self.store.move_history(old_id, &entity.id).await?;

        let origin =
            SnapshotOrigin::new(Operation::Renamed, caller.author()).renamed_from(old_id.clone());
        let snapshot = self.store.write_snapshot(&entity.id, content, origin).await?;
        info!(from = %old_id, to = %entity.id, "Recorded rename");
        Ok(Some(snapshot))
    }

    /// Record that `entity` was deleted, keeping its last known content.
    ///
    /// Returns `None` when there is no history to close.
    pub async fn record_deletion(
        &self,
        caller: &Caller,
        entity: &EntityDescriptor,
    ) -> HistoryResult<Option<SnapshotRef>> {
        if !entity.history_enabled {
            return Ok(None);
        }
        let id = &entity.id;
        let Some(latest) = self.store.latest(id).await? else {
            return Ok(None);
        };
        let content = self.store.read_content(&latest).await?;

        let origin = SnapshotOrigin::new(Operation::Deleted, caller.author());
        Ok(Some(self.store.write_snapshot(id, &content, origin).await?))
    }

    /// `false` when history is disabled for the entity; otherwise the
    /// permission check, failing with `AccessDenied`.
    fn gate(&self, caller: &Caller, entity: &EntityDescriptor) -> HistoryResult<bool> {
        if !entity.history_enabled {
            debug!(entity = %entity.id, kind = ?entity.kind, "History disabled for entity");
            return Ok(false);
        }
        self.access.require_modify_permission(caller, &entity.id)?;
        Ok(true)
    }

    async fn read_at(&self, id: &EntityId, timestamp: &Timestamp) -> HistoryResult<String> {
        let snapshot = self.store.find(id, timestamp).await?;
        Ok(self.store.read_content(&snapshot).await?)
    }

    async fn purge(&self, id: &EntityId) {
        if let Err(e) = self.store.purge(id, &self.purge_policy, Timestamp::now()).await {
            warn!(entity = %id, "History purge failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::host::{MockAccessControl, MockConfigApplier};
    use jobhistory_snapshot::SnapshotConfig;
    use jobhistory_test_utils::{BuiltHistoryFixture, HistoryFixture};
    use mockall::predicate::always;

    fn caller() -> Caller {
        Caller::new("jdoe", "John Doe")
    }

    fn test1() -> EntityDescriptor {
        EntityDescriptor::plain(EntityId::parse("Test1").unwrap())
    }

    fn module(save_modules: bool) -> EntityDescriptor {
        EntityDescriptor::new(
            EntityId::parse("parent/module").unwrap(),
            EntityKind::Module,
            save_modules,
        )
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn allowing() -> MockAccessControl {
        let mut access = MockAccessControl::new();
        access.expect_has_modify_permission().return_const(true);
        access
            .expect_require_modify_permission()
            .returning(|_, _| Ok(()));
        access
    }

    fn denying() -> MockAccessControl {
        let mut access = MockAccessControl::new();
        access.expect_has_modify_permission().return_const(false);
        access
            .expect_require_modify_permission()
            .returning(|caller, entity| {
                Err(HistoryError::access_denied(
                    caller.user_id.clone(),
                    entity.to_string(),
                ))
            });
        access
    }

    fn history(
        fixture: &BuiltHistoryFixture,
        access: MockAccessControl,
        applier: MockConfigApplier,
        config: &HistoryConfig,
    ) -> ConfigHistory {
        let store = HistoryStore::new(fixture.root(), SnapshotConfig::default());
        ConfigHistory::new(Arc::new(store), Arc::new(access), Arc::new(applier), config)
    }

    fn simple(fixture: &BuiltHistoryFixture, access: MockAccessControl) -> ConfigHistory {
        history(
            fixture,
            access,
            MockConfigApplier::new(),
            &HistoryConfig::default(),
        )
    }

    #[test]
    fn test_visible_without_permission() {
        let fixture = HistoryFixture::new().build();
        let sut = simple(&fixture, denying());
        assert!(!sut.is_history_visible(&caller(), &test1()));
        assert!(!sut.has_configure_permission(&caller(), &test1()));
    }

    #[test]
    fn test_visible_for_plain_entity() {
        let fixture = HistoryFixture::new().build();
        let sut = simple(&fixture, allowing());
        assert!(sut.is_history_visible(&caller(), &test1()));
        assert!(sut.has_configure_permission(&caller(), &test1()));
    }

    #[test]
    fn test_visible_for_saved_modules() {
        let fixture = HistoryFixture::new().build();
        let sut = simple(&fixture, allowing());
        assert!(sut.is_history_visible(&caller(), &module(true)));
    }

    #[test]
    fn test_hidden_for_unsaved_modules() {
        let fixture = HistoryFixture::new().build();
        let sut = simple(&fixture, allowing());
        assert!(!sut.is_history_visible(&caller(), &module(false)));
    }

    #[test]
    fn test_check_configure_permission_denied() {
        let fixture = HistoryFixture::new().build();
        let sut = simple(&fixture, denying());
        let err = sut
            .check_configure_permission(&caller(), &test1())
            .unwrap_err();
        assert!(err.is_access_denied());
    }

    #[tokio::test]
    async fn test_get_job_configs() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let sut = simple(&fixture, allowing());

        let configs = sut.get_job_configs(&caller(), &test1()).await.unwrap();
        assert_eq!(configs.len(), 5);
        assert!(configs.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(configs[0].operation, Operation::Created);
    }

    #[tokio::test]
    async fn test_get_job_configs_empty() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let sut = simple(&fixture, allowing());
        let missing = EntityDescriptor::plain(EntityId::parse("I_DO_NOT_EXIST").unwrap());

        let configs = sut.get_job_configs(&caller(), &missing).await.unwrap();
        assert!(configs.is_empty());
    }

    #[tokio::test]
    async fn test_get_snapshot_content() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let sut = simple(&fixture, allowing());

        let content = sut
            .get_snapshot_content(&caller(), &test1(), &ts("2012-11-21_11-40-28"))
            .await
            .unwrap()
            .unwrap();
        assert!(content.starts_with("<?xml version="));
        assert!(content.ends_with("</project>"));
    }

    #[tokio::test]
    async fn test_get_snapshot_content_not_found() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let sut = simple(&fixture, allowing());

        let err = sut
            .get_snapshot_content(&caller(), &test1(), &ts("1999-01-01_00-00-00"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_denied_before_storage_access() {
        // no history root exists, so any storage access would come back empty
        let fixture = HistoryFixture::new().build();
        let sut = simple(&fixture, denying());
        let at = ts("2012-11-21_11-40-28");

        assert!(sut
            .get_job_configs(&caller(), &test1())
            .await
            .unwrap_err()
            .is_access_denied());
        assert!(sut
            .get_snapshot_content(&caller(), &test1(), &at)
            .await
            .unwrap_err()
            .is_access_denied());
        assert!(sut
            .get_diff(&caller(), &test1(), &at, &at)
            .await
            .unwrap_err()
            .is_access_denied());
        assert!(sut
            .restore(&caller(), &test1(), &at)
            .await
            .unwrap_err()
            .is_access_denied());
    }

    #[tokio::test]
    async fn test_disabled_module_is_noop() {
        let fixture = HistoryFixture::new()
            .with_sample_history("parent/module")
            .build();
        // no expectations: any permission call would panic
        let sut = simple(&fixture, MockAccessControl::new());
        let entity = module(false);
        let at = ts("2012-11-21_11-40-28");

        assert!(sut.get_job_configs(&caller(), &entity).await.unwrap().is_empty());
        assert!(sut
            .get_snapshot_content(&caller(), &entity, &at)
            .await
            .unwrap()
            .is_none());
        assert!(sut
            .get_diff(&caller(), &entity, &at, &at)
            .await
            .unwrap()
            .is_none());
        assert!(sut.restore(&caller(), &entity, &at).await.unwrap().is_none());
        assert!(sut
            .record_change(&caller(), &entity, "<project/>", Operation::Changed)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_diff() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let sut = simple(&fixture, allowing());
        let stamps = fixture.sample_timestamps();

        let same = sut
            .get_diff(&caller(), &test1(), &stamps[1], &stamps[1])
            .await
            .unwrap()
            .unwrap();
        assert!(same.is_unchanged());

        let changed = sut
            .get_diff(&caller(), &test1(), &stamps[0], &stamps[1])
            .await
            .unwrap()
            .unwrap();
        assert!(!changed.is_unchanged());
    }

    #[tokio::test]
    async fn test_restore_records_restored_snapshot() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let source = ts("2012-11-21_11-40-28");
        let expected = fixture.sample_content("Test1", 0);

        let mut applier = MockConfigApplier::new();
        let applied = expected.clone();
        applier
            .expect_apply_configuration()
            .withf(move |entity, content| entity.as_str() == "Test1" && content == applied)
            .times(1)
            .returning(|_, _| Ok(()));
        let sut = history(&fixture, allowing(), applier, &HistoryConfig::default());

        let snapshot = sut
            .restore(&caller(), &test1(), &source)
            .await
            .unwrap()
            .unwrap();

        let latest = sut.store().latest(&test1().id).await.unwrap().unwrap();
        assert_eq!(latest, snapshot);
        let content = sut
            .get_snapshot_content(&caller(), &test1(), &latest.timestamp)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, expected);

        let metadata = sut.store().metadata().read_metadata(&latest).await.unwrap();
        assert_eq!(metadata.operation, Operation::Restored);
        assert_eq!(metadata.restored_from, Some(source));
        assert_eq!(metadata.user_id, "jdoe");
    }

    #[tokio::test]
    async fn test_restore_apply_failure_records_nothing() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let mut applier = MockConfigApplier::new();
        applier
            .expect_apply_configuration()
            .with(always(), always())
            .returning(|_, _| Err(anyhow::anyhow!("invalid configuration")));
        let sut = history(&fixture, allowing(), applier, &HistoryConfig::default());

        let err = sut
            .restore(&caller(), &test1(), &ts("2012-11-21_11-40-28"))
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::ApplyFailed { .. }));
        assert!(err.to_string().contains("invalid configuration"));
        let configs = sut.get_job_configs(&caller(), &test1()).await.unwrap();
        assert_eq!(configs.len(), 5);
    }

    #[tokio::test]
    async fn test_restore_missing_timestamp_does_not_apply() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let mut applier = MockConfigApplier::new();
        applier.expect_apply_configuration().never();
        let sut = history(&fixture, allowing(), applier, &HistoryConfig::default());

        let err = sut
            .restore(&caller(), &test1(), &ts("1999-01-01_00-00-00"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_record_change_skips_duplicates() {
        let fixture = HistoryFixture::new().build();
        let sut = simple(&fixture, allowing());
        let entity = test1();

        let first = sut
            .record_change(&caller(), &entity, "<project/>\n", Operation::Created)
            .await
            .unwrap();
        assert!(first.is_some());

        let duplicate = sut
            .record_change(&caller(), &entity, "<project/>\r\n", Operation::Changed)
            .await
            .unwrap();
        assert!(duplicate.is_none());

        let configs = sut.get_job_configs(&caller(), &entity).await.unwrap();
        assert_eq!(configs.len(), 1);
    }

    #[tokio::test]
    async fn test_record_change_keeps_duplicates_when_configured() {
        let fixture = HistoryFixture::new().build();
        let config = HistoryConfig {
            skip_duplicate_history: Some(false),
            ..Default::default()
        };
        let sut = history(&fixture, allowing(), MockConfigApplier::new(), &config);
        let entity = test1();

        for _ in 0..2 {
            sut.record_change(&caller(), &entity, "<project/>", Operation::Changed)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(sut.get_job_configs(&caller(), &entity).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_change_applies_purge_policy() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let config = HistoryConfig {
            max_history_entries: Some(3),
            ..Default::default()
        };
        let sut = history(&fixture, allowing(), MockConfigApplier::new(), &config);

        let latest = sut
            .record_change(&caller(), &test1(), "<project>new</project>", Operation::Changed)
            .await
            .unwrap()
            .unwrap();

        let configs = sut.get_job_configs(&caller(), &test1()).await.unwrap();
        assert_eq!(configs.len(), 3);
        assert_eq!(configs.last().unwrap().timestamp, latest.timestamp);
    }

    #[tokio::test]
    async fn test_record_rename_moves_history() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let sut = simple(&fixture, allowing());
        let old = EntityId::parse("Test1").unwrap();
        let renamed = EntityDescriptor::plain(EntityId::parse("folder/Renamed").unwrap());

        let snapshot = sut
            .record_rename(&caller(), &old, &renamed, "<project/>")
            .await
            .unwrap()
            .unwrap();

        assert!(sut.get_job_configs(&caller(), &test1()).await.unwrap().is_empty());
        let configs = sut.get_job_configs(&caller(), &renamed).await.unwrap();
        assert_eq!(configs.len(), 6);
        let metadata = sut.store().metadata().read_metadata(&snapshot).await.unwrap();
        assert_eq!(metadata.operation, Operation::Renamed);
        assert_eq!(metadata.renamed_from, Some(old));
    }

    #[tokio::test]
    async fn test_record_deletion_keeps_last_content() {
        let fixture = HistoryFixture::new().with_sample_history("Test1").build();
        let sut = simple(&fixture, allowing());

        let snapshot = sut
            .record_deletion(&caller(), &test1())
            .await
            .unwrap()
            .unwrap();

        let content = sut.store().read_content(&snapshot).await.unwrap();
        assert_eq!(content, fixture.sample_content("Test1", 4));
        let configs = sut.get_job_configs(&caller(), &test1()).await.unwrap();
        assert_eq!(configs.last().unwrap().operation, Operation::Deleted);

        let nothing = EntityDescriptor::plain(EntityId::parse("Never").unwrap());
        assert!(sut.record_deletion(&caller(), &nothing).await.unwrap().is_none());
    }
}
