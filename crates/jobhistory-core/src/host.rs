//! Interfaces implemented by the host application.

use crate::config::HistoryConfig;
use crate::entity::{Caller, EntityDescriptor, HistoryRequest};
use crate::error::{HistoryError, HistoryResult};
use async_trait::async_trait;
use jobhistory_snapshot::EntityId;

/// Permission checks for configuring an entity.
#[cfg_attr(test, mockall::automock)]
pub trait AccessControl: Send + Sync {
    /// Whether `caller` may modify the configuration of `entity`.
    fn has_modify_permission(&self, caller: &Caller, entity: &EntityId) -> bool;

    /// Fail with `AccessDenied` unless `caller` may modify `entity`.
    fn require_modify_permission(&self, caller: &Caller, entity: &EntityId) -> HistoryResult<()> {
        if self.has_modify_permission(caller, entity) {
            Ok(())
        } else {
            Err(HistoryError::access_denied(
                caller.user_id.clone(),
                entity.to_string(),
            ))
        }
    }
}

/// Replaces an entity's live configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigApplier: Send + Sync {
    /// Make `content` the current configuration of `entity`.
    ///
    /// On error the live configuration must be left as it was.
    async fn apply_configuration(&self, entity: &EntityId, content: &str) -> anyhow::Result<()>;
}

/// Turns an incoming request into the entity it targets.
pub trait EntityResolver: Send + Sync {
    fn resolve(&self, request: &HistoryRequest) -> HistoryResult<EntityDescriptor>;
}

/// Resolves requests by name, enabling module history per configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigEntityResolver {
    save_module_configuration: bool,
}

impl ConfigEntityResolver {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            save_module_configuration: config.save_module_configuration(),
        }
    }
}

impl EntityResolver for ConfigEntityResolver {
    fn resolve(&self, request: &HistoryRequest) -> HistoryResult<EntityDescriptor> {
        let id = EntityId::parse(request.item.as_str())?;
        Ok(EntityDescriptor::new(
            id,
            request.kind,
            self.save_module_configuration,
        ))
    }
}

/// Access control that answers the same for everyone.
#[derive(Debug, Clone, Copy)]
pub struct StaticAccess(pub bool);

impl AccessControl for StaticAccess {
    fn has_modify_permission(&self, _caller: &Caller, _entity: &EntityId) -> bool {
        self.0
    }
}
