//! Host doubles for testing.

use async_trait::async_trait;
use jobhistory_core::host::ConfigApplier;
use jobhistory_snapshot::EntityId;
use std::sync::{Arc, Mutex};

/// A configuration applier that remembers every configuration it applied.
///
/// # Example
///
/// ```rust,ignore
/// let applier = RecordingApplier::new();
/// history.restore(&caller, &entity, &timestamp).await?;
/// assert_eq!(applier.applied().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct RecordingApplier {
    applied: Arc<Mutex<Vec<(EntityId, String)>>>,
    failure: Option<String>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// An applier that rejects every configuration with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            applied: Arc::default(),
            failure: Some(message.into()),
        }
    }

    /// Configurations applied so far, in order.
    pub fn applied(&self) -> Vec<(EntityId, String)> {
        self.applied.lock().unwrap().clone()
    }

    /// The most recently applied content of `entity`.
    pub fn current(&self, entity: &EntityId) -> Option<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == entity)
            .map(|(_, content)| content.clone())
    }
}

#[async_trait]
impl ConfigApplier for RecordingApplier {
    async fn apply_configuration(&self, entity: &EntityId, content: &str) -> anyhow::Result<()> {
        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }
        self.applied
            .lock()
            .unwrap()
            .push((entity.clone(), content.to_string()));
        Ok(())
    }
}
