//! WorkflowStore trait definition

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::StepState;
use crate::workflow::{InstancePatch, InstanceRecord, InstanceStatus};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Instance not found
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// Backend error
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Status summary for one instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSummary {
    /// Instance id
    pub id: String,

    /// Current lifecycle status
    pub status: InstanceStatus,
}

/// Abstract persistence for instance records, step checkpoints and pending
/// events
///
/// Implementations are opaque to the engine. Individual operations are
/// atomic; no multi-key transactions are required, because every logical
/// transition the engine makes is a single storage call. Implementations
/// must be thread-safe and support concurrent access.
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    /// Full write of a new (or rewritten) record
    async fn save_instance(&self, instance_id: &str, record: InstanceRecord)
        -> Result<(), StoreError>;

    /// Merge-patch an existing record; fails with not-found if absent
    async fn update_instance(&self, instance_id: &str, patch: InstancePatch)
        -> Result<(), StoreError>;

    /// Load a record, or `None` if absent
    ///
    /// A record missing its triggering event is invalid and must also load
    /// as `None`.
    async fn load_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError>;

    /// Remove the record plus all step checkpoints and pending events for
    /// the instance
    async fn delete_instance(&self, instance_id: &str) -> Result<(), StoreError>;

    /// Upsert a step checkpoint
    async fn update_step_state(
        &self,
        instance_id: &str,
        step_name: &str,
        state: StepState,
    ) -> Result<(), StoreError>;

    /// Load a step checkpoint, or `None` if absent
    async fn load_step_state(
        &self,
        instance_id: &str,
        step_name: &str,
    ) -> Result<Option<StepState>, StoreError>;

    /// Remove every checkpoint for the instance; the record is untouched
    async fn clear_all_step_states(&self, instance_id: &str) -> Result<(), StoreError>;

    /// `{id, status}` for every known instance
    async fn list_instance_summaries(&self) -> Result<Vec<InstanceSummary>, StoreError>;

    /// Ids of instances whose status is neither `complete` nor `terminated`
    async fn list_active_instances(&self) -> Result<Vec<String>, StoreError>;

    /// Persist a pending event; first send wins, later duplicates are
    /// silently dropped
    async fn save_pending_event(
        &self,
        instance_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<(), StoreError>;

    /// Atomically return-and-remove the pending event, or `None`
    async fn load_pending_event(
        &self,
        instance_id: &str,
        event_type: &str,
    ) -> Result<Option<Value>, StoreError>;
}

#[async_trait]
impl<S: WorkflowStore + ?Sized> WorkflowStore for Arc<S> {
    async fn save_instance(
        &self,
        instance_id: &str,
        record: InstanceRecord,
    ) -> Result<(), StoreError> {
        (**self).save_instance(instance_id, record).await
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        patch: InstancePatch,
    ) -> Result<(), StoreError> {
        (**self).update_instance(instance_id, patch).await
    }

    async fn load_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        (**self).load_instance(instance_id).await
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), StoreError> {
        (**self).delete_instance(instance_id).await
    }

    async fn update_step_state(
        &self,
        instance_id: &str,
        step_name: &str,
        state: StepState,
    ) -> Result<(), StoreError> {
        (**self).update_step_state(instance_id, step_name, state).await
    }

    async fn load_step_state(
        &self,
        instance_id: &str,
        step_name: &str,
    ) -> Result<Option<StepState>, StoreError> {
        (**self).load_step_state(instance_id, step_name).await
    }

    async fn clear_all_step_states(&self, instance_id: &str) -> Result<(), StoreError> {
        (**self).clear_all_step_states(instance_id).await
    }

    async fn list_instance_summaries(&self) -> Result<Vec<InstanceSummary>, StoreError> {
        (**self).list_instance_summaries().await
    }

    async fn list_active_instances(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_active_instances().await
    }

    async fn save_pending_event(
        &self,
        instance_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<(), StoreError> {
        (**self).save_pending_event(instance_id, event_type, payload).await
    }

    async fn load_pending_event(
        &self,
        instance_id: &str,
        event_type: &str,
    ) -> Result<Option<Value>, StoreError> {
        (**self).load_pending_event(instance_id, event_type).await
    }
}

/// Swappable handle over the engine's storage backend
///
/// Shutdown installs the disabled backend through this handle; every
/// storage interaction reads the current backend first, so the swap is
/// visible to in-flight runners at their next suspension point.
#[derive(Clone)]
pub(crate) struct SharedStore {
    inner: Arc<RwLock<Arc<dyn WorkflowStore>>>,
}

impl SharedStore {
    pub(crate) fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// The backend currently installed
    pub(crate) fn current(&self) -> Arc<dyn WorkflowStore> {
        self.inner.read().clone()
    }

    /// Replace the backend
    pub(crate) fn install(&self, store: Arc<dyn WorkflowStore>) {
        *self.inner.write() = store;
    }
}
