//! Disabled backend installed by engine shutdown

use async_trait::async_trait;
use futures::future;
use serde_json::Value;

use super::store::{InstanceSummary, StoreError, WorkflowStore};
use crate::step::StepState;
use crate::workflow::{InstancePatch, InstanceRecord};

/// A [`WorkflowStore`] whose every operation never completes
///
/// Installing it makes the engine permanently quiescent: outstanding step
/// calls stall at their next storage interaction and no further user code
/// runs. This is the storage half of the shutdown latch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledWorkflowStore;

impl DisabledWorkflowStore {
    /// Create the disabled backend
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkflowStore for DisabledWorkflowStore {
    async fn save_instance(
        &self,
        _instance_id: &str,
        _record: InstanceRecord,
    ) -> Result<(), StoreError> {
        future::pending().await
    }

    async fn update_instance(
        &self,
        _instance_id: &str,
        _patch: InstancePatch,
    ) -> Result<(), StoreError> {
        future::pending().await
    }

    async fn load_instance(&self, _instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        future::pending().await
    }

    async fn delete_instance(&self, _instance_id: &str) -> Result<(), StoreError> {
        future::pending().await
    }

    async fn update_step_state(
        &self,
        _instance_id: &str,
        _step_name: &str,
        _state: StepState,
    ) -> Result<(), StoreError> {
        future::pending().await
    }

    async fn load_step_state(
        &self,
        _instance_id: &str,
        _step_name: &str,
    ) -> Result<Option<StepState>, StoreError> {
        future::pending().await
    }

    async fn clear_all_step_states(&self, _instance_id: &str) -> Result<(), StoreError> {
        future::pending().await
    }

    async fn list_instance_summaries(&self) -> Result<Vec<InstanceSummary>, StoreError> {
        future::pending().await
    }

    async fn list_active_instances(&self) -> Result<Vec<String>, StoreError> {
        future::pending().await
    }

    async fn save_pending_event(
        &self,
        _instance_id: &str,
        _event_type: &str,
        _payload: Value,
    ) -> Result<(), StoreError> {
        future::pending().await
    }

    async fn load_pending_event(
        &self,
        _instance_id: &str,
        _event_type: &str,
    ) -> Result<Option<Value>, StoreError> {
        future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_operations_never_complete() {
        let store = DisabledWorkflowStore::new();

        let load = tokio::time::timeout(Duration::from_millis(20), store.load_instance("i1")).await;
        assert!(load.is_err());

        let list = tokio::time::timeout(Duration::from_millis(20), store.list_active_instances()).await;
        assert!(list.is_err());
    }
}
