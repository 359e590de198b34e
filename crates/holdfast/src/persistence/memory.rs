//! In-memory implementation of WorkflowStore

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::store::{InstanceSummary, StoreError, WorkflowStore};
use crate::step::StepState;
use crate::workflow::{InstancePatch, InstanceRecord};

type StepKey = (String, String);
type EventKey = (String, String);

/// In-memory reference implementation of [`WorkflowStore`]
///
/// Three maps keyed the way the contract specifies: instances by id, step
/// checkpoints by (instance, step name), pending events by (instance,
/// event type). Suitable for local use and tests; state does not survive
/// the process.
///
/// # Example
///
/// ```
/// use holdfast::persistence::InMemoryWorkflowStore;
///
/// let store = InMemoryWorkflowStore::new();
/// assert_eq!(store.instance_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    instances: RwLock<HashMap<String, InstanceRecord>>,
    steps: RwLock<HashMap<StepKey, StepState>>,
    pending_events: RwLock<HashMap<EventKey, Value>>,
}

impl InMemoryWorkflowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instance records
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Number of checkpoints held for one instance
    pub fn step_count(&self, instance_id: &str) -> usize {
        self.steps.read().keys().filter(|(id, _)| id == instance_id).count()
    }

    /// Number of undelivered pending events across all instances
    pub fn pending_event_count(&self) -> usize {
        self.pending_events.read().len()
    }

    /// Drop all data (for tests)
    pub fn clear(&self) {
        self.instances.write().clear();
        self.steps.write().clear();
        self.pending_events.write().clear();
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn save_instance(
        &self,
        instance_id: &str,
        record: InstanceRecord,
    ) -> Result<(), StoreError> {
        self.instances.write().insert(instance_id.to_string(), record);
        Ok(())
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        patch: InstancePatch,
    ) -> Result<(), StoreError> {
        let mut instances = self.instances.write();
        let record = instances
            .get_mut(instance_id)
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;
        patch.apply_to(record);
        Ok(())
    }

    async fn load_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        let instances = self.instances.read();
        // a record without its triggering event is invalid
        Ok(instances
            .get(instance_id)
            .filter(|record| record.event.is_some())
            .cloned())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), StoreError> {
        self.instances.write().remove(instance_id);
        self.steps.write().retain(|(id, _), _| id != instance_id);
        self.pending_events.write().retain(|(id, _), _| id != instance_id);
        Ok(())
    }

    async fn update_step_state(
        &self,
        instance_id: &str,
        step_name: &str,
        state: StepState,
    ) -> Result<(), StoreError> {
        self.steps
            .write()
            .insert((instance_id.to_string(), step_name.to_string()), state);
        Ok(())
    }

    async fn load_step_state(
        &self,
        instance_id: &str,
        step_name: &str,
    ) -> Result<Option<StepState>, StoreError> {
        let steps = self.steps.read();
        Ok(steps.get(&(instance_id.to_string(), step_name.to_string())).cloned())
    }

    async fn clear_all_step_states(&self, instance_id: &str) -> Result<(), StoreError> {
        self.steps.write().retain(|(id, _), _| id != instance_id);
        Ok(())
    }

    async fn list_instance_summaries(&self) -> Result<Vec<InstanceSummary>, StoreError> {
        let instances = self.instances.read();
        Ok(instances
            .iter()
            .map(|(id, record)| InstanceSummary {
                id: id.clone(),
                status: record.status,
            })
            .collect())
    }

    async fn list_active_instances(&self) -> Result<Vec<String>, StoreError> {
        let instances = self.instances.read();
        Ok(instances
            .iter()
            .filter(|(_, record)| record.status.is_active())
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn save_pending_event(
        &self,
        instance_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<(), StoreError> {
        self.pending_events
            .write()
            .entry((instance_id.to_string(), event_type.to_string()))
            .or_insert(payload);
        Ok(())
    }

    async fn load_pending_event(
        &self,
        instance_id: &str,
        event_type: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .pending_events
            .write()
            .remove(&(instance_id.to_string(), event_type.to_string())))
    }
}
