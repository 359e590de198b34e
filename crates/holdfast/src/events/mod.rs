//! Event routing: live listeners with a persistent pending-event fallback
//!
//! An incoming event is handed synchronously to a step that is actively
//! waiting for it; otherwise it is persisted so the next matching wait can
//! consume it. Events sent before the workflow starts waiting are therefore
//! never lost.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::persistence::{SharedStore, StoreError, WorkflowStore};

type ListenerKey = (String, String);

/// Routes incoming events to an actively-waiting step or into the
/// pending-event store for future delivery
pub(crate) struct EventRouter {
    store: SharedStore,
    listeners: Mutex<HashMap<ListenerKey, oneshot::Sender<Value>>>,
}

impl EventRouter {
    pub(crate) fn new(store: SharedStore) -> Self {
        Self {
            store,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver an event to a live waiter, or persist it for a future one
    ///
    /// Persistence is first-wins: a later send for the same (instance,
    /// type) while one is pending is dropped by the storage contract.
    pub(crate) async fn send(
        &self,
        instance_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<(), StoreError> {
        let key = (instance_id.to_string(), event_type.to_string());
        let listener = self.listeners.lock().remove(&key);

        let payload = match listener {
            Some(tx) => match tx.send(payload) {
                Ok(()) => {
                    debug!(%instance_id, event_type, "event delivered to live waiter");
                    return Ok(());
                }
                // the waiter went away between lookup and delivery
                Err(payload) => payload,
            },
            None => payload,
        };

        debug!(%instance_id, event_type, "no live waiter; persisting pending event");
        self.store
            .current()
            .save_pending_event(instance_id, event_type, payload)
            .await
    }

    /// Register a one-shot listener for (instance, type)
    ///
    /// A stale listener for the same key is replaced; its receiver observes
    /// a closed channel.
    pub(crate) fn subscribe(&self, instance_id: &str, event_type: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.listeners
            .lock()
            .insert((instance_id.to_string(), event_type.to_string()), tx);
        rx
    }

    /// Remove a listener; returns whether one was present
    pub(crate) fn unsubscribe(&self, instance_id: &str, event_type: &str) -> bool {
        self.listeners
            .lock()
            .remove(&(instance_id.to_string(), event_type.to_string()))
            .is_some()
    }

    /// Drop every listener for an instance
    pub(crate) fn remove_instance(&self, instance_id: &str) {
        self.listeners.lock().retain(|(id, _), _| id != instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryWorkflowStore, WorkflowStore};
    use serde_json::json;
    use std::sync::Arc;

    fn router_over(store: Arc<InMemoryWorkflowStore>) -> EventRouter {
        EventRouter::new(SharedStore::new(store))
    }

    #[tokio::test]
    async fn test_send_reaches_live_listener() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let router = router_over(store.clone());

        let rx = router.subscribe("i1", "go");
        router.send("i1", "go", json!("now")).await.unwrap();

        assert_eq!(rx.await.unwrap(), json!("now"));
        // synchronous handoff leaves nothing in storage
        assert_eq!(store.pending_event_count(), 0);
    }

    #[tokio::test]
    async fn test_send_without_listener_persists() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let router = router_over(store.clone());

        router.send("i1", "go", json!("early")).await.unwrap();

        assert_eq!(store.pending_event_count(), 1);
        let payload = store.load_pending_event("i1", "go").await.unwrap();
        assert_eq!(payload, Some(json!("early")));
    }

    #[tokio::test]
    async fn test_dropped_listener_falls_back_to_storage() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let router = router_over(store.clone());

        let rx = router.subscribe("i1", "go");
        drop(rx);
        router.send("i1", "go", json!("late")).await.unwrap();

        assert_eq!(store.pending_event_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_listener() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let router = router_over(store.clone());

        let _rx = router.subscribe("i1", "go");
        assert!(router.unsubscribe("i1", "go"));
        assert!(!router.unsubscribe("i1", "go"));

        router.send("i1", "go", json!(1)).await.unwrap();
        assert_eq!(store.pending_event_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_instance_drops_all_listeners() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let router = router_over(store.clone());

        let _a = router.subscribe("i1", "a");
        let _b = router.subscribe("i1", "b");
        let _c = router.subscribe("i2", "a");

        router.remove_instance("i1");

        assert!(!router.unsubscribe("i1", "a"));
        assert!(!router.unsubscribe("i1", "b"));
        assert!(router.unsubscribe("i2", "a"));
    }
}
