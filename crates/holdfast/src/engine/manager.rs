//! Workflow manager: the public facade over runners, routing and storage

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::runner;
use super::shutdown::ShutdownLatch;
use crate::events::EventRouter;
use crate::persistence::{
    DisabledWorkflowStore, InstanceSummary, SharedStore, StoreError, WorkflowStore,
};
use crate::step::StepExecutor;
use crate::workflow::{
    InstancePatch, InstanceRecord, InstanceStatus, Workflow, WorkflowEvent,
};

/// Errors from manager operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No record exists for the instance
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// A record already exists for the requested id
    #[error("instance already exists: {0}")]
    InstanceAlreadyExists(String),

    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration for the workflow engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default timeout for event waits that do not specify one
    pub default_event_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_event_timeout: Duration::from_secs(86_400),
        }
    }
}

impl EngineConfig {
    /// Set the default event-wait timeout
    pub fn with_default_event_timeout(mut self, timeout: Duration) -> Self {
        self.default_event_timeout = timeout;
        self
    }
}

/// Options for creating an instance
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Instance id; a random one is generated when absent
    pub id: Option<String>,

    /// Caller parameters, delivered as the triggering event payload
    pub params: Option<Value>,
}

impl CreateOptions {
    /// Empty options: generated id, null payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit instance id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach caller parameters
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

struct RunnerSlot {
    token: u64,
    task: JoinHandle<()>,
}

/// Shared engine state, reachable from runners and handles
pub(crate) struct EngineInner {
    pub(crate) workflow: Arc<dyn Workflow>,
    pub(crate) store: SharedStore,
    pub(crate) router: Arc<EventRouter>,
    pub(crate) shutdown: Arc<ShutdownLatch>,
    config: EngineConfig,
    runners: Mutex<HashMap<String, RunnerSlot>>,
    next_runner_token: AtomicU64,
}

impl EngineInner {
    /// Build the step executor handed to user code for one instance
    pub(crate) fn step_executor(&self, instance_id: &str) -> StepExecutor {
        StepExecutor::new(
            instance_id.to_string(),
            self.store.clone(),
            self.router.clone(),
            self.shutdown.clone(),
            self.config.default_event_timeout.as_millis() as u64,
        )
    }

    /// Drop a runner-table entry, but only if it still belongs to the
    /// finishing task
    pub(crate) fn remove_runner(&self, instance_id: &str, token: u64) {
        let mut runners = self.runners.lock();
        if runners.get(instance_id).is_some_and(|slot| slot.token == token) {
            runners.remove(instance_id);
        }
    }

    /// Abort and forget the runner for an instance, if any
    pub(crate) fn abort_runner(&self, instance_id: &str) {
        if let Some(slot) = self.runners.lock().remove(instance_id) {
            slot.task.abort();
        }
    }
}

/// Spawn a runner for an instance, replacing (and aborting) any live one
///
/// Two runners over one checkpoint table would race; restart and resume go
/// through here so the stale runner is gone before the fresh one starts.
fn spawn_runner(engine: &Arc<EngineInner>, event: WorkflowEvent) {
    let instance_id = event.instance_id.clone();
    let token = engine.next_runner_token.fetch_add(1, Ordering::Relaxed);
    let task = tokio::spawn(runner::run_instance(engine.clone(), event, token));

    let mut runners = engine.runners.lock();
    if let Some(previous) = runners.insert(instance_id, RunnerSlot { token, task }) {
        previous.task.abort();
    }
}

/// Public facade: create, look up, recover and shut down workflow instances
///
/// One engine runs one workflow definition; each `create` starts an
/// independent instance of it. The engine is cheap to clone and safe to
/// share across tasks.
///
/// # Example
///
/// ```ignore
/// use holdfast::prelude::*;
///
/// let engine = WorkflowEngine::new(OrderWorkflow, InMemoryWorkflowStore::new());
///
/// let instance = engine
///     .create(CreateOptions::new().with_params(json!({ "order_id": "123" })))
///     .await?;
///
/// instance.send_event("confirmed", json!({ "by": "ops" })).await?;
/// ```
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    /// Create an engine over a workflow definition and a storage backend
    pub fn new(workflow: impl Workflow, store: impl WorkflowStore) -> Self {
        Self::with_config(workflow, store, EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(
        workflow: impl Workflow,
        store: impl WorkflowStore,
        config: EngineConfig,
    ) -> Self {
        let store = SharedStore::new(Arc::new(store));
        Self {
            inner: Arc::new(EngineInner {
                workflow: Arc::new(workflow),
                router: Arc::new(EventRouter::new(store.clone())),
                store,
                shutdown: Arc::new(ShutdownLatch::new()),
                config,
                runners: Mutex::new(HashMap::new()),
                next_runner_token: AtomicU64::new(0),
            }),
        }
    }

    /// Create a new instance and start running it
    ///
    /// The id defaults to a fresh UUID. Ids that already have a record are
    /// rejected rather than silently overwritten.
    #[instrument(skip(self, options))]
    pub async fn create(&self, options: CreateOptions) -> Result<WorkflowInstance, EngineError> {
        let instance_id = options.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if self
            .inner
            .store
            .current()
            .load_instance(&instance_id)
            .await?
            .is_some()
        {
            return Err(EngineError::InstanceAlreadyExists(instance_id));
        }

        let event = WorkflowEvent::new(&instance_id, options.params.unwrap_or(Value::Null));
        self.inner
            .store
            .current()
            .save_instance(&instance_id, InstanceRecord::queued(event.clone()))
            .await?;

        info!(%instance_id, "created workflow instance");
        spawn_runner(&self.inner, event);
        Ok(self.handle(instance_id))
    }

    /// Create several instances; order-preserving, and one failure does not
    /// cancel its siblings
    pub async fn create_batch(
        &self,
        batch: Vec<CreateOptions>,
    ) -> Vec<Result<WorkflowInstance, EngineError>> {
        let mut handles = Vec::with_capacity(batch.len());
        for options in batch {
            handles.push(self.create(options).await);
        }
        handles
    }

    /// Look up an existing instance
    pub async fn get(&self, instance_id: &str) -> Result<WorkflowInstance, EngineError> {
        match self.inner.store.current().load_instance(instance_id).await? {
            Some(_) => Ok(self.handle(instance_id.to_string())),
            None => Err(EngineError::InstanceNotFound(instance_id.to_string())),
        }
    }

    /// Status summaries for every known instance
    pub async fn list(&self) -> Result<Vec<InstanceSummary>, EngineError> {
        Ok(self.inner.store.current().list_instance_summaries().await?)
    }

    /// Re-spawn runners for every active instance; returns how many started
    ///
    /// Replay makes this safe to call after a crash or restart: completed
    /// steps return their checkpointed outcome without re-running, so each
    /// instance resumes exactly where it stopped.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let active = self.inner.store.current().list_active_instances().await?;
        let mut recovered = 0;

        for instance_id in active {
            let Some(record) = self.inner.store.current().load_instance(&instance_id).await?
            else {
                debug!(%instance_id, "skipping invalid record");
                continue;
            };
            let Some(event) = record.event else {
                debug!(%instance_id, "skipping record without event");
                continue;
            };

            match record.status {
                InstanceStatus::Paused => {
                    self.inner
                        .store
                        .current()
                        .update_instance(
                            &instance_id,
                            InstancePatch::status(InstanceStatus::Running),
                        )
                        .await?;
                    spawn_runner(&self.inner, event);
                    recovered += 1;
                }
                InstanceStatus::Queued
                | InstanceStatus::Running
                | InstanceStatus::Waiting
                | InstanceStatus::WaitingForPause => {
                    spawn_runner(&self.inner, event);
                    recovered += 1;
                }
                status => {
                    debug!(%instance_id, %status, "status not recoverable; skipping");
                }
            }
        }

        info!(recovered, "recovery complete");
        Ok(recovered)
    }

    /// Raise the shutdown latch and install the disabled storage backend
    ///
    /// Returns once the swap is visible. Outstanding step calls stall
    /// forever at their next suspension point; no further user code runs
    /// and no error is raised into workflows.
    pub fn shutdown(&self) {
        self.inner.shutdown.raise();
        self.inner.store.install(Arc::new(DisabledWorkflowStore::new()));
        info!("engine shut down");
    }

    fn handle(&self, instance_id: String) -> WorkflowInstance {
        WorkflowInstance {
            instance_id,
            engine: self.inner.clone(),
        }
    }
}

/// Handle to one workflow instance
///
/// All operations route through the engine that produced the handle.
#[derive(Clone)]
pub struct WorkflowInstance {
    instance_id: String,
    engine: Arc<EngineInner>,
}

impl WorkflowInstance {
    /// The instance id
    pub fn id(&self) -> &str {
        &self.instance_id
    }

    /// The current record; fails if the instance no longer exists
    pub async fn status(&self) -> Result<InstanceRecord, EngineError> {
        self.engine
            .store
            .current()
            .load_instance(&self.instance_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(self.instance_id.clone()))
    }

    /// Pause the instance
    ///
    /// Best-effort: a vanished instance is a no-op. An in-flight step body
    /// is not interrupted; it abandons at its next checkpoint interaction.
    pub async fn pause(&self) -> Result<(), EngineError> {
        match self
            .engine
            .store
            .current()
            .update_instance(&self.instance_id, InstancePatch::status(InstanceStatus::Paused))
            .await
        {
            Ok(()) => {
                info!(instance_id = %self.instance_id, "instance paused");
                Ok(())
            }
            Err(StoreError::InstanceNotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Resume a paused instance
    ///
    /// Transitions to `running` and spawns a fresh runner from the stored
    /// event; replay skips completed steps. A no-op unless the instance is
    /// paused.
    pub async fn resume(&self) -> Result<(), EngineError> {
        let Some(record) = self
            .engine
            .store
            .current()
            .load_instance(&self.instance_id)
            .await?
        else {
            return Err(EngineError::InstanceNotFound(self.instance_id.clone()));
        };

        if record.status != InstanceStatus::Paused {
            return Ok(());
        }
        let Some(event) = record.event else {
            return Ok(());
        };

        self.engine
            .store
            .current()
            .update_instance(&self.instance_id, InstancePatch::status(InstanceStatus::Running))
            .await?;
        spawn_runner(&self.engine, event);
        info!(instance_id = %self.instance_id, "instance resumed");
        Ok(())
    }

    /// Terminate the instance
    pub async fn terminate(&self) -> Result<(), EngineError> {
        self.engine
            .store
            .current()
            .update_instance(
                &self.instance_id,
                InstancePatch::status(InstanceStatus::Terminated),
            )
            .await?;
        info!(instance_id = %self.instance_id, "instance terminated");
        Ok(())
    }

    /// Clear every checkpoint and run again from the original event
    pub async fn restart(&self) -> Result<(), EngineError> {
        let Some(record) = self
            .engine
            .store
            .current()
            .load_instance(&self.instance_id)
            .await?
        else {
            return Err(EngineError::InstanceNotFound(self.instance_id.clone()));
        };
        let Some(event) = record.event else {
            return Err(EngineError::InstanceNotFound(self.instance_id.clone()));
        };

        self.engine
            .store
            .current()
            .clear_all_step_states(&self.instance_id)
            .await?;
        // full rewrite: a merge patch cannot unset output or error
        self.engine
            .store
            .current()
            .save_instance(&self.instance_id, InstanceRecord::queued(event.clone()))
            .await?;
        spawn_runner(&self.engine, event);
        info!(instance_id = %self.instance_id, "instance restarted");
        Ok(())
    }

    /// Send an event to this instance
    ///
    /// Delivered synchronously to an active waiter, or persisted (first
    /// send wins) for a future `wait_for_event`.
    pub async fn send_event(&self, event_type: &str, payload: Value) -> Result<(), EngineError> {
        Ok(self
            .engine
            .router
            .send(&self.instance_id, event_type, payload)
            .await?)
    }

    /// Remove the instance, its checkpoints and its pending events
    pub async fn delete(&self) -> Result<(), EngineError> {
        self.engine.abort_runner(&self.instance_id);
        self.engine.router.remove_instance(&self.instance_id);
        self.engine
            .store
            .current()
            .delete_instance(&self.instance_id)
            .await?;
        info!(instance_id = %self.instance_id, "instance deleted");
        Ok(())
    }
}
