//! Step executor: the object handed to user workflow code
//!
//! Every operation performs a load-checkpoint / maybe-execute /
//! write-checkpoint round trip against the storage contract. Terminal
//! checkpoints short-circuit, which is what makes replay after a crash or
//! restart skip work that already happened.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use serde_json::Value;
use tracing::{debug, warn};

use crate::duration::{epoch_millis, DurationError, DurationInput, SleepTarget};
use crate::engine::ShutdownLatch;
use crate::events::EventRouter;
use crate::persistence::{SharedStore, WorkflowStore};
use crate::step::config::StepConfig;
use crate::step::state::StepState;
use crate::workflow::{InstanceStatus, StepError, TIMEOUT_ERROR};

/// Options for [`StepExecutor::wait_for_event`]
#[derive(Debug, Clone)]
pub struct EventWaitOptions {
    /// Event type to wait for
    pub event_type: String,

    /// How long to wait before failing the step; defaults to the engine's
    /// configured event timeout (24 hours unless overridden)
    pub timeout: Option<DurationInput>,
}

impl EventWaitOptions {
    /// Wait for the given event type with the default timeout
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timeout: None,
        }
    }

    /// Set an explicit timeout
    pub fn with_timeout(mut self, timeout: impl Into<DurationInput>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }
}

/// Executes named steps on behalf of one workflow instance
///
/// Step names within one instance are unique: the same name reaching
/// storage twice is the same step resuming, not a new one. Within one
/// instance steps run strictly serially, in the order `run` invokes them.
pub struct StepExecutor {
    instance_id: String,
    store: SharedStore,
    router: Arc<EventRouter>,
    shutdown: Arc<ShutdownLatch>,
    default_event_timeout_ms: u64,
}

impl StepExecutor {
    pub(crate) fn new(
        instance_id: String,
        store: SharedStore,
        router: Arc<EventRouter>,
        shutdown: Arc<ShutdownLatch>,
        default_event_timeout_ms: u64,
    ) -> Self {
        Self {
            instance_id,
            store,
            router,
            shutdown,
            default_event_timeout_ms,
        }
    }

    /// The instance this executor belongs to
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Stall forever if the engine has shut down
    async fn checkpoint(&self) {
        if self.shutdown.is_raised() {
            future::pending::<()>().await;
        }
    }

    /// Load the checkpoint for a step
    async fn load_state(&self, name: &str) -> Result<Option<StepState>, StepError> {
        self.checkpoint().await;
        Ok(self
            .store
            .current()
            .load_step_state(&self.instance_id, name)
            .await?)
    }

    /// Write a checkpoint, abandoning silently if the engine shut down or
    /// the instance was paused or terminated in the meantime
    async fn write_state(&self, name: &str, state: StepState) -> Result<(), StepError> {
        self.checkpoint().await;

        let store = self.store.current();
        if let Some(record) = store.load_instance(&self.instance_id).await? {
            if matches!(
                record.status,
                InstanceStatus::Paused | InstanceStatus::Terminated
            ) {
                debug!(
                    instance_id = %self.instance_id,
                    step = name,
                    status = %record.status,
                    "instance halted; abandoning step"
                );
                future::pending::<()>().await;
            }
        }

        store
            .update_step_state(&self.instance_id, name, state)
            .await?;
        Ok(())
    }

    /// Wait wall-clock time, then re-check the latch
    async fn wait_millis(&self, millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        self.checkpoint().await;
    }

    /// Execute a work step with the default config: one attempt, no retry
    pub async fn run<F, Fut>(&self, name: &str, body: F) -> Result<Value, StepError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<Value, StepError>> + Send,
    {
        self.run_with(name, StepConfig::default(), body).await
    }

    /// Execute a work step with retry configuration
    ///
    /// A `completed` checkpoint returns its stored result without invoking
    /// the body; a `failed` checkpoint re-raises its stored error. The
    /// checkpoint is written after the body succeeds, so a crash between
    /// the two re-runs the body on replay; bodies must be safe under that
    /// retry.
    pub async fn run_with<F, Fut>(
        &self,
        name: &str,
        config: StepConfig,
        body: F,
    ) -> Result<Value, StepError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<Value, StepError>> + Send,
    {
        let retry = config.retries.unwrap_or_default();

        let mut retries = match self.load_state(name).await? {
            Some(StepState::Completed { result, .. }) => {
                debug!(instance_id = %self.instance_id, step = name, "replaying completed step");
                return Ok(result.unwrap_or(Value::Null));
            }
            Some(StepState::Failed { error, .. }) => {
                debug!(instance_id = %self.instance_id, step = name, "replaying failed step");
                return Err(StepError::non_retryable(error));
            }
            Some(StepState::Retrying {
                retry_end_time,
                retries,
            }) => {
                // resume the backoff that was in flight when we stopped
                let remaining = retry_end_time - epoch_millis();
                if remaining > 0 {
                    self.wait_millis(remaining as u64).await;
                }
                retries
            }
            Some(StepState::Running { retries }) => retries,
            _ => 0,
        };

        loop {
            self.write_state(name, StepState::Running { retries }).await?;

            let err = match body().await {
                Ok(result) => {
                    self.write_state(
                        name,
                        StepState::Completed {
                            result: Some(result.clone()),
                            retries: Some(retries),
                        },
                    )
                    .await?;
                    return Ok(result);
                }
                Err(err) => err,
            };

            if !err.retryable || retries >= retry.limit {
                warn!(
                    instance_id = %self.instance_id,
                    step = name,
                    error = %err,
                    retries,
                    "step failed terminally"
                );
                self.write_state(
                    name,
                    StepState::Failed {
                        error: err.message.clone(),
                        retries: Some(retries),
                    },
                )
                .await?;
                return Err(StepError::non_retryable(err.message));
            }

            retries += 1;
            let delay = retry.delay_for_retry(retries)?;
            debug!(
                instance_id = %self.instance_id,
                step = name,
                retries,
                delay_ms = delay,
                "step failed; backing off before retry"
            );
            self.write_state(
                name,
                StepState::Retrying {
                    retry_end_time: epoch_millis() + delay as i64,
                    retries,
                },
            )
            .await?;
            self.wait_millis(delay).await;
        }
    }

    /// Pause the workflow for a duration
    ///
    /// Accepts raw milliseconds or a human string ("30 seconds"). The
    /// deadline is persisted as absolute epoch milliseconds, so a replay
    /// waits out only the remainder.
    pub async fn sleep(
        &self,
        name: &str,
        duration: impl Into<DurationInput>,
    ) -> Result<(), StepError> {
        let duration = duration.into();
        let end_time = match self.load_state(name).await? {
            Some(StepState::Completed { .. }) => return Ok(()),
            Some(StepState::Sleeping { sleep_end_time }) => sleep_end_time,
            _ => {
                let millis = duration.to_millis()?;
                if millis == 0 {
                    return Err(DurationError::NonPositive.into());
                }
                let end_time = epoch_millis() + millis as i64;
                self.write_state(name, StepState::Sleeping { sleep_end_time: end_time })
                    .await?;
                end_time
            }
        };
        self.finish_sleep(name, end_time).await
    }

    /// Pause the workflow until an absolute point in time
    ///
    /// Accepts a `DateTime<Utc>` or a seconds-since-epoch numeric. The
    /// target must be in the future when the step first runs.
    pub async fn sleep_until(
        &self,
        name: &str,
        target: impl Into<SleepTarget>,
    ) -> Result<(), StepError> {
        let target = target.into();
        let end_time = match self.load_state(name).await? {
            Some(StepState::Completed { .. }) => return Ok(()),
            Some(StepState::Sleeping { sleep_end_time }) => sleep_end_time,
            _ => {
                let end_time = target.epoch_millis();
                if end_time <= epoch_millis() {
                    return Err(DurationError::InPast.into());
                }
                self.write_state(name, StepState::Sleeping { sleep_end_time: end_time })
                    .await?;
                end_time
            }
        };
        self.finish_sleep(name, end_time).await
    }

    async fn finish_sleep(&self, name: &str, end_time: i64) -> Result<(), StepError> {
        let remaining = end_time - epoch_millis();
        if remaining > 0 {
            self.wait_millis(remaining as u64).await;
        }
        self.write_state(
            name,
            StepState::Completed {
                result: None,
                retries: None,
            },
        )
        .await?;
        Ok(())
    }

    /// Suspend until an event of the given type arrives
    ///
    /// An event sent before this wait began is consumed immediately from
    /// the pending-event store. Otherwise a one-shot in-process listener is
    /// raced against the timeout; a timeout writes a `failed` checkpoint
    /// and raises a non-retryable Timeout error.
    pub async fn wait_for_event(
        &self,
        name: &str,
        options: EventWaitOptions,
    ) -> Result<Value, StepError> {
        match self.load_state(name).await? {
            Some(StepState::Completed { result, .. }) => {
                return Ok(result.unwrap_or(Value::Null));
            }
            Some(StepState::Failed { error, .. }) => {
                return Err(StepError::non_retryable(error));
            }
            _ => {}
        }

        let timeout_ms = match &options.timeout {
            Some(timeout) => timeout.to_millis()?,
            None => self.default_event_timeout_ms,
        };
        let event_type = options.event_type;

        self.write_state(
            name,
            StepState::WaitingForEvent {
                wait_event_type: event_type.clone(),
                wait_timeout: timeout_ms as i64,
            },
        )
        .await?;

        // subscribe before consulting the pending store: a send landing
        // between the two must reach one of the two channels
        let mut rx = self.router.subscribe(&self.instance_id, &event_type);

        // an event sent before this wait began is consumed immediately
        self.checkpoint().await;
        if let Some(payload) = self
            .store
            .current()
            .load_pending_event(&self.instance_id, &event_type)
            .await?
        {
            self.router.unsubscribe(&self.instance_id, &event_type);
            debug!(
                instance_id = %self.instance_id,
                step = name,
                event_type,
                "consumed pending event"
            );
            return self.complete_wait(name, payload).await;
        }

        let received = tokio::select! {
            received = &mut rx => received.ok(),
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                self.router.unsubscribe(&self.instance_id, &event_type);
                // a send racing the timer may have landed in the channel
                rx.try_recv().ok()
            }
        };

        match received {
            Some(payload) => {
                debug!(
                    instance_id = %self.instance_id,
                    step = name,
                    event_type,
                    "event delivered to waiting step"
                );
                self.complete_wait(name, payload).await
            }
            None => {
                warn!(
                    instance_id = %self.instance_id,
                    step = name,
                    event_type,
                    timeout_ms,
                    "event wait timed out"
                );
                self.write_state(
                    name,
                    StepState::Failed {
                        error: TIMEOUT_ERROR.to_string(),
                        retries: None,
                    },
                )
                .await?;
                Err(StepError::timeout())
            }
        }
    }

    async fn complete_wait(&self, name: &str, payload: Value) -> Result<Value, StepError> {
        self.write_state(
            name,
            StepState::Completed {
                result: Some(payload.clone()),
                retries: None,
            },
        )
        .await?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryWorkflowStore, WorkflowStore};
    use crate::workflow::{InstanceRecord, WorkflowEvent};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn executor_over(store: Arc<InMemoryWorkflowStore>) -> StepExecutor {
        let shared = SharedStore::new(store.clone());
        store
            .save_instance(
                "i1",
                InstanceRecord::queued(WorkflowEvent::new("i1", json!({}))),
            )
            .await
            .unwrap();
        StepExecutor::new(
            "i1".to_string(),
            shared.clone(),
            Arc::new(EventRouter::new(shared)),
            Arc::new(ShutdownLatch::new()),
            86_400_000,
        )
    }

    #[tokio::test]
    async fn test_completed_step_replays_without_running_body() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let executor = executor_over(store.clone()).await;
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let result = executor
                .run("once", move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!("done"))
                    }
                })
                .await
                .unwrap();
            assert_eq!(result, json!("done"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_step_replays_stored_error() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let executor = executor_over(store.clone()).await;

        let err = executor
            .run("broken", || async { Err(StepError::non_retryable("bad input")) })
            .await
            .unwrap_err();
        assert_eq!(err.message, "bad input");

        // the body must not run again on replay
        let err = executor
            .run("broken", || async { Ok(json!("recovered")) })
            .await
            .unwrap_err();
        assert_eq!(err.message, "bad input");
    }

    #[tokio::test]
    async fn test_sleep_honors_stored_deadline() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let executor = executor_over(store.clone()).await;

        // a deadline already in the past completes without waiting
        store
            .update_step_state(
                "i1",
                "nap",
                StepState::Sleeping {
                    sleep_end_time: epoch_millis() - 1_000,
                },
            )
            .await
            .unwrap();

        let started = std::time::Instant::now();
        executor.sleep("nap", "1 hour").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        let state = store.load_step_state("i1", "nap").await.unwrap().unwrap();
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn test_sleep_rejects_zero_duration() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let executor = executor_over(store.clone()).await;

        let err = executor.sleep("zero", 0u64).await.unwrap_err();
        assert!(err.message.contains("positive"));
    }

    #[tokio::test]
    async fn test_sleep_until_rejects_past_target() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let executor = executor_over(store.clone()).await;

        let past = chrono::Utc::now() - chrono::Duration::seconds(60);
        let err = executor.sleep_until("past", past).await.unwrap_err();
        assert!(err.message.contains("future"));
    }

    #[tokio::test]
    async fn test_retry_checkpoint_records_backoff_deadline() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let executor = executor_over(store.clone()).await;
        let calls = Arc::new(AtomicU32::new(0));

        let config = StepConfig::new().with_retries(crate::step::RetryConfig::new(1, 20u64));
        let calls_in_body = calls.clone();
        let result = executor
            .run_with("flaky", config, move || {
                let calls = calls_in_body.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StepError::retryable("transient"))
                    } else {
                        Ok(json!("ok"))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, json!("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let state = store.load_step_state("i1", "flaky").await.unwrap().unwrap();
        assert_eq!(
            state,
            StepState::Completed {
                result: Some(json!("ok")),
                retries: Some(1),
            }
        );
    }
}
