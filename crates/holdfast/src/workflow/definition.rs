//! Workflow trait and the triggering event record

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::duration::DurationError;
use crate::persistence::StoreError;
use crate::step::StepExecutor;

/// Message stored and raised when an event wait times out
pub const TIMEOUT_ERROR: &str = "Timeout";

/// Error raised by a step body or by the step executor
///
/// Two categories are visible to user code: ordinary failures, which the
/// retry loop may consume, and non-retryable failures, which mark the step
/// `failed` on first occurrence. Timeouts from event waits are
/// non-retryable.
///
/// # Example
///
/// ```
/// use holdfast::workflow::StepError;
///
/// let transient = StepError::retryable("connection reset");
/// assert!(transient.retryable);
///
/// let fatal = StepError::non_retryable("invalid input");
/// assert!(!fatal.retryable);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepError {
    /// Error message
    pub message: String,

    /// Whether the retry loop may re-run the step body
    pub retryable: bool,
}

impl StepError {
    /// Create an ordinary, retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable error that skips the retry loop
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// The error raised when an event wait times out
    pub fn timeout() -> Self {
        Self::non_retryable(TIMEOUT_ERROR)
    }

    /// Whether this is an event-wait timeout
    pub fn is_timeout(&self) -> bool {
        self.message == TIMEOUT_ERROR
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StepError {}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        Self::non_retryable(format!("storage error: {err}"))
    }
}

impl From<DurationError> for StepError {
    fn from(err: DurationError) -> Self {
        Self::non_retryable(err.to_string())
    }
}

/// The triggering event for a workflow instance
///
/// Every valid instance record carries one; a record without it is treated
/// as nonexistent by the storage contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEvent {
    /// Caller-provided parameters
    pub payload: Value,

    /// When the instance was created
    pub timestamp: DateTime<Utc>,

    /// The instance this event triggered
    pub instance_id: String,
}

impl WorkflowEvent {
    /// Build the triggering event for a new instance
    pub fn new(instance_id: impl Into<String>, payload: Value) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
            instance_id: instance_id.into(),
        }
    }
}

/// A workflow is a user procedure expressed as named, checkpointed steps
///
/// The engine invokes `run` once per live instance and again on every
/// replay. Each step call consults its checkpoint first, so completed work
/// is skipped and the procedure resumes exactly where it stopped. Step
/// bodies may run more than once if a crash lands between the body
/// finishing and its checkpoint being written; they must be safe under that
/// retry.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use holdfast::prelude::*;
/// use serde_json::{json, Value};
///
/// struct OrderWorkflow;
///
/// #[async_trait]
/// impl Workflow for OrderWorkflow {
///     async fn run(&self, event: WorkflowEvent, step: &StepExecutor) -> Result<Value, StepError> {
///         let charge = step
///             .run("charge", || async { Ok(json!({ "charged": true })) })
///             .await?;
///
///         step.sleep("cooldown", "30 seconds").await?;
///
///         let confirmation = step
///             .wait_for_event("confirm", EventWaitOptions::new("confirmed"))
///             .await?;
///
///         Ok(json!({ "charge": charge, "confirmation": confirmation }))
///     }
/// }
/// ```
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Execute the procedure for one instance
    ///
    /// The return value becomes the instance's `output`; an escaping error
    /// becomes its `error` and moves the instance to `errored`.
    async fn run(&self, event: WorkflowEvent, step: &StepExecutor) -> Result<Value, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_display() {
        let error = StepError::retryable("something went wrong");
        assert_eq!(error.to_string(), "something went wrong");
    }

    #[test]
    fn test_timeout_is_non_retryable() {
        let error = StepError::timeout();
        assert!(!error.retryable);
        assert!(error.is_timeout());
        assert_eq!(error.message, TIMEOUT_ERROR);
    }

    #[test]
    fn test_duration_error_conversion() {
        let error: StepError = DurationError::Invalid("bogus".to_string()).into();
        assert!(!error.retryable);
        assert!(error.message.contains("bogus"));
    }

    #[test]
    fn test_event_carries_instance_id() {
        let event = WorkflowEvent::new("instance-1", serde_json::json!({ "value": 10 }));
        assert_eq!(event.instance_id, "instance-1");
        assert_eq!(event.payload["value"], 10);
    }

    #[test]
    fn test_step_error_serialization() {
        let error = StepError::non_retryable("fatal");
        let json = serde_json::to_string(&error).unwrap();
        let parsed: StepError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, parsed);
    }
}
