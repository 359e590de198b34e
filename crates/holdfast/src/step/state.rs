//! Step checkpoint states

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted outcome (or in-progress state) of one step of one instance
///
/// A tagged variant: the `status` field is the tag in the serialized form,
/// so consumers pattern-match rather than test-and-cast. `completed` and
/// `failed` are terminal; the executor replays their outcome and never
/// re-runs the body. Deadlines are absolute epoch milliseconds so they
/// survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepState {
    /// Just initialized
    Pending,

    /// The body is (re)executing
    Running {
        /// Retries consumed so far
        retries: u32,
    },

    /// Waiting out a backoff delay before the next attempt
    Retrying {
        /// Absolute epoch-ms deadline for the backoff
        retry_end_time: i64,
        /// Retries consumed so far
        retries: u32,
    },

    /// Terminal success
    Completed {
        /// The body's return value; absent for sleeps
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retries: Option<u32>,
    },

    /// Terminal failure after exhausting retries or a non-retryable error
    Failed {
        /// Normalized error message
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retries: Option<u32>,
    },

    /// Sleeping until an absolute epoch-ms deadline
    Sleeping { sleep_end_time: i64 },

    /// Waiting for an external event
    WaitingForEvent {
        /// Event type being waited on
        wait_event_type: String,
        /// Timeout in milliseconds recorded when waiting began
        wait_timeout: i64,
    },
}

impl StepState {
    /// Terminal states replay their outcome; the body never re-runs
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_tag_names() {
        let state = StepState::WaitingForEvent {
            wait_event_type: "order-shipped".to_string(),
            wait_timeout: 86_400_000,
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], "waitingForEvent");
        assert_eq!(value["waitEventType"], "order-shipped");
        assert_eq!(value["waitTimeout"], 86_400_000);
    }

    #[test]
    fn test_sleeping_field_names() {
        let state = StepState::Sleeping {
            sleep_end_time: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], "sleeping");
        assert_eq!(value["sleepEndTime"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_completed_omits_absent_fields() {
        let state = StepState::Completed {
            result: None,
            retries: None,
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value, json!({ "status": "completed" }));
    }

    #[test]
    fn test_round_trip() {
        let state = StepState::Retrying {
            retry_end_time: 1_700_000_000_000,
            retries: 2,
        };
        let json = serde_json::to_string(&state).unwrap();
        let parsed: StepState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, parsed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(StepState::Completed {
            result: Some(json!(1)),
            retries: None
        }
        .is_terminal());
        assert!(StepState::Failed {
            error: "boom".to_string(),
            retries: Some(3)
        }
        .is_terminal());
        assert!(!StepState::Pending.is_terminal());
        assert!(!StepState::Running { retries: 0 }.is_terminal());
        assert!(!StepState::Sleeping { sleep_end_time: 0 }.is_terminal());
    }
}
