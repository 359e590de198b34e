//! Instance records and lifecycle status

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WorkflowEvent;

/// Lifecycle status of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceStatus {
    /// Created but not yet picked up by a runner
    Queued,

    /// A runner is executing the procedure
    Running,

    /// Explicitly paused; a fresh runner resumes it via replay
    Paused,

    /// Blocked on an external event
    Waiting,

    /// Pause requested while a step was in flight
    WaitingForPause,

    /// Terminal success
    Complete,

    /// Terminal failure; `error` carries the message
    Errored,

    /// Explicitly terminated
    Terminated,

    /// Catch-all for unrecognized stored values
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Whether the instance belongs in the active list
    ///
    /// Only `complete` and `terminated` are inactive; an `errored` instance
    /// still shows up in the active list.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Complete | Self::Terminated)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Waiting => write!(f, "waiting"),
            Self::WaitingForPause => write!(f, "waitingForPause"),
            Self::Complete => write!(f, "complete"),
            Self::Errored => write!(f, "errored"),
            Self::Terminated => write!(f, "terminated"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Persisted record for one workflow instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceRecord {
    /// Current lifecycle status
    pub status: InstanceStatus,

    /// The triggering event; a record without one is treated as nonexistent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<WorkflowEvent>,

    /// The `run` return value, set only on `complete`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Error message, set only on `errored`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceRecord {
    /// Fresh record for a newly created instance
    pub fn queued(event: WorkflowEvent) -> Self {
        Self {
            status: InstanceStatus::Queued,
            event: Some(event),
            output: None,
            error: None,
        }
    }
}

/// Merge-patch for [`InstanceRecord`]
///
/// `None` fields are left untouched by `update_instance`. A patch can never
/// unset a field; `restart` rewrites the whole record instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancePatch {
    /// New status, if any
    pub status: Option<InstanceStatus>,

    /// New output, if any
    pub output: Option<Value>,

    /// New error message, if any
    pub error: Option<String>,
}

impl InstancePatch {
    /// Patch that only moves the status
    pub fn status(status: InstanceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Attach an output value
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Attach an error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Apply the patch to a record
    pub fn apply_to(&self, record: &mut InstanceRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(output) = &self.output {
            record.output = Some(output.clone());
        }
        if let Some(error) = &self.error {
            record.error = Some(error.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&InstanceStatus::WaitingForPause).unwrap(),
            "\"waitingForPause\""
        );
        assert_eq!(serde_json::to_string(&InstanceStatus::Queued).unwrap(), "\"queued\"");
    }

    #[test]
    fn test_unrecognized_status_maps_to_unknown() {
        let status: InstanceStatus = serde_json::from_str("\"hibernating\"").unwrap();
        assert_eq!(status, InstanceStatus::Unknown);
    }

    #[test]
    fn test_active_statuses() {
        assert!(InstanceStatus::Queued.is_active());
        assert!(InstanceStatus::Running.is_active());
        assert!(InstanceStatus::Paused.is_active());
        assert!(InstanceStatus::Errored.is_active());
        assert!(!InstanceStatus::Complete.is_active());
        assert!(!InstanceStatus::Terminated.is_active());
    }

    #[test]
    fn test_patch_merges_without_unsetting() {
        let mut record = InstanceRecord::queued(WorkflowEvent::new("i1", json!({ "n": 1 })));

        InstancePatch::status(InstanceStatus::Running).apply_to(&mut record);
        assert_eq!(record.status, InstanceStatus::Running);
        assert!(record.event.is_some());

        InstancePatch::status(InstanceStatus::Complete)
            .with_output(json!(42))
            .apply_to(&mut record);
        assert_eq!(record.status, InstanceStatus::Complete);
        assert_eq!(record.output, Some(json!(42)));

        InstancePatch::default().apply_to(&mut record);
        assert_eq!(record.output, Some(json!(42)));
    }
}
