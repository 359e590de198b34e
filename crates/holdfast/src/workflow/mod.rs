//! User-facing workflow contract and instance records

mod definition;
mod instance;

pub use definition::{StepError, Workflow, WorkflowEvent, TIMEOUT_ERROR};
pub use instance::{InstancePatch, InstanceRecord, InstanceStatus};
