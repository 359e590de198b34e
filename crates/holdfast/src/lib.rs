//! # Holdfast
//!
//! A durable workflow execution engine that runs user-defined long-lived
//! procedures locally, with persistence, event delivery, and crash/restart
//! recovery. No external orchestrator is involved.
//!
//! ## Features
//!
//! - **Step-level checkpointing**: every `do`, sleep, and event wait
//!   persists its outcome; replay after a restart skips completed work
//! - **Events that wait for you**: an event sent before the workflow
//!   reaches its wait is persisted and consumed the moment the wait begins
//! - **Retries with backoff**: constant or exponential, with the backoff
//!   deadline persisted so restarts resume mid-backoff
//! - **Pluggable storage**: a single async contract with an in-memory
//!   reference backend
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowEngine                          │
//! │  (create / get / recover / shutdown, instance handles)      │
//! └─────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌─────────────────────────────┐  ┌───────────────────────────┐
//! │       instance runner        │  │        EventRouter        │
//! │  (one per live instance)     │  │  (live waiters + pending  │
//! │                              │  │   event fallback)         │
//! └─────────────────────────────┘  └───────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       StepExecutor                           │
//! │  (load checkpoint / maybe execute / write checkpoint)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowStore                           │
//! │  (instances, step checkpoints, pending events)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use holdfast::prelude::*;
//! use serde_json::{json, Value};
//!
//! struct GreetingWorkflow;
//!
//! #[async_trait]
//! impl Workflow for GreetingWorkflow {
//!     async fn run(&self, event: WorkflowEvent, step: &StepExecutor) -> Result<Value, StepError> {
//!         let name = step
//!             .run("lookup", || async { Ok(json!("world")) })
//!             .await?;
//!
//!         step.sleep("breathe", "1 second").await?;
//!
//!         Ok(json!(format!("hello, {}", name.as_str().unwrap_or("?"))))
//!     }
//! }
//!
//! let engine = WorkflowEngine::new(GreetingWorkflow, InMemoryWorkflowStore::new());
//! let instance = engine.create(CreateOptions::new()).await?;
//! ```

pub mod duration;
pub mod engine;
mod events;
pub mod persistence;
pub mod step;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::duration::{DurationInput, SleepTarget};
    pub use crate::engine::{
        CreateOptions, EngineConfig, EngineError, WorkflowEngine, WorkflowInstance,
    };
    pub use crate::persistence::{
        InMemoryWorkflowStore, InstanceSummary, StoreError, WorkflowStore,
    };
    pub use crate::step::{
        Backoff, EventWaitOptions, RetryConfig, StepConfig, StepExecutor, StepState,
    };
    pub use crate::workflow::{
        InstanceRecord, InstanceStatus, StepError, Workflow, WorkflowEvent,
    };
}

// Re-export key types at crate root
pub use engine::{CreateOptions, EngineConfig, EngineError, WorkflowEngine, WorkflowInstance};
pub use persistence::{
    DisabledWorkflowStore, InMemoryWorkflowStore, InstanceSummary, StoreError, WorkflowStore,
};
pub use step::{Backoff, EventWaitOptions, RetryConfig, StepConfig, StepExecutor, StepState};
pub use workflow::{InstanceRecord, InstanceStatus, StepError, Workflow, WorkflowEvent};
