//! Pluggable persistence for instance records, checkpoints and events

mod disabled;
mod memory;
mod store;

pub use disabled::DisabledWorkflowStore;
pub use memory::InMemoryWorkflowStore;
pub use store::{InstanceSummary, StoreError, WorkflowStore};

pub(crate) use store::SharedStore;
