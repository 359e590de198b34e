//! Step execution: checkpoint states, retry configuration, the executor

mod config;
mod executor;
mod state;

pub use config::{Backoff, RetryConfig, StepConfig};
pub use executor::{EventWaitOptions, StepExecutor};
pub use state::StepState;
