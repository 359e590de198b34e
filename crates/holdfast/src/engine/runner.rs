//! Per-instance driver
//!
//! The runner is deliberately thin: replay safety lives entirely in the
//! step executor, so the runner only moves the instance record through its
//! lifecycle and reports the terminal outcome.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::manager::EngineInner;
use crate::persistence::WorkflowStore;
use crate::workflow::{InstancePatch, InstanceStatus, WorkflowEvent};

/// Drive one instance from its triggering event to a terminal status
pub(crate) async fn run_instance(engine: Arc<EngineInner>, event: WorkflowEvent, token: u64) {
    let instance_id = event.instance_id.clone();
    let step = engine.step_executor(&instance_id);

    if let Err(err) = engine
        .store
        .current()
        .update_instance(&instance_id, InstancePatch::status(InstanceStatus::Running))
        .await
    {
        error!(%instance_id, error = %err, "failed to mark instance running");
        engine.remove_runner(&instance_id, token);
        return;
    }

    info!(%instance_id, "workflow instance running");
    let outcome = engine.workflow.run(event, &step).await;

    // pause, terminate or delete may have won the race while the body ran;
    // in that case the record is left exactly as the user action set it
    let halted = match engine.store.current().load_instance(&instance_id).await {
        Ok(Some(record)) => matches!(
            record.status,
            InstanceStatus::Paused | InstanceStatus::Terminated
        ),
        Ok(None) => true,
        Err(_) => false,
    };

    if halted {
        debug!(%instance_id, "instance halted mid-run; skipping terminal write");
    } else {
        let patch = match &outcome {
            Ok(output) => {
                info!(%instance_id, "workflow instance complete");
                InstancePatch::status(InstanceStatus::Complete).with_output(output.clone())
            }
            Err(err) => {
                info!(%instance_id, error = %err, "workflow instance errored");
                InstancePatch::status(InstanceStatus::Errored).with_error(err.message.clone())
            }
        };
        if let Err(err) = engine.store.current().update_instance(&instance_id, patch).await {
            error!(%instance_id, error = %err, "failed to record terminal status");
        }
    }

    engine.remove_runner(&instance_id, token);
}
