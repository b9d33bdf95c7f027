use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::{
    domain::{Credential, TaskOutcome, TaskPhase},
    ports::GameApi,
};

/// Run one phase (start/check/claim) over a batch of task ids.
///
/// Order is randomized per call; invocations are strictly sequential to
/// avoid request bursts. The returned list always has one outcome per input
/// id. A soft error mid-batch abandons the remaining tasks and reports that
/// error for every id: a batch either progresses task by task or fails as a
/// whole, never partially.
pub async fn run_phase(
    api: &dyn GameApi,
    name: &str,
    cred: &Credential,
    phase: TaskPhase,
    task_ids: &[String],
) -> Vec<TaskOutcome> {
    let mut order: Vec<&String> = task_ids.iter().collect();
    order.shuffle(&mut rand::thread_rng());

    let mut outcomes = Vec::with_capacity(order.len());
    for task_id in order {
        let call = match phase {
            TaskPhase::Start => api.start_task(cred, task_id).await,
            TaskPhase::Check => api.check_task(cred, task_id).await,
            TaskPhase::Claim => api.claim_task(cred, task_id).await,
        };

        match call {
            Ok(true) => outcomes.push(TaskOutcome::Accepted),
            Ok(false) => {
                info!(
                    account = %name,
                    task = %task_id,
                    op = phase.as_str(),
                    "unexpected task status"
                );
                outcomes.push(TaskOutcome::Rejected);
            }
            Err(e) => {
                warn!(
                    account = %name,
                    task = %task_id,
                    op = phase.as_str(),
                    error = %e,
                    "task batch aborted"
                );
                return vec![TaskOutcome::Failed(e.to_string()); task_ids.len()];
            }
        }
    }

    outcomes
}
