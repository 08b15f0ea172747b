//! Fixed-interval poll loop for reconstruction tasks
//!
//! Kept separate from the HTTP client so the attempt budget can be exercised
//! without a network.

use std::future::Future;

use tracing::debug;

use crate::config::PollPolicy;
use crate::error::MeshError;

use super::types::{ReconstructionTask, TaskStatus};

/// One status query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: TaskStatus,
    /// Resolved model URL, only meaningful on success
    pub model_url: Option<String>,
}

/// Query `task` until it reaches a terminal status or the budget runs out
///
/// Sleeps `policy.interval` before each query. A query error is transient and
/// only consumes an attempt. Returns the final status; running out of attempts
/// yields [`TaskStatus::Timeout`]. A success without a model URL is returned
/// as `Success` with no `output_url`, left for the caller to reject.
pub async fn poll_until_terminal<F, Fut>(
    task: &mut ReconstructionTask,
    policy: PollPolicy,
    mut query: F,
) -> TaskStatus
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<StatusReport, MeshError>>,
{
    while task.attempts() < policy.max_attempts {
        tokio::time::sleep(policy.interval).await;
        task.record_attempt();

        match query().await {
            Ok(StatusReport {
                status: TaskStatus::Success,
                model_url,
            }) => {
                debug!(task_id = %task.task_id, attempt = task.attempts(), "Task succeeded");
                match model_url {
                    Some(url) => task.succeed(url),
                    None => task.observe(TaskStatus::Success),
                };
                return task.status();
            }
            Ok(report) => {
                debug!(
                    task_id = %task.task_id,
                    attempt = task.attempts(),
                    status = ?report.status,
                    "Polled task"
                );
                task.observe(report.status);
                if task.status().is_terminal() {
                    return task.status();
                }
            }
            Err(e) => {
                debug!(
                    task_id = %task.task_id,
                    attempt = task.attempts(),
                    error = %e,
                    "Status query failed, will retry"
                );
            }
        }
    }

    task.observe(TaskStatus::Timeout);
    task.status()
}
