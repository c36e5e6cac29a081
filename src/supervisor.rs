//! Restart-with-budget wrapper for pipeline tasks.
//!
//! A failing task is restarted after a fixed backoff. Once it has failed more
//! often than the budget allows, the supervisor cancels the whole pipeline
//! and reports which task gave up.

use crate::pipeline::PipelineError;
use logship_core::config::PipelineConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub backoff: Duration,
}

impl RestartPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            backoff: config.restart_backoff(),
        }
    }
}

/// Run `task` until it returns `Ok`, restarting it on error.
///
/// An error after cancellation is logged and treated as a clean stop. When
/// the restart budget runs out, `cancel` is fired and the last error is
/// returned as [`PipelineError::GaveUp`].
pub async fn supervise<F, Fut, E>(
    name: String,
    policy: RestartPolicy,
    cancel: CancellationToken,
    mut task: F,
) -> Result<(), PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut restarts = 0;
    loop {
        let err = match task().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            warn!(task = %name, error = %err, "task failed during shutdown");
            return Ok(());
        }

        if restarts >= policy.max_restarts {
            error!(task = %name, restarts, error = %err, "restart budget exhausted; stopping pipeline");
            cancel.cancel();
            return Err(PipelineError::GaveUp {
                task: name,
                restarts,
                reason: err.to_string(),
            });
        }

        restarts += 1;
        warn!(
            task = %name,
            restart = restarts,
            max_restarts = policy.max_restarts,
            error = %err,
            "task failed; restarting"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(policy.backoff) => {}
        }
    }
}
