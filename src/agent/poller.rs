//! Run Poller - waits for an agent run to become actionable or terminal
//!
//! # Run States
//!
//! ```text
//! CREATED ──first poll──► IN_PROGRESS ──poll──► IN_PROGRESS
//!                             │
//!                             ├──► REQUIRES_ACTION ──outputs submitted──► IN_PROGRESS
//!                             ├──► COMPLETED
//!                             ├──► FAILED
//!                             └──► TIMED_OUT   (wait exceeded the run timeout)
//! ```
//!
//! Polling is a fixed interval with no backoff. Each wait is bounded by the
//! run timeout and also ends early when the session's cancellation token fires.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::AgentService;
use super::controller::AgentError;
use super::types::{RunError, RunObject, RunStatus, ToolCall};
use crate::clock::Clock;
use crate::metrics::{RUN_POLLS, RUN_WAIT_DURATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Created => "created",
            RunState::InProgress => "in_progress",
            RunState::RequiresAction => "requires_action",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local view of one run; only the poller moves its state
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    state: RunState,
    tool_calls: Vec<ToolCall>,
    last_error: Option<RunError>,
}

impl Run {
    /// Track a run the service just created
    pub fn created(run: &RunObject) -> Self {
        Self {
            id: run.id.clone(),
            thread_id: run.thread_id.clone(),
            state: RunState::Created,
            tool_calls: Vec::new(),
            last_error: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Tool calls of the pending REQUIRES_ACTION event
    pub fn take_tool_calls(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.tool_calls)
    }

    /// Failure message reported by the service, if any
    pub fn failure_message(&self) -> String {
        self.last_error
            .as_ref()
            .map(|e| {
                if e.code.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.code, e.message)
                }
            })
            .unwrap_or_else(|| "no error details reported".to_string())
    }

    /// REQUIRES_ACTION → IN_PROGRESS once tool outputs are accepted
    pub fn resume(&mut self) {
        if self.state == RunState::RequiresAction {
            self.state = RunState::InProgress;
            self.tool_calls.clear();
        }
    }
}

/// Polls run status at a fixed interval
pub struct RunPoller {
    service: Arc<dyn AgentService>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    timeout: Duration,
}

impl RunPoller {
    pub fn new(
        service: Arc<dyn AgentService>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            clock,
            interval,
            timeout,
        }
    }

    /// Poll until `run` requires action, completes or fails
    ///
    /// On return `run.state()` is one of REQUIRES_ACTION, COMPLETED or FAILED.
    /// Exceeding the timeout moves the run to TIMED_OUT and returns
    /// [`AgentError::RunTimeout`]; it is never retried.
    pub async fn wait(&self, run: &mut Run, cancel: &CancellationToken) -> Result<(), AgentError> {
        if run.state.is_terminal() {
            return Ok(());
        }
        let started = self.clock.now();
        let result = self.poll_loop(run, cancel, started).await;
        RUN_WAIT_DURATION.observe(self.clock.now().saturating_sub(started).as_secs_f64());
        result
    }

    async fn poll_loop(
        &self,
        run: &mut Run,
        cancel: &CancellationToken,
        started: Duration,
    ) -> Result<(), AgentError> {
        if run.state == RunState::Created {
            run.state = RunState::InProgress;
        }

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let elapsed = self.clock.now().saturating_sub(started);
            if elapsed >= self.timeout {
                run.state = RunState::TimedOut;
                warn!(run_id = %run.id, elapsed_secs = elapsed.as_secs_f64(), "run polling timed out");
                return Err(AgentError::RunTimeout {
                    run_id: run.id.clone(),
                    after: self.timeout,
                });
            }

            RUN_POLLS.inc();
            let remote = self.service.retrieve_run(&run.thread_id, &run.id).await?;
            debug!(run_id = %run.id, status = %remote.status, "polled run");

            match &remote.status {
                RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => {}
                RunStatus::RequiresAction => {
                    run.state = RunState::RequiresAction;
                    run.tool_calls = remote.pending_tool_calls().to_vec();
                    return Ok(());
                }
                RunStatus::Completed => {
                    run.state = RunState::Completed;
                    return Ok(());
                }
                RunStatus::Failed => {
                    run.state = RunState::Failed;
                    run.last_error = remote.last_error.clone();
                    return Ok(());
                }
                other => {
                    warn!(run_id = %run.id, status = %other, "run reached an unexpected status");
                    return Err(AgentError::UnexpectedRunState {
                        run_id: run.id.clone(),
                        status: other.to_string(),
                    });
                }
            }

            let remaining = self.timeout.saturating_sub(self.clock.now().saturating_sub(started));
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = self.clock.sleep(self.interval.min(remaining)) => {}
            }
        }
    }
}
