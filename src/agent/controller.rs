//! Session Manager - drives one operator exchange with the hosted agent
//!
//! The manager owns the [`ConversationSession`], starts a run for every
//! prompt, and keeps handing `requires_action` rounds to the tool
//! dispatcher until the run completes.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::client::{AgentService, RunRequest, ServiceError};
use super::poller::{Run, RunPoller, RunState};
use super::session::{truncate, ConversationSession, DEFAULT_INTRO};
use super::types::{ChatMessage, ToolOutput};
use crate::clock::{Clock, TokioClock};
use crate::metrics::{AGENT_EXCHANGES, TOOL_ROUNDS};
use crate::tools::{verify_round, RoundMismatch, ToolDispatcher};

/// Configuration for the session manager
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Assistant that runs are started against
    pub assistant_id: String,
    /// Model override; `None` uses the assistant's configured model
    pub model: Option<String>,
    /// Delay between run status polls
    pub poll_interval: Duration,
    /// Bound on each wait for an actionable or terminal run state
    pub run_timeout: Duration,
    /// Greeting added to history when a session starts
    pub intro_message: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            assistant_id: String::new(),
            model: None,
            poll_interval: Duration::from_secs(1),
            run_timeout: Duration::from_secs(300),
            intro_message: Some(DEFAULT_INTRO.to_string()),
        }
    }
}

/// Result of one operator prompt
#[derive(Debug, Clone)]
pub struct Exchange {
    pub run_id: String,
    /// Assistant messages produced by the run, in order
    pub replies: Vec<String>,
    /// Number of requires_action rounds handled
    pub tool_rounds: usize,
    /// Number of tool calls executed across all rounds
    pub tool_calls_made: usize,
    /// Unique trace ID for this exchange
    pub trace_id: String,
}

/// Error type for agent exchanges
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("run {run_id} did not reach an actionable state within {after:?}")]
    RunTimeout { run_id: String, after: Duration },
    #[error("run {run_id} ended with unexpected status: {status}")]
    UnexpectedRunState { run_id: String, status: String },
    #[error("run {run_id} failed: {message}")]
    RunFailed { run_id: String, message: String },
    #[error("agent service error: {0}")]
    Service(#[from] ServiceError),
    #[error("tool outputs do not match the requested calls: {0}")]
    IncompleteRound(#[from] RoundMismatch),
    #[error("no active conversation session")]
    NoSession,
    #[error("exchange cancelled")]
    Cancelled,
}

impl AgentError {
    fn outcome(&self) -> &'static str {
        match self {
            AgentError::RunTimeout { .. } => "timeout",
            AgentError::UnexpectedRunState { .. } => "unexpected_state",
            AgentError::RunFailed { .. } => "failed",
            AgentError::Cancelled => "cancelled",
            AgentError::Service(_) | AgentError::IncompleteRound(_) | AgentError::NoSession => "error",
        }
    }
}

/// Owns the conversation session and runs exchanges on it
pub struct SessionManager {
    service: Arc<dyn AgentService>,
    dispatcher: ToolDispatcher,
    poller: RunPoller,
    config: AgentConfig,
    session: Option<ConversationSession>,
    cancel: CancellationToken,
}

impl SessionManager {
    /// Create a session manager
    ///
    /// # Arguments
    /// * `service` - hosted agent the runs execute on
    /// * `dispatcher` - handlers for the agent's tool calls
    /// * `config` - assistant and polling configuration
    pub fn new(service: Arc<dyn AgentService>, dispatcher: ToolDispatcher, config: AgentConfig) -> Self {
        Self::with_clock(service, dispatcher, config, Arc::new(TokioClock::new()))
    }

    pub fn with_clock(
        service: Arc<dyn AgentService>,
        dispatcher: ToolDispatcher,
        config: AgentConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let poller = RunPoller::new(service.clone(), clock, config.poll_interval, config.run_timeout);
        Self {
            service,
            dispatcher,
            poller,
            config,
            session: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    /// Token that aborts the exchange in flight when cancelled
    ///
    /// A fired token is replaced once that exchange returns, so fetch a
    /// fresh one before each `send`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open a new agent thread and make it the current session
    pub async fn start(&mut self) -> Result<&ConversationSession, AgentError> {
        let thread = self.service.create_thread().await?;
        info!(thread_id = %thread.id, "conversation session started");

        let mut session = ConversationSession::new(thread.id, self.config.model.clone());
        if let Some(intro) = &self.config.intro_message {
            session.add_message(ChatMessage::assistant(intro.clone()));
        }
        Ok(&*self.session.insert(session))
    }

    /// Discard the current session and start a fresh one
    pub async fn reset(&mut self) -> Result<&ConversationSession, AgentError> {
        self.end();
        self.start().await
    }

    /// Drop the current session; a cancelled token is replaced
    pub fn end(&mut self) {
        if let Some(old) = self.session.take() {
            info!(thread_id = %old.id, messages = old.messages.len(), "conversation session ended");
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    /// Send `prompt` to the agent and drive the run to completion
    ///
    /// Starts a session first if none is active. Every requires_action round
    /// is dispatched, checked for one result per call, and submitted before
    /// polling resumes.
    pub async fn send(&mut self, prompt: &str) -> Result<Exchange, AgentError> {
        let trace_id = Uuid::now_v7().to_string();

        if self.session.is_none() {
            self.start().await?;
        }
        let thread_id = self.session_mut()?.id.clone();

        let root_span = info_span!(
            "agent_exchange",
            trace_id = %trace_id,
            thread_id = %thread_id,
            prompt = %truncate(prompt, 80),
            otel.name = "agent_exchange"
        );

        let result = self
            .exchange(prompt, &thread_id, &trace_id)
            .instrument(root_span)
            .await;

        if let Some(session) = self.session.as_mut() {
            session.current_run = None;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        match &result {
            Ok(exchange) => {
                AGENT_EXCHANGES.with_label_values(&["completed"]).inc();
                info!(
                    trace_id = %trace_id,
                    run_id = %exchange.run_id,
                    rounds = exchange.tool_rounds,
                    tool_calls = exchange.tool_calls_made,
                    "exchange completed"
                );
            }
            Err(e) => {
                AGENT_EXCHANGES.with_label_values(&[e.outcome()]).inc();
                warn!(trace_id = %trace_id, error = %e, "exchange failed");
            }
        }
        result
    }

    async fn exchange(&mut self, prompt: &str, thread_id: &str, trace_id: &str) -> Result<Exchange, AgentError> {
        self.service.post_message(thread_id, prompt).await?;
        self.session_mut()?.add_message(ChatMessage::user(prompt));

        let request = RunRequest {
            assistant_id: self.config.assistant_id.clone(),
            model: self.session_mut()?.model.clone(),
            tools: self.dispatcher.registry().definitions(),
        };
        let created = self.service.create_run(thread_id, &request).await?;
        self.session_mut()?.current_run = Some(created.id.clone());
        info!(trace_id = %trace_id, run_id = %created.id, "run created");

        let mut run = Run::created(&created);
        let mut tool_rounds = 0;
        let mut tool_calls_made = 0;

        loop {
            self.poller.wait(&mut run, &self.cancel).await?;

            match run.state() {
                RunState::RequiresAction => {
                    tool_rounds += 1;
                    let calls = run.take_tool_calls();
                    tool_calls_made += calls.len();

                    let round_span = info_span!(
                        "tool_round",
                        trace_id = %trace_id,
                        run_id = %run.id,
                        round = tool_rounds,
                        calls = calls.len(),
                        otel.name = "tool_round"
                    );
                    let round = self.dispatcher.execute_round(&calls).instrument(round_span);
                    let results = tokio::select! {
                        results = round => results,
                        _ = self.cancel.cancelled() => {
                            warn!(trace_id = %trace_id, run_id = %run.id, "tool round abandoned on cancellation");
                            return Err(AgentError::Cancelled);
                        }
                    };
                    verify_round(&calls, &results)?;

                    let outputs: Vec<ToolOutput> = results.into_iter().map(ToolOutput::from).collect();
                    self.service
                        .submit_tool_outputs(thread_id, &run.id, &outputs)
                        .await?;
                    TOOL_ROUNDS.inc();
                    run.resume();
                }
                RunState::Completed => break,
                RunState::Failed => {
                    return Err(AgentError::RunFailed {
                        run_id: run.id.clone(),
                        message: run.failure_message(),
                    });
                }
                other => {
                    return Err(AgentError::UnexpectedRunState {
                        run_id: run.id.clone(),
                        status: other.to_string(),
                    });
                }
            }
        }

        let messages = self.service.list_messages(thread_id, Some(&run.id)).await?;
        let replies: Vec<String> = messages
            .iter()
            .filter(|m| m.role == "assistant" && m.run_id.as_deref() == Some(run.id.as_str()))
            .map(|m| m.text())
            .collect();

        let session = self.session_mut()?;
        for reply in &replies {
            session.add_message(ChatMessage::assistant(reply.clone()));
        }

        Ok(Exchange {
            run_id: run.id,
            replies,
            tool_rounds,
            tool_calls_made,
            trace_id: trace_id.to_string(),
        })
    }

    fn session_mut(&mut self) -> Result<&mut ConversationSession, AgentError> {
        self.session.as_mut().ok_or(AgentError::NoSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_outcome_labels() {
        let timeout = AgentError::RunTimeout {
            run_id: "run_1".to_string(),
            after: Duration::from_secs(300),
        };
        assert_eq!(timeout.outcome(), "timeout");
        assert_eq!(AgentError::Cancelled.outcome(), "cancelled");
        assert_eq!(AgentError::NoSession.outcome(), "error");

        AGENT_EXCHANGES.with_label_values(&[AgentError::Cancelled.outcome()]).inc();
        assert!(crate::metrics::gather_text().contains(r#"outcome="cancelled""#));
    }
}
