//! Agent module: conversation with the hosted tool-calling agent
//!
//! # Architecture
//!
//! ```text
//! Operator prompt → SessionManager → post message + create run
//!                        ↓
//!                  RunPoller (fixed 1s interval, bounded wait)
//!                        ↓
//!              requires_action? ── yes ──► ToolDispatcher.execute_round()
//!                        │                       ↓
//!                        │            submit_tool_outputs → poll again
//!                        ↓
//!                   completed → assistant replies for this run
//! ```

pub mod client;
pub mod controller;
pub mod poller;
pub mod session;
pub mod types;

pub use client::{AgentService, AssistantsClient, RunRequest, ServiceError, DEFAULT_BASE_URL};
pub use controller::{AgentConfig, AgentError, Exchange, SessionManager};
pub use poller::{Run, RunPoller, RunState};
pub use session::{ConversationSession, DEFAULT_INTRO};
