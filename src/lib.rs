//! netassist - tool-calling network assistant
//!
//! Lets an operator converse with a hosted agent that can query and
//! configure routers. The agent asks for tool calls; this crate executes
//! them (often on many devices at once) and feeds the results back until
//! the run completes.
//!
//! # Modules
//!
//! - `agent` - session manager, run poller and agent-service client
//! - `tools` - tool registry and the concurrent round dispatcher
//! - `dispatch` - fan-out of command batches across devices
//! - `device` - SSH sessions and per-device command execution
//! - `inventory` - device registry and credential resolution
//! - `clock` - injectable time source for every wait
//! - `config` - CLI/environment configuration
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - structured logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use netassist::agent::{AgentConfig, AssistantsClient, SessionManager};
//! use netassist::tools::{ToolDispatcher, ToolRegistry};
//!
//! let service = Arc::new(AssistantsClient::new(DEFAULT_BASE_URL, api_key));
//! let mut manager = SessionManager::new(service, ToolDispatcher::new(registry), config);
//! let exchange = manager.send("show me the interfaces on router1").await?;
//! ```

pub mod agent;
pub mod clock;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod inventory;
pub mod metrics;
pub mod tools;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentError, Exchange, SessionManager};
pub use dispatch::{BatchReport, CommandBatch, DeviceDispatcher, DeviceOutcome, ExecutionMode};
pub use tools::{Tool, ToolDispatcher, ToolRegistry};
