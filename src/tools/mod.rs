//! Tool Dispatcher - executes one round of agent tool calls
//!
//! # Round Flow
//!
//! ```text
//! [ToolCall, ToolCall, ToolCall]      (one requires_action event)
//!        │
//!        ▼
//! ToolRegistry lookup by name ── unknown ──► error ToolResult
//!        │
//!        ▼
//! spawn one task per call ─► Tool::call(arguments)
//!        │
//!        ▼
//! join_all (barrier) ─► [ToolResult; n]   (same order, same ids)
//! ```
//!
//! Handler errors and panics stop at the per-call boundary and become
//! `Error: <message>` outputs, so a round always yields one result per call.

pub mod librenms;
pub mod local_time;
pub mod network;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::agent::types::{ToolCall, ToolDefinition, ToolOutput};
use crate::metrics::{TOOL_CALLS, TOOL_CALL_DURATION};

pub use librenms::{LibreNmsClient, QueryBackend, QueryError};
pub use local_time::LocalTimeTool;
pub use network::{ConfigCommandsTool, ShowCommandsTool};

/// Per-call failures, always converted into an error [`ToolResult`]
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

/// A handler the agent can invoke by name
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registration shape advertised to the agent service
    fn definition(&self) -> ToolDefinition;

    /// Execute with the decoded argument object and return the output text
    async fn call(&self, args: Value) -> Result<String, ToolError>;
}

/// Decode a tool's argument object into its typed form
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Name → handler map
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under its definition's name, replacing any previous handler
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.definition().name().to_string();
        self.tools.insert(name, tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions of every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Output of one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: format!("Error: {}", message),
            is_error: true,
        }
    }
}

impl From<ToolResult> for ToolOutput {
    fn from(result: ToolResult) -> Self {
        ToolOutput {
            tool_call_id: result.tool_call_id,
            output: result.output,
        }
    }
}

/// A round whose results do not pair one-to-one with its calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundMismatch {
    #[error("no result for tool call {0}")]
    Missing(String),
    #[error("tool call {0} has more than one result")]
    Duplicate(String),
    #[error("result {0} does not match any tool call")]
    Unexpected(String),
}

/// Check that every call id has exactly one result and nothing else is present
pub fn verify_round(calls: &[ToolCall], results: &[ToolResult]) -> Result<(), RoundMismatch> {
    let expected: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();
    let mut seen = HashSet::new();
    for result in results {
        let id = result.tool_call_id.as_str();
        if !expected.contains(id) {
            return Err(RoundMismatch::Unexpected(id.to_string()));
        }
        if !seen.insert(id) {
            return Err(RoundMismatch::Duplicate(id.to_string()));
        }
    }
    match calls.iter().find(|c| !seen.contains(c.id.as_str())) {
        Some(missing) => Err(RoundMismatch::Missing(missing.id.clone())),
        None => Ok(()),
    }
}

/// Executes tool-call rounds against a [`ToolRegistry`]
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every call of one round concurrently; results keep the call order
    pub async fn execute_round(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let tasks: Vec<_> = calls
            .iter()
            .map(|call| {
                let tool = self.registry.get(call.name());
                let call = call.clone();
                let span = info_span!("tool_call", tool = %call.function.name, call_id = %call.id);
                tokio::spawn(async move { execute_call(tool, call).await }.instrument(span))
            })
            .collect();

        calls
            .iter()
            .zip(join_all(tasks).await)
            .map(|(call, joined)| {
                joined.unwrap_or_else(|e| {
                    warn!(tool = %call.function.name, call_id = %call.id, error = %e, "tool task aborted");
                    TOOL_CALLS.with_label_values(&[call.name(), "error"]).inc();
                    ToolResult::error(&call.id, format!("tool task aborted: {}", e))
                })
            })
            .collect()
    }
}

async fn execute_call(tool: Option<Arc<dyn Tool>>, call: ToolCall) -> ToolResult {
    let name = call.function.name.as_str();
    let Some(tool) = tool else {
        warn!(tool = %name, "agent requested an unregistered tool");
        TOOL_CALLS.with_label_values(&["unknown", "error"]).inc();
        return ToolResult::error(&call.id, ToolError::UnknownTool(name.to_string()));
    };

    let start = Instant::now();
    let result = match call.function.parse_arguments() {
        Ok(args) => tool.call(args).await,
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    };
    TOOL_CALL_DURATION
        .with_label_values(&[name])
        .observe(start.elapsed().as_secs_f64());

    match result {
        Ok(output) => {
            TOOL_CALLS.with_label_values(&[name, "success"]).inc();
            debug!(tool = %name, bytes = output.len(), "tool call completed");
            ToolResult::success(&call.id, output)
        }
        Err(e) => {
            TOOL_CALLS.with_label_values(&[name, "error"]).inc();
            warn!(tool = %name, error = %e, "tool call failed");
            ToolResult::error(&call.id, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("echo", "Echo the text argument", json!({"type": "object"}))
        }

        async fn call(&self, args: Value) -> Result<String, ToolError> {
            #[derive(serde::Deserialize)]
            struct Args {
                text: String,
            }
            let args: Args = parse_args(args)?;
            Ok(args.text)
        }
    }

    struct Panics;

    #[async_trait]
    impl Tool for Panics {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("panics", "Always panics", json!({"type": "object"}))
        }

        async fn call(&self, _args: Value) -> Result<String, ToolError> {
            panic!("handler blew up");
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).register(Arc::new(Panics));
        ToolDispatcher::new(registry)
    }

    #[tokio::test]
    async fn test_round_preserves_order_and_isolates_failures() {
        let calls = vec![
            ToolCall::new("c1", "echo", r#"{"text":"hello"}"#),
            ToolCall::new("c2", "panics", "{}"),
            ToolCall::new("c3", "nope", "{}"),
            ToolCall::new("c4", "echo", "not json"),
            ToolCall::new("c5", "echo", r#"{"wrong":1}"#),
        ];
        let results = dispatcher().execute_round(&calls).await;

        assert_eq!(results.len(), 5);
        assert!(verify_round(&calls, &results).is_ok());
        assert_eq!(results[0], ToolResult::success("c1", "hello"));
        assert!(results[1].is_error);
        assert!(results[1].output.starts_with("Error: tool task aborted"));
        assert_eq!(results[2].output, "Error: unknown tool: nope");
        assert!(results[3].output.starts_with("Error: invalid arguments"));
        assert!(results[4].output.starts_with("Error: invalid arguments"));
    }

    #[tokio::test]
    async fn test_empty_round() {
        let results = dispatcher().execute_round(&[]).await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_verify_round_detects_mismatches() {
        let calls = vec![ToolCall::new("a", "echo", "{}"), ToolCall::new("b", "echo", "{}")];

        let missing = vec![ToolResult::success("a", "x")];
        assert_eq!(verify_round(&calls, &missing), Err(RoundMismatch::Missing("b".into())));

        let duplicate = vec![
            ToolResult::success("a", "x"),
            ToolResult::success("a", "y"),
            ToolResult::success("b", "z"),
        ];
        assert_eq!(verify_round(&calls, &duplicate), Err(RoundMismatch::Duplicate("a".into())));

        let stray = vec![ToolResult::success("a", "x"), ToolResult::success("zzz", "y")];
        assert_eq!(verify_round(&calls, &stray), Err(RoundMismatch::Unexpected("zzz".into())));
    }

    #[test]
    fn test_registry_definitions_sorted() {
        let registry = dispatcher();
        let names: Vec<_> = registry
            .registry()
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["echo", "panics"]);
    }
}
