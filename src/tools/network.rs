//! Device command tools backed by the multi-device dispatcher

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{parse_args, Tool, ToolError};
use crate::agent::types::ToolDefinition;
use crate::dispatch::{BatchReport, CommandBatch, DeviceDispatcher, DeviceOutcome};

fn render<T: Serialize>(value: &T) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::Failed(e.to_string()))
}

/// `show_commands`: run one read-only command on each listed router
pub struct ShowCommandsTool {
    dispatcher: Arc<DeviceDispatcher>,
}

impl ShowCommandsTool {
    pub fn new(dispatcher: Arc<DeviceDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[derive(Deserialize)]
struct ShowArgs {
    command: String,
    routers: Vec<String>,
}

#[derive(Serialize)]
struct ShowResponse<'a> {
    status: &'static str,
    command: &'a str,
    routers: Vec<String>,
    results: &'a BTreeMap<String, DeviceOutcome>,
}

#[async_trait]
impl Tool for ShowCommandsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "show_commands",
            "Execute a show command on one or more routers over SSH and return the output of each.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The show command to execute, e.g. 'show ip interface brief'"
                    },
                    "routers": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Names of the routers to run the command on"
                    }
                },
                "required": ["command", "routers"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let args: ShowArgs = parse_args(args)?;
        if args.command.trim().is_empty() {
            return Err(ToolError::InvalidArguments("missing required parameter: command".into()));
        }
        info!(command = %args.command, routers = ?args.routers, "show_commands");

        let report: BatchReport = self
            .dispatcher
            .dispatch(CommandBatch::one_shot(&args.command, args.routers))
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        render(&ShowResponse {
            status: "success",
            command: &args.command,
            routers: report.matched_devices(),
            results: &report.outcomes,
        })
    }
}

/// `config_commands`: push an ordered configuration sequence to each listed router
pub struct ConfigCommandsTool {
    dispatcher: Arc<DeviceDispatcher>,
}

impl ConfigCommandsTool {
    pub fn new(dispatcher: Arc<DeviceDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[derive(Deserialize)]
struct ConfigArgs {
    commands: Vec<String>,
    target_routers: Vec<String>,
}

#[async_trait]
impl Tool for ConfigCommandsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "config_commands",
            "Apply configuration commands to one or more routers through an interactive shell. \
             Commands are sent in order, so include 'configure terminal' and 'exit' where needed.",
            json!({
                "type": "object",
                "properties": {
                    "commands": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Configuration commands in the order they must be entered"
                    },
                    "target_routers": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Names of the routers to configure"
                    }
                },
                "required": ["commands", "target_routers"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let args: ConfigArgs = parse_args(args)?;
        info!(commands = args.commands.len(), routers = ?args.target_routers, "config_commands");

        let report = self
            .dispatcher
            .dispatch(CommandBatch::interactive(args.commands, args.target_routers))
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        render(&json!({
            "status": "success",
            "message": format!(
                "Configuration commands executed on {} routers",
                report.matched_devices().len()
            ),
            "results": report.outcomes,
        }))
    }
}
