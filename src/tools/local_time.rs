//! `get_local_time`: lets the agent reason about log timestamps

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::{json, Value};

use super::{Tool, ToolError};
use crate::agent::types::ToolDefinition;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTimeTool;

#[async_trait]
impl Tool for LocalTimeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "get_local_time",
            "Get the current local date and time of the operator's machine, and the same instant in UTC.",
            json!({"type": "object", "properties": {}}),
        )
    }

    async fn call(&self, _args: Value) -> Result<String, ToolError> {
        let local = Local::now();
        let out = json!({
            "local_time": local.format("%Y-%m-%d %H:%M:%S").to_string(),
            "utc_offset": local.format("%:z").to_string(),
            "utc_time": local.with_timezone(&Utc).to_rfc3339(),
        });
        serde_json::to_string_pretty(&out).map_err(|e| ToolError::Failed(e.to_string()))
    }
}
