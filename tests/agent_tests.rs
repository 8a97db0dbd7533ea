//! Integration tests for the session manager
//!
//! The agent service is a scripted stub and time is a manual clock, so
//! multi-minute polling scenarios finish instantly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use netassist::agent::types::{RunObject, ThreadMessage, ThreadObject, ToolDefinition, ToolOutput};
use netassist::agent::{AgentConfig, AgentError, AgentService, RunRequest, ServiceError, SessionManager};
use netassist::clock::{Clock, ManualClock};
use netassist::tools::{Tool, ToolDispatcher, ToolError, ToolRegistry};
use tokio_util::sync::CancellationToken;

/// Agent service that replays a fixed sequence of run states
#[derive(Default)]
struct ScriptedService {
    threads: Mutex<u32>,
    /// Statuses returned by retrieve_run; the last one repeats forever
    script: Mutex<VecDeque<Value>>,
    posted: Mutex<Vec<String>>,
    run_requests: Mutex<Vec<Value>>,
    submissions: Mutex<Vec<Vec<ToolOutput>>>,
    messages: Vec<Value>,
}

impl ScriptedService {
    fn new(script: Vec<Value>, messages: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            messages,
            ..Default::default()
        })
    }
}

fn run(status: &str) -> Value {
    json!({"id": "run_1", "thread_id": "thread_1", "status": status})
}

fn requires_action(calls: &[(&str, &str, Value)]) -> Value {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| {
            json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": args.to_string()}
            })
        })
        .collect();
    json!({
        "id": "run_1",
        "thread_id": "thread_1",
        "status": "requires_action",
        "required_action": {
            "type": "submit_tool_outputs",
            "submit_tool_outputs": {"tool_calls": tool_calls}
        }
    })
}

fn message(role: &str, run_id: &str, text: &str) -> Value {
    json!({
        "id": format!("msg_{}", text.len()),
        "role": role,
        "run_id": run_id,
        "content": [{"type": "text", "text": {"value": text, "annotations": []}}]
    })
}

#[async_trait]
impl AgentService for ScriptedService {
    async fn create_thread(&self) -> Result<ThreadObject, ServiceError> {
        let mut threads = self.threads.lock().unwrap();
        *threads += 1;
        Ok(ThreadObject {
            id: format!("thread_{}", threads),
        })
    }

    async fn post_message(&self, _thread_id: &str, content: &str) -> Result<ThreadMessage, ServiceError> {
        self.posted.lock().unwrap().push(content.to_string());
        Ok(ThreadMessage {
            id: "msg_user".to_string(),
            role: "user".to_string(),
            run_id: None,
            content: vec![],
        })
    }

    async fn create_run(&self, _thread_id: &str, request: &RunRequest) -> Result<RunObject, ServiceError> {
        self.run_requests.lock().unwrap().push(serde_json::to_value(request)?);
        Ok(serde_json::from_value(run("queued"))?)
    }

    async fn retrieve_run(&self, _thread_id: &str, _run_id: &str) -> Result<RunObject, ServiceError> {
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script[0].clone()
        };
        Ok(serde_json::from_value(next)?)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        _run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunObject, ServiceError> {
        self.submissions.lock().unwrap().push(outputs.to_vec());
        Ok(serde_json::from_value(run("queued"))?)
    }

    async fn list_messages(&self, _thread_id: &str, _run_id: Option<&str>) -> Result<Vec<ThreadMessage>, ServiceError> {
        self.messages
            .iter()
            .map(|m| serde_json::from_value(m.clone()).map_err(ServiceError::from))
            .collect()
    }
}

/// Returns the `router` argument, counting invocations
#[derive(Default)]
struct Lookup {
    calls: Mutex<u32>,
}

#[async_trait]
impl Tool for Lookup {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "lookup",
            "Look up a router",
            json!({"type": "object", "properties": {"router": {"type": "string"}}}),
        )
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        *self.calls.lock().unwrap() += 1;
        args["router"]
            .as_str()
            .map(|r| format!("{} is up", r))
            .ok_or_else(|| ToolError::InvalidArguments("router is required".to_string()))
    }
}

/// Tool that fires the exchange's cancel token and then never returns
struct Hangs {
    cancel: Mutex<Option<CancellationToken>>,
}

#[async_trait]
impl Tool for Hangs {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function("hangs", "Never finishes", json!({"type": "object"}))
    }

    async fn call(&self, _args: Value) -> Result<String, ToolError> {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
        std::future::pending().await
    }
}

fn manager(service: Arc<ScriptedService>, tool: Arc<dyn Tool>) -> (SessionManager, Arc<ManualClock>) {
    let mut registry = ToolRegistry::new();
    registry.register(tool);
    let clock = Arc::new(ManualClock::new());
    let config = AgentConfig {
        assistant_id: "asst_net".to_string(),
        ..AgentConfig::default()
    };
    let manager = SessionManager::with_clock(service, ToolDispatcher::new(registry), config, clock.clone());
    (manager, clock)
}

/// Test that AgentConfig has the documented defaults
#[test]
fn test_agent_config_defaults() {
    let config = AgentConfig::default();
    assert_eq!(config.poll_interval, Duration::from_secs(1));
    assert_eq!(config.run_timeout, Duration::from_secs(300));
    assert!(config.model.is_none());
    assert!(config.intro_message.is_some());
}

#[tokio::test]
async fn test_multi_round_exchange() {
    let service = ScriptedService::new(
        vec![
            run("in_progress"),
            requires_action(&[
                ("call_a", "lookup", json!({"router": "r1"})),
                ("call_b", "not_a_tool", json!({})),
            ]),
            run("in_progress"),
            requires_action(&[("call_c", "lookup", json!({"router": "r2"}))]),
            run("completed"),
        ],
        vec![
            message("user", "run_1", "check r1 and r2"),
            message("assistant", "run_0", "an older answer"),
            message("assistant", "run_1", "Both routers are up."),
        ],
    );
    let tool = Arc::new(Lookup::default());
    let (mut manager, _clock) = manager(service.clone(), tool.clone());

    let exchange = manager.send("check r1 and r2").await.unwrap();

    assert_eq!(exchange.run_id, "run_1");
    assert_eq!(exchange.tool_rounds, 2);
    assert_eq!(exchange.tool_calls_made, 3);
    assert_eq!(exchange.replies, vec!["Both routers are up."]);
    assert_eq!(*tool.calls.lock().unwrap(), 2);

    let submissions = service.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].len(), 2);
    assert_eq!(submissions[0][0].tool_call_id, "call_a");
    assert_eq!(submissions[0][0].output, "r1 is up");
    assert_eq!(submissions[0][1].tool_call_id, "call_b");
    assert_eq!(submissions[0][1].output, "Error: unknown tool: not_a_tool");
    assert_eq!(submissions[1][0].output, "r2 is up");

    let requests = service.run_requests.lock().unwrap();
    assert_eq!(requests[0]["assistant_id"], "asst_net");
    assert_eq!(requests[0]["tools"][0]["function"]["name"], "lookup");

    let session = manager.session().unwrap();
    assert!(session.current_run.is_none());
    let roles: Vec<_> = session.messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["assistant", "user", "assistant"]);
    assert_eq!(session.last_reply(), Some("Both routers are up."));
}

#[tokio::test]
async fn test_run_timeout_at_deadline() {
    let service = ScriptedService::new(vec![run("in_progress")], vec![]);
    let (mut manager, clock) = manager(service, Arc::new(Lookup::default()));

    let err = manager.send("hello").await.unwrap_err();

    assert!(matches!(err, AgentError::RunTimeout { .. }), "{:?}", err);
    assert!(clock.now() >= Duration::from_secs(300));
    assert!(manager.session().unwrap().current_run.is_none());
}

#[tokio::test]
async fn test_unexpected_status_is_reported() {
    let service = ScriptedService::new(vec![run("in_progress"), run("expired")], vec![]);
    let (mut manager, _) = manager(service, Arc::new(Lookup::default()));

    let err = manager.send("hello").await.unwrap_err();
    match err {
        AgentError::UnexpectedRunState { run_id, status } => {
            assert_eq!(run_id, "run_1");
            assert_eq!(status, "expired");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_run_surfaces_service_error() {
    let failed = json!({
        "id": "run_1",
        "thread_id": "thread_1",
        "status": "failed",
        "last_error": {"code": "rate_limit_exceeded", "message": "slow down"}
    });
    let service = ScriptedService::new(vec![failed], vec![]);
    let (mut manager, _) = manager(service, Arc::new(Lookup::default()));

    let err = manager.send("hello").await.unwrap_err();
    assert!(matches!(err, AgentError::RunFailed { .. }));
    assert!(err.to_string().contains("rate_limit_exceeded: slow down"));
}

#[tokio::test]
async fn test_send_starts_session_and_reset_replaces_it() {
    let service = ScriptedService::new(
        vec![run("completed")],
        vec![message("assistant", "run_1", "hi there")],
    );
    let (mut manager, _) = manager(service.clone(), Arc::new(Lookup::default()));
    assert!(manager.session().is_none());

    manager.send("hello").await.unwrap();
    let first_id = manager.session().unwrap().id.clone();
    assert_eq!(first_id, "thread_1");
    assert_eq!(manager.session().unwrap().messages.len(), 3);

    let session = manager.reset().await.unwrap();
    assert_eq!(session.id, "thread_2");
    // only the greeting survives a restart
    assert_eq!(session.messages.len(), 1);
    assert_eq!(*service.posted.lock().unwrap(), vec!["hello"]);
}

#[tokio::test]
async fn test_cancellation_aborts_exchange_only() {
    let service = ScriptedService::new(vec![run("completed")], vec![]);
    let (mut manager, _) = manager(service, Arc::new(Lookup::default()));

    manager.cancel_token().cancel();
    let err = manager.send("hello").await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));

    // the token is replaced, so the next exchange runs normally
    let exchange = manager.send("hello again").await.unwrap();
    assert!(exchange.replies.is_empty());
}

#[tokio::test]
async fn test_cancellation_interrupts_tool_round() {
    let service = ScriptedService::new(vec![requires_action(&[("call_h", "hangs", json!({}))])], vec![]);
    let tool = Arc::new(Hangs {
        cancel: Mutex::new(None),
    });
    let (mut manager, _) = manager(service.clone(), tool.clone());
    *tool.cancel.lock().unwrap() = Some(manager.cancel_token());

    let result = tokio::time::timeout(Duration::from_secs(5), manager.send("hello"))
        .await
        .expect("tool round was not interrupted");

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(service.submissions.lock().unwrap().is_empty());
    assert!(manager.session().unwrap().current_run.is_none());
}
