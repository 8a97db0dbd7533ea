//! Prometheus metrics for agent exchanges, tool rounds and device sessions
//!
//! All metrics live in the default registry; [`gather_text`] renders them in
//! the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Run Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Operator exchanges by final outcome.
    ///
    /// Labels:
    /// - outcome: "completed", "failed", "timeout", "unexpected_state", "cancelled", "error"
    pub static ref AGENT_EXCHANGES: CounterVec = register_counter_vec!(
        "netassist_agent_exchanges_total",
        "Operator exchanges with the agent service by outcome",
        &["outcome"]
    ).expect("failed to register AGENT_EXCHANGES metric");

    /// Run status retrievals issued by the poller.
    pub static ref RUN_POLLS: Counter = register_counter!(
        "netassist_run_polls_total",
        "Run status polls issued against the agent service"
    ).expect("failed to register RUN_POLLS metric");

    /// Time spent waiting for a run to become actionable or terminal.
    pub static ref RUN_WAIT_DURATION: Histogram = register_histogram!(
        "netassist_run_wait_seconds",
        "Time spent polling a run until it is actionable or terminal",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).expect("failed to register RUN_WAIT_DURATION metric");

    /// Tool-output rounds submitted back to the agent service.
    pub static ref TOOL_ROUNDS: Counter = register_counter!(
        "netassist_tool_rounds_total",
        "Tool-output rounds submitted to the agent service"
    ).expect("failed to register TOOL_ROUNDS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Tool Dispatch Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tool calls by tool name and status.
    ///
    /// Labels:
    /// - tool: registered tool name, or "unknown"
    /// - status: "success" or "error"
    pub static ref TOOL_CALLS: CounterVec = register_counter_vec!(
        "netassist_tool_calls_total",
        "Tool calls executed by tool and status",
        &["tool", "status"]
    ).expect("failed to register TOOL_CALLS metric");

    /// Tool call execution time.
    pub static ref TOOL_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "netassist_tool_call_seconds",
        "Tool call execution time",
        &["tool"]
    ).expect("failed to register TOOL_CALL_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Device Command Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Command batches by execution mode and outcome.
    ///
    /// Labels:
    /// - mode: "one_shot" or "interactive"
    /// - outcome: "dispatched" or "rejected"
    pub static ref COMMAND_BATCHES: CounterVec = register_counter_vec!(
        "netassist_command_batches_total",
        "Command batches by execution mode and outcome",
        &["mode", "outcome"]
    ).expect("failed to register COMMAND_BATCHES metric");

    /// Device sessions by execution mode and status.
    pub static ref DEVICE_SESSIONS: CounterVec = register_counter_vec!(
        "netassist_device_sessions_total",
        "Device command sessions by execution mode and status",
        &["mode", "status"]
    ).expect("failed to register DEVICE_SESSIONS metric");

    /// Device session duration, connect to close.
    pub static ref DEVICE_SESSION_DURATION: HistogramVec = register_histogram_vec!(
        "netassist_device_session_seconds",
        "Device command session duration from connect to close",
        &["mode"]
    ).expect("failed to register DEVICE_SESSION_DURATION metric");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
