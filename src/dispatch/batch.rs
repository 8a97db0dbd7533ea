//! Command batches and their per-device results

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

/// How a batch is executed on each device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One request/response exchange per device ("show" style)
    OneShot,
    /// Persistent shell, commands sent one at a time (configuration style)
    Interactive,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::OneShot => "one_shot",
            ExecutionMode::Interactive => "interactive",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands to run on a set of devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    pub commands: Vec<String>,
    pub targets: Vec<String>,
    pub mode: ExecutionMode,
}

impl CommandBatch {
    /// A single command string executed once per device
    pub fn one_shot(command: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            commands: vec![command.into()],
            targets,
            mode: ExecutionMode::OneShot,
        }
    }

    /// An ordered command sequence sent through an interactive shell
    pub fn interactive(commands: Vec<String>, targets: Vec<String>) -> Self {
        Self {
            commands,
            targets,
            mode: ExecutionMode::Interactive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Error => "error",
        }
    }
}

/// Result of running a batch on one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceOutcome {
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_ip: Option<String>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceOutcome {
    pub fn success(
        device: impl Into<String>,
        management_ip: Option<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            management_ip,
            status: OutcomeStatus::Success,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(
        device: impl Into<String>,
        management_ip: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            management_ip,
            status: OutcomeStatus::Error,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Aggregated outcomes of one batch, keyed by device name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub mode: ExecutionMode,
    pub outcomes: BTreeMap<String, DeviceOutcome>,
    /// Devices found in the inventory and handed to the executor
    #[serde(skip)]
    matched: BTreeSet<String>,
}

impl BatchReport {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            outcomes: BTreeMap::new(),
            matched: BTreeSet::new(),
        }
    }

    /// Record the outcome of a device that was found in the inventory
    pub fn insert_matched(&mut self, outcome: DeviceOutcome) {
        self.matched.insert(outcome.device.clone());
        self.insert(outcome);
    }

    pub fn insert(&mut self, outcome: DeviceOutcome) {
        self.outcomes.insert(outcome.device.clone(), outcome);
    }

    pub fn get(&self, device: &str) -> Option<&DeviceOutcome> {
        self.outcomes.get(device)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Names of every device with an outcome, including unknown names under `Report`
    pub fn devices(&self) -> Vec<String> {
        self.outcomes.keys().cloned().collect()
    }

    /// Names of the inventory devices the batch ran on
    pub fn matched_devices(&self) -> Vec<String> {
        self.matched.iter().cloned().collect()
    }
}
