//! Multi-Device Dispatcher - fans a command batch out across devices
//!
//! # Batch Flow
//!
//! ```text
//! CommandBatch
//!      │
//!      ├── no targets ───────────────► Configuration error
//!      │
//!      ▼
//! InventorySource.load() ─► lookup(targets)
//!      │
//!      ├── nothing matched ──────────► Configuration error
//!      │
//!      ▼
//! CredentialResolver.resolve() (once) ─ failure ─► Configuration error
//!      │
//!      ▼
//! spawn one task per matched device ──► SessionExecutor.run()
//!      │
//!      ▼
//! join_all (barrier) ─► BatchReport { device → DeviceOutcome }
//! ```

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, info_span, warn, Instrument};

use super::batch::{BatchReport, CommandBatch, DeviceOutcome};
use crate::device::SessionExecutor;
use crate::inventory::{CredentialError, CredentialResolver, InventoryError, InventorySource};
use crate::metrics::COMMAND_BATCHES;

/// Batch-level failures; no device outcomes are produced
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<InventoryError> for DispatchError {
    fn from(e: InventoryError) -> Self {
        DispatchError::Configuration(format!("could not load device inventory: {}", e))
    }
}

impl From<CredentialError> for DispatchError {
    fn from(e: CredentialError) -> Self {
        DispatchError::Configuration(format!("could not resolve device credentials: {}", e))
    }
}

/// What happens to requested devices that are not in the inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmatchedDevicePolicy {
    /// Leave them out of the report without comment
    Drop,
    /// Add an explicit "not found" error outcome for each
    #[default]
    Report,
}

/// Runs command batches on many devices concurrently
pub struct DeviceDispatcher {
    inventory: InventorySource,
    credentials: CredentialResolver,
    executor: Arc<SessionExecutor>,
    unmatched: UnmatchedDevicePolicy,
}

impl DeviceDispatcher {
    pub fn new(
        inventory: InventorySource,
        credentials: CredentialResolver,
        executor: Arc<SessionExecutor>,
    ) -> Self {
        Self {
            inventory,
            credentials,
            executor,
            unmatched: UnmatchedDevicePolicy::default(),
        }
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedDevicePolicy) -> Self {
        self.unmatched = policy;
        self
    }

    /// Execute `batch` on every matched device and collect the outcomes
    ///
    /// Individual device failures are reported inside the [`BatchReport`];
    /// only configuration problems fail the whole call.
    pub async fn dispatch(&self, batch: CommandBatch) -> Result<BatchReport, DispatchError> {
        let mode = batch.mode;
        let result = self.dispatch_inner(batch).await;
        let outcome = if result.is_ok() { "dispatched" } else { "rejected" };
        COMMAND_BATCHES
            .with_label_values(&[mode.as_str(), outcome])
            .inc();
        if let Err(e) = &result {
            warn!(mode = %mode, error = %e, "command batch rejected");
        }
        result
    }

    async fn dispatch_inner(&self, batch: CommandBatch) -> Result<BatchReport, DispatchError> {
        if batch.targets.is_empty() {
            return Err(DispatchError::Configuration(
                "no target devices specified; provide a list of device names".to_string(),
            ));
        }

        let registry = self.inventory.load().await?;
        let matched = registry.lookup(&batch.targets);
        if matched.is_empty() {
            return Err(DispatchError::Configuration(format!(
                "none of the specified devices were found in the inventory: {}",
                batch.targets.join(", ")
            )));
        }

        let credential = Arc::new(self.credentials.resolve().await?);
        let commands = Arc::new(batch.commands);
        let mode = batch.mode;

        info!(
            mode = %mode,
            devices = matched.len(),
            commands = commands.len(),
            "dispatching command batch"
        );

        let (names, tasks): (Vec<_>, Vec<_>) = matched
            .into_values()
            .map(|device| {
                let executor = self.executor.clone();
                let credential = credential.clone();
                let commands = commands.clone();
                let span = info_span!("device_session", device = %device.name, mode = %mode);
                let name = device.name.clone();
                let task = tokio::spawn(
                    async move { executor.run(&device, &credential, mode, &commands).await }
                        .instrument(span),
                );
                (name, task)
            })
            .unzip();

        let mut report = BatchReport::new(mode);
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            let outcome = joined.unwrap_or_else(|e| {
                warn!(device = %name, error = %e, "device task aborted");
                DeviceOutcome::error(&name, None, format!("device task aborted: {}", e))
            });
            report.insert_matched(outcome);
        }

        for target in &batch.targets {
            if registry.get(target).is_some() {
                continue;
            }
            match self.unmatched {
                UnmatchedDevicePolicy::Drop => {
                    debug!(device = %target, "requested device not in inventory; skipped");
                }
                UnmatchedDevicePolicy::Report => {
                    report.insert(DeviceOutcome::error(
                        target,
                        None,
                        format!("device '{}' not found in inventory", target),
                    ));
                }
            }
        }

        info!(
            mode = %mode,
            succeeded = report.success_count(),
            failed = report.error_count(),
            "command batch finished"
        );
        Ok(report)
    }
}
