//! Command Session Executor - runs a command sequence on one device
//!
//! # Execution Modes
//!
//! ```text
//! one-shot:     connect → exec(commands) → read until EOF → close
//!
//! interactive:  connect → open shell
//!                  for each command:
//!                     send ─► settle delay ─► drain (poll every drain_interval)
//!               close
//! ```
//!
//! Every failure is folded into the returned [`DeviceOutcome`]; nothing here
//! can fail a sibling device or the batch. Each transport call is bounded
//! here as well, so a connector that never answers still yields an outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, warn};

use super::transport::{ConnectTarget, DeviceConnector, DeviceError, DeviceSession, ShellChannel};
use crate::clock::{Clock, TokioClock};
use crate::dispatch::{DeviceOutcome, ExecutionMode};
use crate::inventory::{Credential, Device};
use crate::metrics::{DEVICE_SESSIONS, DEVICE_SESSION_DURATION};

/// Timing knobs for device sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Bound on TCP connect plus authentication
    pub connect_timeout: Duration,
    /// Bound on reading a one-shot response, and on draining one interactive command
    pub read_timeout: Duration,
    /// Wait after each interactive send before reading
    pub settle_delay: Duration,
    /// Pause between reads while output keeps arriving
    pub drain_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            drain_interval: Duration::from_millis(500),
        }
    }
}

/// Opens one session per device and runs a batch's commands on it
pub struct SessionExecutor {
    connector: Arc<dyn DeviceConnector>,
    clock: Arc<dyn Clock>,
    settings: ExecutorSettings,
}

impl SessionExecutor {
    pub fn new(connector: Arc<dyn DeviceConnector>, settings: ExecutorSettings) -> Self {
        Self::with_clock(connector, settings, Arc::new(TokioClock::new()))
    }

    pub fn with_clock(
        connector: Arc<dyn DeviceConnector>,
        settings: ExecutorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connector,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run `commands` on `device` and report the outcome
    pub async fn run(
        &self,
        device: &Device,
        credential: &Credential,
        mode: ExecutionMode,
        commands: &[String],
    ) -> DeviceOutcome {
        let start = Instant::now();
        let result = self.try_run(device, credential, mode, commands).await;
        let elapsed = start.elapsed().as_secs_f64();
        DEVICE_SESSION_DURATION
            .with_label_values(&[mode.as_str()])
            .observe(elapsed);

        match result {
            Ok(output) => {
                DEVICE_SESSIONS
                    .with_label_values(&[mode.as_str(), "success"])
                    .inc();
                debug!(device = %device.name, bytes = output.len(), "device commands completed");
                DeviceOutcome::success(&device.name, device.management_ip.clone(), output)
            }
            Err(e) => {
                DEVICE_SESSIONS
                    .with_label_values(&[mode.as_str(), "error"])
                    .inc();
                warn!(device = %device.name, error = %e, "device commands failed");
                DeviceOutcome::error(&device.name, device.management_ip.clone(), e.to_string())
            }
        }
    }

    async fn try_run(
        &self,
        device: &Device,
        credential: &Credential,
        mode: ExecutionMode,
        commands: &[String],
    ) -> Result<String, DeviceError> {
        let address = device
            .management_ip
            .as_deref()
            .ok_or_else(|| DeviceError::MissingAddress(device.name.clone()))?;

        let connect_timeout = self.settings.connect_timeout;
        let connecting = self.connector.connect(ConnectTarget {
            device: &device.name,
            address,
            credential,
            connect_timeout,
            read_timeout: self.settings.read_timeout,
        });
        let mut session = timeout(connect_timeout, connecting)
            .await
            .map_err(|_| DeviceError::ConnectTimeout {
                address: address.to_string(),
                after: connect_timeout,
            })??;

        let result = match mode {
            ExecutionMode::OneShot => self.run_one_shot(session.as_mut(), commands).await,
            ExecutionMode::Interactive => self.run_interactive(session.as_mut(), commands).await,
        };
        if timeout(self.settings.read_timeout, session.close()).await.is_err() {
            debug!(device = %device.name, "session close timed out");
        }
        result
    }

    /// Run one transport call, failing with `ReadTimeout` past the read timeout
    async fn bounded<T>(&self, call: impl Future<Output = Result<T, DeviceError>>) -> Result<T, DeviceError> {
        let limit = self.settings.read_timeout;
        timeout(limit, call)
            .await
            .map_err(|_| DeviceError::ReadTimeout(limit))?
    }

    async fn run_one_shot(
        &self,
        session: &mut dyn DeviceSession,
        commands: &[String],
    ) -> Result<String, DeviceError> {
        let command = commands.join("\n");
        self.bounded(session.exec(&command, self.settings.read_timeout))
            .await
    }

    async fn run_interactive(
        &self,
        session: &mut dyn DeviceSession,
        commands: &[String],
    ) -> Result<String, DeviceError> {
        let mut shell = self.bounded(session.open_shell()).await?;
        let result = self.drive_shell(shell.as_mut(), commands).await;
        let _ = timeout(self.settings.read_timeout, shell.close()).await;
        result
    }

    async fn drive_shell(
        &self,
        shell: &mut dyn ShellChannel,
        commands: &[String],
    ) -> Result<String, DeviceError> {
        let mut output = String::new();
        for command in commands {
            self.bounded(shell.send_line(command)).await?;
            self.clock.sleep(self.settings.settle_delay).await;

            let draining_since = self.clock.now();
            while let Some(chunk) = self.bounded(shell.read_available()).await? {
                output.push_str(&chunk);
                if self.clock.now().saturating_sub(draining_since) >= self.settings.read_timeout {
                    return Err(DeviceError::ReadTimeout(self.settings.read_timeout));
                }
                self.clock.sleep(self.settings.drain_interval).await;
            }
        }
        Ok(output)
    }
}
