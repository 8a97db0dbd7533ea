//! Remote command transport abstraction
//!
//! The executor only talks to these traits; [`crate::device::ssh`] provides
//! the production implementation and tests plug in scripted devices.

use std::time::Duration;

use async_trait::async_trait;

use crate::inventory::Credential;

/// Per-device transport failures
///
/// Every variant is reported as an error outcome for that one device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("missing management_ip for device: {0}")]
    MissingAddress(String),
    #[error("connection to {address} failed: {message}")]
    Connect { address: String, message: String },
    #[error("connection to {address} timed out after {after:?}")]
    ConnectTimeout { address: String, after: Duration },
    #[error("authentication failed for user '{username}'")]
    Auth { username: String },
    #[error("host key for {address} rejected (fingerprint {fingerprint})")]
    HostKeyRejected { address: String, fingerprint: String },
    #[error("channel error: {0}")]
    Channel(String),
    #[error("no response within {0:?}")]
    ReadTimeout(Duration),
}

/// Everything needed to open a session to one device
#[derive(Debug, Clone, Copy)]
pub struct ConnectTarget<'a> {
    pub device: &'a str,
    pub address: &'a str,
    pub credential: &'a Credential,
    pub connect_timeout: Duration,
    /// Bound on each channel setup and read once the session is up
    pub read_timeout: Duration,
}

/// Opens authenticated sessions to devices
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, target: ConnectTarget<'_>) -> Result<Box<dyn DeviceSession>, DeviceError>;
}

/// An authenticated session to one device
#[async_trait]
pub trait DeviceSession: Send {
    /// Run one command and return everything it printed
    async fn exec(&mut self, command: &str, read_timeout: Duration) -> Result<String, DeviceError>;

    /// Open a persistent interactive shell
    async fn open_shell(&mut self) -> Result<Box<dyn ShellChannel>, DeviceError>;

    async fn close(&mut self);
}

/// A persistent interactive shell on a device
#[async_trait]
pub trait ShellChannel: Send {
    /// Send one line; the newline is appended by the channel
    async fn send_line(&mut self, line: &str) -> Result<(), DeviceError>;

    /// Return output that is immediately available, or `None` when the
    /// device has nothing pending
    async fn read_available(&mut self) -> Result<Option<String>, DeviceError>;

    async fn close(&mut self);
}
