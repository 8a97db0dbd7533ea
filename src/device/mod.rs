//! Remote command execution on network devices
//!
//! - `transport` - connector/session/shell traits and the device error type
//! - `ssh` - `russh` implementation of the transport
//! - `executor` - one-shot and interactive command sequencing for one device

pub mod executor;
pub mod ssh;
pub mod transport;

pub use executor::{ExecutorSettings, SessionExecutor};
pub use ssh::{HostKeyPolicy, SshConnector};
pub use transport::{ConnectTarget, DeviceConnector, DeviceError, DeviceSession, ShellChannel};
