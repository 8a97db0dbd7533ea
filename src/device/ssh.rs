//! SSH transport built on `russh`
//!
//! Password authentication only. Host identity checking is governed by an
//! explicit [`HostKeyPolicy`]; `AcceptUnknown` trusts any key the device
//! presents and should only be used on isolated lab networks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::transport::{ConnectTarget, DeviceConnector, DeviceError, DeviceSession, ShellChannel};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How long a shell read waits before reporting "nothing pending"
const DEFAULT_SHELL_POLL_WINDOW: Duration = Duration::from_millis(50);

/// Which server host keys are trusted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Trust any host key
    #[default]
    AcceptUnknown,
    /// Trust only these SHA-256 fingerprints (with or without `SHA256:`)
    Pinned(Vec<String>),
}

impl HostKeyPolicy {
    pub fn accepts(&self, fingerprint: &str) -> bool {
        match self {
            HostKeyPolicy::AcceptUnknown => true,
            HostKeyPolicy::Pinned(allowed) => {
                let presented = fingerprint.trim_start_matches("SHA256:");
                allowed
                    .iter()
                    .any(|f| f.trim_start_matches("SHA256:") == presented)
            }
        }
    }
}

struct HostKeyCheck {
    address: String,
    policy: HostKeyPolicy,
    rejected: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        if self.policy.accepts(&fingerprint) {
            debug!(address = %self.address, fingerprint = %fingerprint, "host key accepted");
            return Ok(true);
        }
        warn!(address = %self.address, fingerprint = %fingerprint, "host key rejected");
        if let Ok(mut slot) = self.rejected.lock() {
            *slot = Some(fingerprint);
        }
        Ok(false)
    }
}

/// Opens password-authenticated SSH sessions
#[derive(Debug, Clone)]
pub struct SshConnector {
    port: u16,
    host_keys: HostKeyPolicy,
    shell_poll_window: Duration,
}

impl SshConnector {
    pub fn new(host_keys: HostKeyPolicy) -> Self {
        Self {
            port: DEFAULT_SSH_PORT,
            host_keys,
            shell_poll_window: DEFAULT_SHELL_POLL_WINDOW,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(HostKeyPolicy::default())
    }
}

#[async_trait]
impl DeviceConnector for SshConnector {
    async fn connect(&self, target: ConnectTarget<'_>) -> Result<Box<dyn DeviceSession>, DeviceError> {
        let address = target.address.to_string();
        let rejected = Arc::new(Mutex::new(None));
        let handler = HostKeyCheck {
            address: address.clone(),
            policy: self.host_keys.clone(),
            rejected: rejected.clone(),
        };
        let config = Arc::new(client_config(target.connect_timeout + target.read_timeout));

        let connecting = client::connect(config, (target.address, self.port), handler);
        let mut handle = match timeout(target.connect_timeout, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let fingerprint = rejected.lock().ok().and_then(|mut slot| slot.take());
                return Err(match fingerprint {
                    Some(fingerprint) => DeviceError::HostKeyRejected {
                        address,
                        fingerprint,
                    },
                    None => DeviceError::Connect {
                        address,
                        message: e.to_string(),
                    },
                });
            }
            Err(_) => {
                return Err(DeviceError::ConnectTimeout {
                    address,
                    after: target.connect_timeout,
                })
            }
        };

        let authenticating = handle.authenticate_password(
            target.credential.username.clone(),
            target.credential.password().to_string(),
        );
        let authenticated = timeout(target.connect_timeout, authenticating)
            .await
            .map_err(|_| DeviceError::ConnectTimeout {
                address: address.clone(),
                after: target.connect_timeout,
            })?
            .map_err(|e| DeviceError::Connect {
                address: address.clone(),
                message: e.to_string(),
            })?;

        if !authenticated {
            return Err(DeviceError::Auth {
                username: target.credential.username.clone(),
            });
        }

        debug!(device = target.device, address = %address, "ssh session established");
        Ok(Box::new(SshSession {
            handle,
            channel_timeout: target.read_timeout,
            shell_poll_window: self.shell_poll_window,
        }))
    }
}

/// Client config that drops a connection after `inactivity` without traffic
fn client_config(inactivity: Duration) -> client::Config {
    client::Config {
        inactivity_timeout: Some(inactivity),
        ..Default::default()
    }
}

fn channel_error(e: russh::Error) -> DeviceError {
    DeviceError::Channel(e.to_string())
}

struct SshSession {
    handle: Handle<HostKeyCheck>,
    /// Bound on opening a channel and on each request made on it
    channel_timeout: Duration,
    shell_poll_window: Duration,
}

impl SshSession {
    async fn open_channel(&mut self) -> Result<Channel<Msg>, DeviceError> {
        timeout(self.channel_timeout, self.handle.channel_open_session())
            .await
            .map_err(|_| DeviceError::ReadTimeout(self.channel_timeout))?
            .map_err(channel_error)
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    async fn exec(&mut self, command: &str, read_timeout: Duration) -> Result<String, DeviceError> {
        let mut channel = self.open_channel().await?;
        timeout(read_timeout, channel.exec(true, command))
            .await
            .map_err(|_| DeviceError::ReadTimeout(read_timeout))?
            .map_err(channel_error)?;

        let collected = timeout(read_timeout, async {
            let mut output = Vec::new();
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => output.extend_from_slice(&data),
                    ChannelMsg::Eof | ChannelMsg::Close => break,
                    _ => {}
                }
            }
            output
        })
        .await;

        let _ = timeout(read_timeout, channel.close()).await;
        let output = collected.map_err(|_| DeviceError::ReadTimeout(read_timeout))?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn open_shell(&mut self) -> Result<Box<dyn ShellChannel>, DeviceError> {
        let channel = self.open_channel().await?;
        let limit = self.channel_timeout;
        timeout(limit, async {
            channel.request_pty(false, "vt100", 200, 48, 0, 0, &[]).await?;
            channel.request_shell(true).await?;
            Ok::<_, russh::Error>(())
        })
        .await
        .map_err(|_| DeviceError::ReadTimeout(limit))?
        .map_err(channel_error)?;

        Ok(Box::new(SshShell {
            channel,
            poll_window: self.shell_poll_window,
        }))
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(error = %e, "ssh disconnect failed");
        }
    }
}

struct SshShell {
    channel: Channel<Msg>,
    poll_window: Duration,
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
        let payload = format!("{}\n", line);
        self.channel
            .data(payload.as_bytes())
            .await
            .map_err(channel_error)
    }

    async fn read_available(&mut self) -> Result<Option<String>, DeviceError> {
        match timeout(self.poll_window, self.channel.wait()).await {
            Ok(Some(ChannelMsg::Data { data })) | Ok(Some(ChannelMsg::ExtendedData { data, .. })) => {
                Ok(Some(String::from_utf8_lossy(&data).into_owned()))
            }
            // Window adjustments and status messages carry no text
            Ok(Some(_)) => Ok(Some(String::new())),
            Ok(None) | Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) {
        let _ = self.channel.eof().await;
        let _ = self.channel.close().await;
    }
}
