//! Shared stubs for the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use netassist::clock::ManualClock;
use netassist::device::{
    ConnectTarget, DeviceConnector, DeviceError, DeviceSession, ExecutorSettings, SessionExecutor, ShellChannel,
};
use netassist::dispatch::DeviceDispatcher;
use netassist::inventory::{CredentialError, CredentialResolver, Device, DeviceRegistry, InventorySource, SecretStore};

/// How a mock device answers a connection attempt
#[derive(Debug, Clone)]
pub enum Behavior {
    Respond,
    Refuse,
    /// Hang for the given time, then refuse
    SlowRefuse(Duration),
    /// Accept the login, then never answer
    StallAfterLogin,
}

/// Devices keyed by management address
pub struct MockNetwork {
    behaviors: HashMap<String, Behavior>,
    pub connects: AtomicUsize,
    /// Address → time from network creation until its output was produced
    pub finished: Arc<Mutex<HashMap<String, Duration>>>,
    started: Instant,
}

impl MockNetwork {
    pub fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
        Arc::new(Self {
            behaviors: behaviors
                .iter()
                .map(|(addr, b)| (addr.to_string(), b.clone()))
                .collect(),
            connects: AtomicUsize::new(0),
            finished: Arc::new(Mutex::new(HashMap::new())),
            started: Instant::now(),
        })
    }
}

#[async_trait]
impl DeviceConnector for MockNetwork {
    async fn connect(&self, target: ConnectTarget<'_>) -> Result<Box<dyn DeviceSession>, DeviceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = || DeviceError::Connect {
            address: target.address.to_string(),
            message: "connection refused".to_string(),
        };
        match self.behaviors.get(target.address) {
            Some(Behavior::Respond) => Ok(Box::new(MockSession {
                address: target.address.to_string(),
                finished: self.finished.clone(),
                started: self.started,
                stalled: false,
            })),
            Some(Behavior::StallAfterLogin) => Ok(Box::new(MockSession {
                address: target.address.to_string(),
                finished: self.finished.clone(),
                started: self.started,
                stalled: true,
            })),
            Some(Behavior::SlowRefuse(delay)) => {
                tokio::time::sleep(*delay).await;
                Err(refused())
            }
            Some(Behavior::Refuse) | None => Err(refused()),
        }
    }
}

struct MockSession {
    address: String,
    finished: Arc<Mutex<HashMap<String, Duration>>>,
    started: Instant,
    stalled: bool,
}

#[async_trait]
impl DeviceSession for MockSession {
    async fn exec(&mut self, command: &str, _read_timeout: Duration) -> Result<String, DeviceError> {
        if self.stalled {
            return std::future::pending().await;
        }
        self.finished
            .lock()
            .unwrap()
            .insert(self.address.clone(), self.started.elapsed());
        Ok(format!("{} ran: {}", self.address, command))
    }

    async fn open_shell(&mut self) -> Result<Box<dyn ShellChannel>, DeviceError> {
        if self.stalled {
            return std::future::pending().await;
        }
        Ok(Box::new(MockShell {
            prompt: format!("{}#", self.address),
            pending: VecDeque::new(),
        }))
    }

    async fn close(&mut self) {}
}

/// Echoes each line back behind a prompt, split into two chunks
struct MockShell {
    prompt: String,
    pending: VecDeque<String>,
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
        self.pending.push_back(format!("{}{}", self.prompt, line));
        self.pending.push_back("\r\n".to_string());
        Ok(())
    }

    async fn read_available(&mut self) -> Result<Option<String>, DeviceError> {
        Ok(self.pending.pop_front())
    }

    async fn close(&mut self) {}
}

/// In-memory secret store that counts lookups
pub struct StaticSecrets {
    secrets: Value,
    pub lookups: AtomicUsize,
}

impl StaticSecrets {
    pub fn routers() -> Arc<Self> {
        Self::with(json!({"routers": {"username": "netops", "password": "hunter2"}}))
    }

    pub fn with(secrets: Value) -> Arc<Self> {
        Arc::new(Self {
            secrets,
            lookups: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SecretStore for StaticSecrets {
    async fn get_secret(&self, name: &str) -> Result<Option<Value>, CredentialError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.secrets.get(name).cloned())
    }
}

/// Inventory of `(name, management address)` pairs
pub fn inventory(devices: &[(&str, Option<&str>)]) -> InventorySource {
    InventorySource::Static(DeviceRegistry::from_devices(devices.iter().map(|(name, ip)| Device {
        name: name.to_string(),
        management_ip: ip.map(str::to_string),
    })))
}

/// Dispatcher over mock devices; waits inside sessions use a manual clock
pub fn dispatcher(
    network: Arc<MockNetwork>,
    secrets: Arc<StaticSecrets>,
    inventory: InventorySource,
) -> DeviceDispatcher {
    dispatcher_with_settings(network, secrets, inventory, ExecutorSettings::default())
}

pub fn dispatcher_with_settings(
    network: Arc<MockNetwork>,
    secrets: Arc<StaticSecrets>,
    inventory: InventorySource,
    settings: ExecutorSettings,
) -> DeviceDispatcher {
    let executor = SessionExecutor::with_clock(network, settings, Arc::new(ManualClock::new()));
    DeviceDispatcher::new(inventory, CredentialResolver::new(secrets, "routers"), Arc::new(executor))
}
