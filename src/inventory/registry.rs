//! Device registry loaded from a static inventory document
//!
//! The document has the shape:
//!
//! ```json
//! { "routers": { "router1": { "management_ip": "10.0.0.1" } } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors raised while loading the inventory
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to read inventory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid inventory document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("inventory contains no devices")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct InventoryDocument {
    routers: BTreeMap<String, DeviceRecord>,
}

#[derive(Debug, Deserialize)]
struct DeviceRecord {
    #[serde(default)]
    management_ip: Option<String>,
}

/// A managed network device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    /// Absent when the inventory entry has no `management_ip`
    pub management_ip: Option<String>,
}

impl Device {
    pub fn new(name: impl Into<String>, management_ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            management_ip: Some(management_ip.into()),
        }
    }
}

/// Read-only name → device mapping
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
}

impl DeviceRegistry {
    pub fn from_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.name.clone(), d)).collect(),
        }
    }

    /// Parse an inventory document
    pub fn from_json(json: &str) -> Result<Self, InventoryError> {
        let doc: InventoryDocument = serde_json::from_str(json)?;
        if doc.routers.is_empty() {
            return Err(InventoryError::Empty);
        }
        let devices = doc.routers.into_iter().map(|(name, record)| Device {
            name,
            management_ip: record.management_ip.filter(|ip| !ip.trim().is_empty()),
        });
        Ok(Self::from_devices(devices))
    }

    /// Load an inventory document from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| InventoryError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&json)
    }

    /// Return the subset of `names` present in the registry
    ///
    /// Unknown names are simply absent from the result.
    pub fn lookup<S: AsRef<str>>(&self, names: &[S]) -> BTreeMap<String, Device> {
        names
            .iter()
            .filter_map(|name| self.devices.get(name.as_ref()))
            .map(|device| (device.name.clone(), device.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Where the dispatcher gets its registry from
///
/// `File` re-reads the document on every batch so inventory edits take effect
/// without a restart.
#[derive(Debug, Clone)]
pub enum InventorySource {
    File(PathBuf),
    Static(DeviceRegistry),
}

impl InventorySource {
    pub async fn load(&self) -> Result<DeviceRegistry, InventoryError> {
        match self {
            InventorySource::File(path) => DeviceRegistry::load(path).await,
            InventorySource::Static(registry) => Ok(registry.clone()),
        }
    }
}
