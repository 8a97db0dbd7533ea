//! Static device inventory and operator credentials
//!
//! Both are leaves of the command path: the dispatcher loads the inventory and
//! resolves one credential pair per batch, then hands them read-only to every
//! device task.

pub mod credentials;
pub mod registry;

pub use credentials::{
    Credential, CredentialError, CredentialResolver, EnvSecretStore, FileSecretStore, SecretStore,
};
pub use registry::{Device, DeviceRegistry, InventoryError, InventorySource};
