//! Operator credential resolution
//!
//! A single username/password pair is shared by every device in a batch. It
//! is looked up in a [`SecretStore`] each time a batch runs and is never
//! cached or written anywhere.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Errors raised while resolving credentials
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("secret '{0}' not found")]
    NotFound(String),
    #[error("secret '{name}' is missing a non-empty '{field}' field")]
    Incomplete { name: String, field: &'static str },
    #[error("secret store error: {0}")]
    Store(String),
    #[error("secret '{name}' is not valid JSON: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Username/password pair for device logins
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A source of named JSON secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret by name; `Ok(None)` when it does not exist
    async fn get_secret(&self, name: &str) -> Result<Option<Value>, CredentialError>;
}

/// Secrets kept in a local JSON document of `{ name: { ... } }`
///
/// The file is read on every lookup.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<Value>, CredentialError> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CredentialError::Store(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let mut doc: Value = serde_json::from_str(&json).map_err(|source| CredentialError::Parse {
            name: name.to_string(),
            source,
        })?;
        Ok(doc.get_mut(name).map(Value::take))
    }
}

/// Secrets passed as JSON in environment variables
///
/// The secret `routers` is read from `{prefix}ROUTERS`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub const DEFAULT_PREFIX: &'static str = "NETASSIST_SECRET_";

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable_name(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<Value>, CredentialError> {
        let Ok(raw) = std::env::var(self.variable_name(name)) else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| CredentialError::Parse {
                name: name.to_string(),
                source,
            })
    }
}

/// Resolves the shared device credential from a secret store
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
    secret_name: String,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn SecretStore>, secret_name: impl Into<String>) -> Self {
        Self {
            store,
            secret_name: secret_name.into(),
        }
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// Fetch and validate the credential
    pub async fn resolve(&self) -> Result<Credential, CredentialError> {
        let name = &self.secret_name;
        let secret = self
            .store
            .get_secret(name)
            .await?
            .ok_or_else(|| CredentialError::NotFound(name.clone()))?;

        let field = |key: &'static str| -> Result<String, CredentialError> {
            secret
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| CredentialError::Incomplete {
                    name: name.clone(),
                    field: key,
                })
        };

        Ok(Credential::new(field("username")?, field("password")?))
    }
}
