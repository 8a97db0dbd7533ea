//! Command-line and environment configuration
//!
//! Every option can come from a flag or an environment variable; `main`
//! loads a `.env` file first so local setups need no flags at all.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::agent::{AgentConfig, DEFAULT_BASE_URL};
use crate::device::{ExecutorSettings, HostKeyPolicy};
use crate::dispatch::UnmatchedDevicePolicy;
use crate::inventory::{EnvSecretStore, FileSecretStore, SecretStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HostKeyMode {
    /// Trust any host key presented by a router
    AcceptUnknown,
    /// Trust only the fingerprints given with --host-key
    Pinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnmatchedMode {
    /// Leave unknown router names out of the results
    Drop,
    /// Report unknown router names as errors
    Report,
}

/// Network assistant configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "netassist")]
#[command(about = "Chat with a tool-calling agent that can inspect and configure your routers", long_about = None)]
pub struct AppConfig {
    /// API key for the agent service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Assistant that runs are started against
    #[arg(long, env = "ASSISTANT_ID")]
    pub assistant_id: String,

    /// Model override for runs
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Router inventory document
    #[arg(long, env = "NETASSIST_INVENTORY", default_value = "devices/routers.json")]
    pub inventory: PathBuf,

    /// JSON file of secrets; environment variables are used when absent
    #[arg(long, env = "NETASSIST_SECRETS_FILE")]
    pub secrets_file: Option<PathBuf>,

    /// Secret holding the router username and password
    #[arg(long, env = "NETASSIST_SECRET_NAME", default_value = "routers")]
    pub secret_name: String,

    /// LibreNMS API root, e.g. https://librenms.example.net/api/v0
    #[arg(long, env = "LIBRENMS_BASE_URL")]
    pub librenms_url: Option<String>,

    #[arg(long, env = "LIBRENMS_API_TOKEN", hide_env_values = true)]
    pub librenms_token: Option<String>,

    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[arg(long, default_value_t = 300)]
    pub run_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub read_timeout_secs: u64,

    #[arg(long, default_value_t = 2000)]
    pub settle_delay_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub drain_interval_ms: u64,

    #[arg(long, value_enum, env = "NETASSIST_HOST_KEY_MODE", default_value = "accept-unknown")]
    pub host_key_mode: HostKeyMode,

    /// Trusted SHA-256 host key fingerprint (repeatable)
    #[arg(long = "host-key", env = "NETASSIST_HOST_KEYS", value_delimiter = ',')]
    pub host_keys: Vec<String>,

    #[arg(long, value_enum, env = "NETASSIST_UNMATCHED", default_value = "report")]
    pub unmatched: UnmatchedMode,

    /// OTLP collector for trace export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Skip the greeting at session start
    #[arg(long)]
    pub no_intro: bool,
}

impl AppConfig {
    pub fn agent_config(&self) -> AgentConfig {
        let defaults = AgentConfig::default();
        AgentConfig {
            assistant_id: self.assistant_id.clone(),
            model: self.model.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            intro_message: if self.no_intro { None } else { defaults.intro_message },
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            drain_interval: Duration::from_millis(self.drain_interval_ms),
        }
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        match self.host_key_mode {
            HostKeyMode::AcceptUnknown => HostKeyPolicy::AcceptUnknown,
            HostKeyMode::Pinned => HostKeyPolicy::Pinned(self.host_keys.clone()),
        }
    }

    pub fn unmatched_policy(&self) -> UnmatchedDevicePolicy {
        match self.unmatched {
            UnmatchedMode::Drop => UnmatchedDevicePolicy::Drop,
            UnmatchedMode::Report => UnmatchedDevicePolicy::Report,
        }
    }

    pub fn secret_store(&self) -> Arc<dyn SecretStore> {
        match &self.secrets_file {
            Some(path) => Arc::new(FileSecretStore::new(path.clone())),
            None => Arc::new(EnvSecretStore::default()),
        }
    }

    /// LibreNMS URL and token, when both are configured
    pub fn librenms(&self) -> Option<(&str, &str)> {
        match (&self.librenms_url, &self.librenms_token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> AppConfig {
        let mut args = vec!["netassist", "--api-key", "sk-test", "--assistant-id", "asst_1"];
        args.extend_from_slice(extra);
        AppConfig::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = parse(&["--host-key-mode", "accept-unknown", "--unmatched", "report"]);
        assert_eq!(config.executor_settings(), ExecutorSettings::default());
        let agent = config.agent_config();
        assert_eq!(agent.poll_interval, Duration::from_secs(1));
        assert_eq!(agent.run_timeout, Duration::from_secs(300));
        assert!(agent.intro_message.is_some());
        assert_eq!(config.secret_name, "routers");
        assert_eq!(config.host_key_policy(), HostKeyPolicy::AcceptUnknown);
        assert_eq!(config.unmatched_policy(), UnmatchedDevicePolicy::Report);
    }

    #[test]
    fn test_pinned_host_keys_and_drop_policy() {
        let config = parse(&[
            "--host-key-mode",
            "pinned",
            "--host-key",
            "SHA256:abc,SHA256:def",
            "--unmatched",
            "drop",
            "--no-intro",
        ]);
        assert_eq!(
            config.host_key_policy(),
            HostKeyPolicy::Pinned(vec!["SHA256:abc".to_string(), "SHA256:def".to_string()])
        );
        assert_eq!(config.unmatched_policy(), UnmatchedDevicePolicy::Drop);
        assert!(config.agent_config().intro_message.is_none());
    }

    #[test]
    fn test_librenms_requires_url_and_token() {
        let mut config = parse(&["--librenms-url", "http://nms/api/v0"]);
        config.librenms_token = None;
        assert!(config.librenms().is_none());

        config.librenms_url = None;
        config.librenms_token = Some("t".to_string());
        assert!(config.librenms().is_none());

        let config = parse(&["--librenms-url", "http://nms/api/v0", "--librenms-token", "t"]);
        assert_eq!(config.librenms(), Some(("http://nms/api/v0", "t")));
    }
}
