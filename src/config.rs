//! Agent configuration parsing, validation, and key loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::mode::ResolverMode;
use crate::models::server::ServerList;
use crate::{AppError, Result};

/// Keychain service name the shared key is stored under.
pub const KEYRING_SERVICE: &str = "hostwatch-agent";

/// Environment variable consulted when the keychain has no shared key.
pub const KEY_ENV_VAR: &str = "HOSTWATCH_AGENT_KEY";

/// Identity reported in the startup audit record.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentIdentity {
    /// Agent name as registered with the collector.
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Agent address as registered with the collector.
    #[serde(default = "default_agent_ip")]
    pub ip: String,
}

impl Default for AgentIdentity {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            ip: default_agent_ip(),
        }
    }
}

fn default_agent_name() -> String {
    "hostwatch-agent".into()
}

fn default_agent_ip() -> String {
    "any".into()
}

/// Length of one backoff time unit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackoffConfig {
    /// Milliseconds per time unit.
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            unit_ms: default_unit_ms(),
        }
    }
}

fn default_unit_ms() -> u64 {
    1000
}

/// Keep-alive cadence once a session is established, in time units.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct KeepaliveConfig {
    /// Units between keep-alive messages.
    #[serde(default = "default_interval_units")]
    pub interval_units: u32,
    /// Units without an ACK before the handshake is re-run.
    #[serde(default = "default_reconnect_after_units")]
    pub reconnect_after_units: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_units: default_interval_units(),
            reconnect_after_units: default_reconnect_after_units(),
        }
    }
}

fn default_interval_units() -> u32 {
    10
}

fn default_reconnect_after_units() -> u32 {
    60
}

/// Resolver strategy selection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ResolverConfig {
    /// Inline lookup or delegation to the helper process.
    #[serde(default)]
    pub mode: ResolverMode,
}

/// Unprivileged account the agent switches to after the helper starts.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PrivilegeConfig {
    /// User name; `None` keeps the launching account.
    #[serde(default)]
    pub user: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Agent configuration parsed from `agent.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Ordered collector addresses (names or literals).
    pub servers: Vec<String>,
    /// Port shared by every collector.
    pub port: String,
    /// Whether the startup audit record is emitted.
    #[serde(default = "default_true")]
    pub startup_audit: bool,
    /// Directory for JSONL audit files; `None` traces audit records only.
    #[serde(default)]
    pub audit_dir: Option<PathBuf>,
    /// Identity used in audit records.
    #[serde(default)]
    pub agent: AgentIdentity,
    /// Backoff time unit.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Keep-alive cadence.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    /// Resolver strategy.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Privilege drop target.
    #[serde(default)]
    pub privileges: PrivilegeConfig,
    /// Pre-shared session key (populated at runtime).
    #[serde(skip)]
    pub shared_key: String,
}

impl AgentConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the shared key from the OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credential` if neither source provides a key.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.shared_key = load_credential("agent_key", KEY_ENV_VAR).await?;
        Ok(())
    }

    /// Build the ordered server list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the list is empty.
    pub fn server_list(&self) -> Result<ServerList> {
        ServerList::new(self.servers.clone(), &self.port)
    }

    /// Duration of one backoff time unit.
    #[must_use]
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff.unit_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(AppError::Config("servers must not be empty".into()));
        }

        if let Some(blank) = self.servers.iter().position(|s| s.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "servers[{blank}] must not be blank"
            )));
        }

        match self.port.trim().parse::<u16>() {
            Ok(port) if port != 0 => {}
            _ => {
                return Err(AppError::Config(format!(
                    "port must be a number between 1 and 65535, got '{}'",
                    self.port
                )));
            }
        }

        if self.backoff.unit_ms == 0 {
            return Err(AppError::Config(
                "backoff.unit_ms must be greater than zero".into(),
            ));
        }

        if self.keepalive.interval_units == 0 {
            return Err(AppError::Config(
                "keepalive.interval_units must be greater than zero".into(),
            ));
        }

        if self.keepalive.reconnect_after_units < self.keepalive.interval_units {
            return Err(AppError::Config(
                "keepalive.reconnect_after_units must not be less than interval_units".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Credential(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Credential(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
