//! Configuration file handling for the breakglass CLI
//!
//! Loads defaults from ~/.breakglass/config.toml (falling back to
//! /etc/breakglass/config.toml) and resolves each connection setting from
//! flags, the config file, the environment and built-in defaults.

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{BrokerConfig, SessionSettings};

const SYSTEM_CONFIG: &str = "/etc/breakglass/config.toml";

/// CLI configuration stored in ~/.breakglass/config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Full Vault URL, used instead of vault/port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Vault host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_verify: Option<bool>,

    /// Request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Seconds to wait for a credential to propagate (0 waits forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_timeout: Option<u64>,

    /// Seconds to keep retrying secondary resource teardown (0 retries forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_timeout: Option<u64>,
}

impl CliConfig {
    /// Get the default configuration file path (~/.breakglass/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Unable to determine home directory")?;

        Ok(PathBuf::from(home).join(".breakglass").join("config.toml"))
    }

    /// Load `explicit` if given, else the user file, else the system file.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Self::load_from_path(path);
        }

        if let Ok(user) = Self::config_path() {
            if user.exists() {
                return Self::load_from_path(&user);
            }
        }

        Self::load_from_path(Path::new(SYSTEM_CONFIG))
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        debug!("Using config file: {}", path.display());
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Connection flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Vault host to authenticate against
    #[arg(short = 'v', long = "vault", global = true)]
    pub vault: Option<String>,

    /// Port of the Vault server
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,

    /// Username to authenticate to Vault with
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Vault auth method mount (ldap, userpass, ...)
    #[arg(long, global = true)]
    pub auth_method: Option<String>,

    /// Seconds to wait for a new credential to become usable (0 waits forever)
    #[arg(long, global = true)]
    pub activation_timeout: Option<u64>,

    /// Seconds to keep retrying teardown of created resources (0 retries forever)
    #[arg(long, global = true)]
    pub teardown_timeout: Option<u64>,
}

/// Resolve the broker connection from flags, config file and the process environment.
///
/// Priority per value: flag, config file, environment, default.
pub fn resolve_broker_config(flags: &ConnectionArgs, file: &CliConfig) -> BrokerConfig {
    resolve_broker_config_with(flags, file, |key| std::env::var(key).ok())
}

pub fn resolve_broker_config_with<E>(flags: &ConnectionArgs, file: &CliConfig, env: E) -> BrokerConfig
where
    E: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|v| !v.is_empty());
    let defaults = BrokerConfig::default();

    // An explicit --vault always wins over a configured or exported address.
    let address = match flags.vault {
        Some(_) => None,
        None => file.address.clone().or_else(|| env("VAULT_ADDR")),
    };

    let host = flags
        .vault
        .clone()
        .or_else(|| file.vault.clone())
        .or_else(|| env("BREAKGLASS_VAULT"))
        .unwrap_or_default();

    let port = flags
        .port
        .or(file.port)
        .or_else(|| env("BREAKGLASS_PORT").and_then(|p| p.parse().ok()))
        .unwrap_or(defaults.port);

    let username = flags
        .username
        .clone()
        .or_else(|| file.username.clone())
        .or_else(|| env("BREAKGLASS_USERNAME"))
        .or_else(|| env("USER"))
        .or_else(|| env("USERNAME"))
        .unwrap_or_default();

    let auth_method = flags
        .auth_method
        .clone()
        .or_else(|| file.auth_method.clone())
        .or_else(|| env("BREAKGLASS_AUTH_METHOD"))
        .unwrap_or(defaults.auth_method);

    let namespace = file.namespace.clone().or_else(|| env("VAULT_NAMESPACE"));

    let skip_verify = file
        .skip_verify
        .or_else(|| env("VAULT_SKIP_VERIFY").map(|v| matches!(v.as_str(), "1" | "true" | "TRUE")))
        .unwrap_or(false);

    let timeout_seconds = file.timeout.unwrap_or(defaults.timeout_seconds);

    debug!(host = %host, port, username = %username, auth_method = %auth_method, "Resolved broker connection");

    BrokerConfig {
        address,
        host,
        port,
        scheme: defaults.scheme,
        username,
        auth_method,
        namespace,
        skip_verify,
        timeout_seconds,
    }
}

/// Resolve activation and teardown bounds: flag, config file, default.
pub fn resolve_session_settings(flags: &ConnectionArgs, file: &CliConfig) -> SessionSettings {
    let defaults = SessionSettings::default();

    SessionSettings {
        activation_max_wait_secs: flags
            .activation_timeout
            .or(file.activation_timeout)
            .or(defaults.activation_max_wait_secs),
        teardown_max_wait_secs: flags
            .teardown_timeout
            .or(file.teardown_timeout)
            .or(defaults.teardown_max_wait_secs),
        ..defaults
    }
}
