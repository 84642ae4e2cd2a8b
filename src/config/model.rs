use crate::core::{LockConfig, WatcherConfig};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

// Session TTL range accepted by Consul.
const MIN_SESSION_TTL_MS: u64 = 10_000;
const MAX_SESSION_TTL_MS: u64 = 86_400_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failure read file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failure parse file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Profiles {
    pub active: String,
}
// Result of parsing application.yml
#[derive(Serialize, Deserialize, Debug)]
pub struct EnvConfig {
    pub profiles: Profiles,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Bootstrap {
    pub consul: Consul,
    pub watcher: Watch,
    pub slack: Slack,
    pub mail: Option<Mail>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Consul {
    pub address: String,
    pub scheme: String,
    pub datacenter: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for Consul {
    fn default() -> Self {
        Consul {
            address: "127.0.0.1:8500".to_string(),
            scheme: "http".to_string(),
            datacenter: "dc1".to_string(),
            token: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Watch {
    pub interval_ms: u64,
    pub session_ttl_ms: u64,
    pub lock_retry_ms: u64,
    pub lock_key: String,
    pub state_key: String,
}

impl Default for Watch {
    fn default() -> Self {
        Watch {
            interval_ms: 10_000,
            session_ttl_ms: 15_000,
            lock_retry_ms: 1_000,
            lock_key: "health-watcher/lock".to_string(),
            state_key: "health-watcher/state".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Slack {
    pub webhook_url: Option<String>,
    pub channel: String,
    pub username: String,
    pub icon_url: String,
}

impl Default for Slack {
    fn default() -> Self {
        Slack {
            webhook_url: None,
            channel: "#consul".to_string(),
            username: "Consul".to_string(),
            icon_url: "https://www.consul.io/assets/images/logo_large-475cebb0.png".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mail {
    pub from: String,
    pub to: String,
    pub username: String,
    pub password: String,
    pub relay: String,
}

impl Bootstrap {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.watcher;
        if w.interval_ms == 0 || w.session_ttl_ms == 0 || w.lock_retry_ms == 0 {
            return Err(ConfigError::Invalid(
                "watcher durations must be greater than zero".to_string(),
            ));
        }
        if !(MIN_SESSION_TTL_MS..=MAX_SESSION_TTL_MS).contains(&w.session_ttl_ms) {
            return Err(ConfigError::Invalid(format!(
                "session_ttl_ms must be between {} and {}",
                MIN_SESSION_TTL_MS, MAX_SESSION_TTL_MS
            )));
        }
        if w.lock_key.is_empty() || w.state_key.is_empty() {
            return Err(ConfigError::Invalid("watcher keys must not be empty".to_string()));
        }
        if w.lock_key == w.state_key {
            return Err(ConfigError::Invalid(
                "lock_key and state_key must differ".to_string(),
            ));
        }
        if self.consul.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "consul timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.consul.address.is_empty() {
            return Err(ConfigError::Invalid("consul address must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        let w = &self.watcher;
        WatcherConfig {
            lock_key: w.lock_key.clone(),
            state_key: w.state_key.clone(),
            session_ttl: Duration::from_millis(w.session_ttl_ms),
            interval: Duration::from_millis(w.interval_ms),
            lock: LockConfig {
                retry_ms: w.lock_retry_ms,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

// Load the given config file
pub fn load_config<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_yaml::from_str::<T>(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!("loaded config {}", path.display());
    Ok(config)
}

// Load application.yml from dir
fn load_env_config(dir: &Path) -> Result<Option<EnvConfig>, ConfigError> {
    let path = dir.join("application.yml");
    if !path.exists() {
        return Ok(None);
    }
    load_config::<EnvConfig>(&path).map(Some)
}

// Load application-{active}.yml for the given profile
fn load_bootstrap_config_from_env(dir: &Path, active: &str) -> Result<Bootstrap, ConfigError> {
    let path = dir.join(format!("application-{}.yml", active));
    load_config::<Bootstrap>(&path)
}

/// Resolves the active profile from `dir/application.yml` and loads its
/// `application-{active}.yml`. Returns `None` when there is no application.yml.
pub fn load_bootstrap_config(dir: &Path) -> Result<Option<Bootstrap>, ConfigError> {
    match load_env_config(dir)? {
        Some(env_config) => load_bootstrap_config_from_env(dir, &env_config.profiles.active).map(Some),
        None => Ok(None),
    }
}
