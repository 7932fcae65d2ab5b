//! Server configuration with layered sources.
//!
//! Loading flow:
//! 1. Start with compiled [`ServerConfig::default()`]
//! 2. If a JSON config file is given, deep-merge its values over the defaults
//! 3. Apply `TOOLBRIDGE_*` environment variable overrides (highest priority)
//!
//! CLI flags are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Errors that can occur when loading the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Configuration for the toolbridge server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Seconds of silence on a stream before a keepalive frame is sent.
    pub keepalive_interval_secs: u64,
    /// Per-session queue capacity; the oldest pending message is dropped past this.
    pub max_queue: usize,
    /// Maximum concurrently open streams.
    pub max_sessions: usize,
    /// Close sessions with no real traffic for this long. Disabled when unset.
    pub idle_timeout_secs: Option<u64>,
    /// How often the idle reaper runs.
    pub reap_interval_secs: u64,
    /// Reported in the handshake `serverInfo`.
    pub server_name: String,
    pub server_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 10000,
            keepalive_interval_secs: 30,
            max_queue: 256,
            max_sessions: 1024,
            idle_timeout_secs: None,
            reap_interval_secs: 60,
            server_name: "toolbridge".into(),
            server_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl ServerConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keepalive_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("keepalive_interval_secs must be > 0".into()));
        }
        if self.max_queue == 0 {
            return Err(ConfigError::InvalidValue("max_queue must be > 0".into()));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue("max_sessions must be > 0".into()));
        }
        if self.reap_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("reap_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Load config from an optional file path with env var overrides.
///
/// A missing file is an error when a path is given explicitly.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = match path {
        Some(path) => {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        None => defaults,
    };

    let mut config: ServerConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per-key, everything else is replaced by `source`, and
/// nulls in `source` keep the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TOOLBRIDGE_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value stays.
pub fn apply_env_overrides(config: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("TOOLBRIDGE_HOST") {
        config.host = v;
    }
    if let Some(v) = parse_env(&read, "TOOLBRIDGE_PORT", 0u16, u16::MAX) {
        config.port = v;
    }
    if let Some(v) = parse_env(&read, "TOOLBRIDGE_KEEPALIVE_SECS", 1u64, 3600) {
        config.keepalive_interval_secs = v;
    }
    if let Some(v) = parse_env(&read, "TOOLBRIDGE_MAX_QUEUE", 1usize, 1_000_000) {
        config.max_queue = v;
    }
    if let Some(v) = parse_env(&read, "TOOLBRIDGE_MAX_SESSIONS", 1usize, 1_000_000) {
        config.max_sessions = v;
    }
    if let Some(v) = parse_env(&read, "TOOLBRIDGE_IDLE_TIMEOUT_SECS", 1u64, 86_400 * 7) {
        config.idle_timeout_secs = Some(v);
    }
}

fn parse_env<T>(read: &impl Fn(&str) -> Option<String>, key: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let val = read(key)?;
    let parsed = parse_range(&val, min, max);
    if parsed.is_none() {
        tracing::warn!(key, value = %val, "invalid env var, ignoring");
    }
    parsed
}

/// Parse `val` as a number within `[min, max]`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
