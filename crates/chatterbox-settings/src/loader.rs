//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ChatterboxSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{BusBackend, ChatterboxSettings};

/// Resolve the path to the settings file (`~/.chatterbox/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chatterbox").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChatterboxSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). If the file
/// contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChatterboxSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<ChatterboxSettings> {
    let defaults = serde_json::to_value(ChatterboxSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
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
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut ChatterboxSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are treated as unset. Invalid values are logged and ignored
/// (falling back to file/default).
pub fn apply_overrides_from<F>(settings: &mut ChatterboxSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("CHATTERBOX_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("CHATTERBOX_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => tracing::warn!(key = "CHATTERBOX_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("REDIS_URL") {
        settings.bus.url = v;
    }
    if let Some(v) = read("CHATTERBOX_BUS_BACKEND") {
        match BusBackend::parse(&v) {
            Some(backend) => settings.bus.backend = backend,
            None => tracing::warn!(key = "CHATTERBOX_BUS_BACKEND", value = %v, "unknown bus backend, ignoring"),
        }
    }
    if let Some(v) = read("CHATTERBOX_CHANNEL_PREFIX") {
        settings.bus.channel_prefix = v;
    }
    if let Some(v) = read("CHATTERBOX_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &ChatterboxSettings) -> Result<()> {
    if settings.bus.poll_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "bus.pollTimeoutMs must be greater than zero".into(),
        ));
    }
    if settings.bus.channel_prefix.is_empty() || settings.bus.channel_prefix.contains(':') {
        return Err(SettingsError::InvalidValue(format!(
            "bus.channelPrefix must be non-empty and contain no ':' (got {:?})",
            settings.bus.channel_prefix
        )));
    }
    if settings.server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueCapacity must be greater than zero".into(),
        ));
    }
    if settings.server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalSecs must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
