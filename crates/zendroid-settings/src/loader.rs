//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ZendroidSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `ZENDROID_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{TransportMode, ZendroidSettings};

/// Resolve the default settings file (`~/.zendroid/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".zendroid").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ZendroidSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ZendroidSettings> {
    let defaults = serde_json::to_value(ZendroidSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ZendroidSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced, and nulls in
/// `source` leave `target` untouched.
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

/// Apply `ZENDROID_*` environment overrides.
pub fn apply_env_overrides(settings: &mut ZendroidSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and
/// ignored, leaving the file/default value in place.
pub fn apply_overrides_from<F>(settings: &mut ZendroidSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("ZENDROID_BASE_URL") {
        settings.server.base_url = v;
    }
    if let Some(v) = read("ZENDROID_WS_URL") {
        settings.server.ws_url = Some(v);
    }
    if let Some(v) = read("ZENDROID_LEGACY_ENDPOINTS") {
        match parse_bool(&v) {
            Some(b) => settings.server.legacy_endpoints = b,
            None => warn!(key = "ZENDROID_LEGACY_ENDPOINTS", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("ZENDROID_REQUEST_TIMEOUT_MS") {
        match parse_u64_range(&v, 100, 600_000) {
            Some(n) => settings.server.request_timeout_ms = n,
            None => warn!(key = "ZENDROID_REQUEST_TIMEOUT_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = read("ZENDROID_TRANSPORT") {
        match v.parse::<TransportMode>() {
            Ok(mode) => settings.transport.mode = mode,
            Err(e) => warn!(key = "ZENDROID_TRANSPORT", value = %v, error = %e, "invalid transport env var, ignoring"),
        }
    }
    if let Some(v) = read("ZENDROID_POLL_INTERVAL_MS") {
        match parse_u64_range(&v, 100, 60_000) {
            Some(n) => settings.transport.poll_interval_ms = n,
            None => warn!(key = "ZENDROID_POLL_INTERVAL_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = read("ZENDROID_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("ZENDROID_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "ZENDROID_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
