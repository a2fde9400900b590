//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PosestreamSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `POSESTREAM_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::PosestreamSettings;

/// Resolve the default settings path (`~/.posestream/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".posestream").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PosestreamSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PosestreamSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<PosestreamSettings> {
    let defaults = serde_json::to_value(PosestreamSettings::default())?;

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

/// Apply environment overrides using `lookup` to read variables.
///
/// Invalid values are logged and ignored (file/default value stays).
pub fn apply_env_overrides<F>(settings: &mut PosestreamSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("POSESTREAM_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("POSESTREAM_PORT") {
        match parse_range::<u16>(&v, 0, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "POSESTREAM_PORT", value = %v, "invalid port, ignoring"),
        }
    }
    if let Some(v) = read("POSESTREAM_MAX_SESSIONS") {
        match parse_range::<usize>(&v, 1, 100_000) {
            Some(n) => settings.server.max_sessions = n,
            None => warn!(key = "POSESTREAM_MAX_SESSIONS", value = %v, "invalid count, ignoring"),
        }
    }
    if let Some(v) = read("POSESTREAM_QUEUE_CAPACITY") {
        match parse_range::<usize>(&v, 1, 1_024) {
            Some(n) => settings.processing.queue_capacity = n,
            None => warn!(key = "POSESTREAM_QUEUE_CAPACITY", value = %v, "invalid capacity, ignoring"),
        }
    }
    if let Some(v) = read("POSESTREAM_DETECTOR") {
        settings.processing.detector = v;
    }
    if let Some(v) = read("POSESTREAM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("POSESTREAM_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "POSESTREAM_LOG_JSON", value = %v, "invalid boolean, ignoring"),
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

/// Parse a number and check it lies within `min..=max`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
