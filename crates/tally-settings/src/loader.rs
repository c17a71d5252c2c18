//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TallySettings::default()`]
//! 2. If `~/.tally/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TALLY_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{TallySettings, tally_home};

/// Resolve the path to the settings file (`~/.tally/settings.json`).
pub fn settings_path() -> PathBuf {
    tally_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TallySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TallySettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<TallySettings> {
    let defaults = serde_json::to_value(TallySettings::default())?;

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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning and the file/default value
/// stands.
pub fn apply_env_overrides(settings: &mut TallySettings) {
    if let Some(v) = read_env_string("TALLY_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = read_env_u32("TALLY_DB_POOL_SIZE", 1, 256) {
        settings.database.pool_size = v;
    }
    if let Some(v) = read_env_u32("TALLY_BUSY_TIMEOUT_MS", 0, 600_000) {
        settings.database.busy_timeout_ms = v;
    }
    if let Some(v) = read_env_u32("TALLY_RETRY_MAX_ATTEMPTS", 1, 10) {
        settings.retry.max_attempts = v;
    }
    if let Some(v) = read_env_string("TALLY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("TALLY_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "database": {"poolSize": 16, "path": "/a.db"}
        });
        let source = serde_json::json!({
            "database": {"poolSize": 4}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["database"]["poolSize"], 4);
        assert_eq!(merged["database"]["path"], "/a.db");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = read_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.database.pool_size, 16);
        assert_eq!(settings.retry.max_attempts, 5);
    }

    #[test]
    fn partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"database": {"path": "/srv/tally.db"}, "retry": {"maxAttempts": 3}}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.database.path, "/srv/tally.db");
        assert_eq!(settings.database.pool_size, 16);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.base_delay_ms, 10);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert!(matches!(
            read_file_layer(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn invalid_merged_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"retry": {"jitterFactor": 3.0}}"#).unwrap();

        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    #[test]
    fn wrong_type_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"database": {"poolSize": "many"}}"#).unwrap();

        assert!(matches!(
            read_file_layer(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("3", 1, 10), Some(3));
        assert_eq!(parse_u32_range(" 10 ", 1, 10), Some(10));
        assert_eq!(parse_u32_range("0", 1, 10), None);
        assert_eq!(parse_u32_range("11", 1, 10), None);
        assert_eq!(parse_u32_range("-1", 0, 10), None);
        assert_eq!(parse_u32_range("five", 1, 10), None);
    }
}
