//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LogFormat, TroopSettings};

/// Path of the user settings file (`~/.troop/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".troop").join("settings.json")
}

/// Load settings from the default path with env overrides applied.
pub fn load_settings() -> Result<TroopSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env overrides applied.
///
/// A missing file yields defaults. Invalid JSON or a broken cross-field rule
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TroopSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<TroopSettings> {
    let defaults = serde_json::to_value(TroopSettings::default())?;

    let merged = if path.exists() {
        debug!(path = %path.display(), "loading settings file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(path = %path.display(), "settings file not found, using defaults");
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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TROOP_*` overrides read through `lookup`.
///
/// Out-of-range or unparsable values are logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut TroopSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── server ──
    if let Some(v) = env.string("TROOP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("TROOP_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("TROOP_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }

    // ── relay ──
    if let Some(v) = env.usize("TROOP_SEND_QUEUE", 1, 65_536) {
        settings.relay.send_queue_capacity = v;
    }
    if let Some(v) = env.u64("TROOP_WRITE_TIMEOUT_MS", 100, 600_000) {
        settings.relay.write_timeout_ms = v;
    }
    if let Some(v) = env.u64("TROOP_AUTH_TIMEOUT_MS", 100, 600_000) {
        settings.relay.auth_timeout_ms = v;
    }
    if let Some(v) = env.u64("TROOP_HEARTBEAT_INTERVAL_MS", 1_000, 600_000) {
        settings.relay.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("TROOP_HEARTBEAT_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.relay.heartbeat_timeout_ms = v;
    }
    if let Some(v) = env.usize("TROOP_MAX_MESSAGE_CHARS", 1, 1_000_000) {
        settings.relay.max_message_chars = v;
    }

    // ── logging ──
    if let Some(v) = env.string("TROOP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("TROOP_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "TROOP_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" | "text" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, |v| parse_usize_range(v, min, max))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"relay": {"writeTimeoutMs": 5000, "authTimeoutMs": 10000}});
        let source = serde_json::json!({"relay": {"writeTimeoutMs": 250}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["relay"]["writeTimeoutMs"], 250);
        assert_eq!(merged["relay"]["authTimeoutMs"], 10000);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3], "name": "x"}),
            serde_json::json!({"items": [4], "name": {"nested": true}}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
        assert_eq!(merged["name"]["nested"], true);
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(serde_json::json!({}), serde_json::json!({"b": 2}));
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ──

    #[test]
    fn missing_file_yields_defaults() {
        let settings = read_layers(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, TroopSettings::default().server.port);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9090}, "logging": {"format": "json"}}"#)
            .unwrap();
        let settings = read_layers(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert_matches!(read_layers(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn broken_cross_field_rule_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"relay": {"heartbeatIntervalMs": 60000, "heartbeatTimeoutMs": 30000}}"#,
        )
        .unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── env overrides ──

    #[test]
    fn env_overrides_apply() {
        let mut settings = TroopSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("TROOP_HOST", "0.0.0.0"),
                ("TROOP_PORT", "0"),
                ("TROOP_SEND_QUEUE", "16"),
                ("TROOP_WRITE_TIMEOUT_MS", "750"),
                ("TROOP_LOG_LEVEL", "troop_relay=debug"),
                ("TROOP_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.relay.send_queue_capacity, 16);
        assert_eq!(settings.relay.write_timeout_ms, 750);
        assert_eq!(settings.logging.level, "troop_relay=debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = TroopSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("TROOP_PORT", "99999"),
                ("TROOP_SEND_QUEUE", "0"),
                ("TROOP_HEARTBEAT_INTERVAL_MS", "abc"),
                ("TROOP_LOG_FORMAT", "xml"),
                ("TROOP_HOST", ""),
            ]),
        );
        let defaults = TroopSettings::default();
        assert_eq!(settings.server.port, defaults.server.port);
        assert_eq!(settings.relay.send_queue_capacity, defaults.relay.send_queue_capacity);
        assert_eq!(
            settings.relay.heartbeat_interval_ms,
            defaults.relay.heartbeat_interval_ms
        );
        assert_eq!(settings.logging.format, defaults.logging.format);
        assert_eq!(settings.server.host, defaults.server.host);
    }

    // ── parsers ──

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("abc", 1, 10), None);
        assert_eq!(parse_usize_range("50", 1, 100), Some(50));
        assert_eq!(parse_usize_range("101", 1, 100), None);
    }

    #[test]
    fn parse_log_formats() {
        assert_eq!(parse_log_format("Pretty"), Some(LogFormat::Pretty));
        assert_eq!(parse_log_format("text"), Some(LogFormat::Pretty));
        assert_eq!(parse_log_format("json"), Some(LogFormat::Json));
        assert_eq!(parse_log_format("yaml"), None);
    }
}
