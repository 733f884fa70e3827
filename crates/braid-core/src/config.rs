use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result};

/// Top-level Braid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub spans: SpanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum elements one traversal may visit before failing.
    /// Guards against cyclic definitions that never reach an end event.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize { 10_000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String { "braid=info,warn".to_string() }

/// Task span emission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanConfig {
    #[serde(default = "default_spans_enabled")]
    pub enabled: bool,
    /// Append spans as JSONL to this file.
    #[serde(default)]
    pub jsonl_path: Option<String>,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for SpanConfig {
    fn default() -> Self {
        Self {
            enabled: default_spans_enabled(),
            jsonl_path: None,
            bus_capacity: default_bus_capacity(),
        }
    }
}

fn default_spans_enabled() -> bool { true }
fn default_bus_capacity() -> usize { 256 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| BraidError::ConfigNotFound(path.display().to_string()))?;

        Self::from_toml(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| BraidError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.engine.max_steps, 10_000);
        assert_eq!(config.log.filter, "braid=info,warn");
        assert!(config.spans.enabled);
        assert!(config.spans.jsonl_path.is_none());
        assert_eq!(config.spans.bus_capacity, 256);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
[engine]
max_steps = 50

[spans]
jsonl_path = "/tmp/spans.jsonl"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.max_steps, 50);
        assert_eq!(config.spans.jsonl_path.as_deref(), Some("/tmp/spans.jsonl"));
        assert!(config.spans.enabled);
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("BRAID_CORE_TEST_DIR", "/var/log/braid");
        let out = expand_env_vars("path = \"${BRAID_CORE_TEST_DIR}/spans.jsonl\"");
        assert_eq!(out, "path = \"/var/log/braid/spans.jsonl\"");
    }

    #[test]
    fn test_unset_env_var_kept() {
        let out = expand_env_vars("${BRAID_CORE_DEFINITELY_UNSET}");
        assert_eq!(out, "${BRAID_CORE_DEFINITELY_UNSET}");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[engine\nmax_steps = ").unwrap_err();
        assert!(matches!(err, BraidError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/braid.toml")).unwrap_err();
        assert!(matches!(err, BraidError::ConfigNotFound(_)));
    }
}
