//! Configuration loading, validation, and management for Ember.
//!
//! Loads configuration from `~/.ember/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-plugin runtime configuration: `{key: value}`.
pub type PluginSettingsMap = serde_json::Map<String, serde_json::Value>;

/// The root configuration structure.
///
/// Maps directly to `~/.ember/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Plugin discovery and per-plugin settings
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Reasoning markers recognized by the stream segmenter
    #[serde(default)]
    pub segmenter: SegmenterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Hard cap on probe/execute rounds per agent run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Base system prompt; tool instructions are appended to it
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_true")]
    pub tools_enabled: bool,
}

fn default_model() -> String {
    "qwen3:8b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    5
}
fn default_system_prompt() -> String {
    "You are a helpful AI assistant.".into()
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            max_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
            tools_enabled: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directories scanned for plugin bundles, in order
    #[serde(default = "default_plugin_dirs")]
    pub dirs: Vec<PathBuf>,

    /// Per-plugin config, keyed by plugin name
    #[serde(default)]
    pub settings: BTreeMap<String, PluginSettingsMap>,
}

fn default_plugin_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("plugins/builtin"),
        PathBuf::from("plugins/community"),
    ]
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dirs: default_plugin_dirs(),
            settings: BTreeMap::new(),
        }
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("key") || key.contains("secret") || key.contains("token")
}

impl std::fmt::Debug for PluginsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings: BTreeMap<&str, BTreeMap<&str, String>> = self
            .settings
            .iter()
            .map(|(plugin, values)| {
                let values = values
                    .iter()
                    .map(|(k, v)| {
                        let shown = if is_secret_key(k) { "[REDACTED]".to_string() } else { v.to_string() };
                        (k.as_str(), shown)
                    })
                    .collect();
                (plugin.as_str(), values)
            })
            .collect();
        f.debug_struct("PluginsConfig")
            .field("dirs", &self.dirs)
            .field("settings", &settings)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    #[serde(default = "default_think_open")]
    pub think_open: String,

    #[serde(default = "default_think_close")]
    pub think_close: String,
}

fn default_think_open() -> String {
    "<think>".into()
}
fn default_think_close() -> String {
    "</think>".into()
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            think_open: default_think_open(),
            think_close: default_think_close(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ember/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `EMBER_MODEL`
    /// - `EMBER_PLUGIN_DIRS` (platform path-list separated)
    /// - `EMBER_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("EMBER_MODEL") {
            self.agent.model = model;
        }

        if let Some(dirs) = lookup("EMBER_PLUGIN_DIRS") {
            self.plugins.dirs = std::env::split_paths(&dirs).collect();
        }

        if let Some(raw) = lookup("EMBER_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("EMBER_MAX_ITERATIONS must be an integer, got '{raw}'"))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ember")
    }

    /// Settings for one plugin, empty when none are configured.
    pub fn plugin_settings(&self, name: &str) -> PluginSettingsMap {
        self.plugins.settings.get(name).cloned().unwrap_or_default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        let seg = &self.segmenter;
        if seg.think_open.is_empty() || seg.think_close.is_empty() || seg.think_open == seg.think_close {
            return Err(ConfigError::ValidationError(
                "segmenter markers must be non-empty and distinct".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 5);
        assert!(config.agent.tools_enabled);
        assert_eq!(config.segmenter.think_open, "<think>");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.agent.model, config.agent.model);
        assert_eq!(parsed.plugins.dirs, config.plugins.dirs);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.agent.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.model, "qwen3:8b");
    }

    #[test]
    fn plugin_settings_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
max_iterations = 3

[plugins]
dirs = ["/opt/ember/plugins"]

[plugins.settings.shell_exec]
allowed_commands = ["ls", "echo"]

[plugins.settings.web_search]
api_key = "sk-live-123"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.plugins.dirs, vec![PathBuf::from("/opt/ember/plugins")]);
        let shell = config.plugin_settings("shell_exec");
        assert_eq!(shell["allowed_commands"], serde_json::json!(["ls", "echo"]));
        assert!(config.plugin_settings("missing").is_empty());

        let debug = format!("{:?}", config.plugins);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-live-123"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nmodel = ").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("EMBER_MODEL", "llama3"),
            ("EMBER_MAX_ITERATIONS", "2"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.agent.model, "llama3");
        assert_eq!(config.agent.max_iterations, 2);
    }

    #[test]
    fn bad_iteration_override_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|k| (k == "EMBER_MAX_ITERATIONS").then(|| "many".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("qwen3:8b"));
        assert!(toml_str.contains("plugins/builtin"));
    }
}
