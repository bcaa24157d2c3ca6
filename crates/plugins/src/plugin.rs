//! The plugin contract.

use async_trait::async_trait;
use ember_core::Tool;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;

/// Runtime configuration handed to a plugin: `{key: value}`.
pub type PluginConfig = serde_json::Map<String, serde_json::Value>;

/// Read-only view given to lifecycle hooks.
pub struct PluginContext<'a> {
    pub descriptor: &'a PluginDescriptor,
    pub config: &'a PluginConfig,
}

impl PluginContext<'_> {
    /// Typed lookup of a config value. `Ok(None)` when the key is absent.
    pub fn setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PluginError> {
        match self.config.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                PluginError::InvalidConfig {
                    name: self.descriptor.name.clone(),
                    reason: format!("{key}: {e}"),
                }
            }),
        }
    }
}

/// A loadable unit that contributes tools.
///
/// `on_load` runs once before tools are harvested; `on_unload` runs once
/// before the plugin is dropped. `tools` is consulted only between the two.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Empty means the manifest version applies.
    fn version(&self) -> &str {
        ""
    }

    async fn on_load(&mut self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Status snapshot of a loaded plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub loaded: bool,
    pub tools: Vec<String>,
    pub config: PluginConfig,
}

const REDACTED: &str = "***";

/// Copy `config` with values under keys containing `key`, `secret`, or
/// `token` (case-insensitive) replaced by `***`.
pub fn redact_config(config: &PluginConfig) -> PluginConfig {
    config
        .iter()
        .map(|(k, v)| {
            let lower = k.to_lowercase();
            if lower.contains("key") || lower.contains("secret") || lower.contains("token") {
                (k.clone(), serde_json::Value::String(REDACTED.into()))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}
