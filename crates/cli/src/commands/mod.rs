//! Subcommand implementations and the bootstrap they share.

pub mod call;
pub mod config_cmd;
pub mod parse;
pub mod plugins;
pub mod prompt;
pub mod segment;
pub mod tools;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ember_config::AppConfig;
use ember_core::ToolRegistry;
use ember_plugins::PluginLoader;
use ember_tools::{BuiltinServices, Sandbox, builtin_catalog};
use tokio::io::AsyncReadExt;

/// Loaded plugins and the registry their tools were published into.
pub struct Runtime {
    pub config: AppConfig,
    pub loader: PluginLoader,
    pub registry: Arc<ToolRegistry>,
}

/// Load the config file (or the default location) plus environment overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        return AppConfig::load().context("Failed to load config");
    };
    let mut config =
        AppConfig::load_from(path).with_context(|| format!("Failed to load config from {}", path.display()))?;
    config
        .apply_overrides(|name| std::env::var(name).ok())
        .context("Invalid environment override")?;
    Ok(config)
}

/// Discover and load every plugin in the configured directories.
pub async fn bootstrap(config: AppConfig) -> Runtime {
    let catalog = builtin_catalog(BuiltinServices::new(Sandbox::current_dir()));
    let loader = PluginLoader::new(config.plugins.dirs.clone(), catalog);
    let loaded = loader.load_all(&config.plugins.settings).await;

    let registry = Arc::new(ToolRegistry::new());
    let tools = loader.register_into(&registry).await;
    tracing::debug!(plugins = loaded, tools, "Runtime ready");

    Runtime {
        config,
        loader,
        registry,
    }
}

pub async fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read stdin")?;
    Ok(input)
}
