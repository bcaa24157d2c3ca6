//! Plugin loader: discovery, lifecycle, and the owned tool index.

use chrono::Utc;
use ember_core::{DomainEvent, EventBus, Tool, ToolRegistry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::PluginCatalog;
use crate::descriptor::{self, PluginDescriptor};
use crate::error::PluginError;
use crate::plugin::{Plugin, PluginConfig, PluginContext, PluginInfo, redact_config};
use crate::process::ProcessPlugin;

struct LoadedPlugin {
    descriptor: PluginDescriptor,
    config: PluginConfig,
    plugin: Box<dyn Plugin>,
    loaded: bool,
    tool_names: Vec<String>,
}

impl LoadedPlugin {
    fn info(&self) -> PluginInfo {
        let description = match self.plugin.description() {
            "" => self.descriptor.description.clone(),
            d => d.to_string(),
        };
        let version = match self.plugin.version() {
            "" => self.descriptor.version.clone(),
            v => v.to_string(),
        };
        PluginInfo {
            name: self.descriptor.name.clone(),
            version,
            description,
            loaded: self.loaded,
            tools: self.tool_names.clone(),
            config: redact_config(&self.config),
        }
    }
}

struct OwnedTool {
    owner: String,
    tool: Arc<dyn Tool>,
}

#[derive(Default)]
struct LoaderState {
    plugins: HashMap<String, LoadedPlugin>,
    tools: HashMap<String, OwnedTool>,
}

/// Aggregate loader counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub total_plugins: usize,
    pub total_tools: usize,
    pub plugin_dirs: Vec<String>,
}

/// Discovers plugin bundles, drives their lifecycle, and keeps an index of
/// the tools each loaded plugin contributed.
///
/// All mutating operations serialize on one async lock, so load, unload,
/// and reload never interleave.
pub struct PluginLoader {
    plugin_dirs: Vec<PathBuf>,
    catalog: PluginCatalog,
    events: Option<Arc<EventBus>>,
    state: Mutex<LoaderState>,
}

impl PluginLoader {
    pub fn new(plugin_dirs: Vec<PathBuf>, catalog: PluginCatalog) -> Self {
        Self {
            plugin_dirs,
            catalog,
            events: None,
            state: Mutex::new(LoaderState::default()),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn plugin_dirs(&self) -> &[PathBuf] {
        &self.plugin_dirs
    }

    /// Scan the configured directories for bundles. Nothing is loaded.
    pub fn discover(&self) -> Vec<PluginDescriptor> {
        descriptor::discover_in(&self.plugin_dirs)
    }

    /// Load one plugin. Failures are logged and yield `None`.
    ///
    /// Loading a name that is already loaded returns its current info
    /// without running any hooks.
    pub async fn load(&self, descriptor: &PluginDescriptor, config: Option<PluginConfig>) -> Option<PluginInfo> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.plugins.get(&descriptor.name) {
            tracing::warn!(plugin = %descriptor.name, "Plugin already loaded");
            return Some(existing.info());
        }

        match self.load_locked(&mut state, descriptor, config.unwrap_or_default()).await {
            Ok(info) => Some(info),
            Err(PluginError::Disabled(name)) => {
                tracing::info!(plugin = %name, "Plugin disabled, skipping");
                None
            }
            Err(e) => {
                tracing::error!(plugin = %descriptor.name, "Failed to load plugin: {e}");
                None
            }
        }
    }

    /// Discover and load every bundle with its settings entry, returning
    /// how many ended up loaded.
    pub async fn load_all(&self, settings: &BTreeMap<String, PluginConfig>) -> usize {
        let mut loaded = 0;
        for descriptor in self.discover() {
            let config = settings.get(&descriptor.name).cloned();
            if self.load(&descriptor, config).await.is_some() {
                loaded += 1;
            }
        }
        tracing::info!(loaded, "Plugin loading complete");
        loaded
    }

    /// Unload a plugin and retract the tools it still owns.
    /// Returns `false` when the name is not loaded.
    pub async fn unload(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        self.unload_locked(&mut state, name).await
    }

    pub async fn unload_all(&self) {
        let mut state = self.state.lock().await;
        let mut names: Vec<String> = state.plugins.keys().cloned().collect();
        names.sort();
        for name in names {
            self.unload_locked(&mut state, &name).await;
        }
    }

    /// Unload then load again with the same config, re-reading the manifest.
    pub async fn reload(&self, name: &str) -> Option<PluginInfo> {
        let mut state = self.state.lock().await;

        let Some(entry) = state.plugins.get(name) else {
            tracing::warn!(plugin = %name, "Cannot reload: plugin not loaded");
            return None;
        };
        let previous = entry.descriptor.clone();
        let config = entry.config.clone();

        self.unload_locked(&mut state, name).await;

        let descriptor = match PluginDescriptor::from_dir(&previous.location) {
            Ok(Some(fresh)) if fresh.name == previous.name => fresh,
            Ok(_) => previous,
            Err(e) => {
                tracing::warn!(plugin = %name, "Manifest unreadable on reload, keeping previous: {e}");
                previous
            }
        };

        match self.load_locked(&mut state, &descriptor, config).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::error!(plugin = %name, "Failed to reload plugin: {e}");
                None
            }
        }
    }

    /// Register every indexed tool into `registry`. Returns the count.
    pub async fn register_into(&self, registry: &ToolRegistry) -> usize {
        let tools = self.tools().await;
        let count = tools.len();
        for tool in tools {
            registry.register(tool);
        }
        count
    }

    /// All indexed tools, sorted by name.
    pub async fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let state = self.state.lock().await;
        let mut tools: Vec<Arc<dyn Tool>> = state.tools.values().map(|o| Arc::clone(&o.tool)).collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub async fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let state = self.state.lock().await;
        state.tools.get(name).map(|o| Arc::clone(&o.tool))
    }

    /// Name of the plugin currently providing `tool_name`.
    pub async fn tool_owner(&self, tool_name: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.tools.get(tool_name).map(|o| o.owner.clone())
    }

    pub async fn plugin_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get(&self, name: &str) -> Option<PluginInfo> {
        let state = self.state.lock().await;
        state.plugins.get(name).map(LoadedPlugin::info)
    }

    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        let state = self.state.lock().await;
        let mut infos: Vec<PluginInfo> = state.plugins.values().map(LoadedPlugin::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn stats(&self) -> LoaderStats {
        let state = self.state.lock().await;
        LoaderStats {
            total_plugins: state.plugins.len(),
            total_tools: state.tools.len(),
            plugin_dirs: self.plugin_dirs.iter().map(|d| d.display().to_string()).collect(),
        }
    }

    fn instantiate(&self, descriptor: &PluginDescriptor) -> Result<Box<dyn Plugin>, PluginError> {
        if let Some(plugin) = self.catalog.instantiate(&descriptor.entry) {
            return Ok(plugin);
        }

        if let Some(executable) = descriptor.executable() {
            if !is_executable(&executable) {
                return Err(PluginError::CodeUnavailable {
                    name: descriptor.name.clone(),
                    reason: format!("{} is not executable", executable.display()),
                });
            }
            return Ok(Box::new(ProcessPlugin::new(descriptor, executable)));
        }

        Err(PluginError::NoProvider {
            name: descriptor.name.clone(),
            entry: descriptor.entry.clone(),
        })
    }

    async fn load_locked(
        &self,
        state: &mut LoaderState,
        descriptor: &PluginDescriptor,
        config: PluginConfig,
    ) -> Result<PluginInfo, PluginError> {
        if !descriptor.enabled {
            return Err(PluginError::Disabled(descriptor.name.clone()));
        }

        let mut plugin = self.instantiate(descriptor)?;
        let ctx = PluginContext { descriptor, config: &config };
        plugin.on_load(&ctx).await?;

        let mut tool_names = Vec::new();
        for tool in plugin.tools() {
            let tool_name = tool.name().to_string();
            if let Some(previous) = state.tools.get(&tool_name)
                && previous.owner != descriptor.name
            {
                tracing::warn!(
                    tool = %tool_name,
                    plugin = %descriptor.name,
                    previous_owner = %previous.owner,
                    "Tool name already provided by another plugin, overriding"
                );
            }
            state.tools.insert(
                tool_name.clone(),
                OwnedTool { owner: descriptor.name.clone(), tool },
            );
            if !tool_names.contains(&tool_name) {
                tool_names.push(tool_name);
            }
        }

        let entry = LoadedPlugin {
            descriptor: descriptor.clone(),
            config,
            plugin,
            loaded: true,
            tool_names,
        };
        let info = entry.info();
        state.plugins.insert(descriptor.name.clone(), entry);

        tracing::info!(plugin = %info.name, version = %info.version, tools = info.tools.len(), "Loaded plugin");
        if let Some(events) = &self.events {
            events.publish(DomainEvent::PluginLoaded {
                name: info.name.clone(),
                version: info.version.clone(),
                tools: info.tools.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(info)
    }

    async fn unload_locked(&self, state: &mut LoaderState, name: &str) -> bool {
        let Some(mut entry) = state.plugins.remove(name) else {
            tracing::warn!(plugin = %name, "Cannot unload: plugin not loaded");
            return false;
        };

        entry.loaded = false;
        if let Err(e) = entry.plugin.on_unload().await {
            tracing::warn!(plugin = %name, "on_unload failed: {e}");
        }

        for tool_name in &entry.tool_names {
            if state.tools.get(tool_name).is_some_and(|o| o.owner == name) {
                state.tools.remove(tool_name);
            }
        }

        tracing::info!(plugin = %name, "Unloaded plugin");
        if let Some(events) = &self.events {
            events.publish(DomainEvent::PluginUnloaded {
                name: name.to_string(),
                timestamp: Utc::now(),
            });
        }
        true
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
