use std::collections::HashMap;
use std::sync::Arc;

use crate::plugin::Plugin;

/// Constructs a fresh plugin instance. Dependencies are captured by the closure.
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Plugins compiled into the host, keyed by manifest `entry`.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `entry`. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, entry: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        let entry = entry.into();
        if self.factories.insert(entry.clone(), Arc::new(factory)).is_some() {
            tracing::warn!(entry = %entry, "Catalog entry replaced");
        }
        self
    }

    pub fn with<F>(mut self, entry: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(entry, factory);
        self
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.factories.contains_key(entry)
    }

    pub fn instantiate(&self, entry: &str) -> Option<Box<dyn Plugin>> {
        self.factories.get(entry).map(|factory| factory())
    }

    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.factories.keys().cloned().collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("entries", &self.entries())
            .finish()
    }
}
