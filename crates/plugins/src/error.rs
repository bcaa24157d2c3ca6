use std::path::PathBuf;

/// Errors raised while discovering or loading a plugin.
///
/// The loader never propagates these to its caller; they are logged and
/// the offending bundle is skipped.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin '{0}' is disabled")]
    Disabled(String),

    #[error("Failed to parse manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Plugin '{name}' code cannot be loaded: {reason}")]
    CodeUnavailable { name: String, reason: String },

    #[error("No capability provider for plugin '{name}' (entry '{entry}')")]
    NoProvider { name: String, entry: String },

    #[error("Plugin '{name}' lifecycle hook failed: {reason}")]
    Lifecycle { name: String, reason: String },

    #[error("Invalid config for plugin '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("Plugin process '{name}' failed: {reason}")]
    Process { name: String, reason: String },
}
