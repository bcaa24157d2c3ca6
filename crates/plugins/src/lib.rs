//! Plugin system for Ember.
//!
//! A plugin is a bundle directory under one of the configured plugin dirs:
//!
//! ```text
//! plugins/builtin/calculator/
//! ├── plugin.toml      # manifest (optional)
//! └── plugin           # executable, for subprocess plugins (optional)
//! ```
//!
//! The manifest's `entry` names a plugin compiled into the host and
//! registered in a [`PluginCatalog`]. A bundle without a matching catalog
//! entry but with a `plugin` executable is driven over a small
//! stdin/stdout protocol by [`ProcessPlugin`].
//!
//! [`PluginLoader`] ties it together: discover bundles, load them, harvest
//! their tools, and retract exactly those tools again on unload.

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod plugin;
pub mod process;
pub mod table;

pub use catalog::{PluginCatalog, PluginFactory};
pub use descriptor::{MANIFEST_FILE, PROCESS_ENTRY_FILE, PluginDescriptor};
pub use error::PluginError;
pub use loader::{LoaderStats, PluginLoader};
pub use plugin::{Plugin, PluginConfig, PluginContext, PluginInfo, redact_config};
pub use process::ProcessPlugin;
pub use table::{DeclarativePlugin, FnTool, ToolSpec, ToolTable};
