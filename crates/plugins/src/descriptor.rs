//! Plugin bundle metadata and directory discovery.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PluginError;

/// Manifest file name inside a bundle directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Executable file name for subprocess plugins.
pub const PROCESS_ENTRY_FILE: &str = "plugin";

/// Static metadata about a plugin bundle, read from its manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub dependencies: Vec<String>,
    pub config_schema: serde_json::Value,
    pub enabled: bool,
    /// Catalog key the plugin code is registered under.
    pub entry: String,
    /// Bundle directory.
    pub location: PathBuf,
}

/// On-disk manifest shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct Manifest {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    config_schema: Option<toml::Table>,
    enabled: Option<bool>,
    entry: Option<String>,
}

impl PluginDescriptor {
    /// Descriptor with defaults for a bundle at `location`.
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            entry: name.clone(),
            name,
            version: "0.1.0".into(),
            description: String::new(),
            author: String::new(),
            dependencies: Vec::new(),
            config_schema: serde_json::Value::Object(serde_json::Map::new()),
            enabled: true,
            location: location.into(),
        }
    }

    /// Build a descriptor from manifest text. Missing fields take their
    /// defaults; `name` and `entry` default to the directory name.
    pub fn from_manifest_str(content: &str, dir: &Path) -> Result<Self, PluginError> {
        let manifest: Manifest = toml::from_str(content).map_err(|e| PluginError::Manifest {
            path: dir.join(MANIFEST_FILE),
            reason: e.to_string(),
        })?;

        let dir_name = dir_name(dir);
        let mut descriptor = Self::new(manifest.name.unwrap_or_else(|| dir_name.clone()), dir);
        descriptor.entry = manifest.entry.unwrap_or(dir_name);
        if let Some(version) = manifest.version {
            descriptor.version = version;
        }
        descriptor.description = manifest.description.unwrap_or_default();
        descriptor.author = manifest.author.unwrap_or_default();
        descriptor.dependencies = manifest.dependencies;
        descriptor.enabled = manifest.enabled.unwrap_or(true);
        if let Some(schema) = manifest.config_schema {
            descriptor.config_schema = serde_json::to_value(schema).map_err(|e| PluginError::Manifest {
                path: dir.join(MANIFEST_FILE),
                reason: e.to_string(),
            })?;
        }
        Ok(descriptor)
    }

    /// Inspect one bundle directory.
    ///
    /// Returns `Ok(None)` when the directory holds neither a manifest nor a
    /// plugin executable. A bundle with only an executable yields a
    /// degraded descriptor named after the directory.
    pub fn from_dir(dir: &Path) -> Result<Option<Self>, PluginError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.is_file() {
            let content = std::fs::read_to_string(&manifest_path).map_err(|e| PluginError::Manifest {
                path: manifest_path.clone(),
                reason: e.to_string(),
            })?;
            return Self::from_manifest_str(&content, dir).map(Some);
        }

        if dir.join(PROCESS_ENTRY_FILE).is_file() {
            let name = dir_name(dir);
            let mut descriptor = Self::new(name.clone(), dir);
            descriptor.description = format!("Auto-discovered plugin: {name}");
            return Ok(Some(descriptor));
        }

        Ok(None)
    }

    /// Path of the subprocess executable, if the bundle ships one.
    pub fn executable(&self) -> Option<PathBuf> {
        let path = self.location.join(PROCESS_ENTRY_FILE);
        path.is_file().then_some(path)
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Scan `dirs` in order and return a descriptor for every bundle found.
///
/// Missing directories are skipped. Entries whose name starts with `_` or
/// `.` are ignored. A malformed manifest is logged and the bundle skipped.
pub fn discover_in(dirs: &[PathBuf]) -> Vec<PluginDescriptor> {
    let mut found = Vec::new();

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => {
                tracing::debug!(dir = %dir.display(), "Plugin directory not found, skipping");
                continue;
            }
        };

        let mut bundles: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                let name = dir_name(p);
                !name.starts_with('_') && !name.starts_with('.')
            })
            .collect();
        bundles.sort();

        for bundle in bundles {
            match PluginDescriptor::from_dir(&bundle) {
                Ok(Some(descriptor)) => {
                    tracing::info!(plugin = %descriptor.name, version = %descriptor.version, "Discovered plugin");
                    found.push(descriptor);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(bundle = %bundle.display(), "Skipping plugin: {e}"),
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_defaults() {
        let dir = Path::new("/plugins/calculator");
        let d = PluginDescriptor::from_manifest_str("", dir).unwrap();
        assert_eq!(d.name, "calculator");
        assert_eq!(d.entry, "calculator");
        assert_eq!(d.version, "0.1.0");
        assert!(d.enabled);
        assert!(d.dependencies.is_empty());
        assert_eq!(d.config_schema, serde_json::json!({}));
        assert_eq!(d.location, dir);
    }

    #[test]
    fn manifest_full() {
        let content = r#"
name = "shell_exec"
version = "1.2.0"
description = "Run allowed shell commands"
author = "ember"
dependencies = ["core"]
enabled = false
entry = "shell"

[config_schema.allowed_commands]
type = "array"
"#;
        let d = PluginDescriptor::from_manifest_str(content, Path::new("/p/shell")).unwrap();
        assert_eq!(d.name, "shell_exec");
        assert_eq!(d.version, "1.2.0");
        assert_eq!(d.entry, "shell");
        assert!(!d.enabled);
        assert_eq!(d.dependencies, vec!["core"]);
        assert_eq!(d.config_schema["allowed_commands"]["type"], "array");
    }

    #[test]
    fn malformed_manifest_is_error() {
        let err = PluginDescriptor::from_manifest_str("name = ", Path::new("/p/bad")).unwrap_err();
        assert!(matches!(err, PluginError::Manifest { .. }));
    }

    #[test]
    fn discovery_skips_hidden_and_invalid() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path();

        std::fs::create_dir(base.join("alpha")).unwrap();
        std::fs::write(base.join("alpha").join(MANIFEST_FILE), "description = \"a\"").unwrap();

        std::fs::create_dir(base.join("beta")).unwrap();
        std::fs::write(base.join("beta").join(PROCESS_ENTRY_FILE), "#!/bin/sh\n").unwrap();

        std::fs::create_dir(base.join("_private")).unwrap();
        std::fs::write(base.join("_private").join(MANIFEST_FILE), "").unwrap();

        std::fs::create_dir(base.join("broken")).unwrap();
        std::fs::write(base.join("broken").join(MANIFEST_FILE), "name = [").unwrap();

        std::fs::create_dir(base.join("empty")).unwrap();
        std::fs::write(base.join("loose_file.toml"), "").unwrap();

        let found = discover_in(&[base.to_path_buf(), base.join("does_not_exist")]);
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(found[1].description, "Auto-discovered plugin: beta");
        assert!(found[1].executable().is_some());
        assert!(found[0].executable().is_none());
    }
}
