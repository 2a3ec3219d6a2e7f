//! Configuration management for CLI tools.
//!
//! Configuration is stored in ~/.shelf/{app_name}/config.yaml:
//!
//! ```yaml
//! current_context: home
//! contexts:
//!   home:
//!     backend: kv
//!   archive:
//!     backend: graph
//!     path: /srv/archive.redb
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths::Paths;

/// Backend used when neither a context nor a flag names one.
pub const DEFAULT_BACKEND: &str = "kv";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application name (not serialized).
    #[serde(skip)]
    pub app_name: String,

    /// Name of the currently active context.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_context: String,

    /// Map of context name to context configuration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contexts: BTreeMap<String, Context>,

    /// Path to the config file (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

/// A named store selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Context name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Storage model: kv, doc or graph.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backend: String,

    /// Database file. Empty means the per-backend file in the data directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl Context {
    /// The backend name, falling back to [`DEFAULT_BACKEND`].
    pub fn backend(&self) -> &str {
        if self.backend.is_empty() {
            DEFAULT_BACKEND
        } else {
            &self.backend
        }
    }

    /// The database file for this context.
    pub fn db_path(&self, paths: &Paths) -> PathBuf {
        if self.path.is_empty() {
            paths.db_path(self.backend())
        } else {
            PathBuf::from(&self.path)
        }
    }
}

impl Config {
    /// Gets the default config file path.
    pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
        Paths::new(app_name).ok().map(|p| p.config_file())
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Saves the configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Adds or replaces a context.
    pub fn add_context(&mut self, name: &str, mut ctx: Context) -> anyhow::Result<()> {
        ctx.name = name.to_string();
        self.contexts.insert(name.to_string(), ctx);
        self.save()
    }

    /// Deletes a context.
    pub fn delete_context(&mut self, name: &str) -> anyhow::Result<()> {
        if self.contexts.remove(name).is_none() {
            anyhow::bail!("context '{}' not found", name);
        }
        if self.current_context == name {
            self.current_context.clear();
        }
        self.save()
    }

    /// Sets the current context.
    pub fn use_context(&mut self, name: &str) -> anyhow::Result<()> {
        if !self.contexts.contains_key(name) {
            anyhow::bail!("context '{}' not found", name);
        }
        self.current_context = name.to_string();
        self.save()
    }

    /// Gets a specific context.
    pub fn get_context(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    /// Gets the current context.
    pub fn get_current_context(&self) -> Option<&Context> {
        if self.current_context.is_empty() {
            return None;
        }
        self.contexts.get(&self.current_context)
    }

    /// Resolves the context by name, or current context if name is empty.
    pub fn resolve_context(&self, name: Option<&str>) -> Option<&Context> {
        match name {
            Some(n) if !n.is_empty() => self.get_context(n),
            _ => self.get_current_context(),
        }
    }

    /// Lists all context names, sorted.
    pub fn list_contexts(&self) -> Vec<&str> {
        self.contexts.keys().map(|s| s.as_str()).collect()
    }
}

/// Loads configuration for the specified app, creating an empty config
/// file on first use.
pub fn load_config(app_name: &str, custom_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path(app_name)
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cfg = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)?
        }
    } else {
        let cfg = Config::default();
        std::fs::write(&config_path, serde_yaml::to_string(&cfg)?)?;
        cfg
    };

    cfg.app_name = app_name.to_string();
    cfg.config_path = config_path;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &tempfile::TempDir) -> Config {
        let path = dir.path().join("nested").join("config.yaml");
        load_config("shelf", path.to_str()).unwrap()
    }

    #[test]
    fn test_load_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = temp_config(&dir);
        assert!(cfg.path().exists());
        assert!(cfg.contexts.is_empty());
        assert_eq!(cfg.app_name, "shelf");
    }

    #[test]
    fn test_context_lifecycle_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = temp_config(&dir);

        let ctx = Context {
            backend: "graph".into(),
            path: "/tmp/g.redb".into(),
            ..Default::default()
        };
        cfg.add_context("archive", ctx).unwrap();
        cfg.add_context("home", Context::default()).unwrap();
        cfg.use_context("archive").unwrap();
        assert!(cfg.use_context("missing").is_err());

        let path = cfg.path().to_str().unwrap().to_string();
        let reloaded = load_config("shelf", Some(&path)).unwrap();
        assert_eq!(reloaded.current_context, "archive");
        assert_eq!(reloaded.list_contexts(), vec!["archive", "home"]);
        let archive = reloaded.resolve_context(None).unwrap();
        assert_eq!(archive.name, "archive");
        assert_eq!(archive.backend(), "graph");
        assert_eq!(reloaded.resolve_context(Some("home")).unwrap().backend(), "kv");

        let mut cfg = reloaded;
        cfg.delete_context("archive").unwrap();
        assert!(cfg.current_context.is_empty());
        assert!(cfg.resolve_context(None).is_none());
        assert!(cfg.delete_context("archive").is_err());
    }

    #[test]
    fn test_db_path_defaults_per_backend() {
        let paths = Paths::with_home("/home/me", "shelf");
        let ctx = Context {
            backend: "doc".into(),
            ..Default::default()
        };
        assert_eq!(
            ctx.db_path(&paths),
            PathBuf::from("/home/me/.shelf/shelf/data/doc.redb")
        );

        let ctx = Context {
            path: "/srv/lib.redb".into(),
            ..Default::default()
        };
        assert_eq!(ctx.db_path(&paths), PathBuf::from("/srv/lib.redb"));
    }
}
