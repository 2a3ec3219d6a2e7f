//! Path utilities for shelf applications.

use std::io;
use std::path::PathBuf;

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".shelf";

/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Extension of database files under the data directory.
pub const DB_EXTENSION: &str = "redb";

/// Provides access to the shelf directory structure.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Application name.
    pub app_name: String,
    /// User's home directory.
    pub home_dir: PathBuf,
}

impl Paths {
    /// Creates a new Paths instance for the given app.
    pub fn new(app_name: impl Into<String>) -> io::Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "could not find home directory")
        })?;
        Ok(Self::with_home(home_dir, app_name))
    }

    /// Creates a Paths instance rooted at an explicit home directory.
    pub fn with_home(home_dir: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            home_dir: home_dir.into(),
        }
    }

    /// Returns the base directory (~/.shelf).
    pub fn base_dir(&self) -> PathBuf {
        self.home_dir.join(DEFAULT_BASE_DIR)
    }

    /// Returns the app-specific directory (~/.shelf/<app>).
    pub fn app_dir(&self) -> PathBuf {
        self.base_dir().join(&self.app_name)
    }

    /// Returns the config file path (~/.shelf/<app>/config.yaml).
    pub fn config_file(&self) -> PathBuf {
        self.app_dir().join(DEFAULT_CONFIG_FILE)
    }

    /// Returns the data directory (~/.shelf/<app>/data).
    pub fn data_dir(&self) -> PathBuf {
        self.app_dir().join("data")
    }

    /// Creates the data directory if it doesn't exist.
    pub fn ensure_data_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.data_dir())
    }

    /// Returns a path within the data directory.
    pub fn data_path(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }

    /// Returns the default database file for a backend
    /// (~/.shelf/<app>/data/<backend>.redb).
    pub fn db_path(&self, backend: &str) -> PathBuf {
        self.data_path(&format!("{backend}.{DB_EXTENSION}"))
    }
}
