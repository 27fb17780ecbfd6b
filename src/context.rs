// File: ./src/context.rs
//! Where the config file and the default vault live.
//!
//! Nothing reads environment variables or global paths: code that touches
//! the filesystem is handed an `&dyn AppContext`.
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub trait AppContext: Send + Sync + std::fmt::Debug {
    /// Directory holding `config.toml`. Created on demand.
    fn get_config_dir(&self) -> Result<PathBuf>;

    /// Directory under which the default vault lives. Created on demand.
    fn get_data_dir(&self) -> Result<PathBuf>;

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_config_dir()?.join("config.toml"))
    }

    /// Vault used by the CLI when none is given on the command line.
    fn get_default_vault_dir(&self) -> Option<PathBuf> {
        self.get_data_dir().ok().map(|p| p.join("vault"))
    }
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory '{}'", path.display()))?;
    Ok(path)
}

// --- Production Implementation ---

/// Platform directories, or `config/` and `data/` under an explicit root.
#[derive(Clone, Debug, Default)]
pub struct StandardContext {
    root: Option<PathBuf>,
}

impl StandardContext {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, sub: &str, pick: fn(&ProjectDirs) -> &Path) -> Result<PathBuf> {
        let dir = match &self.root {
            Some(root) => root.join(sub),
            None => {
                let dirs = ProjectDirs::from("org", "itinerary", "itinerary")
                    .ok_or_else(|| anyhow::anyhow!("No home directory"))?;
                pick(&dirs).to_path_buf()
            }
        };
        ensure_dir(dir)
    }
}

impl AppContext for StandardContext {
    fn get_config_dir(&self) -> Result<PathBuf> {
        self.resolve("config", ProjectDirs::config_dir)
    }

    fn get_data_dir(&self) -> Result<PathBuf> {
        self.resolve("data", ProjectDirs::data_dir)
    }
}

// --- Test Implementation ---

/// A unique temporary root, removed when dropped.
#[derive(Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let root = std::env::temp_dir().join(format!("itinerary_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).expect("failed to create TestContext temp dir");
        Self { root }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn get_config_dir(&self) -> Result<PathBuf> {
        ensure_dir(self.root.join("config"))
    }

    fn get_data_dir(&self) -> Result<PathBuf> {
        ensure_dir(self.root.join("data"))
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
