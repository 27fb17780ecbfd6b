// File: ./src/store.rs
//! Document stores the engine reads sources from.
//!
//! Document identities are vault-relative paths with `/` separators
//! (`Trips/Japan.md`), regardless of the host platform.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub const DOCUMENT_EXTENSION: &str = "md";

/// Enumerates known documents and reads their current text on demand.
pub trait DocumentStore: Send {
    /// Every known document identity, sorted.
    fn list(&self) -> Result<Vec<String>>;

    fn read(&self, id: &str) -> Result<String>;

    fn exists(&self, id: &str) -> bool {
        self.list().map(|ids| ids.iter().any(|i| i == id)).unwrap_or(false)
    }
}

// --- In-memory store ---

/// Shared in-memory documents.
///
/// Clones share the same map, so a host can keep a handle and edit documents
/// after giving the store to an engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I, K, V>(docs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (k, v) in docs {
            store.insert(k, v);
        }
        store
    }

    pub fn insert(&self, id: impl Into<String>, text: impl Into<String>) {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), text.into());
    }

    pub fn remove(&self, id: &str) -> Option<String> {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

impl DocumentStore for MemoryStore {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn read(&self, id: &str) -> Result<String> {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Document '{}' not found", id))
    }

    fn exists(&self, id: &str) -> bool {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}

// --- Filesystem store ---

/// A directory of markdown files.
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: PathBuf,
}

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            anyhow::bail!("Vault root '{}' is not a directory", root.display());
        }
        Ok(Self { root })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.split('/').any(|part| part == ".." || part.is_empty()) {
            anyhow::bail!("Invalid document path '{}'", id);
        }
        Ok(self.root.join(id))
    }

    fn collect(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            // Skip dot-directories such as .obsidian or .git
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if path.is_dir() {
                Self::collect(&path, out)?;
            } else if path.extension().and_then(|s| s.to_str()) == Some(DOCUMENT_EXTENSION) {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl DocumentStore for VaultStore {
    fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        Self::collect(&self.root, &mut files)
            .with_context(|| format!("Failed to scan vault '{}'", self.root.display()))?;

        let mut ids = files
            .iter()
            .filter_map(|p| p.strip_prefix(&self.root).ok())
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }

    fn read(&self, id: &str) -> Result<String> {
        let path = self.path_for(id)?;
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document '{}'", path.display()))
    }

    fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }
}
