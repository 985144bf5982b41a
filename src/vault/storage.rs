//! File-backed vault persistence

use crate::errors::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stores the single vault blob at a fixed path
#[derive(Debug, Clone)]
pub struct FileVaultStore {
    path: PathBuf,
}

impl FileVaultStore {
    /// Create a store at `path`, creating parent directories as needed
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the stored vault, if any
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let vault = fs::read_to_string(&self.path)?;
        debug!("Loaded vault from {:?}", self.path);
        Ok(Some(vault))
    }

    /// Replace the stored vault
    pub fn save(&self, vault: &str) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, vault)?;
        fs::rename(&tmp, &self.path)?;
        info!("Vault persisted to {:?}", self.path);
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = FileVaultStore::new(dir.path().join("nested").join("vault.json")).unwrap();

        assert_eq!(store.load().unwrap(), None);
        store.save("{\"version\":1}").unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap().as_deref(), Some("{\"version\":1}"));

        store.save("{\"version\":2}").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("{\"version\":2}"));
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json")).unwrap();
        store.save("blob").unwrap();
        store.delete().unwrap();
        assert!(!store.exists());
        store.delete().unwrap();
    }
}
