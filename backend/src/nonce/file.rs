//! File-backed nonce region for several processes on one host
//!
//! Entries live in a JSON file; the lock flag is a sibling `<file>.lock`
//! created with `create_new`, which the filesystem makes atomic. Writes go to
//! a temporary file that is renamed over the region file, so a crashed writer
//! never leaves a half-written region behind.
//!
//! A lock file left by a killed process has to be removed by hand.

use super::{NonceEntry, NonceError, NonceRegion};
use crate::models::Address;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileRegion {
    path: PathBuf,
    lock_path: PathBuf,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl FileRegion {
    /// Create an empty region (and clear any stale lock) at `path`
    pub fn initialize(path: impl AsRef<Path>) -> Result<Self, NonceError> {
        let region = Self::handle(path.as_ref());
        if let Some(parent) = region.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        region.store(&BTreeMap::new())?;
        match fs::remove_file(&region.lock_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        Ok(region)
    }

    /// Open a region created by [`FileRegion::initialize`]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NonceError> {
        let region = Self::handle(path.as_ref());
        if !region.path.exists() {
            return Err(NonceError::NotInitialised(region.path));
        }
        Ok(region)
    }

    fn handle(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock_path: sibling(path, ".lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<Address, NonceEntry>, NonceError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(NonceError::NotInitialised(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    fn store(&self, entries: &BTreeMap<Address, NonceEntry>) -> Result<(), NonceError> {
        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl NonceRegion for FileRegion {
    fn try_acquire(&self) -> Result<bool, NonceError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn release(&self) -> Result<(), NonceError> {
        fs::remove_file(&self.lock_path)?;
        Ok(())
    }

    fn read(&self, account: &Address) -> Result<Option<NonceEntry>, NonceError> {
        Ok(self.load()?.get(account).copied())
    }

    fn write(&self, account: &Address, entry: NonceEntry) -> Result<(), NonceError> {
        let mut entries = self.load()?;
        entries.insert(account.clone(), entry);
        self.store(&entries)
    }

    fn entries(&self) -> Result<BTreeMap<Address, NonceEntry>, NonceError> {
        self.load()
    }

    fn lock_name(&self) -> String {
        self.lock_path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        assert!(matches!(
            FileRegion::open(&path),
            Err(NonceError::NotInitialised(_))
        ));
        FileRegion::initialize(&path).unwrap();
        assert!(FileRegion::open(&path).unwrap().entries().unwrap().is_empty());
    }

    #[test]
    fn test_entries_persist_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        let first = FileRegion::initialize(&path).unwrap();
        let entry = NonceEntry {
            last_seen_block: 3,
            next_sequence: 9,
        };
        first.write(&Address::from_index(1), entry).unwrap();

        let second = FileRegion::open(&path).unwrap();
        assert_eq!(second.read(&Address::from_index(1)).unwrap(), Some(entry));
    }

    #[test]
    fn test_lock_file_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        let a = FileRegion::initialize(&path).unwrap();
        let b = FileRegion::open(&path).unwrap();
        assert!(a.try_acquire().unwrap());
        assert!(!b.try_acquire().unwrap());
        a.release().unwrap();
        assert!(b.try_acquire().unwrap());
        b.release().unwrap();
    }

    #[test]
    fn test_lock_name_is_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        let region = FileRegion::initialize(&path).unwrap();
        assert!(region.lock_name().ends_with("nonces.json.lock"));
    }

    #[test]
    fn test_entries_through_coordinator_leave_no_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        let region = FileRegion::initialize(&path).unwrap();
        region
            .write(
                &Address::from_index(2),
                NonceEntry {
                    last_seen_block: 1,
                    next_sequence: 4,
                },
            )
            .unwrap();

        let coordinator = crate::nonce::NonceCoordinator::new(std::sync::Arc::new(region));
        assert_eq!(coordinator.entries().unwrap().len(), 1);
        assert!(!sibling(&path, ".lock").exists());
    }
}
