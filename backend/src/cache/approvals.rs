//! Persisted owner → spender approval record
//!
//! Stored as `<dir>/<token>-approvals.json`, a map from owner address to the
//! spenders it has granted an unlimited allowance. Without a directory the
//! record only lives as long as the process.

use crate::models::Address;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApprovalStoreError {
    #[error("Approval record {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Approval record {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalStore {
    path: Option<PathBuf>,
    approved: BTreeMap<Address, BTreeSet<Address>>,
}

impl ApprovalStore {
    /// Record that is never written to disk
    pub fn ephemeral() -> Self {
        Self::default()
    }

    /// Load the record for `token` from `dir`, empty if none exists yet
    pub fn load(dir: &Path, token: &Address) -> Result<Self, ApprovalStoreError> {
        let path = dir.join(format!("{token}-approvals.json"));
        let approved = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ApprovalStoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(ApprovalStoreError::Io { path, source }),
        };
        Ok(Self {
            path: Some(path),
            approved,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, owner: &Address, spender: &Address) -> bool {
        self.approved
            .get(owner)
            .is_some_and(|spenders| spenders.contains(spender))
    }

    /// Record a confirmed approval and persist the whole record
    pub fn record(&mut self, owner: &Address, spender: &Address) -> Result<(), ApprovalStoreError> {
        self.approved
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone());
        self.persist()
    }

    fn persist(&self) -> Result<(), ApprovalStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| ApprovalStoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(&self.approved).map_err(|source| {
            ApprovalStoreError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(path, json).map_err(io_err)
    }
}
