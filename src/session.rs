// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable local session storage.
//!
//! The gate's two flags survive process restarts in a small key-value file,
//! the way a browser app keeps them in local storage.

use crate::error::AppError;
use crate::gate::GateState;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key of the "identity proven" flag.
pub const SIGNED_UP_KEY: &str = "study_hub_signed_up";
/// Key of the "access password accepted" flag.
pub const ACCESS_OK_KEY: &str = "study_hub_access_ok";

const FLAG_SET: &str = "true";

/// Durable string key-value storage scoped to this installation.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Key-value storage backed by a JSON file, rewritten atomically on change.
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::Storage(format!("corrupt session file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened session storage");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_locked(&self, entries: &BTreeMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| AppError::Storage(format!("failed to encode session: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::Storage(format!("failed to replace {}: {}", self.path.display(), e))
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Storage("session storage lock poisoned".to_string()))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_locked(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self.lock()?;
        if entries.remove(key).is_some() {
            self.write_locked(&entries)?;
        }
        Ok(())
    }
}

/// In-memory key-value storage (tests and throwaway sessions).
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Storage("session storage lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// The two persisted gate flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub identity_proven: bool,
    pub secret_proven: bool,
}

impl SessionState {
    /// Read both flags from storage. Anything other than `"true"` is unset.
    pub fn load(kv: &dyn KeyValueStore) -> Result<Self, AppError> {
        Ok(Self {
            identity_proven: kv.get(SIGNED_UP_KEY)?.as_deref() == Some(FLAG_SET),
            secret_proven: kv.get(ACCESS_OK_KEY)?.as_deref() == Some(FLAG_SET),
        })
    }

    /// Write both flags; unset flags are removed rather than stored as false.
    pub fn persist(&self, kv: &dyn KeyValueStore) -> Result<(), AppError> {
        for (key, set) in [
            (SIGNED_UP_KEY, self.identity_proven),
            (ACCESS_OK_KEY, self.secret_proven),
        ] {
            if set {
                kv.set(key, FLAG_SET)?;
            } else {
                kv.remove(key)?;
            }
        }
        Ok(())
    }

    /// Gate state implied by the flags. The secret never admits on its own.
    pub fn gate_state(&self) -> GateState {
        match (self.identity_proven, self.secret_proven) {
            (true, true) => GateState::Admitted,
            (true, false) => GateState::IdentityProven,
            (false, _) => GateState::Unauthenticated,
        }
    }
}
