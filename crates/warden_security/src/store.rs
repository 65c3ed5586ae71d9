//! Persistence backends for the identity directory.
//!
//! The directory is small and rewritten in full on every change, so a store
//! only needs to load and save the complete record set.

use crate::{IdentityRecord, Records};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use warden_core::{Handle, Role, WILDCARD_SCOPE, fold_scope};
use warden_error::{SecurityError, SecurityErrorKind, SecurityResult, StorageError, StorageErrorKind};

/// Load and save the full identity record set.
pub trait RecordStore: Send + Sync {
    /// Load every record. A store that does not exist yet yields an empty set.
    fn load(&self) -> SecurityResult<Records>;

    /// Replace the persisted record set with `records`.
    ///
    /// Either the whole set is written or the previous contents stay intact.
    fn save(&self, records: &Records) -> SecurityResult<()>;
}

/// JSON file store.
///
/// The file holds an object keyed by handle:
///
/// ```text
/// {
///   "~alice@example.com": {
///     "hostmask": "~alice@example.com",
///     "roles": { "#rust": "Admin", "#ops": "Trusted" }
///   }
/// }
/// ```
///
/// Writes go to a sibling temp file which is then renamed over the original.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    fn ensure_parent(&self) -> SecurityResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }
        Ok(())
    }

    fn write_atomically(&self, contents: &[u8]) -> Result<(), std::io::Error> {
        let temp = self.temp_path();
        let result = (|| {
            let mut file = std::fs::File::create(&temp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            std::fs::rename(&temp, &self.path)
        })();
        if result.is_err() {
            let _ = std::fs::remove_file(&temp);
        }
        result
    }
}

impl RecordStore for JsonFileStore {
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> SecurityResult<Records> {
        if !self.path.exists() {
            tracing::info!("Identity store missing, creating empty store");
            let records = Records::new();
            self.save(&records)?;
            return Ok(records);
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                self.path.display(),
                e
            )))
        })?;

        let decoded: BTreeMap<String, IdentityRecord> = serde_json::from_str(&raw)
            .map_err(|e| StorageError::new(StorageErrorKind::Corrupt(e.to_string())))?;

        let records = reconcile(decoded)?;
        tracing::debug!(count = records.len(), "Loaded identity records");
        Ok(records)
    }

    #[tracing::instrument(skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    fn save(&self, records: &Records) -> SecurityResult<()> {
        self.ensure_parent()?;

        let mut encoded = serde_json::to_vec_pretty(records)
            .map_err(|e| StorageError::new(StorageErrorKind::Serialize(e.to_string())))?;
        encoded.push(b'\n');

        self.write_atomically(&encoded).map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                self.path.display(),
                e
            )))
        })?;

        tracing::debug!("Persisted identity records");
        Ok(())
    }
}

/// Rebuild a decoded file into a consistent record set.
///
/// Keys are normalized and become the authoritative handle of each record,
/// and scope names are folded. The file is rejected as corrupt when two keys
/// name the same handle, when folded scopes of one record disagree, when
/// `Owner` appears outside the wildcard scope or when more than one record
/// holds it.
fn reconcile(decoded: BTreeMap<String, IdentityRecord>) -> SecurityResult<Records> {
    let mut records = Records::new();
    for (key, record) in decoded {
        let handle = Handle::normalize(&key);
        if record.handle != handle {
            tracing::warn!(key = %key, hostmask = %record.handle, "Record hostmask differs from key, using key");
        }

        let mut roles = BTreeMap::new();
        for (scope, role) in record.roles {
            if role == Role::Owner && scope != WILDCARD_SCOPE {
                return Err(corrupt(format!("{} holds Owner in scope {}", handle, scope)));
            }
            let folded = fold_scope(&scope);
            if let Some(existing) = roles.insert(folded, role)
                && existing != role
            {
                return Err(corrupt(format!(
                    "{} has conflicting roles for scope {}",
                    handle, scope
                )));
            }
        }

        if records.contains_key(&handle) {
            return Err(corrupt(format!("{} appears under more than one key", handle)));
        }
        records.insert(handle.clone(), IdentityRecord { handle, roles });
    }

    let owners: Vec<&Handle> = records
        .values()
        .filter(|record| record.is_owner())
        .map(|record| &record.handle)
        .collect();
    if owners.len() > 1 {
        let names = owners.iter().map(|h| h.as_str()).collect::<Vec<_>>().join(", ");
        return Err(corrupt(format!("multiple owners: {}", names)));
    }

    Ok(records)
}

fn corrupt(detail: String) -> SecurityError {
    SecurityError::new(SecurityErrorKind::Storage(StorageError::new(
        StorageErrorKind::Corrupt(detail),
    )))
}

/// In-memory store for hosts that do not persist identities.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with `records`.
    pub fn with_records(records: Records) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl RecordStore for MemoryStore {
    fn load(&self) -> SecurityResult<Records> {
        Ok(self.records.lock().clone())
    }

    fn save(&self, records: &Records) -> SecurityResult<()> {
        *self.records.lock() = records.clone();
        Ok(())
    }
}
