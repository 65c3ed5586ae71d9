//! Persistent identity directory.

use crate::{JsonFileStore, RecordStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};
use warden_core::{Handle, Role, WILDCARD_SCOPE, fold_scope};
use warden_error::{SecurityError, SecurityErrorKind, SecurityResult};

/// Roles assigned to a single handle, keyed by scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Normalized handle
    #[serde(rename = "hostmask")]
    pub handle: Handle,
    /// Role per folded scope; only `Owner` lives at `*`
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
}

impl IdentityRecord {
    /// Create a record with no roles.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            roles: BTreeMap::new(),
        }
    }

    /// Whether this record holds the owner role in the wildcard scope.
    pub fn is_owner(&self) -> bool {
        self.roles.get(WILDCARD_SCOPE) == Some(&Role::Owner)
    }

    /// Effective role in `scope`.
    ///
    /// Owner at `*` wins everywhere, otherwise only the entry for `scope`
    /// counts.
    pub fn role_in(&self, scope: &str) -> Option<Role> {
        if self.is_owner() {
            return Some(Role::Owner);
        }
        self.roles.get(&fold_scope(scope)).copied()
    }
}

/// Complete record set, ordered by handle.
pub type Records = BTreeMap<Handle, IdentityRecord>;

/// Result of [`IdentityDirectory::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was created
    Created,
    /// An existing record gained or changed a scope entry
    Updated {
        /// Role previously held in that scope, if any
        previous: Option<Role>,
    },
    /// The record already held this role; nothing was written
    Unchanged,
}

/// Result of [`IdentityDirectory::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The scope entry was removed and the record still has others
    Removed {
        /// Role that was held
        role: Role,
    },
    /// The last scope entry was removed along with the record
    IdentityRemoved {
        /// Role that was held
        role: Role,
    },
    /// The record exists but holds nothing in that scope
    NotAssigned,
    /// No record exists for the handle
    UnknownIdentity,
}

/// Authoritative mapping from handle to per-scope roles.
///
/// Every mutation is persisted before it becomes visible: the next record set
/// is built aside, written through the store and only then swapped in. A
/// failed write leaves both memory and disk unchanged.
///
/// At most one record ever holds [`Role::Owner`], and only at the wildcard
/// scope. The owner's record cannot be changed or removed through this type.
pub struct IdentityDirectory {
    store: Box<dyn RecordStore>,
    records: Mutex<Records>,
}

impl std::fmt::Debug for IdentityDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityDirectory")
            .field("records", &self.records.lock().len())
            .finish_non_exhaustive()
    }
}

impl IdentityDirectory {
    /// Load the directory from a store.
    #[instrument(skip(store))]
    pub fn load(store: impl RecordStore + 'static) -> SecurityResult<Self> {
        let records = store.load()?;
        info!(count = records.len(), "Identity directory loaded");
        Ok(Self {
            store: Box::new(store),
            records: Mutex::new(records),
        })
    }

    /// Open a JSON file backed directory, creating the file when missing.
    pub fn open(path: impl Into<PathBuf>) -> SecurityResult<Self> {
        Self::load(JsonFileStore::new(path))
    }

    /// Effective role of `handle` in `scope`. Unknown handles are `Everyone`.
    pub fn get_role(&self, handle: &Handle, scope: &str) -> Role {
        self.records
            .lock()
            .get(handle)
            .and_then(|record| record.role_in(scope))
            .unwrap_or_default()
    }

    /// Handle of the current owner.
    pub fn owner(&self) -> Option<Handle> {
        owner_of(&self.records.lock()).cloned()
    }

    /// Whether an owner is enrolled.
    pub fn has_owner(&self) -> bool {
        self.owner().is_some()
    }

    /// Copy of the record for `handle`.
    pub fn record(&self, handle: &Handle) -> Option<IdentityRecord> {
        self.records.lock().get(handle).cloned()
    }

    /// Copy of every record.
    pub fn snapshot(&self) -> Records {
        self.records.lock().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the directory holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Rewrite the store from the in-memory records.
    pub fn save(&self) -> SecurityResult<()> {
        let records = self.records.lock();
        self.store.save(&records)
    }

    /// Assign `role` to `handle` in `scope`.
    ///
    /// Scopes are stored folded. `Owner` is always stored at the wildcard
    /// scope regardless of `scope`.
    ///
    /// # Errors
    ///
    /// * `OwnerProtected` when `handle` is the current owner.
    /// * `OwnerConflict` when assigning `Owner` while another owner exists.
    /// * `Storage` when the rewrite fails; nothing changes in that case.
    #[instrument(skip(self, handle), fields(handle = %handle))]
    pub fn upsert(&self, handle: &Handle, scope: &str, role: Role) -> SecurityResult<UpsertOutcome> {
        let mut records = self.records.lock();
        let owner = owner_of(&records).cloned();

        if owner.as_ref() == Some(handle) {
            warn!("Refusing to modify owner record");
            return Err(SecurityError::new(SecurityErrorKind::OwnerProtected {
                handle: handle.to_string(),
            }));
        }

        let scope = if role == Role::Owner {
            if let Some(holder) = owner {
                warn!(holder = %holder, "Owner already enrolled");
                return Err(SecurityError::new(SecurityErrorKind::OwnerConflict {
                    holder: holder.to_string(),
                }));
            }
            WILDCARD_SCOPE.to_string()
        } else {
            fold_scope(scope)
        };
        let scope = scope.as_str();

        let previous = records
            .get(handle)
            .and_then(|record| record.roles.get(scope))
            .copied();
        if previous == Some(role) {
            debug!(scope, %role, "Role already assigned");
            return Ok(UpsertOutcome::Unchanged);
        }

        let created = !records.contains_key(handle);
        let mut next = records.clone();
        next.entry(handle.clone())
            .or_insert_with(|| IdentityRecord::new(handle.clone()))
            .roles
            .insert(scope.to_string(), role);

        self.store.save(&next)?;
        *records = next;

        info!(scope, %role, created, "Role assigned");
        Ok(if created {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated { previous }
        })
    }

    /// Remove the role `handle` holds in `scope`.
    ///
    /// A record left without any scope entry is deleted.
    ///
    /// # Errors
    ///
    /// * `OwnerProtected` when `handle` is the current owner.
    /// * `Storage` when the rewrite fails; nothing changes in that case.
    #[instrument(skip(self, handle), fields(handle = %handle))]
    pub fn remove(&self, handle: &Handle, scope: &str) -> SecurityResult<RemoveOutcome> {
        let mut records = self.records.lock();

        if owner_of(&records) == Some(handle) {
            warn!("Refusing to remove owner record");
            return Err(SecurityError::new(SecurityErrorKind::OwnerProtected {
                handle: handle.to_string(),
            }));
        }

        let folded = fold_scope(scope);
        let scope = folded.as_str();
        let Some(record) = records.get(handle) else {
            return Ok(RemoveOutcome::UnknownIdentity);
        };
        let Some(role) = record.roles.get(scope).copied() else {
            return Ok(RemoveOutcome::NotAssigned);
        };

        let mut next = records.clone();
        let emptied = match next.get_mut(handle) {
            Some(record) => {
                record.roles.remove(scope);
                record.roles.is_empty()
            }
            None => false,
        };
        if emptied {
            next.remove(handle);
        }

        self.store.save(&next)?;
        *records = next;

        info!(scope, %role, emptied, "Role removed");
        Ok(if emptied {
            RemoveOutcome::IdentityRemoved { role }
        } else {
            RemoveOutcome::Removed { role }
        })
    }
}

fn owner_of(records: &Records) -> Option<&Handle> {
    records
        .values()
        .find(|record| record.is_owner())
        .map(|record| &record.handle)
}
