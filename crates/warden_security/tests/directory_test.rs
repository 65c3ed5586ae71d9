//! Identity directory persistence and owner invariants.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use warden_core::{Handle, Role, WILDCARD_SCOPE};
use warden_error::{SecurityError, SecurityErrorKind, SecurityResult, StorageError, StorageErrorKind};
use warden_security::{
    IdentityDirectory, JsonFileStore, MemoryStore, RecordStore, Records, RemoveOutcome,
    UpsertOutcome,
};

/// Store whose writes can be switched to fail.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: Arc<MemoryStore>,
    failing: Arc<AtomicBool>,
}

impl RecordStore for FlakyStore {
    fn load(&self) -> SecurityResult<Records> {
        self.inner.load()
    }

    fn save(&self, records: &Records) -> SecurityResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SecurityError::new(SecurityErrorKind::Storage(StorageError::new(
                StorageErrorKind::FileWrite("disk full".to_string()),
            ))));
        }
        self.inner.save(records)
    }
}

fn handle(raw: &str) -> Handle {
    Handle::normalize(raw)
}

#[test]
fn test_round_trip_through_json_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");

    let directory = IdentityDirectory::open(&path).unwrap();
    directory.upsert(&handle("root@box"), WILDCARD_SCOPE, Role::Owner).unwrap();
    directory.upsert(&handle("ann@isp"), "#rust", Role::Admin).unwrap();
    directory.upsert(&handle("ann@isp"), WILDCARD_SCOPE, Role::Trusted).unwrap();
    directory.upsert(&handle("troll@isp"), "#rust", Role::BadBoy).unwrap();
    let before = directory.snapshot();
    drop(directory);

    let reloaded = IdentityDirectory::open(&path).unwrap();
    assert_eq!(reloaded.snapshot(), before);
    assert_eq!(reloaded.get_role(&handle("ann@isp"), "#rust"), Role::Admin);
    assert_eq!(reloaded.get_role(&handle("ann@isp"), "#go"), Role::Everyone);
    assert_eq!(reloaded.get_role(&handle("ann@isp"), WILDCARD_SCOPE), Role::Trusted);
    assert_eq!(reloaded.get_role(&handle("troll@isp"), "#rust"), Role::BadBoy);
    assert_eq!(reloaded.owner(), Some(handle("root@box")));
}

#[test]
fn test_save_then_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    let directory = IdentityDirectory::open(&path).unwrap();
    directory.upsert(&handle("ann@isp"), "#Rust", Role::Admin).unwrap();

    std::fs::remove_file(&path).unwrap();
    directory.save().unwrap();

    let reloaded = IdentityDirectory::open(&path).unwrap();
    assert_eq!(reloaded.snapshot(), directory.snapshot());
    assert_eq!(reloaded.get_role(&handle("ann@isp"), "#rust"), Role::Admin);
}

#[test]
fn test_file_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    let directory = IdentityDirectory::open(&path).unwrap();
    directory.upsert(&handle("ann@isp"), "#rust", Role::Admin).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        raw,
        serde_json::json!({
            "~ann@isp": {
                "hostmask": "~ann@isp",
                "roles": { "#rust": "Admin" }
            }
        })
    );
}

#[test]
fn test_owner_uniqueness() {
    let directory = IdentityDirectory::load(MemoryStore::new()).unwrap();
    let first = handle("first@host");
    let second = handle("second@host");

    directory.upsert(&first, WILDCARD_SCOPE, Role::Owner).unwrap();
    let err = directory
        .upsert(&second, WILDCARD_SCOPE, Role::Owner)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        SecurityErrorKind::OwnerConflict { holder } if holder == first.as_str()
    ));

    // Owner requested for a channel is still the wildcard owner.
    assert!(directory.upsert(&second, "#chan", Role::Owner).is_err());

    let owners = directory
        .snapshot()
        .values()
        .filter(|record| record.is_owner())
        .count();
    assert_eq!(owners, 1);
}

#[test]
fn test_owner_record_is_protected() {
    let directory = IdentityDirectory::load(MemoryStore::new()).unwrap();
    let owner = handle("root@box");
    directory.upsert(&owner, WILDCARD_SCOPE, Role::Owner).unwrap();
    let before = directory.snapshot();

    for result in [
        directory.upsert(&owner, "#chan", Role::Trusted),
        directory.upsert(&owner, WILDCARD_SCOPE, Role::Everyone),
    ] {
        assert!(matches!(
            result.unwrap_err().kind(),
            SecurityErrorKind::OwnerProtected { .. }
        ));
    }
    assert!(matches!(
        directory.remove(&owner, WILDCARD_SCOPE).unwrap_err().kind(),
        SecurityErrorKind::OwnerProtected { .. }
    ));
    assert_eq!(directory.snapshot(), before);
}

#[test]
fn test_failed_write_changes_nothing() {
    let store = FlakyStore::default();
    let directory = IdentityDirectory::load(store.clone()).unwrap();
    let ann = handle("ann@isp");
    directory.upsert(&ann, "#rust", Role::Trusted).unwrap();
    let before = directory.snapshot();

    store.failing.store(true, Ordering::SeqCst);
    assert!(directory.upsert(&ann, "#rust", Role::Admin).is_err());
    assert!(directory.upsert(&handle("new@isp"), "#rust", Role::Admin).is_err());
    assert!(directory.remove(&ann, "#rust").is_err());

    assert_eq!(directory.snapshot(), before);
    assert_eq!(store.inner.load().unwrap(), before);
    assert_eq!(directory.get_role(&ann, "#rust"), Role::Trusted);
}

#[test]
fn test_unchanged_grant_skips_write() {
    let store = FlakyStore::default();
    let directory = IdentityDirectory::load(store.clone()).unwrap();
    let ann = handle("ann@isp");
    directory.upsert(&ann, "#rust", Role::Trusted).unwrap();

    store.failing.store(true, Ordering::SeqCst);
    assert_eq!(
        directory.upsert(&ann, "#rust", Role::Trusted).unwrap(),
        UpsertOutcome::Unchanged
    );
}

#[test]
fn test_revoke_last_scope_removes_identity_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    let directory = IdentityDirectory::open(&path).unwrap();
    let ann = handle("ann@isp");
    directory.upsert(&ann, "#rust", Role::Trusted).unwrap();

    assert_eq!(
        directory.remove(&ann, "#rust").unwrap(),
        RemoveOutcome::IdentityRemoved {
            role: Role::Trusted
        }
    );
    let persisted = JsonFileStore::new(&path).load().unwrap();
    assert!(persisted.is_empty());
}

#[test]
fn test_corrupt_store_fails_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    std::fs::write(&path, "{\"~a@b\": {\"hostmask\": \"~a@b\", \"roles\": {\"*\": \"Wizard\"}}}")
        .unwrap();

    let err = IdentityDirectory::open(&path).unwrap_err();
    assert!(matches!(err.kind(), SecurityErrorKind::Storage(_)));
}
