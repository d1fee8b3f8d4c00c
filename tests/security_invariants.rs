//! Security Invariant Tests
//!
//! ACL resolution walks from the node toward the root and the first
//! entry with an opinion wins; without any opinion the repository is
//! open. Denied reads are concealed as NotFound, denied writes surface
//! as permission errors, and locks fence writes per principal.

use std::collections::HashMap;
use std::sync::Arc;

use docstore::{
    Ace, Acl, ClusterBus, MemoryBackend, ModelLoader, NodeId, Permission, Principal,
    PropertyValue, Repository, RepositoryConfig, RepositoryError, Session, EVERYONE,
};

fn repository() -> Arc<Repository> {
    let model = Arc::new(ModelLoader::base().unwrap());
    let bus = ClusterBus::new();
    Repository::open(RepositoryConfig::default(), model, MemoryBackend::new(), &bus).unwrap()
}

fn create(session: &mut Session, parent: NodeId, name: &str, type_name: &str) -> NodeId {
    session
        .create_document(parent, name, type_name, HashMap::new())
        .unwrap()
        .id()
}

// =============================================================================
// Closest-ACL-wins
// =============================================================================

/// A grant on the node overrides a deny further up.
#[test]
fn test_local_grant_beats_inherited_deny() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");

    admin
        .set_acl(
            root_id,
            Some(Acl::from_entries(vec![Ace::deny("bob", Permission::Read)])),
        )
        .unwrap();
    admin
        .set_acl(
            doc,
            Some(Acl::from_entries(vec![Ace::grant("bob", Permission::Read)])),
        )
        .unwrap();
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    assert!(bob.get_document(doc).is_ok());
    assert!(matches!(
        bob.get_document(root_id),
        Err(RepositoryError::NotFound(_))
    ));
}

/// A deny on the node overrides a grant further up.
#[test]
fn test_local_deny_beats_inherited_grant() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");

    admin
        .set_acl(
            root_id,
            Some(Acl::from_entries(vec![Ace::grant("bob", Permission::Read)])),
        )
        .unwrap();
    admin
        .set_acl(
            doc,
            Some(Acl::from_entries(vec![Ace::deny("bob", Permission::Read)])),
        )
        .unwrap();
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    assert!(bob.get_document(root_id).is_ok());
    assert!(matches!(
        bob.get_document(doc),
        Err(RepositoryError::NotFound(_))
    ));
}

/// With no ACL on the node itself, the nearest ancestor with an
/// opinion decides.
#[test]
fn test_nearest_ancestor_decides() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let mid = create(&mut admin, root_id, "mid", "Folder");
    let leaf = create(&mut admin, mid, "leaf", "File");

    admin
        .set_acl(
            root_id,
            Some(Acl::from_entries(vec![Ace::grant("bob", Permission::Read)])),
        )
        .unwrap();
    admin
        .set_acl(
            mid,
            Some(Acl::from_entries(vec![Ace::deny("bob", Permission::Read)])),
        )
        .unwrap();
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    assert!(matches!(
        bob.get_document(leaf),
        Err(RepositoryError::NotFound(_))
    ));
    assert!(bob.get_document(root_id).is_ok());
}

/// No opinion anywhere on the chain leaves the repository open.
#[test]
fn test_no_opinion_grants() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    assert!(bob.get_document(doc).is_ok());
    bob.set_property(doc, "dc:title", PropertyValue::from("mine"))
        .unwrap();
    bob.save().unwrap();
}

// =============================================================================
// Concealment and write checks
// =============================================================================

/// A denied read is indistinguishable from a missing document.
#[test]
fn test_denied_read_looks_missing() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let hidden = create(&mut admin, root_id, "hidden", "File");
    admin
        .set_acl(
            hidden,
            Some(Acl::from_entries(vec![Ace::deny(EVERYONE, Permission::Read)])),
        )
        .unwrap();
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    let denied = bob.get_document(hidden).unwrap_err();
    let missing = bob.get_document(NodeId::new()).unwrap_err();
    assert_eq!(denied.code(), missing.code());

    // Unreadable children are silently skipped from listings
    assert!(bob.get_children(root_id).unwrap().is_empty());
    // And path lookups report the path, not the document
    assert!(matches!(
        bob.get_document_by_path("/hidden"),
        Err(RepositoryError::PathNotFound(_))
    ));
}

/// Readable but not writable: mutation fails openly with a permission
/// error, since existence is already known.
#[test]
fn test_read_only_principal_cannot_write() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");
    admin
        .set_acl(
            doc,
            Some(Acl::from_entries(vec![
                Ace::grant("bob", Permission::Read),
                Ace::deny("bob", Permission::Write),
            ])),
        )
        .unwrap();
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    assert!(bob.get_document(doc).is_ok());
    let err = bob
        .set_property(doc, "dc:title", PropertyValue::from("nope"))
        .unwrap_err();
    assert_eq!(err.code(), "PERMISSION_DENIED");
    let err = bob.remove_document(doc).unwrap_err();
    assert_eq!(err.code(), "PERMISSION_DENIED");
}

/// Changing an ACL needs Everything; Write alone is not enough.
#[test]
fn test_acl_change_needs_everything() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");
    admin
        .set_acl(
            doc,
            Some(Acl::from_entries(vec![
                Ace::grant("bob", Permission::Write),
                Ace::deny("bob", Permission::Everything),
            ])),
        )
        .unwrap();
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    bob.set_property(doc, "dc:title", PropertyValue::from("fine"))
        .unwrap();
    let err = bob.set_acl(doc, None).unwrap_err();
    assert_eq!(err.code(), "PERMISSION_DENIED");
}

/// Administrators bypass ACLs entirely.
#[test]
fn test_admin_bypasses_acls() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");
    admin
        .set_acl(
            root_id,
            Some(Acl::from_entries(vec![Ace::deny(
                EVERYONE,
                Permission::Everything,
            )])),
        )
        .unwrap();
    admin.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    assert!(bob.get_document(doc).is_err());

    let mut other_admin = repo.open_session(Principal::admin("ops")).unwrap();
    assert!(other_admin.get_document(doc).is_ok());
    other_admin
        .set_property(doc, "dc:title", PropertyValue::from("ops was here"))
        .unwrap();
    other_admin.save().unwrap();
}

// =============================================================================
// Locks
// =============================================================================

/// A lock fences writes from everyone but its owner and admins.
#[test]
fn test_lock_fences_other_writers() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");
    admin.save().unwrap();

    let mut alice = repo.open_session(Principal::new("alice")).unwrap();
    alice.lock(doc).unwrap();
    // Locking an already-held lock again is a no-op for the owner
    alice.lock(doc).unwrap();
    alice.save().unwrap();

    let mut bob = repo.open_session(Principal::new("bob")).unwrap();
    assert_eq!(bob.get_lock(doc).unwrap().unwrap().owner, "alice");
    assert!(matches!(
        bob.set_property(doc, "dc:title", PropertyValue::from("no")),
        Err(RepositoryError::LockConflict { .. })
    ));
    assert!(matches!(
        bob.lock(doc),
        Err(RepositoryError::LockConflict { .. })
    ));
    assert_eq!(bob.unlock(doc).unwrap_err().code(), "PERMISSION_DENIED");

    // The owner still writes freely
    alice
        .set_property(doc, "dc:title", PropertyValue::from("mine"))
        .unwrap();
    alice.save().unwrap();

    alice.unlock(doc).unwrap();
    alice.save().unwrap();
    bob.set_property(doc, "dc:title", PropertyValue::from("now me"))
        .unwrap();
    bob.save().unwrap();
}

/// Admins may break a foreign lock.
#[test]
fn test_admin_breaks_foreign_lock() {
    let repo = repository();
    let mut admin = repo.open_session(Principal::system()).unwrap();
    let root_id = admin.get_root().unwrap().id();
    let doc = create(&mut admin, root_id, "doc", "File");
    admin.save().unwrap();

    let mut alice = repo.open_session(Principal::new("alice")).unwrap();
    alice.lock(doc).unwrap();
    alice.save().unwrap();

    admin.unlock(doc).unwrap();
    admin.save().unwrap();
    assert!(admin.get_lock(doc).unwrap().is_none());

    // Unlocking an unlocked document is a no-op
    admin.unlock(doc).unwrap();
}
