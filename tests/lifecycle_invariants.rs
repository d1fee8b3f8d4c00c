//! Lifecycle and Schema Invariant Tests
//!
//! Documents are born in their lifecycle's initial state and only move
//! along declared transitions. Property writes are validated against
//! the type's schemas before anything is applied.

use std::collections::HashMap;
use std::sync::Arc;

use docstore::{
    ClusterBus, MemoryBackend, ModelLoader, Principal, PropertyValue, QueryExpr, Repository,
    RepositoryConfig,
};

fn repository() -> Arc<Repository> {
    let model = Arc::new(ModelLoader::base().unwrap());
    let bus = ClusterBus::new();
    Repository::open(RepositoryConfig::default(), model, MemoryBackend::new(), &bus).unwrap()
}

// =============================================================================
// Lifecycle transitions
// =============================================================================

/// Documents start in the initial state and follow declared transitions.
#[test]
fn test_transitions_follow_the_declared_graph() {
    let repo = repository();
    let mut session = repo.open_session(Principal::system()).unwrap();
    let root = session.get_root().unwrap();
    let doc = session
        .create_document(root.id(), "doc", "File", HashMap::new())
        .unwrap();
    session.save().unwrap();

    assert_eq!(session.lifecycle_state(doc.id()).unwrap(), "project");

    session.follow_transition(doc.id(), "approve").unwrap();
    session.save().unwrap();
    assert_eq!(session.lifecycle_state(doc.id()).unwrap(), "approved");

    session.follow_transition(doc.id(), "delete").unwrap();
    session.follow_transition(doc.id(), "undelete").unwrap();
    session.save().unwrap();
    assert_eq!(session.lifecycle_state(doc.id()).unwrap(), "project");
}

/// Transitions not declared from the current state are illegal.
#[test]
fn test_undeclared_transition_rejected() {
    let repo = repository();
    let mut session = repo.open_session(Principal::system()).unwrap();
    let root = session.get_root().unwrap();
    let doc = session
        .create_document(root.id(), "doc", "File", HashMap::new())
        .unwrap();
    session.save().unwrap();

    // "undelete" only leaves the deleted state
    let err = session
        .follow_transition(doc.id(), "undelete")
        .unwrap_err();
    assert_eq!(err.code(), "ILLEGAL_STATE");
    let err = session.follow_transition(doc.id(), "launch").unwrap_err();
    assert_eq!(err.code(), "ILLEGAL_STATE");
    assert_eq!(session.lifecycle_state(doc.id()).unwrap(), "project");
}

/// Lifecycle state is queryable like any other node attribute.
#[test]
fn test_query_by_lifecycle_state() {
    let repo = repository();
    let mut session = repo.open_session(Principal::system()).unwrap();
    let root = session.get_root().unwrap();
    let kept = session
        .create_document(root.id(), "kept", "File", HashMap::new())
        .unwrap();
    let approved = session
        .create_document(root.id(), "approved", "File", HashMap::new())
        .unwrap();
    session.save().unwrap();
    session.follow_transition(approved.id(), "approve").unwrap();
    session.save().unwrap();

    let expr = QueryExpr::And(vec![
        QueryExpr::type_is("File"),
        QueryExpr::LifecycleIs("approved".into()),
    ]);
    let hits = session.query(&expr).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id(), approved.id());
    let _ = kept;
}

// =============================================================================
// Schema validation
// =============================================================================

/// Unknown types, unknown properties and type mismatches are all
/// rejected before any state changes.
#[test]
fn test_schema_violations_rejected() {
    let repo = repository();
    let mut session = repo.open_session(Principal::system()).unwrap();
    let root = session.get_root().unwrap();

    let err = session
        .create_document(root.id(), "x", "Spreadsheet", HashMap::new())
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");

    let err = session
        .create_document(
            root.id(),
            "x",
            "File",
            HashMap::from([("dc:nonsense".to_string(), PropertyValue::from("x"))]),
        )
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");

    let doc = session
        .create_document(root.id(), "doc", "File", HashMap::new())
        .unwrap();
    let err = session
        .set_property(doc.id(), "dc:title", PropertyValue::from(42i64))
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");

    // The failed set left the document untouched
    assert_eq!(session.get_document(doc.id()).unwrap().property("dc:title"), None);
}

/// A multi-property set validates everything before applying anything.
#[test]
fn test_multi_set_is_atomic() {
    let repo = repository();
    let mut session = repo.open_session(Principal::system()).unwrap();
    let root = session.get_root().unwrap();
    let doc = session
        .create_document(root.id(), "doc", "File", HashMap::new())
        .unwrap();
    session.save().unwrap();

    let err = session
        .set_properties(
            doc.id(),
            HashMap::from([
                ("dc:title".to_string(), PropertyValue::from("good")),
                ("dc:bogus".to_string(), PropertyValue::from("bad")),
            ]),
        )
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert!(!session.has_pending_changes());
    assert_eq!(session.get_document(doc.id()).unwrap().property("dc:title"), None);
}
