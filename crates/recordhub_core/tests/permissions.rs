use recordhub_core::{
    open_db_in_memory, Action, FieldDef, FieldKind, Generator, Identity, RecordPermissionPolicy,
    RecordSchema, RecordService, RecordServiceConfig, RecordType, SearchParams, ServiceError,
};
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;

fn schema() -> RecordSchema {
    RecordSchema::new()
        .field(FieldDef::new("title", FieldKind::String).required())
        .field(FieldDef::new("internal_note", FieldKind::String).restricted_to("curator"))
}

fn config(policy: RecordPermissionPolicy) -> Arc<RecordServiceConfig> {
    Arc::new(RecordServiceConfig::new(
        RecordType::named("record").unwrap(),
        schema(),
        Arc::new(policy),
    ))
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn assert_denied(err: ServiceError, expected: Action) {
    match err {
        ServiceError::PermissionDenied { action } => assert_eq!(action, expected),
        other => panic!("expected permission denial, got {other}"),
    }
}

#[test]
fn anonymous_create_is_denied_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, config(RecordPermissionPolicy::owner_scoped()));

    let err = service
        .create(&Identity::anonymous(), &json!({"title": "X"}), None)
        .unwrap_err();
    assert_eq!(err.code(), "permission_denied");
    assert_denied(err, Action::Create);
    assert_eq!(count(&conn, "records"), 0);
    assert_eq!(count(&conn, "record_index"), 0);
}

#[test]
fn denied_create_skips_validation() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, config(RecordPermissionPolicy::deny_all()));

    let err = service
        .create(&Identity::user("alice"), &json!("not an object"), None)
        .unwrap_err();
    assert_denied(err, Action::Create);
}

#[test]
fn non_owners_cannot_read_update_or_delete() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, config(RecordPermissionPolicy::owner_scoped()));
    let alice = Identity::user("alice");
    let bob = Identity::user("bob");

    let created = service.create(&alice, &json!({"title": "X"}), None).unwrap();
    let id = created.id().to_string();

    assert_denied(service.read(&bob, &id, None).unwrap_err(), Action::Read);
    assert_denied(
        service
            .update(&bob, &id, &json!({"title": "hijacked"}), None)
            .unwrap_err(),
        Action::Update,
    );
    assert_denied(service.delete(&bob, &id, None).unwrap_err(), Action::Delete);

    let unchanged = service.read(&alice, &id, None).unwrap();
    assert_eq!(unchanged.revision(), 1);
    assert_eq!(unchanged.data()["title"], json!("X"));
    assert!(service.index().get(created.id()).unwrap().is_some());

    let system = service.read(&Identity::system(), &id, None).unwrap();
    assert_eq!(system.id(), created.id());
}

#[test]
fn role_generators_grant_actions() {
    let conn = open_db_in_memory().unwrap();
    let policy = RecordPermissionPolicy::owner_scoped().allow(
        Action::Read,
        vec![Generator::RecordOwners, Generator::Role("auditor".to_string())],
    );
    let service = RecordService::sqlite(&conn, config(policy));
    let created = service
        .create(&Identity::user("alice"), &json!({"title": "X"}), None)
        .unwrap();
    let id = created.id().to_string();

    let auditor = Identity::user("carol").with_role("auditor");
    assert!(service.read(&auditor, &id, None).is_ok());
    assert_denied(
        service.read(&Identity::user("carol"), &id, None).unwrap_err(),
        Action::Read,
    );

    let found = service
        .search(&auditor, &SearchParams::new(), None)
        .unwrap();
    assert_eq!(found.total(), 1);
}

#[test]
fn search_permission_is_checked() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, config(RecordPermissionPolicy::deny_all()));

    let err = service
        .search(&Identity::system(), &SearchParams::new(), None)
        .unwrap_err();
    assert_denied(err, Action::Search);
}

#[test]
fn restricted_fields_are_masked_by_role() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, config(RecordPermissionPolicy::owner_scoped()));
    let curator = Identity::user("alice").with_role("curator");
    let plain = Identity::user("alice");

    let created = service
        .create(
            &curator,
            &json!({"title": "X", "internal_note": "check provenance"}),
            None,
        )
        .unwrap();
    assert_eq!(created.data()["internal_note"], json!("check provenance"));
    let id = created.id().to_string();

    let read = service.read(&plain, &id, None).unwrap();
    assert!(read.data().get("internal_note").is_none());
    assert_eq!(
        read.record().get("internal_note"),
        Some(&json!("check provenance"))
    );

    // Dropped silently for callers without the role.
    let updated = service
        .update(&plain, &id, &json!({"internal_note": "overwritten"}), None)
        .unwrap();
    assert_eq!(
        updated.record().get("internal_note"),
        Some(&json!("check provenance"))
    );

    let listed = service.search(&plain, &SearchParams::new(), None).unwrap();
    assert_eq!(listed.total(), 1);
    assert!(listed.hits()[0].document.get("internal_note").is_none());
}

#[test]
fn full_text_does_not_match_restricted_fields() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, config(RecordPermissionPolicy::public_read()));
    let curator = Identity::user("alice").with_role("curator");
    service
        .create(
            &curator,
            &json!({"title": "Harbour survey", "internal_note": "zanzibar"}),
            None,
        )
        .unwrap();

    let secret = SearchParams::new().with("q", "zanzibar");
    assert_eq!(service.search(&Identity::user("bob"), &secret, None).unwrap().total(), 0);
    assert_eq!(service.search(&curator, &secret, None).unwrap().total(), 0);

    let title = SearchParams::new().with("q", "harbour");
    let found = service.search(&Identity::user("bob"), &title, None).unwrap();
    assert_eq!(found.total(), 1);
    assert!(found.hits()[0].document.get("internal_note").is_none());
}
