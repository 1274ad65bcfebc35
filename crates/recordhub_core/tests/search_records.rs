use recordhub_core::{
    open_db_in_memory, FieldDef, FieldKind, Identity, LinksConfig, PaginationInterpreter,
    ParamInterpreter, RecordPermissionPolicy, RecordSchema, RecordService, RecordServiceConfig,
    RecordType, SearchOptions, SearchParams, ServiceError, SortInterpreter,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn base_config() -> RecordServiceConfig {
    let schema = RecordSchema::new()
        .field(FieldDef::new("title", FieldKind::String).required())
        .field(FieldDef::new("kind", FieldKind::String));
    RecordServiceConfig::new(
        RecordType::named("record").unwrap(),
        schema,
        Arc::new(RecordPermissionPolicy::owner_scoped()),
    )
}

fn created_at(document: &serde_json::Map<String, serde_json::Value>) -> i64 {
    document["created"].as_i64().unwrap()
}

#[test]
fn search_only_returns_readable_records() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, Arc::new(base_config()));
    let alice = Identity::user("alice");
    let bob = Identity::user("bob");

    for title in ["a1", "a2", "a3"] {
        service.create(&alice, &json!({ "title": title }), None).unwrap();
    }
    for title in ["b1", "b2"] {
        service.create(&bob, &json!({ "title": title }), None).unwrap();
    }

    let mine = service.search(&bob, &SearchParams::new(), None).unwrap();
    assert_eq!(mine.total(), 2);
    for id in mine.ids() {
        assert!(service.read(&bob, &id.to_string(), None).is_ok());
    }

    let alices = service.search(&alice, &SearchParams::new(), None).unwrap();
    assert_eq!(alices.total(), 3);
    assert!(alices
        .hits()
        .iter()
        .all(|hit| hit.document["owners"] == json!(["alice"])));

    let anonymous = service
        .search(&Identity::anonymous(), &SearchParams::new(), None)
        .unwrap();
    assert_eq!(anonymous.total(), 0);
    assert!(anonymous.hits().is_empty());

    let system = service
        .search(&Identity::system(), &SearchParams::new(), None)
        .unwrap();
    assert_eq!(system.total(), 5);
}

#[test]
fn deleted_records_leave_search_results() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, Arc::new(base_config()));
    let alice = Identity::user("alice");
    let kept = service.create(&alice, &json!({"title": "kept"}), None).unwrap();
    let gone = service.create(&alice, &json!({"title": "gone"}), None).unwrap();

    service
        .delete(&alice, &gone.id().to_string(), None)
        .unwrap();
    let found = service.search(&alice, &SearchParams::new(), None).unwrap();
    assert_eq!(found.ids(), vec![kept.id()]);
}

#[test]
fn page_two_sorted_by_created_descending() {
    let conn = open_db_in_memory().unwrap();
    let interpreters: Vec<Arc<dyn ParamInterpreter>> =
        vec![Arc::new(PaginationInterpreter), Arc::new(SortInterpreter)];
    let service = RecordService::sqlite(
        &conn,
        Arc::new(base_config().with_interpreters(interpreters)),
    );
    let alice = Identity::user("alice");
    for n in 0..25 {
        service
            .create(&alice, &json!({ "title": format!("record {n}") }), None)
            .unwrap();
    }

    let params = SearchParams::from_value(json!({"page": 2, "size": 10, "sort": "-created"}));
    let page_two = service.search(&alice, &params, None).unwrap();
    assert_eq!(page_two.total(), 25);
    assert_eq!(page_two.page(), 2);
    assert_eq!(page_two.size(), 10);
    assert_eq!(page_two.hits().len(), 10);

    let created = page_two
        .hits()
        .iter()
        .map(|hit| created_at(&hit.document))
        .collect::<Vec<_>>();
    assert!(created.windows(2).all(|pair| pair[0] >= pair[1]));

    let page_one = service
        .search(&alice, &params.clone().with("page", 1), None)
        .unwrap();
    let page_three = service
        .search(&alice, &params.clone().with("page", 3), None)
        .unwrap();
    assert_eq!(page_three.hits().len(), 5);
    assert!(created_at(&page_one.hits()[9].document) >= created[0]);

    let mut seen = HashSet::new();
    for list in [&page_one, &page_two, &page_three] {
        for id in list.ids() {
            assert!(seen.insert(id), "record {id} returned on two pages");
        }
    }
    assert_eq!(seen.len(), 25);
}

#[test]
fn full_text_query_matches_terms() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, Arc::new(base_config()));
    let alice = Identity::user("alice");
    let dune = service
        .create(&alice, &json!({"title": "Dune", "kind": "book"}), None)
        .unwrap();
    let messiah = service
        .create(&alice, &json!({"title": "Dune Messiah", "kind": "book"}), None)
        .unwrap();
    service
        .create(&alice, &json!({"title": "Solaris", "kind": "book"}), None)
        .unwrap();

    let both = service
        .search(&alice, &SearchParams::new().with("q", "dune"), None)
        .unwrap();
    let ids = both.ids().into_iter().collect::<HashSet<_>>();
    assert_eq!(ids, HashSet::from([dune.id(), messiah.id()]));
    assert!(both.hits().iter().all(|hit| hit.revision == Some(1)));

    let one = service
        .search(&alice, &SearchParams::new().with("q", "dune messiah"), None)
        .unwrap();
    assert_eq!(one.ids(), vec![messiah.id()]);

    // Owner ids are not searchable text.
    let owners = service
        .search(&alice, &SearchParams::new().with("q", "alice"), None)
        .unwrap();
    assert_eq!(owners.total(), 0);
}

#[test]
fn facets_count_scope_and_filter_hits() {
    let conn = open_db_in_memory().unwrap();
    let config = base_config()
        .with_search_options(SearchOptions {
            facets: vec!["kind".to_string()],
            ..SearchOptions::default()
        })
        .unwrap();
    let service = RecordService::sqlite(&conn, Arc::new(config));
    let alice = Identity::user("alice");
    for (title, kind) in [("a", "book"), ("b", "book"), ("c", "film")] {
        service
            .create(&alice, &json!({ "title": title, "kind": kind }), None)
            .unwrap();
    }
    service
        .create(&Identity::user("bob"), &json!({"title": "d", "kind": "film"}), None)
        .unwrap();

    let films = service
        .search(&alice, &SearchParams::new().with("kind", "film"), None)
        .unwrap();
    assert_eq!(films.total(), 1);
    assert_eq!(films.hits()[0].document["kind"], json!("film"));

    let buckets = &films.aggregations()["kind"];
    let counts = buckets
        .iter()
        .map(|bucket| (bucket.key.as_str(), bucket.doc_count))
        .collect::<Vec<_>>();
    assert_eq!(counts, vec![("book", 2), ("film", 1)]);

    let rendered = films.to_json();
    assert_eq!(rendered["aggregations"]["kind"]["buckets"][0]["key"], json!("book"));
}

#[test]
fn facets_select_integer_and_boolean_buckets() {
    let conn = open_db_in_memory().unwrap();
    let schema = RecordSchema::new()
        .field(FieldDef::new("title", FieldKind::String).required())
        .field(FieldDef::new("year", FieldKind::Integer))
        .field(FieldDef::new("open", FieldKind::Boolean));
    let config = RecordServiceConfig::new(
        RecordType::named("record").unwrap(),
        schema,
        Arc::new(RecordPermissionPolicy::owner_scoped()),
    )
    .with_search_options(SearchOptions {
        facets: vec!["year".to_string(), "open".to_string()],
        ..SearchOptions::default()
    })
    .unwrap();
    let service = RecordService::sqlite(&conn, Arc::new(config));
    let alice = Identity::user("alice");
    for (title, year, open) in [("a", 1965, true), ("b", 1965, false), ("c", 1972, false)] {
        service
            .create(&alice, &json!({ "title": title, "year": year, "open": open }), None)
            .unwrap();
    }

    let all = service.search(&alice, &SearchParams::new(), None).unwrap();
    let year_keys = all.aggregations()["year"]
        .iter()
        .map(|bucket| bucket.key.clone())
        .collect::<Vec<_>>();
    assert_eq!(year_keys, vec!["1965".to_string(), "1972".to_string()]);

    let by_text = service
        .search(&alice, &SearchParams::new().with("year", "1965"), None)
        .unwrap();
    assert_eq!(by_text.total(), 2);

    let by_number = service
        .search(&alice, &SearchParams::new().with("year", 1972), None)
        .unwrap();
    assert_eq!(by_number.total(), 1);
    assert_eq!(by_number.hits()[0].document["title"], json!("c"));

    let open = service
        .search(&alice, &SearchParams::new().with("open", "true"), None)
        .unwrap();
    assert_eq!(open.total(), 1);
    assert_eq!(open.hits()[0].document["title"], json!("a"));
}

#[test]
fn invalid_params_are_validation_errors() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, Arc::new(base_config()));
    let alice = Identity::user("alice");

    for params in [
        json!({"sort": "title"}),
        json!({"page": 0}),
        json!({"size": 1000}),
    ] {
        let err = service
            .search(&alice, &SearchParams::from_value(params), None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}

#[test]
fn search_links_follow_pagination() {
    let conn = open_db_in_memory().unwrap();
    let service = RecordService::sqlite(&conn, Arc::new(base_config()));
    let alice = Identity::user("alice");
    for n in 0..3 {
        service
            .create(&alice, &json!({ "title": format!("t{n}") }), None)
            .unwrap();
    }

    let links = LinksConfig::new("https://example.org/api/records");
    let list = service
        .search(&alice, &SearchParams::new().with("size", 2), Some(&links))
        .unwrap();
    let rendered = list.links();
    assert_eq!(rendered["self"], "https://example.org/api/records?page=1&size=2");
    assert_eq!(rendered["next"], "https://example.org/api/records?page=2&size=2");
    assert!(!rendered.contains_key("prev"));
}
