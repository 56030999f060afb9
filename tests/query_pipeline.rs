//! Query Pipeline Tests
//!
//! Full-stack coverage of the generic query path: records written through
//! the validated store, then read back through allowlist resolution,
//! filter evaluation, sorting, and pagination.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use tabula::context::RequestContext;
use tabula::query::{
    AllowlistRegistry, FilterGroup, PageRequest, QueryEngine, QueryRequest, SortSpec,
};
use tabula::records::RecordStore;
use tabula::registry::{ChoiceOption, CreateField, CreateTable, FieldType, SchemaRegistry};
use tabula::storage::{MemoryStore, RowStore};

struct Harness {
    schema: SchemaRegistry,
    records: RecordStore,
    engine: QueryEngine,
    ctx: RequestContext,
}

fn harness() -> Harness {
    let store: Arc<dyn RowStore> = Arc::new(MemoryStore::new());
    let schema = SchemaRegistry::new(store).unwrap();
    let allowlists = Arc::new(AllowlistRegistry::new(schema.clone()).with_ttl(Duration::ZERO));
    Harness {
        records: RecordStore::new(schema.clone()),
        engine: QueryEngine::new(schema.clone(), allowlists),
        schema,
        ctx: RequestContext::for_user("acme", "alice"),
    }
}

fn field(name: &str, ty: FieldType) -> CreateField {
    CreateField {
        field_name: name.to_string(),
        label: name.to_string(),
        field_type: ty,
        is_required: false,
        is_unique: false,
        read_only: false,
        reference_table: None,
        choice_options: None,
        choice_table: None,
        default_value: None,
        max_length: None,
        field_order: 0,
        indexed: false,
        is_active: true,
    }
}

fn payload(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Declares `u_ticket` and loads six tickets with mixed fields.
fn seed(h: &Harness) {
    h.schema
        .create_table(
            &h.ctx,
            CreateTable {
                name: "u_ticket".to_string(),
                label: "Ticket".to_string(),
                description: None,
                is_active: true,
                extends: None,
                display_field: None,
                number_prefix: Some("TKT".to_string()),
            },
        )
        .unwrap();
    for f in [
        field("title", FieldType::Text),
        field("assignee", FieldType::Text),
        field("score", FieldType::Number),
        field("due", FieldType::Date),
    ] {
        h.schema.create_field(&h.ctx, "u_ticket", f).unwrap();
    }
    let mut state = field("state", FieldType::Choice);
    state.choice_options = Some(vec![
        ChoiceOption { label: "Open".to_string(), value: "OPEN".to_string() },
        ChoiceOption { label: "Closed".to_string(), value: "CLOSED".to_string() },
    ]);
    h.schema.create_field(&h.ctx, "u_ticket", state).unwrap();

    let rows: Vec<Vec<(&str, Value)>> = vec![
        vec![
            ("title", json!("Login outage")),
            ("assignee", json!("alice")),
            ("score", json!(9)),
            ("state", json!("OPEN")),
            ("due", json!("2026-09-10T00:00:00Z")),
        ],
        vec![
            ("title", json!("Slow reports")),
            ("assignee", json!("bob")),
            ("score", json!(4)),
            ("state", json!("OPEN")),
            ("due", json!("2026-09-20T00:00:00Z")),
        ],
        vec![
            ("title", json!("Broken export")),
            ("score", json!(7)),
            ("state", json!("OPEN")),
            ("due", json!("2026-08-01T00:00:00Z")),
        ],
        vec![
            ("title", json!("Export formatting")),
            ("assignee", json!("")),
            ("score", json!(2)),
            ("state", json!("CLOSED")),
        ],
        vec![
            ("title", json!("Password reset loop")),
            ("assignee", json!("carol")),
            ("score", json!(6)),
            ("state", json!("CLOSED")),
            ("due", json!("2026-10-01T00:00:00Z")),
        ],
        vec![("title", json!("Stale cache")), ("score", json!(5)), ("state", json!("OPEN"))],
    ];
    for row in rows {
        h.records.create_record(&h.ctx, "u_ticket", payload(&row)).unwrap();
    }
}

fn run(h: &Harness, request: QueryRequest) -> Vec<String> {
    h.engine
        .execute(&h.ctx, "u_ticket", request)
        .unwrap()
        .items
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect()
}

fn filter_request(json_filter: &str) -> QueryRequest {
    QueryRequest {
        filter: Some(FilterGroup::parse(json_filter).unwrap()),
        sort: Some(SortSpec::parse("title:asc")),
        ..Default::default()
    }
}

// =============================================================================
// Operators
// =============================================================================

#[test]
fn test_comparison_operators() {
    let h = harness();
    seed(&h);

    let titles = run(
        &h,
        filter_request(r#"{"conditions":[{"field":"score","operator":"gte","value":7}]}"#),
    );
    assert_eq!(titles, vec!["Broken export", "Login outage"]);

    let titles = run(
        &h,
        filter_request(r#"{"conditions":[{"field":"score","operator":"lt","value":4}]}"#),
    );
    assert_eq!(titles, vec!["Export formatting"]);
}

#[test]
fn test_string_operators_are_case_insensitive() {
    let h = harness();
    seed(&h);

    let titles = run(
        &h,
        filter_request(
            r#"{"conditions":[{"field":"title","operator":"contains","value":"EXPORT"}]}"#,
        ),
    );
    assert_eq!(titles, vec!["Broken export", "Export formatting"]);

    let titles = run(
        &h,
        filter_request(
            r#"{"conditions":[{"field":"title","operator":"starts_with","value":"slow"}]}"#,
        ),
    );
    assert_eq!(titles, vec!["Slow reports"]);
}

/// `is_empty` treats an absent field, a null, and an empty string alike.
#[test]
fn test_is_empty_covers_absent_and_blank() {
    let h = harness();
    seed(&h);

    let titles = run(
        &h,
        filter_request(r#"{"conditions":[{"field":"assignee","operator":"is_empty","value":null}]}"#),
    );
    assert_eq!(titles, vec!["Broken export", "Export formatting", "Stale cache"]);
}

#[test]
fn test_date_window_operators() {
    let h = harness();
    seed(&h);

    let titles = run(
        &h,
        filter_request(
            r#"{"conditions":[
                {"field":"due","operator":"after","value":"2026-09-01T00:00:00Z"},
                {"field":"due","operator":"before","value":"2026-09-30T00:00:00Z"}
            ]}"#,
        ),
    );
    assert_eq!(titles, vec!["Login outage", "Slow reports"]);
}

#[test]
fn test_in_operator() {
    let h = harness();
    seed(&h);

    let titles = run(
        &h,
        filter_request(
            r#"{"conditions":[{"field":"assignee","operator":"in","value":["bob","carol"]}]}"#,
        ),
    );
    assert_eq!(titles, vec!["Password reset loop", "Slow reports"]);
}

// =============================================================================
// Grouping
// =============================================================================

/// OPEN tickets scoring at least 7, or anything CLOSED: a nested
/// OR-of-ANDs evaluates each branch independently.
#[test]
fn test_nested_groups() {
    let h = harness();
    seed(&h);

    let titles = run(
        &h,
        filter_request(
            r#"{"logic":"OR","groups":[
                {"conditions":[
                    {"field":"state","operator":"equals","value":"OPEN"},
                    {"field":"score","operator":"gte","value":7}
                ]},
                {"conditions":[{"field":"state","operator":"equals","value":"CLOSED"}]}
            ]}"#,
        ),
    );
    assert_eq!(
        titles,
        vec!["Broken export", "Export formatting", "Login outage", "Password reset loop"]
    );
}

/// An empty filter group matches everything.
#[test]
fn test_empty_filter_matches_all() {
    let h = harness();
    seed(&h);

    let titles = run(&h, filter_request(r#"{"conditions":[]}"#));
    assert_eq!(titles.len(), 6);
}

// =============================================================================
// Degradation
// =============================================================================

/// Unknown filter fields are dropped; unknown sort fields fall back to
/// newest-first. Neither fails the query.
#[test]
fn test_stale_client_views_degrade() {
    let h = harness();
    seed(&h);

    let page = h
        .engine
        .execute(
            &h.ctx,
            "u_ticket",
            QueryRequest {
                filter: Some(
                    FilterGroup::parse(
                        r#"{"conditions":[
                            {"field":"removed_field","operator":"equals","value":1},
                            {"field":"state","operator":"equals","value":"CLOSED"}
                        ]}"#,
                    )
                    .unwrap(),
                ),
                sort: Some(SortSpec::parse("also_removed:desc")),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(page.total, 2);
    let titles: Vec<&str> = page.items.iter().filter_map(|r| r["title"].as_str()).collect();
    assert!(titles.contains(&"Password reset loop"));
    assert!(titles.contains(&"Export formatting"));
}

// =============================================================================
// Pagination
// =============================================================================

#[test]
fn test_page_math_and_clamping() {
    let h = harness();
    seed(&h);

    let page = h
        .engine
        .execute(
            &h.ctx,
            "u_ticket",
            QueryRequest {
                sort: Some(SortSpec::parse("score:desc")),
                page: PageRequest { page: Some(2), page_size: Some(4), ..Default::default() },
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0]["score"], 4);

    // Oversized pageSize clamps to the maximum instead of failing.
    let page = h
        .engine
        .execute(
            &h.ctx,
            "u_ticket",
            QueryRequest {
                page: PageRequest { page_size: Some(10_000), ..Default::default() },
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(page.page_size, 100);
}

#[test]
fn test_limit_offset_style() {
    let h = harness();
    seed(&h);

    let page = h
        .engine
        .execute(
            &h.ctx,
            "u_ticket",
            QueryRequest {
                sort: Some(SortSpec::parse("score:asc")),
                page: PageRequest { limit: Some(2), offset: Some(2), ..Default::default() },
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.items[0]["score"], 5);
}

// =============================================================================
// Implicit constraints
// =============================================================================

/// Soft-deleted rows never appear, and deletion changes totals.
#[test]
fn test_soft_delete_removes_from_results() {
    let h = harness();
    seed(&h);

    let page = h.engine.execute(&h.ctx, "u_ticket", QueryRequest::default()).unwrap();
    let victim = page.items[0]["recordId"].as_str().unwrap().to_string();
    h.records.delete_record(&h.ctx, "u_ticket", &victim).unwrap();

    let page = h.engine.execute(&h.ctx, "u_ticket", QueryRequest::default()).unwrap();
    assert_eq!(page.total, 5);
    assert!(page.items.iter().all(|r| r["recordId"] != victim.as_str()));
}

/// A tenant only ever sees its own rows, with no way to opt out.
#[test]
fn test_cross_tenant_rows_unreachable() {
    let h = harness();
    seed(&h);

    let other = RequestContext::for_tenant("globex");
    let err = h.engine.execute(&other, "u_ticket", QueryRequest::default()).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

// =============================================================================
// Describe
// =============================================================================

/// The describe surface reflects schema changes and always carries the
/// engine-stamped fields.
#[test]
fn test_describe_tracks_schema() {
    let h = harness();
    seed(&h);

    let allow = h.engine.describe(&h.ctx, "u_ticket").unwrap();
    assert!(allow.is_sortable("score"));
    assert!(allow.is_filterable("state"));
    assert!(allow.is_sortable("createdAt"));
    assert!(allow.searchable_names().contains(&"title"));

    h.schema
        .create_field(&h.ctx, "u_ticket", field("region", FieldType::Text))
        .unwrap();
    let allow = h.engine.describe(&h.ctx, "u_ticket").unwrap();
    assert!(allow.is_filterable("region"));
}

// =============================================================================
// Legacy surface
// =============================================================================

/// The flat legacy inputs run through the same pipeline and agree with
/// the structured filter.
#[test]
fn test_legacy_inputs_match_structured() {
    let h = harness();
    seed(&h);

    let legacy = h
        .engine
        .execute(
            &h.ctx,
            "u_ticket",
            QueryRequest {
                search: Some("export".to_string()),
                equals: vec![("state".to_string(), json!("OPEN"))],
                sort: Some(SortSpec::parse("title:asc")),
                ..Default::default()
            },
        )
        .unwrap();
    let structured = run(
        &h,
        filter_request(
            r#"{"conditions":[
                {"field":"title","operator":"contains","value":"export"},
                {"field":"state","operator":"equals","value":"OPEN"}
            ]}"#,
        ),
    );
    let legacy_titles: Vec<String> = legacy
        .items
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(legacy_titles, structured);
}
