//! # Generic Query Evaluator
//!
//! One evaluation path for every queryable entity, built-in or dynamic:
//! resolve the entity's allowlist, prune anything the allowlist does not
//! vouch for, compile legacy flat filters into the same AST the structured
//! filter uses, and run count plus bounded page against the row store.
//!
//! Two predicates are implicit and cannot be expressed or overridden by
//! the caller: tenant scope (the scan itself is tenant-partitioned) and
//! soft-delete exclusion. Unknown filter/sort fields degrade the query
//! instead of failing it, since the input may come from a saved, now-stale
//! client view.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;

use crate::context::RequestContext;
use crate::error::EngineResult;
use crate::observability::Logger;
use crate::registry::{record_space, SchemaRegistry};
use crate::storage::RowStore;

use super::allowlist::{Allowlist, AllowlistRegistry};
use super::filter::{FilterCondition, FilterGroup, FilterNode, FilterOperator};
use super::paginate::{Page, PageRequest};

/// Sort applied when the caller names none, or names an unknown field.
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// Requested sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    /// Parses `field`, `field:asc`, or `field:desc`.
    pub fn parse(text: &str) -> Self {
        match text.rsplit_once(':') {
            Some((field, order)) => Self {
                field: field.to_string(),
                descending: order.eq_ignore_ascii_case("desc"),
            },
            None => Self {
                field: text.to_string(),
                descending: false,
            },
        }
    }

    fn default_sort() -> Self {
        Self {
            field: DEFAULT_SORT_FIELD.to_string(),
            descending: true,
        }
    }
}

/// A query against one entity.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Structured filter tree
    pub filter: Option<FilterGroup>,
    /// Legacy free-text search, matched across the searchable allowlist
    pub search: Option<String>,
    /// Legacy per-field equality filters, combined with AND
    pub equals: Vec<(String, Value)>,
    pub sort: Option<SortSpec>,
    pub page: PageRequest,
}

/// The generic query evaluator.
#[derive(Clone)]
pub struct QueryEngine {
    schema: SchemaRegistry,
    allowlists: Arc<AllowlistRegistry>,
}

impl QueryEngine {
    pub fn new(schema: SchemaRegistry, allowlists: Arc<AllowlistRegistry>) -> Self {
        Self { schema, allowlists }
    }

    /// The resolved query surface of an entity, for consuming UIs.
    pub fn describe(&self, ctx: &RequestContext, entity: &str) -> EngineResult<Allowlist> {
        self.allowlists.resolve(ctx, entity)
    }

    /// Executes a query and returns one page of rows plus the total count.
    pub fn execute(
        &self,
        ctx: &RequestContext,
        entity: &str,
        request: QueryRequest,
    ) -> EngineResult<Page<Value>> {
        let allow = self.allowlists.resolve(ctx, entity)?;

        let predicate = self.compile(&allow, &request, entity)?;
        let window = request.page.normalize();
        let sort = self.resolve_sort(&allow, request.sort.as_ref(), entity);

        let store: Arc<dyn RowStore> = self.schema.store();
        let rows = store.scan(&record_space(&ctx.tenant_id, entity), &ctx.tenant_id);

        // Implicit predicates: the scan is already tenant-scoped, and
        // soft-deleted rows are invisible through this surface.
        let mut matched: Vec<Value> = rows
            .into_iter()
            .filter(|row| !is_deleted(row) && predicate.matches(row))
            .collect();

        let total = matched.len();
        matched.sort_by(|a, b| {
            let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
            if sort.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let items: Vec<Value> = matched
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .collect();

        Logger::info(
            "QUERY_EXECUTED",
            &[
                ("entity", entity),
                ("tenant", &ctx.tenant_id),
                ("total", &total.to_string()),
            ],
        );
        Ok(Page::new(items, total, window))
    }

    /// Builds the effective predicate: the structured filter plus the
    /// legacy flat inputs, all through the same AST.
    fn compile(
        &self,
        allow: &Allowlist,
        request: &QueryRequest,
        entity: &str,
    ) -> EngineResult<FilterGroup> {
        let mut root = FilterGroup::match_all();
        let mut dropped = 0;

        if let Some(filter) = &request.filter {
            filter.check_depth()?;
            let mut filter = filter.clone();
            dropped += filter.prune(&|field| allow.is_filterable(field));
            root.children.push(FilterNode::Group(filter));
        }

        if let Some(term) = request.search.as_deref().filter(|t| !t.trim().is_empty()) {
            let searches = allow
                .searchable_names()
                .into_iter()
                .map(|field| {
                    FilterCondition::new(field, FilterOperator::Contains, Value::from(term))
                })
                .collect();
            root.children
                .push(FilterNode::Group(FilterGroup::any_of(searches)));
        }

        for (field, value) in &request.equals {
            if !allow.is_filterable(field) {
                dropped += 1;
                continue;
            }
            root.children.push(FilterNode::Condition(FilterCondition::new(
                field,
                FilterOperator::Equals,
                value.clone(),
            )));
        }

        if dropped > 0 {
            Logger::warn(
                "QUERY_DEGRADED",
                &[
                    ("dropped_conditions", &dropped.to_string()),
                    ("entity", entity),
                ],
            );
        }
        Ok(root)
    }

    /// Unknown sort fields fall back to `createdAt DESC` without error.
    fn resolve_sort(
        &self,
        allow: &Allowlist,
        requested: Option<&SortSpec>,
        entity: &str,
    ) -> SortSpec {
        match requested {
            Some(spec) if allow.is_sortable(&spec.field) => spec.clone(),
            Some(spec) => {
                Logger::warn(
                    "QUERY_DEGRADED",
                    &[("entity", entity), ("unknown_sort_field", spec.field.as_str())],
                );
                SortSpec::default_sort()
            }
            None => SortSpec::default_sort(),
        }
    }
}

fn is_deleted(row: &Value) -> bool {
    row.get("deleted").and_then(Value::as_bool).unwrap_or(false)
}

/// Ordering across row values: numbers numerically, strings
/// lexicographically (RFC 3339 stamps order correctly), booleans false
/// first. Missing values and explicit nulls sort last, and mixed-type
/// pairings order by type rank, so the comparator is a total order.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(x), Some(y)) => compare_present(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&y.as_f64().unwrap_or(0.0)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CreateField, CreateTable, FieldType};
    use crate::storage::{MemoryStore, StoreOp};
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (QueryEngine, SchemaRegistry, RequestContext) {
        let store: Arc<dyn RowStore> = Arc::new(MemoryStore::new());
        let schema = SchemaRegistry::new(store).unwrap();
        let allowlists =
            Arc::new(AllowlistRegistry::new(schema.clone()).with_ttl(Duration::ZERO));
        let engine = QueryEngine::new(schema.clone(), allowlists);
        (engine, schema, RequestContext::for_tenant("acme"))
    }

    fn seed_risks(schema: &SchemaRegistry, ctx: &RequestContext) {
        schema
            .create_table(
                ctx,
                CreateTable {
                    name: "u_risk".to_string(),
                    label: "Risk".to_string(),
                    description: None,
                    is_active: true,
                    extends: None,
                    display_field: None,
                    number_prefix: None,
                },
            )
            .unwrap();
        for (name, ty) in [
            ("title", FieldType::Text),
            ("status", FieldType::Text),
            ("severity", FieldType::Text),
            ("score", FieldType::Number),
        ] {
            schema
                .create_field(
                    ctx,
                    "u_risk",
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
                    },
                )
                .unwrap();
        }

        let rows = [
            json!({"title": "Data breach", "status": "ACTIVE", "severity": "HIGH", "score": 9, "createdAt": "2024-01-05T00:00:00Z"}),
            json!({"title": "Vendor risk", "status": "ACTIVE", "severity": "CRITICAL", "score": 8, "createdAt": "2024-01-04T00:00:00Z"}),
            json!({"title": "Policy gap", "status": "ACTIVE", "severity": "LOW", "score": 2, "createdAt": "2024-01-03T00:00:00Z"}),
            json!({"title": "Audit finding", "status": "CLOSED", "severity": "HIGH", "score": 6, "createdAt": "2024-01-02T00:00:00Z"}),
            json!({"title": "Access review", "status": "CLOSED", "severity": "LOW", "score": 1, "createdAt": "2024-01-01T00:00:00Z"}),
        ];
        for (i, row) in rows.into_iter().enumerate() {
            schema
                .store()
                .apply(vec![StoreOp::Insert {
                    space: record_space("acme", "u_risk"),
                    tenant: "acme".to_string(),
                    id: format!("r{}", i),
                    row,
                }])
                .unwrap();
        }
    }

    #[test]
    fn test_and_filter_matches_exactly() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        let filter = FilterGroup::parse(
            r#"{"logic":"AND","conditions":[
                {"field":"status","operator":"equals","value":"ACTIVE"},
                {"field":"severity","operator":"in","value":["HIGH","CRITICAL"]}
            ]}"#,
        )
        .unwrap();

        let page = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    filter: Some(filter),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), page.total);
    }

    #[test]
    fn test_unknown_entity_fails() {
        let (engine, _schema, ctx) = setup();
        let err = engine.execute(&ctx, "u_nope", QueryRequest::default()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_unknown_filter_field_degrades() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        let filter = FilterGroup::parse(
            r#"{"conditions":[
                {"field":"status","operator":"equals","value":"ACTIVE"},
                {"field":"no_such_field","operator":"equals","value":"x"}
            ]}"#,
        )
        .unwrap();

        let page = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    filter: Some(filter),
                    ..Default::default()
                },
            )
            .unwrap();
        // The unknown condition is dropped, not fatal.
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_unknown_sort_falls_back_to_created_desc() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        let page = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    sort: Some(SortSpec::parse("unknownField:asc")),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.items[0]["title"], "Data breach"); // newest first
    }

    #[test]
    fn test_sort_by_number_field() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        let page = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    sort: Some(SortSpec::parse("score:desc")),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.items[0]["score"], 9);
        assert_eq!(page.items[4]["score"], 1);
    }

    #[test]
    fn test_pagination_window() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        let page = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    sort: Some(SortSpec::parse("score:asc")),
                    page: PageRequest {
                        page: Some(2),
                        page_size: Some(2),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["score"], 6);
    }

    #[test]
    fn test_legacy_search_and_equality() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        let page = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    search: Some("risk".to_string()),
                    equals: vec![("status".to_string(), json!("ACTIVE"))],
                    ..Default::default()
                },
            )
            .unwrap();
        // "Vendor risk" matches the term and is ACTIVE.
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0]["title"], "Vendor risk");
    }

    #[test]
    fn test_legacy_and_structured_agree() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        // The same expression in both shapes yields the same result set.
        let structured = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    filter: Some(FilterGroup::all_of(vec![FilterCondition::new(
                        "status",
                        FilterOperator::Equals,
                        json!("CLOSED"),
                    )])),
                    ..Default::default()
                },
            )
            .unwrap();
        let legacy = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    equals: vec![("status".to_string(), json!("CLOSED"))],
                    ..Default::default()
                },
            )
            .unwrap();
        let titles = |page: &Page<Value>| {
            page.items
                .iter()
                .map(|r| r["title"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(titles(&structured), titles(&legacy));
        assert_eq!(structured.total, legacy.total);
    }

    #[test]
    fn test_soft_deleted_rows_invisible() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        schema
            .store()
            .apply(vec![StoreOp::Insert {
                space: record_space("acme", "u_risk"),
                tenant: "acme".to_string(),
                id: "gone".to_string(),
                row: json!({"title": "Removed", "deleted": true}),
            }])
            .unwrap();

        let page = engine.execute(&ctx, "u_risk", QueryRequest::default()).unwrap();
        assert_eq!(page.total, 5);
        assert!(page.items.iter().all(|r| r["title"] != "Removed"));
    }

    #[test]
    fn test_tenant_scope_is_implicit() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        let other = RequestContext::for_tenant("globex");
        schema
            .create_table(
                &other,
                CreateTable {
                    name: "u_risk".to_string(),
                    label: "Risk".to_string(),
                    description: None,
                    is_active: true,
                    extends: None,
                    display_field: None,
                    number_prefix: None,
                },
            )
            .unwrap();

        let page = engine.execute(&other, "u_risk", QueryRequest::default()).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_sort_handles_explicit_nulls() {
        let (engine, schema, ctx) = setup();
        seed_risks(&schema, &ctx);

        // ~60 rows alternating a string and an explicit null in the sort
        // field. Nulls must sort after every present value.
        for i in 0..60 {
            let severity = if i % 2 == 0 {
                json!(format!("S{:02}", i))
            } else {
                Value::Null
            };
            schema
                .store()
                .apply(vec![StoreOp::Insert {
                    space: record_space("acme", "u_risk"),
                    tenant: "acme".to_string(),
                    id: format!("n{}", i),
                    row: json!({"title": format!("row {}", i), "severity": severity}),
                }])
                .unwrap();
        }

        let page = engine
            .execute(
                &ctx,
                "u_risk",
                QueryRequest {
                    sort: Some(SortSpec::parse("severity:asc")),
                    page: PageRequest {
                        limit: Some(100),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.total, 65);
        let first_null = page
            .items
            .iter()
            .position(|r| r.get("severity").map_or(true, Value::is_null))
            .unwrap();
        assert!(page.items[..first_null]
            .iter()
            .all(|r| r["severity"].is_string()));
        assert!(page.items[first_null..]
            .iter()
            .all(|r| r.get("severity").map_or(true, Value::is_null)));
    }

    #[test]
    fn test_sort_spec_parsing() {
        assert_eq!(
            SortSpec::parse("name:desc"),
            SortSpec { field: "name".to_string(), descending: true }
        );
        assert_eq!(
            SortSpec::parse("name"),
            SortSpec { field: "name".to_string(), descending: false }
        );
    }
}
