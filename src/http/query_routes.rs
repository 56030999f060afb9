//! Query Routes
//!
//! The single query surface for every entity. The request body carries
//! either the structured filter tree or the legacy flat inputs (free-text
//! `q` and per-field equality pairs); both run through the same evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::EngineResult;
use crate::query::{FilterGroup, PageRequest, QueryRequest, SortSpec};

use super::context_from_headers;
use super::errors::ApiResult;
use super::server::AppState;

pub fn query_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query/:entity", get(list_entity).post(run_query))
        .route("/query/:entity/describe", get(describe_entity))
        .with_state(state)
}

/// Wire shape of a query. Pagination accepts both styles; when the
/// caller mixes them, `limit`/`offset` wins.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryBody {
    #[serde(default)]
    pub filter: Option<FilterGroup>,
    /// Free-text term matched against the searchable fields
    #[serde(default)]
    pub q: Option<String>,
    /// Per-field equality filters, combined with AND
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
    /// `field` or `field:desc`
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    /// `asc` (default) or `desc`, paired with `sortBy`
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(flatten)]
    pub page: PageRequest,
}

impl QueryBody {
    fn into_request(self) -> QueryRequest {
        let sort = match (self.sort, self.sort_by) {
            (Some(spec), _) => Some(SortSpec::parse(&spec)),
            (None, Some(field)) => Some(SortSpec {
                field,
                descending: self
                    .sort_order
                    .as_deref()
                    .is_some_and(|o| o.eq_ignore_ascii_case("desc")),
            }),
            (None, None) => None,
        };
        QueryRequest {
            filter: self.filter,
            search: self.q,
            equals: self
                .filters
                .map(|map| map.into_iter().collect())
                .unwrap_or_default(),
            sort,
            page: self.page,
        }
    }
}

/// Query-string names with a fixed meaning on the GET surface; anything
/// else is treated as a per-field equality filter.
const CONTROL_PARAMS: &[&str] =
    &["filter", "q", "sort", "sortBy", "sortOrder", "page", "pageSize", "limit", "offset"];

/// Flat GET surface: control parameters plus `field=value` equality
/// pairs, e.g. `/api/query/u_ticket?state=OPEN&sortBy=score&page=2`.
/// A structured filter tree rides along as JSON in `filter=`.
fn request_from_params(params: HashMap<String, String>) -> EngineResult<QueryRequest> {
    let control = |name: &str| params.get(name).cloned();
    let number = |name: &str| control(name).and_then(|v| v.parse::<u64>().ok());

    let filter = match params.get("filter") {
        Some(text) => Some(FilterGroup::parse(text)?),
        None => None,
    };

    let sort = match (control("sort"), control("sortBy")) {
        (Some(spec), _) => Some(SortSpec::parse(&spec)),
        (None, Some(field)) => Some(SortSpec {
            field,
            descending: control("sortOrder").is_some_and(|o| o.eq_ignore_ascii_case("desc")),
        }),
        (None, None) => None,
    };

    let equals = params
        .iter()
        .filter(|(name, _)| !CONTROL_PARAMS.contains(&name.as_str()))
        .map(|(name, raw)| (name.clone(), param_value(raw)))
        .collect();

    Ok(QueryRequest {
        filter,
        search: control("q"),
        equals,
        sort,
        page: PageRequest {
            page: number("page"),
            page_size: number("pageSize"),
            limit: number("limit"),
            offset: number("offset"),
        },
    })
}

/// Query-string values are untyped; promote the ones that read as JSON
/// numbers or booleans so they compare against typed record values.
fn param_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return json!(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return json!(f);
    }
    match raw {
        "true" => json!(true),
        "false" => json!(false),
        _ => json!(raw),
    }
}

async fn list_entity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let page = state
        .engine
        .execute(&ctx, &entity, request_from_params(params)?)?;
    Ok(Json(json!(page)))
}

async fn run_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    Json(body): Json<QueryBody>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let page = state.engine.execute(&ctx, &entity, body.into_request())?;
    Ok(Json(json!(page)))
}

async fn describe_entity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(entity): Path<String>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let allow = state.engine.describe(&ctx, &entity)?;
    Ok(Json(json!(allow)))
}
