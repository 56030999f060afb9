//! Record Routes
//!
//! CRUD endpoints for dynamic table rows. Listing goes through the query
//! endpoint; these routes cover single-record operations.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};

use crate::error::EngineError;

use super::context_from_headers;
use super::errors::ApiResult;
use super::server::AppState;

pub fn record_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/records/:table", post(create_record))
        .route(
            "/records/:table/:id",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .with_state(state)
}

fn expect_object(body: Value) -> Result<Map<String, Value>, EngineError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(EngineError::validation("body", "expected a JSON object")),
    }
}

async fn create_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let row = state.records.create_record(&ctx, &table, expect_object(body)?)?;
    Ok(Json(row))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((table, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let row = state.records.get_record(&ctx, &table, &id)?;
    Ok(Json(row))
}

async fn update_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((table, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let row = state
        .records
        .update_record(&ctx, &table, &id, expect_object(body)?)?;
    Ok(Json(row))
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((table, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    state.records.delete_record(&ctx, &table, &id)?;
    Ok(Json(json!({ "deleted": id })))
}
