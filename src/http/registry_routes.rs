//! Schema Registry Routes
//!
//! Endpoints for managing tables, fields, and relationships. Every
//! successful mutation re-snapshots the metadata when the server runs
//! with a data directory attached.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, patch},
    Json, Router,
};
use serde_json::{json, Value};

use crate::registry::{
    CreateField, CreateRelationship, CreateTable, UpdateField, UpdateTable,
};

use super::context_from_headers;
use super::errors::ApiResult;
use super::server::AppState;

pub fn registry_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tables", get(list_tables).post(create_table))
        .route(
            "/tables/:table",
            get(get_table).patch(update_table).delete(delete_table),
        )
        .route(
            "/tables/:table/fields",
            get(list_fields).post(create_field),
        )
        .route(
            "/tables/:table/fields/:field",
            patch(update_field).delete(delete_field),
        )
        .route(
            "/tables/:table/relationships",
            get(list_table_relationships),
        )
        .route("/relationships", get(list_relationships).post(create_relationship))
        .route("/relationships/:name", delete(delete_relationship))
        .with_state(state)
}

async fn create_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTable>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let def = state.schema.create_table(&ctx, body)?;
    state.persist()?;
    Ok(Json(json!(def)))
}

async fn list_tables(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let tables = state.schema.list_tables(&ctx)?;
    Ok(Json(json!({ "tables": tables, "total": tables.len() })))
}

async fn get_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let def = state.schema.require_table(&ctx, &table)?;
    Ok(Json(json!(def)))
}

async fn update_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Json(body): Json<UpdateTable>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let def = state.schema.update_table(&ctx, &table, body)?;
    state.persist()?;
    Ok(Json(json!(def)))
}

async fn delete_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    state.schema.delete_table(&ctx, &table)?;
    state.persist()?;
    Ok(Json(json!({ "deleted": table })))
}

async fn create_field(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Json(body): Json<CreateField>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let def = state.schema.create_field(&ctx, &table, body)?;
    state.persist()?;
    Ok(Json(json!(def)))
}

async fn list_fields(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let fields = state.schema.effective_fields(&ctx, &table)?;
    Ok(Json(json!({ "fields": fields, "total": fields.len() })))
}

async fn update_field(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((table, field)): Path<(String, String)>,
    Json(body): Json<UpdateField>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let def = state.schema.update_field(&ctx, &table, &field, body)?;
    state.persist()?;
    Ok(Json(json!(def)))
}

async fn delete_field(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((table, field)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    state.schema.delete_field(&ctx, &table, &field)?;
    state.persist()?;
    Ok(Json(json!({ "deleted": field })))
}

async fn create_relationship(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRelationship>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let def = state.schema.create_relationship(&ctx, body)?;
    state.persist()?;
    Ok(Json(json!(def)))
}

async fn list_relationships(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    let rels = state.schema.relationships(&ctx)?;
    Ok(Json(json!({ "relationships": rels, "total": rels.len() })))
}

async fn list_table_relationships(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    state.schema.require_table(&ctx, &table)?;
    let rels = state.schema.relationships_for(&ctx, &table)?;
    Ok(Json(json!({ "relationships": rels, "total": rels.len() })))
}

async fn delete_relationship(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let ctx = context_from_headers(&headers)?;
    state.schema.delete_relationship(&ctx, &name)?;
    state.persist()?;
    Ok(Json(json!({ "deleted": name })))
}
