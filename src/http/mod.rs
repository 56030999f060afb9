//! HTTP surface of the engine: tenant extraction, error mapping, and the
//! routers for schema, records, and queries.

mod errors;
mod query_routes;
mod record_routes;
mod registry_routes;
mod server;

pub use errors::{ApiError, ApiResult};
pub use server::{AppState, HttpServer, DEFAULT_PORT};

use axum::http::HeaderMap;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};

/// Header naming the tenant every request runs as
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Optional header naming the acting user
pub const USER_HEADER: &str = "x-user-id";

/// Builds the request context from headers. The tenant header is
/// mandatory; requests without one are rejected before touching state.
pub fn context_from_headers(headers: &HeaderMap) -> EngineResult<RequestContext> {
    let tenant = headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            EngineError::validation(TENANT_HEADER, "missing or invalid tenant header")
        })?;

    match headers.get(USER_HEADER).and_then(|v| v.to_str().ok()) {
        Some(user) if !user.is_empty() => Ok(RequestContext::for_user(tenant, user)),
        _ => Ok(RequestContext::for_tenant(tenant)),
    }
}
