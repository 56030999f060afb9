//! # HTTP Server
//!
//! Main HTTP server combining all endpoint routers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::EngineResult;
use crate::query::{AllowlistRegistry, QueryEngine};
use crate::records::RecordStore;
use crate::registry::{MetadataLoader, SchemaRegistry};

use super::query_routes::query_routes;
use super::record_routes::record_routes;
use super::registry_routes::registry_routes;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8642;

/// Shared state across all handlers
pub struct AppState {
    pub schema: SchemaRegistry,
    pub records: RecordStore,
    pub engine: QueryEngine,
    loader: Option<MetadataLoader>,
}

impl AppState {
    pub fn new(schema: SchemaRegistry) -> Self {
        let allowlists = Arc::new(AllowlistRegistry::new(schema.clone()));
        Self {
            records: RecordStore::new(schema.clone()),
            engine: QueryEngine::new(schema.clone(), allowlists),
            schema,
            loader: None,
        }
    }

    /// Attaches a loader so schema mutations are snapshotted to disk.
    pub fn with_loader(mut self, loader: MetadataLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Writes the metadata snapshot when a loader is attached. The schema
    /// endpoints call this after every successful mutation.
    pub(super) fn persist(&self) -> EngineResult<()> {
        match &self.loader {
            Some(loader) => loader.save(&self.schema),
            None => Ok(()),
        }
    }
}

/// HTTP server for the engine API
pub struct HttpServer {
    port: u16,
    router: Router,
}

impl HttpServer {
    pub fn new(schema: SchemaRegistry, port: u16) -> Self {
        Self::with_state(AppState::new(schema), port)
    }

    /// Server whose schema mutations are snapshotted through `loader`.
    pub fn persistent(schema: SchemaRegistry, loader: MetadataLoader, port: u16) -> Self {
        Self::with_state(AppState::new(schema).with_loader(loader), port)
    }

    fn with_state(state: AppState, port: u16) -> Self {
        let router = build_router(Arc::new(state));
        Self { port, router }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// The combined router, exposed for in-process tests
    pub fn router(self) -> Router {
        self.router
    }

    /// Binds and serves until the process is stopped
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr = self.socket_addr();
        println!("Listening on {}", addr);
        println!("  - /api/tables - schema registry");
        println!("  - /api/records/{{table}} - record CRUD");
        println!("  - /api/query/{{entity}} - generic query");

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .nest(
            "/api",
            registry_routes(state.clone())
                .merge(record_routes(state.clone()))
                .merge(query_routes(state)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, RowStore};

    #[test]
    fn test_router_builds() {
        let store: Arc<dyn RowStore> = Arc::new(MemoryStore::new());
        let schema = SchemaRegistry::new(store).unwrap();
        let server = HttpServer::new(schema, DEFAULT_PORT);
        assert_eq!(server.socket_addr().port(), DEFAULT_PORT);
        let _router = server.router();
    }
}
