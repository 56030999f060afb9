//! CLI command implementations
//!
//! `serve` is the only long-running command: it builds the in-process
//! store, replays the metadata snapshot from disk, and hands off to the
//! HTTP server. Everything else is a one-shot against the data directory.

use std::path::Path;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::http::HttpServer;
use crate::observability::Logger;
use crate::registry::{MetadataLoader, SchemaRegistry};
use crate::storage::{MemoryStore, RowStore};

use super::args::{Cli, Command};

/// Parses arguments and dispatches to the selected command.
pub fn run() -> EngineResult<()> {
    match Cli::parse_args().command {
        Command::Init { data_dir } => init(&data_dir),
        Command::Serve { port, data_dir } => serve(port, &data_dir),
    }
}

/// Creates the data directory with an empty metadata snapshot.
pub fn init(data_dir: &Path) -> EngineResult<()> {
    let schema = boot_registry()?;
    MetadataLoader::new(data_dir).save(&schema)?;
    Logger::info("INIT_COMPLETE", &[("data_dir", &data_dir.display().to_string())]);
    Ok(())
}

/// Boots the engine, replays persisted metadata, and serves HTTP.
pub fn serve(port: u16, data_dir: &Path) -> EngineResult<()> {
    let schema = boot_registry()?;
    let loader = MetadataLoader::new(data_dir);
    loader.load(&schema)?;
    Logger::info(
        "SERVER_STARTING",
        &[
            ("port", &port.to_string()),
            ("data_dir", &data_dir.display().to_string()),
        ],
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| EngineError::internal(format!("tokio runtime: {}", e)))?;
    runtime
        .block_on(HttpServer::persistent(schema, loader, port).start())
        .map_err(|e| EngineError::internal(format!("server: {}", e)))
}

fn boot_registry() -> EngineResult<SchemaRegistry> {
    let store: Arc<dyn RowStore> = Arc::new(MemoryStore::new());
    SchemaRegistry::new(store)
}
