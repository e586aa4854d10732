//! CubeQL MCP Server
//!
//! Model Context Protocol server over OLAP cubes: pivot queries compiled to
//! SQL, drill-down sessions, and natural language questions answered through
//! an OpenAI model. Every statement passes the safety gate before DuckDB sees it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use cubeql_duck::{DuckWarehouse, Warehouse};
use cubeql_nl2sql::{Nl2SqlPipeline, PipelineOptions, SchemaGenerator};
use cubeql_registry::CubeRegistry;
use rust_mcp_sdk::mcp_server::{hyper_server, HyperServerOptions};
use tracing::{info, warn};

mod catalog;
mod config;
mod llm;
mod logging;
mod mcp;
mod metrics;
mod query;
mod session;
#[cfg(test)]
mod test_support;

use config::{Config, RegistryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets live in .env
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CUBEQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path))?;
    config.apply_logging_env();
    logging::init()?;

    let registry = Arc::new(CubeRegistry::new());
    bootstrap_registry(&registry, &config.registry)?;
    info!(cubes = registry.len(), "Registry ready");

    let warehouse: Arc<dyn Warehouse> = Arc::new(match &config.warehouse.database {
        Some(path) => {
            info!(database = %path, "Opening DuckDB database");
            DuckWarehouse::open(path)?
        }
        None => {
            warn!("No database configured, using an empty in-memory DuckDB");
            DuckWarehouse::open_in_memory()?
        }
    });

    let api_key = Config::get_openai_api_key()?;
    info!(model = %config.llm.model, "Using OpenAI model");
    let provider = Arc::new(llm::OpenAiProvider::new(api_key, config.llm.model.as_str()));

    let pivot = query::PivotService::new(
        Arc::clone(&registry),
        Arc::clone(&warehouse),
        config.warehouse.query_timeout(),
    );
    let generator = SchemaGenerator::new(provider.clone(), config.llm.timeout());
    let nl2sql = Nl2SqlPipeline::new(
        Arc::clone(&registry),
        provider,
        warehouse,
        PipelineOptions {
            completion_timeout: config.llm.timeout(),
            query_timeout: config.warehouse.query_timeout(),
            dialect: config.llm.dialect.clone(),
        },
    );
    let metrics = metrics::Metrics::new()?;

    let handler = mcp::CubeQlServerHandler::new(
        registry,
        pivot,
        nl2sql,
        generator,
        session::SessionStore::from_config(&config.sessions),
        metrics,
        config.registry.snapshot.clone(),
    );
    let server_info = mcp::CubeQlServerHandler::server_info();

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting CubeQL MCP server (SSE enabled)"
    );

    let server = hyper_server::create_server(
        server_info,
        handler,
        HyperServerOptions {
            host: config.server.host.clone(),
            port: config.server.port,
            sse_support: true,
            ..Default::default()
        },
    );

    server
        .start()
        .await
        .map_err(|e| anyhow!("MCP server failed: {}", e))?;

    Ok(())
}

/// Restore the snapshot, then register every schema file in the schema directory.
///
/// Schema files are applied after the snapshot, so a file wins over a
/// snapshotted cube of the same name.
fn bootstrap_registry(registry: &CubeRegistry, config: &RegistryConfig) -> anyhow::Result<()> {
    if let Some(path) = &config.snapshot {
        if path.exists() {
            let names = registry.load_snapshot(path)?;
            info!(path = %path.display(), cubes = ?names, "Restored registry snapshot");
        }
    }

    if let Some(dir) = &config.schema_dir {
        for path in schema_files(dir)? {
            let names = registry
                .ingest_file(&path)
                .with_context(|| format!("Failed to load schema {}", path.display()))?;
            info!(path = %path.display(), cubes = ?names, "Loaded schema file");
        }
    }
    Ok(())
}

/// `*.xml` files directly under `dir`, sorted by path
fn schema_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read schema directory {}", dir.display()))?
    {
        let path = entry?.path();
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if path.is_file() && is_xml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
