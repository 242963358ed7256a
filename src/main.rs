use clap::Parser;
use r2d2::Pool;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod db;
mod llm;
mod ner;
mod pipeline;
mod sql;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs, LogFormat};
use crate::db::catalog::SchemaCatalog;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::executor::QueryExecutor;
use crate::llm::prompt::PromptBuilder;
use crate::llm::LlmManager;
use crate::ner::EntityExtractor;
use crate::pipeline::ChatPipeline;
use crate::sql::validator::SqlValidator;
use crate::util::logging::init_tracing;
use crate::web::state::{AppState, InitFailure, ServiceStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::default());
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(config.logging.format);

    let catalog = SchemaCatalog::from_config(&config.schema);
    info!(
        "Schema catalog {} with {} tables",
        catalog.version(),
        catalog.entries().len()
    );

    let status = match build_pipeline(&config, &catalog) {
        Ok(pipeline) => ServiceStatus::Ready(Arc::new(pipeline)),
        Err(failures) => {
            for failure in &failures {
                error!("Failed to initialize {}: {}", failure.component, failure.message);
            }
            warn!("Starting without a chat pipeline; /bot will answer 503");
            ServiceStatus::Unavailable(failures)
        }
    };

    let app_state = Arc::new(AppState::new(config.clone(), catalog, status));

    // Start the web server
    info!(
        "Starting antibiogram chat server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

/// Brings up every collaborator, collecting all failures rather than
/// stopping at the first one.
fn build_pipeline(
    config: &AppConfig,
    catalog: &SchemaCatalog,
) -> Result<ChatPipeline, Vec<InitFailure>> {
    let mut failures = Vec::new();

    info!("Initializing entity extractor with backend: {}", config.ner.backend);
    let entities = EntityExtractor::new(&config.ner)
        .map_err(|e| failures.push(InitFailure::new("ner", e)))
        .ok();

    info!(
        "Initializing DuckDB connection pool for {}",
        config.database.connection_string
    );
    let executor = pool_max_size(config.database.pool_size)
        .and_then(|max_size| {
            let manager = DuckDBConnectionManager::open(
                &config.database.connection_string,
                config.database.read_only,
            )
            .map_err(|e| e.to_string())?;
            Pool::builder()
                .max_size(max_size)
                .build(manager)
                .map_err(|e| e.to_string())
        })
        .map(|pool| QueryExecutor::new(pool, config.result.column_case))
        .map_err(|e| failures.push(InitFailure::new("database", e)))
        .ok();

    if config.llm.backend == "remote" && config.llm.api_key.is_none() {
        warn!("No API key configured for the remote LLM backend");
    }
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm = LlmManager::new(&config.llm)
        .map_err(|e| failures.push(InitFailure::new("llm", e)))
        .ok();

    match (entities, executor, llm) {
        (Some(entities), Some(executor), Some(llm)) => Ok(ChatPipeline::new(
            entities,
            llm,
            catalog.clone(),
            PromptBuilder::new(config.prompt.dialect.clone()),
            SqlValidator::new(config.validation.strict),
            executor,
        )),
        _ => Err(failures),
    }
}

fn pool_max_size(pool_size: usize) -> Result<u32, String> {
    match u32::try_from(pool_size) {
        Ok(0) => Err("database.pool_size must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(_) => Err(format!("database.pool_size {} is too large", pool_size)),
    }
}
