use crate::config::AppConfig;
use crate::db::catalog::SchemaCatalog;
use crate::pipeline::ChatPipeline;
use serde::Serialize;
use std::sync::Arc;

/// A collaborator that could not be brought up at startup.
#[derive(Debug, Clone, Serialize)]
pub struct InitFailure {
    pub component: String,
    pub message: String,
}

impl InitFailure {
    pub fn new(component: &str, message: impl ToString) -> Self {
        Self {
            component: component.to_string(),
            message: message.to_string(),
        }
    }
}

/// Decided once at startup and never changed afterwards.
pub enum ServiceStatus {
    Ready(Arc<ChatPipeline>),
    Unavailable(Vec<InitFailure>),
}

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub catalog: SchemaCatalog,
    pub status: ServiceStatus,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, catalog: SchemaCatalog, status: ServiceStatus) -> Self {
        Self {
            config,
            catalog,
            status,
            startup_time: chrono::Utc::now(),
        }
    }

    pub fn pipeline(&self) -> Option<Arc<ChatPipeline>> {
        match &self.status {
            ServiceStatus::Ready(pipeline) => Some(Arc::clone(pipeline)),
            ServiceStatus::Unavailable(_) => None,
        }
    }

    pub fn failures(&self) -> &[InitFailure] {
        match &self.status {
            ServiceStatus::Ready(_) => &[],
            ServiceStatus::Unavailable(failures) => failures,
        }
    }
}
