use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::pipeline::ChatResponse;
use crate::web::state::{AppState, InitFailure};

pub const NOT_READY_MESSAGE: &str = "서버가 아직 준비되지 않았습니다.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorDetail>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorDetail {
            detail: detail.into(),
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub ready: bool,
    pub failures: Vec<InitFailure>,
    pub schema_version: String,
    pub tables: Vec<String>,
}

pub async fn chat(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) =
        payload.map_err(|rejection| api_error(rejection.status(), rejection.body_text()))?;
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "question must not be empty"));
    }

    let pipeline = app_state
        .pipeline()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, NOT_READY_MESSAGE))?;

    info!("Chat question: {}", question);
    let start_time = Instant::now();

    match pipeline.answer(question).await {
        Ok(response) => {
            info!(
                "Answered in {} ms",
                start_time.elapsed().as_millis()
            );
            Ok(Json(response))
        }
        Err(e) => {
            error!("Chat pipeline failed: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("챗봇 응답 생성 중 오류가 발생했습니다: {}", e),
            ))
        }
    }
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        ready: state.pipeline().is_some(),
        failures: state.failures().to_vec(),
        schema_version: state.catalog.version().to_string(),
        tables: state.catalog.table_names(),
    })
}
