use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// Chat API, nested under the configured base path
pub fn api_routes(base_path: &str) -> Router<Arc<AppState>> {
    let api = Router::new()
        .route("/bot", post(handlers::api::chat))
        .route("/status", get(handlers::api::system_status));

    let base_path = base_path.trim_end_matches('/');
    if base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api)
    }
}
