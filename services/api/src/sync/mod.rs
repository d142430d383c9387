pub mod handlers;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/qbo/sync", post(handlers::trigger_sync))
        .route("/api/qbo/sync/status", get(handlers::sync_status))
}
