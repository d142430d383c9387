pub mod handlers;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/qbo/authorize", post(handlers::authorize))
        .route("/api/qbo/accounts", get(handlers::list_accounts))
}
