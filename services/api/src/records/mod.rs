pub mod handlers;
pub mod responses;

use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/qbo/customers", get(handlers::list_customers))
        .route("/api/qbo/invoices", get(handlers::list_invoices))
}
