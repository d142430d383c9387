mod accounts;
mod error;
mod records;
mod sync;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use booksync_common::types::ServiceInfo;
use booksync_config::{init_tracing, AppConfig};
use booksync_db::accounts::pg_repository::PgAccountRepository;
use booksync_db::records::pg_repository::PgRecordRepository;
use booksync_db::sync::pg_repository::PgSyncStateRepository;
use booksync_engine::SyncEngine;
use booksync_qbo::{OauthConfig, QboClientConfig};

type PgSyncEngine = SyncEngine<PgAccountRepository, PgSyncStateRepository, PgRecordRepository>;

#[derive(Clone)]
pub struct AppState {
    pub account_repo: PgAccountRepository,
    pub record_repo: PgRecordRepository,
    pub engine: Arc<PgSyncEngine>,
    pub http: reqwest::Client,
    pub oauth: OauthConfig,
    pub redirect_uri: String,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new("booksync-api"))
}

async fn metrics() -> impl IntoResponse {
    let body = "\
# HELP booksync_up Service up indicator\n\
# TYPE booksync_up gauge\n\
booksync_up 1\n\
# HELP booksync_info Service info\n\
# TYPE booksync_info gauge\n\
booksync_info{service=\"booksync-api\",version=\"0.1.0\"} 1\n";

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/metrics", get(metrics))
        .merge(accounts::router())
        .merge(sync::router())
        .merge(records::router())
        .layer(cors)
        .with_state(state)
}

fn build_state(pool: sqlx::PgPool, qbo_config: QboClientConfig) -> AppState {
    let account_repo = PgAccountRepository::new(pool.clone());
    let record_repo = PgRecordRepository::new(pool.clone());
    let state_repo = PgSyncStateRepository::new(pool);

    let oauth = qbo_config.oauth();
    let redirect_uri = qbo_config.redirect_uri.clone();
    let engine = Arc::new(SyncEngine::new(
        Arc::new(account_repo.clone()),
        Arc::new(state_repo),
        Arc::new(record_repo.clone()),
        qbo_config,
    ));

    AppState {
        account_repo,
        record_repo,
        engine,
        http: reqwest::Client::new(),
        oauth,
        redirect_uri,
    }
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    let qbo_config = QboClientConfig::from_env().expect("failed to load qbo config");
    tracing::info!(service = "booksync-api", "starting");

    let pool = booksync_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let app = build_router(build_state(pool, qbo_config));
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
