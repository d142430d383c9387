use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use booksync_db::accounts::models::QboAccount;
use booksync_db::accounts::repositories::AccountRepository;
use booksync_db::records::repositories::RecordRepository;
use booksync_engine::SyncError;

use crate::error::{validation, ApiError};
use crate::records::responses::{CustomerListResponse, InvoiceListResponse};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    #[serde(default)]
    pub realm_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl RecordsQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

async fn resolve_account(state: &AppState, query: &RecordsQuery) -> Result<QboAccount, ApiError> {
    let realm_id = query
        .realm_id
        .as_deref()
        .ok_or_else(|| validation("realm_id query parameter is required"))?;
    state
        .account_repo
        .get_by_realm_id(realm_id)
        .await?
        .ok_or_else(|| ApiError(SyncError::AccountNotFound(realm_id.to_string())))
}

pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<CustomerListResponse>, ApiError> {
    let account = resolve_account(&state, &query).await?;
    let data = state
        .record_repo
        .list_customers(account.id, query.limit(), query.offset())
        .await?;
    let count = data.len();
    Ok(Json(CustomerListResponse { data, count }))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<InvoiceListResponse>, ApiError> {
    let account = resolve_account(&state, &query).await?;
    let data = state
        .record_repo
        .list_invoices(account.id, query.limit(), query.offset())
        .await?;
    let count = data.len();
    Ok(Json(InvoiceListResponse { data, count }))
}
