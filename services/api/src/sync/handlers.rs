use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use booksync_engine::SyncStatusReport;

use crate::error::{validation, ApiError};
use crate::sync::responses::TriggerResponse;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub realm_id: Option<String>,
}

/// Run a sync now, outside the background schedule. With a realm_id the
/// request syncs that account only; an empty body runs a full cycle.
pub async fn trigger_sync(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TriggerResponse>, ApiError> {
    let req: TriggerRequest = if body.is_empty() {
        TriggerRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| validation(format!("invalid request body: {e}")))?
    };
    let realm_id = req.realm_id;

    match realm_id {
        Some(realm_id) => {
            tracing::info!(%realm_id, "manual sync triggered");
            let data = state.engine.sync_account(&realm_id).await?;
            Ok(Json(TriggerResponse::Account { data }))
        }
        None => {
            tracing::info!("manual full sync cycle triggered");
            let data = state.engine.sync_all_accounts().await?;
            Ok(Json(TriggerResponse::Cycle { data }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub realm_id: Option<String>,
}

pub async fn sync_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<SyncStatusReport>, ApiError> {
    let report = state.engine.get_sync_status(query.realm_id.as_deref()).await?;
    Ok(Json(report))
}
