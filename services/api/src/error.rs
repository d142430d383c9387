use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use booksync_common::error::BooksyncError;
use booksync_engine::SyncError;
use booksync_qbo::QboError;

pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl From<BooksyncError> for ApiError {
    fn from(err: BooksyncError) -> Self {
        Self(SyncError::Db(err))
    }
}

impl From<QboError> for ApiError {
    fn from(err: QboError) -> Self {
        Self(SyncError::Qbo(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut requires_reauthorization = false;
        let (status, message) = match &self.0 {
            SyncError::AccountNotFound(realm_id) => (
                StatusCode::NOT_FOUND,
                format!("no account found for realm {realm_id}"),
            ),
            SyncError::Revoked(_) => {
                requires_reauthorization = true;
                (StatusCode::UNAUTHORIZED, self.0.to_string())
            }
            SyncError::Qbo(QboError::InvalidGrant(_)) => {
                requires_reauthorization = true;
                (StatusCode::UNAUTHORIZED, self.0.to_string())
            }
            SyncError::Qbo(QboError::AuthenticationFailure(_)) => {
                (StatusCode::UNAUTHORIZED, self.0.to_string())
            }
            SyncError::Qbo(QboError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            SyncError::Qbo(_) => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            SyncError::Db(BooksyncError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg.clone()),
            SyncError::Db(BooksyncError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let body = if requires_reauthorization {
            serde_json::json!({ "error": message, "requires_reauthorization": true })
        } else {
            serde_json::json!({ "error": message })
        };
        (status, Json(body)).into_response()
    }
}

pub fn validation(msg: impl Into<String>) -> ApiError {
    ApiError(SyncError::Db(BooksyncError::Validation(msg.into())))
}
