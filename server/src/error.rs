use axum::{http::StatusCode, Json};
use serde::Serialize;

use crate::store::StoreError;

/// JSON error body returned by every HTTP endpoint: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

impl From<StoreError> for ErrorBody {
    fn from(err: StoreError) -> Self {
        ErrorBody {
            error: err.to_string(),
        }
    }
}

/// Map a store failure onto the HTTP status the API reports for it.
pub fn store_error(err: StoreError) -> ApiError {
    let status = match &err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        StoreError::Database(_) | StoreError::Lock | StoreError::Task(_) => {
            tracing::error!(error = %err, "Store failure");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };
    (status, Json(err.into()))
}
