use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::db::models::Photo;
use crate::error::{api_error, store_error, ApiError};
use crate::state::AppState;
use crate::store::{self, pairs, photos};

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub upload_url: String,
    pub photo_id: String,
    /// Seconds until `upload_url` stops working
    pub expires_in: u64,
}

/// POST /api/v1/photos/upload
/// Reserve a photo record in the caller's pair and hand back a presigned PUT
/// URL. The client reports the final location with `photo_uploaded` over the
/// WebSocket once the upload finishes.
pub async fn request_upload(
    State(state): State<AppState>,
    claims: Claims,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let Json(req) = body.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid request body"))?;

    if req.filename.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "filename is required"));
    }
    let content_type = req
        .content_type
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let pair = store::blocking(move || pairs::get_by_user(&db, &user_id))
        .await
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "user is not in a pair"))?;

    let photo_id = Uuid::new_v4().to_string();
    let key = format!("{}/{}.jpg", pair.id, photo_id);

    let upload_url = state.uploads.presign_put(&key, &content_type).map_err(|e| {
        tracing::error!(user_id = %claims.sub, error = %e, "Failed to presign upload");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate upload URL")
    })?;

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let photo = Photo {
        id: photo_id.clone(),
        pair_id: pair.id,
        user_id: claims.sub.clone(),
        s3_url: state.uploads.object_url(&key),
        taken_at: now.clone(),
        created_at: now,
    };
    let db = state.db.clone();
    store::blocking(move || photos::create_photo(&db, &photo))
        .await
        .map_err(store_error)?;

    tracing::info!(
        user_id = %claims.sub,
        photo_id = %photo_id,
        filename = %req.filename,
        "Upload URL issued"
    );

    Ok(Json(UploadResponse {
        upload_url,
        photo_id,
        expires_in: state.uploads.expires_in(),
    }))
}
