use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::models::Photo;
use crate::error::{api_error, store_error, ApiError};
use crate::state::AppState;
use crate::store::{self, pairs, photos};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

/// Raw strings so an unparseable value falls back to the default instead of
/// rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListPhotosQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListPhotosQuery {
    fn page(&self) -> (i64, i64) {
        let limit = self
            .limit
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|&l| l > 0)
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        let offset = self
            .offset
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .max(0);
        (limit, offset)
    }
}

#[derive(Debug, Serialize)]
pub struct PhotoListResponse {
    pub photos: Vec<Photo>,
    pub total: i64,
}

/// GET /api/v1/photos?limit&offset
/// Photos of the caller's pair, newest first.
pub async fn list_photos(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListPhotosQuery>,
) -> Result<Json<PhotoListResponse>, ApiError> {
    let (limit, offset) = query.page();
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let page = store::blocking(move || {
        let Some(pair) = pairs::get_by_user(&db, &user_id)? else {
            return Ok(None);
        };
        photos::list_for_pair(&db, &pair.id, limit, offset).map(Some)
    })
    .await
    .map_err(store_error)?;

    let Some((photos, total)) = page else {
        return Err(api_error(StatusCode::NOT_FOUND, "user is not in a pair"));
    };

    Ok(Json(PhotoListResponse { photos, total }))
}
