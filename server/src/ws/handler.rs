use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::error::api_error;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// Browsers cannot set headers on the upgrade request, so the token rides in `?token=`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws?token=JWT
/// Authenticates before upgrading: a missing or invalid token is answered with
/// 401 and never reaches the registry.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        tracing::debug!("WebSocket upgrade without token");
        return api_error(StatusCode::UNAUTHORIZED, "token required").into_response();
    };

    let claims = match jwt::validate_access_token(&state.jwt_secret, &token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(error = %err, "WebSocket auth failed");
            return api_error(StatusCode::UNAUTHORIZED, "invalid token").into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    tracing::info!(user_id = %claims.sub, "WebSocket connection authenticated");
    ws.on_upgrade(move |socket| handle_authenticated(socket, state, claims.sub))
}

async fn handle_authenticated(socket: WebSocket, state: AppState, user_id: String) {
    actor::run_connection(socket, state, user_id).await;
}
