use axum::http::{header, Method};
use axum::{extract::State, middleware, routing, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::middleware::JwtSecret;
use crate::pairs::crud as pair_crud;
use crate::photos::{listing as photo_listing, upload as photo_upload};
use crate::state::AppState;
use crate::users::registration;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`: the
/// rate limiter keys on the peer address.
pub fn build_router(state: AppState) -> Router {
    // Anonymous user creation: 10 requests per minute per IP
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(6) // 1 token every 6 seconds = 10 per minute
            .burst_size(10)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let user_routes = Router::new()
        .route("/api/v1/users", routing::post(registration::create_user))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Bearer-authenticated routes; the Claims extractor validates the token
    let authenticated_routes = Router::new()
        .route("/api/v1/pairs", routing::post(pair_crud::create_pair))
        .route("/api/v1/pairs/{pair_id}", routing::delete(pair_crud::delete_pair))
        .route("/api/v1/photos", routing::get(photo_listing::list_photos))
        .route("/api/v1/photos/upload", routing::post(photo_upload::request_upload));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", routing::get(health_check));

    Router::new()
        .merge(user_routes)
        .merge(authenticated_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer())
        .with_state(state)
}

/// Browser clients may call the API from any origin; preflights are answered here.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
