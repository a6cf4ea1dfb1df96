//! Command-control API (§6.1) — the thin request/response façade the UI
//! talks to. Grounded on the teacher's `axum` router setup in `main.rs`:
//! a shared `AppState`, permissive CORS from config, `tower-http` tracing,
//! and typed errors mapped to a JSON problem body via `IntoResponse`.

mod error;
mod handlers;
mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = if state.config.server.cors_allow_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .server
            .cors_allow_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/preview/start", post(handlers::preview_start))
        .route("/preview/stop", post(handlers::preview_stop))
        .route("/preview/go_live", post(handlers::preview_go_live))
        .route("/preview/status", get(handlers::preview_status))
        .route("/preview/playback_position", get(handlers::preview_playback_position))
        .route("/preview/health", get(handlers::preview_health))
        .route("/ptz/capture/:camera_id", post(handlers::ptz_capture))
        .route("/ptz/move_to_preset/:preset_id", post(handlers::ptz_move_to_preset))
        .route("/ptz/set_preset/:camera_id", post(handlers::ptz_set_preset))
        .route("/ptz/status/:camera_id", get(handlers::ptz_status))
        .route(
            "/destinations/:destination_id/validate_watchdog",
            post(handlers::destinations_validate_watchdog),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
