//! Axum router wiring.
//!
//! Desktop stream routes and `/healthz` sit behind the metrics layer;
//! `/metrics` itself is not instrumented.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops, transport};

pub const DISPLAY_ROUTE: &str = "/api/desktops/ws/:namespace/:name/websockify";
pub const AUDIO_ROUTE: &str = "/api/desktops/ws/:namespace/:name/wsaudio";

pub fn build_router(state: AppState) -> Router {
    let instrumented = Router::new()
        .route("/healthz", get(ops::healthz))
        .route(DISPLAY_ROUTE, get(transport::relay::display))
        .route(AUDIO_ROUTE, get(transport::relay::audio))
        .route_layer(state.metrics_layer());

    Router::new()
        .merge(instrumented)
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
