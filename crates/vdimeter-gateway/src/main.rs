//! vdimeter gateway
//!
//! - Desktop stream relay: /api/desktops/ws/:namespace/:name/{websockify,wsaudio}
//! - Request latency / status metrics for every instrumented route
//! - Per-connection byte counters for upgraded streams
//! - /metrics in Prometheus text format

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use vdimeter_gateway::{app_state, config, router};

const CONFIG_ENV: &str = "VDIMETER_CONFIG";

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "vdimeter.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .expect("gateway.listen must be a valid SocketAddr");

    let state = app_state::AppState::new(cfg).expect("metrics setup failed");
    let app = router::build_router(state);

    tracing::info!(%listen, config = %path, "vdimeter-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
