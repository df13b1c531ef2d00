//! Desktop stream relay.
//!
//! Responsibilities:
//! - Validate the upgrade request (`Connection: upgrade` + `Upgrade: <proto>`)
//! - Connect to the desktop's upstream socket before answering
//! - Answer `101 Switching Protocols`, then splice the metered stream to the
//!   upstream until either side closes
//!
//! Bytes are relayed as-is after the upgrade; framing is end to end between
//! the client and the upstream.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::Duration;

use vdimeter_core::error::{Result, VdiMeterError};
use vdimeter_core::ChannelKind;

use crate::app_state::AppState;
use crate::instrument::ResponseInterceptor;

#[derive(Debug, Deserialize)]
pub struct DesktopPath {
    pub namespace: String,
    pub name: String,
}

pub async fn display(
    State(app): State<AppState>,
    Path(desktop): Path<DesktopPath>,
    headers: HeaderMap,
    interceptor: ResponseInterceptor,
) -> Response {
    relay(app, desktop, &headers, interceptor, ChannelKind::Display).await
}

pub async fn audio(
    State(app): State<AppState>,
    Path(desktop): Path<DesktopPath>,
    headers: HeaderMap,
    interceptor: ResponseInterceptor,
) -> Response {
    relay(app, desktop, &headers, interceptor, ChannelKind::Audio).await
}

async fn relay(
    app: AppState,
    desktop: DesktopPath,
    headers: &HeaderMap,
    interceptor: ResponseInterceptor,
    kind: ChannelKind,
) -> Response {
    let protocol = match upgrade_protocol(headers) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let desktops = &app.cfg().desktops;
    let addr = desktops.upstream_addr(kind, &desktop.namespace, &desktop.name);
    let upstream = match connect(&addr, desktops.connect_timeout()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(%kind, upstream = %addr, error = %e, "desktop upstream unavailable");
            return error_response(&e);
        }
    };

    tokio::spawn(splice(interceptor, upstream, addr));

    (
        StatusCode::SWITCHING_PROTOCOLS,
        [
            (header::CONNECTION, "upgrade".to_string()),
            (header::UPGRADE, protocol),
        ],
    )
        .into_response()
}

async fn splice(interceptor: ResponseInterceptor, mut upstream: TcpStream, addr: String) {
    let mut client = match interceptor.upgrade().await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(upstream = %addr, error = %e, "upgrade did not complete");
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((from_client, to_client)) => tracing::info!(
            kind = %client.kind(),
            desktop = %client.label().endpoint,
            client = %client.label().peer,
            upstream = %addr,
            from_client,
            to_client,
            "relay finished"
        ),
        Err(e) => tracing::debug!(upstream = %addr, error = %e, "relay ended with error"),
    }
}

async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| VdiMeterError::Upstream(format!("connect to {addr} timed out")))?
        .map_err(|e| VdiMeterError::Upstream(format!("connect to {addr} failed: {e}")))
}

/// Requested upgrade protocol, if the request asks for one.
fn upgrade_protocol(headers: &HeaderMap) -> Result<String> {
    let wants_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !wants_upgrade {
        return Err(VdiMeterError::BadRequest("missing Connection: upgrade".into()));
    }

    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .ok_or_else(|| VdiMeterError::BadRequest("missing Upgrade header".into()))
}

fn error_response(err: &VdiMeterError) -> Response {
    let status = match err {
        VdiMeterError::BadRequest(_) | VdiMeterError::UpgradeFailed(_) => StatusCode::BAD_REQUEST,
        VdiMeterError::UpgradeUnsupported => StatusCode::UPGRADE_REQUIRED,
        VdiMeterError::Upstream(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = json!({
        "code": err.client_code().as_str(),
        "msg": err.to_string(),
    });
    (status, Json(body)).into_response()
}
