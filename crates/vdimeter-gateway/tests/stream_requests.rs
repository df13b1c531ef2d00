//! Streaming (display/audio) request instrumentation.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tower::ServiceExt;

use vdimeter_core::{ChannelKind, RouteClassifier, StreamLabel};
use vdimeter_gateway::instrument::{MetricsLayer, NamespacedNameResolver, ResponseInterceptor};
use vdimeter_gateway::obs::Metrics;

mod support;
use support::{metrics, read_head, series_count, upgrade_request, wait_for_active};

const PEER: ([u8; 4], u16) = ([10, 0, 0, 5], 51000);

/// Tries to upgrade; reports what the handler observed while running.
#[derive(Clone)]
struct GaugeWatch {
    metrics: Arc<Metrics>,
    display_seen: Arc<AtomicI64>,
    audio_seen: Arc<AtomicI64>,
}

impl GaugeWatch {
    fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            display_seen: Arc::new(AtomicI64::new(-1)),
            audio_seen: Arc::new(AtomicI64::new(-1)),
        }
    }

    async fn handle(self, interceptor: ResponseInterceptor) -> Response {
        self.display_seen
            .store(self.metrics.active_streams(ChannelKind::Display), Ordering::SeqCst);
        self.audio_seen
            .store(self.metrics.active_streams(ChannelKind::Audio), Ordering::SeqCst);

        let label = interceptor
            .channel()
            .map(|(kind, l)| format!("{kind} {} {}", l.endpoint, l.peer))
            .unwrap_or_default();

        match interceptor.upgrade().await {
            Ok(_) => StatusCode::SWITCHING_PROTOCOLS.into_response(),
            Err(e) => (StatusCode::UPGRADE_REQUIRED, format!("{label}|{}", e.client_code().as_str()))
                .into_response(),
        }
    }
}

fn watched_app(watch: GaugeWatch) -> Router {
    let display = watch.clone();
    let audio = watch.clone();
    Router::new()
        .route(
            "/desktop/:name/websockify",
            get(move |i: ResponseInterceptor| display.clone().handle(i)),
        )
        .route(
            "/desktop/:name/wsaudio",
            get(move |i: ResponseInterceptor| audio.clone().handle(i)),
        )
        .route_layer(
            MetricsLayer::new(watch.metrics.clone()).with_resolver(NamespacedNameResolver::new("kvdi")),
        )
        .layer(MockConnectInfo(SocketAddr::from(PEER)))
}

async fn body_string(rsp: Response) -> String {
    let bytes = axum::body::to_bytes(rsp.into_body(), 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn failed_upgrade_does_not_leak_the_gauge() {
    let m = metrics();
    let watch = GaugeWatch::new(m.clone());
    let rsp = watched_app(watch.clone())
        .oneshot(get_req("/desktop/foo/websockify"))
        .await
        .unwrap();

    assert_eq!(rsp.status(), StatusCode::UPGRADE_REQUIRED);
    assert_eq!(
        body_string(rsp).await,
        "display kvdi/foo 10.0.0.5|UPGRADE_UNSUPPORTED"
    );

    assert_eq!(watch.display_seen.load(Ordering::SeqCst), 1);
    assert_eq!(watch.audio_seen.load(Ordering::SeqCst), 0);
    assert_eq!(m.active_streams(ChannelKind::Display), 0);

    // no upgrade, no byte series
    assert_eq!(series_count(&m, "test_ws_display_bytes_rcvd_total"), 0);
    assert_eq!(series_count(&m, "test_ws_display_bytes_sent_total"), 0);

    // streaming requests never touch the request metrics
    assert_eq!(series_count(&m, "test_http_request_duration_seconds"), 0);
    assert_eq!(series_count(&m, "test_http_requests_total"), 0);
}

#[tokio::test]
async fn audio_paths_only_touch_audio_instruments() {
    let m = metrics();
    let watch = GaugeWatch::new(m.clone());
    let rsp = watched_app(watch.clone())
        .oneshot(get_req("/desktop/bar/wsaudio/"))
        .await
        .unwrap();

    // trailing slash does not match the route; nothing is instrumented
    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
    assert_eq!(watch.audio_seen.load(Ordering::SeqCst), -1);

    let rsp = watched_app(watch.clone())
        .oneshot(get_req("/desktop/bar/wsaudio"))
        .await
        .unwrap();
    assert_eq!(body_string(rsp).await, "audio kvdi/bar 10.0.0.5|UPGRADE_UNSUPPORTED");

    assert_eq!(watch.audio_seen.load(Ordering::SeqCst), 1);
    assert_eq!(watch.display_seen.load(Ordering::SeqCst), 0);
    assert_eq!(m.active_streams(ChannelKind::Audio), 0);
    assert_eq!(series_count(&m, "test_ws_display_bytes_rcvd_total"), 0);
    assert_eq!(series_count(&m, "test_ws_display_bytes_sent_total"), 0);
}

#[tokio::test]
async fn explicit_route_tags_override_suffixes() {
    let m = metrics();
    let watch = GaugeWatch::new(m.clone());
    let display = watch.clone();
    let app = Router::new()
        .route("/custom/:name/vnc", get(move |i: ResponseInterceptor| display.clone().handle(i)))
        .route_layer(
            MetricsLayer::new(m.clone())
                .with_classifier(RouteClassifier::default().with_route("/custom/:name/vnc", ChannelKind::Display)),
        );

    let rsp = app.oneshot(get_req("/custom/foo/vnc")).await.unwrap();
    assert_eq!(body_string(rsp).await, "display default/foo unknown|UPGRADE_UNSUPPORTED");
    assert_eq!(watch.display_seen.load(Ordering::SeqCst), 1);
    assert_eq!(m.active_streams(ChannelKind::Display), 0);
}

type Outcome = tokio::task::JoinHandle<StatusCode>;

/// Reads 1024 bytes, answers with 2048, then closes. The spawned session is
/// handed to the test, which awaits the recorded status.
fn exchange_app(m: Arc<Metrics>, sessions: mpsc::UnboundedSender<Outcome>) -> Router {
    let handler = move |interceptor: ResponseInterceptor| {
        let sessions = sessions.clone();
        async move {
            let session = tokio::spawn(async move {
                let mut stream = interceptor.upgrade().await.unwrap();
                let mut inbound = vec![0u8; 1024];
                stream.read_exact(&mut inbound).await.unwrap();
                stream.write_all(&[7u8; 2048]).await.unwrap();
                stream.shutdown().await.unwrap();
                interceptor.status()
            });
            sessions.send(session).unwrap();

            (
                StatusCode::SWITCHING_PROTOCOLS,
                [(header::CONNECTION, "upgrade"), (header::UPGRADE, "vdi-raw")],
            )
                .into_response()
        }
    };

    Router::new()
        .route("/desktop/:name/websockify", get(handler))
        .route_layer(MetricsLayer::new(m).with_resolver(NamespacedNameResolver::new("kvdi")))
        .layer(MockConnectInfo(SocketAddr::from(PEER)))
}

#[tokio::test]
async fn upgraded_display_stream_is_metered() {
    let m = metrics();
    let (tx, mut sessions) = mpsc::unbounded_channel();
    let app = exchange_app(m.clone(), tx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let mut conn = TcpStream::connect(addr).await.unwrap();
    conn.write_all(upgrade_request("/desktop/foo/websockify").as_bytes())
        .await
        .unwrap();
    let head = read_head(&mut conn).await;
    assert!(head.starts_with("HTTP/1.1 101"), "head={head}");
    assert_eq!(m.active_streams(ChannelKind::Display), 1);

    conn.write_all(&[1u8; 1024]).await.unwrap();
    let mut outbound = vec![0u8; 2048];
    conn.read_exact(&mut outbound).await.unwrap();
    let mut rest = Vec::new();
    conn.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    let session = sessions.recv().await.unwrap();
    assert_eq!(session.await.unwrap(), StatusCode::SWITCHING_PROTOCOLS);
    wait_for_active(&m, ChannelKind::Display, 0).await;

    let label = StreamLabel::new("kvdi/foo", "10.0.0.5:51000");
    assert_eq!(m.stream_bytes(ChannelKind::Display, &label), (1024, 2048));
    assert_eq!(m.active_streams(ChannelKind::Audio), 0);
    assert_eq!(series_count(&m, "test_ws_audio_bytes_rcvd_total"), 0);
    assert_eq!(series_count(&m, "test_http_request_duration_seconds"), 0);
    assert_eq!(series_count(&m, "test_http_requests_total"), 0);
}
