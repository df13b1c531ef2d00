//! Tower layer that instruments every request routed through it.
//!
//! Install with `Router::route_layer` so the matched route template is
//! available as the `path` label.
//!
//! Standard requests get one latency observation and one request counter
//! increment. Streaming requests hold an active-stream gauge unit for the
//! lifetime of the connection and get byte counting through the interceptor.
//! All bookkeeping runs from `Drop`, so it also happens when the handler
//! panics or the host drops the request future.
//!
//! On streaming routes the layer takes hyper's `OnUpgrade` out of the request
//! extensions, so handlers there must upgrade via
//! `ResponseInterceptor::upgrade()` rather than axum's `WebSocketUpgrade`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::connect_info::MockConnectInfo;
use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;
use hyper::upgrade::OnUpgrade;
use prometheus::HistogramTimer;
use tower::{Layer, Service};

use vdimeter_core::{RequestLabel, RouteClass, RouteClassifier, StreamLabel};

use crate::instrument::endpoint::{EndpointResolver, NamespacedNameResolver};
use crate::instrument::interceptor::ResponseInterceptor;
use crate::obs::Metrics;

const UNKNOWN_PEER: &str = "unknown";

#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<Metrics>,
    classifier: Arc<RouteClassifier>,
    resolver: Arc<dyn EndpointResolver>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            classifier: Arc::new(RouteClassifier::default()),
            resolver: Arc::new(NamespacedNameResolver::default()),
        }
    }

    pub fn with_classifier(mut self, classifier: RouteClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_resolver(mut self, resolver: impl EndpointResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    layer: MetricsLayer,
}

/// Records the request counter and latency histogram when dropped.
struct RequestGuard {
    metrics: Arc<Metrics>,
    label: RequestLabel,
    interceptor: ResponseInterceptor,
    // observes on drop, after the counter below
    _timer: HistogramTimer,
}

impl RequestGuard {
    fn start(metrics: Arc<Metrics>, label: RequestLabel, interceptor: ResponseInterceptor) -> Self {
        let timer = metrics.start_request_timer(&label);
        Self {
            metrics,
            label,
            interceptor,
            _timer: timer,
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let status = self.interceptor.status().as_u16();
        self.metrics.record_response(&self.label.with_status(status));
    }
}

fn route_path(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned())
}

/// Client IP, resolved like axum's `ConnectInfo` extractor (real connection
/// info first, then `MockConnectInfo`).
fn peer_addr(req: &Request) -> String {
    let ext = req.extensions();
    ext.get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| ext.get::<MockConnectInfo<SocketAddr>>().map(|MockConnectInfo(addr)| *addr))
        // v4 clients on a dual-stack listener arrive as ::ffff:a.b.c.d
        .map(|addr| addr.ip().to_canonical().to_string())
        .unwrap_or_else(|| UNKNOWN_PEER.to_owned())
}

impl<S> Service<Request> for MetricsService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // keep the instance that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let route = route_path(&req);
        match self.layer.classifier.classify(&route) {
            RouteClass::Standard => {
                let label = RequestLabel::new(&route, req.method().as_str());
                let interceptor = ResponseInterceptor::standard();
                req.extensions_mut().insert(interceptor.clone());
                let guard = RequestGuard::start(
                    Arc::clone(&self.layer.metrics),
                    label,
                    interceptor.clone(),
                );

                Box::pin(async move {
                    let response = inner.call(req).await?;
                    interceptor.write_status(response.status());
                    drop(guard);
                    Ok(response)
                })
            }
            RouteClass::Stream(kind) => {
                let endpoint = self.layer.resolver.resolve(&route, req.uri().path());
                let label = StreamLabel::new(endpoint, &peer_addr(&req));
                tracing::debug!(
                    %kind,
                    desktop = %label.endpoint,
                    client = %label.peer,
                    "stream request"
                );

                let metrics = Arc::clone(&self.layer.metrics);
                let active = metrics.acquire_stream(kind);
                let on_upgrade = req.extensions_mut().remove::<OnUpgrade>();
                let interceptor =
                    ResponseInterceptor::streaming(metrics, kind, label, on_upgrade, active);
                req.extensions_mut().insert(interceptor.clone());

                Box::pin(async move {
                    let response = inner.call(req).await?;
                    interceptor.write_status(response.status());
                    Ok(response)
                })
            }
        }
    }
}
