//! Metric registry for the instrumentation layer.
//!
//! All instruments live on one `Metrics` value registered against a caller
//! provided `Registry`. Updates are plain prometheus atomics, so any number of
//! concurrent requests may record without extra locking.

use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramTimer, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};

use vdimeter_core::error::{Result, VdiMeterError};
use vdimeter_core::{ChannelKind, RequestLabel, ResponseLabel, StreamLabel};

const REQUEST_LABELS: [&str; 2] = ["path", "method"];
const RESPONSE_LABELS: [&str; 3] = ["path", "method", "code"];
const STREAM_LABELS: [&str; 2] = ["desktop", "client"];

fn metrics_err(e: prometheus::Error) -> VdiMeterError {
    VdiMeterError::Metrics(e.to_string())
}

fn register<C>(registry: &Registry, collector: C) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(metrics_err)?;
    Ok(collector)
}

fn counter_vec(registry: &Registry, ns: &str, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    let vec = IntCounterVec::new(Opts::new(name, help).namespace(ns), labels).map_err(metrics_err)?;
    register(registry, vec)
}

fn gauge(registry: &Registry, ns: &str, name: &str, help: &str) -> Result<IntGauge> {
    let g = IntGauge::with_opts(Opts::new(name, help).namespace(ns)).map_err(metrics_err)?;
    register(registry, g)
}

/// Byte counters bound to one connection's labels.
#[derive(Clone)]
pub struct StreamCounters {
    pub received: IntCounter,
    pub sent: IntCounter,
}

/// Holds one unit of an active-stream gauge; releases it on drop.
pub struct ActiveStreamGuard {
    gauge: IntGauge,
    kind: ChannelKind,
}

impl ActiveStreamGuard {
    fn acquire(gauge: IntGauge, kind: ChannelKind) -> Self {
        gauge.inc();
        Self { gauge, kind }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

pub struct Metrics {
    registry: Registry,
    request_duration: HistogramVec,
    requests_total: IntCounterVec,
    display_bytes_sent: IntCounterVec,
    display_bytes_rcvd: IntCounterVec,
    audio_bytes_sent: IntCounterVec,
    audio_bytes_rcvd: IntCounterVec,
    active_display_streams: IntGauge,
    active_audio_streams: IntGauge,
}

impl Metrics {
    /// Register every instrument under `namespace` in `registry`.
    ///
    /// Fails if the registry already holds instruments with the same names or
    /// if `latency_buckets` is not strictly increasing.
    pub fn new(registry: Registry, namespace: &str, latency_buckets: Vec<f64>) -> Result<Self> {
        let ns = namespace;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "The latency of HTTP requests by path and method.",
            )
            .namespace(ns)
            .buckets(latency_buckets),
            &REQUEST_LABELS,
        )
        .map_err(metrics_err)?;
        let request_duration = register(&registry, request_duration)?;

        let requests_total = counter_vec(
            &registry,
            ns,
            "http_requests_total",
            "Total number of HTTP requests by status code, path, and method.",
            &RESPONSE_LABELS,
        )?;

        let display_bytes_sent = counter_vec(
            &registry,
            ns,
            "ws_display_bytes_sent_total",
            "Total bytes sent over display streams by desktop and client.",
            &STREAM_LABELS,
        )?;
        let display_bytes_rcvd = counter_vec(
            &registry,
            ns,
            "ws_display_bytes_rcvd_total",
            "Total bytes received over display streams by desktop and client.",
            &STREAM_LABELS,
        )?;
        let audio_bytes_sent = counter_vec(
            &registry,
            ns,
            "ws_audio_bytes_sent_total",
            "Total bytes sent over audio streams by desktop and client.",
            &STREAM_LABELS,
        )?;
        let audio_bytes_rcvd = counter_vec(
            &registry,
            ns,
            "ws_audio_bytes_rcvd_total",
            "Total bytes received over audio streams by desktop and client.",
            &STREAM_LABELS,
        )?;

        let active_display_streams = gauge(
            &registry,
            ns,
            "active_display_streams",
            "The current number of active display streams.",
        )?;
        let active_audio_streams = gauge(
            &registry,
            ns,
            "active_audio_streams",
            "The current number of active audio streams.",
        )?;

        Ok(Self {
            registry,
            request_duration,
            requests_total,
            display_bytes_sent,
            display_bytes_rcvd,
            audio_bytes_sent,
            audio_bytes_rcvd,
            active_display_streams,
            active_audio_streams,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Timer that observes into the latency histogram when dropped.
    pub fn start_request_timer(&self, label: &RequestLabel) -> HistogramTimer {
        self.request_duration
            .with_label_values(&label.values())
            .start_timer()
    }

    pub fn record_response(&self, label: &ResponseLabel) {
        let code = label.code();
        self.requests_total
            .with_label_values(&[label.path.as_str(), label.method.as_str(), code.as_str()])
            .inc();
    }

    /// Resolve the directional byte counters for one connection.
    pub fn stream_counters(&self, kind: ChannelKind, label: &StreamLabel) -> StreamCounters {
        let (received, sent) = match kind {
            ChannelKind::Display => (&self.display_bytes_rcvd, &self.display_bytes_sent),
            ChannelKind::Audio => (&self.audio_bytes_rcvd, &self.audio_bytes_sent),
        };
        let values = label.values();
        StreamCounters {
            received: received.with_label_values(&values),
            sent: sent.with_label_values(&values),
        }
    }

    fn active_gauge(&self, kind: ChannelKind) -> &IntGauge {
        match kind {
            ChannelKind::Display => &self.active_display_streams,
            ChannelKind::Audio => &self.active_audio_streams,
        }
    }

    /// Increment the active-stream gauge; the returned guard decrements it.
    pub fn acquire_stream(&self, kind: ChannelKind) -> ActiveStreamGuard {
        ActiveStreamGuard::acquire(self.active_gauge(kind).clone(), kind)
    }

    pub fn active_streams(&self, kind: ChannelKind) -> i64 {
        self.active_gauge(kind).get()
    }

    // Read-back helpers. Like any `with_label_values` call they create the
    // series at zero when it does not exist yet.

    pub fn request_count(&self, label: &ResponseLabel) -> u64 {
        let code = label.code();
        self.requests_total
            .with_label_values(&[label.path.as_str(), label.method.as_str(), code.as_str()])
            .get()
    }

    pub fn latency_observations(&self, label: &RequestLabel) -> u64 {
        self.request_duration
            .with_label_values(&label.values())
            .get_sample_count()
    }

    /// `(received, sent)` byte totals for one connection label.
    pub fn stream_bytes(&self, kind: ChannelKind, label: &StreamLabel) -> (u64, u64) {
        let c = self.stream_counters(kind, label);
        (c.received.get(), c.sent.get())
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .map_err(metrics_err)?;
        String::from_utf8(buf).map_err(|e| VdiMeterError::Internal(format!("metrics not utf-8: {e}")))
    }
}
