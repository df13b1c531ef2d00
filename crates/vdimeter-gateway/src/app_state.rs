//! Shared application state for the vdimeter gateway.
//!
//! Holds the validated config and the process-wide metrics. Startup errors
//! (metric registration, classifier setup) are returned, not panicked.

use std::sync::Arc;

use prometheus::Registry;
use vdimeter_core::error::Result;

use crate::config::GatewayConfig;
use crate::instrument::MetricsLayer;
use crate::obs::Metrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    metrics: Arc<Metrics>,
    layer: MetricsLayer,
}

struct AppStateInner {
    cfg: GatewayConfig,
}

impl AppState {
    /// Build application state against a fresh registry.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        Self::with_registry(cfg, Registry::new())
    }

    pub fn with_registry(cfg: GatewayConfig, registry: Registry) -> Result<Self> {
        let metrics = Arc::new(Metrics::new(
            registry,
            &cfg.metrics.namespace,
            cfg.metrics.buckets(),
        )?);

        let layer = MetricsLayer::new(Arc::clone(&metrics))
            .with_classifier(cfg.metrics.classifier()?)
            .with_resolver(cfg.desktops.resolver());

        tracing::debug!(
            namespace = %cfg.metrics.namespace,
            display_suffix = %cfg.metrics.display_suffix,
            audio_suffix = %cfg.metrics.audio_suffix,
            explicit_routes = cfg.metrics.stream_routes.len(),
            "metrics registered"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg }),
            metrics,
            layer,
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_layer(&self) -> MetricsLayer {
        self.layer.clone()
    }
}
