use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use vdimeter_core::error::{Result, VdiMeterError};
use vdimeter_core::{ChannelKind, RouteClassifier};

use crate::instrument::NamespacedNameResolver;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub desktops: DesktopsSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(VdiMeterError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.metrics.validate()?;
        self.desktops.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|e| {
            VdiMeterError::BadRequest(format!("gateway.listen must be a socket address: {e}"))
        })?;
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_display_suffix")]
    pub display_suffix: String,

    #[serde(default = "default_audio_suffix")]
    pub audio_suffix: String,

    /// Histogram buckets in seconds; prometheus defaults when absent.
    #[serde(default)]
    pub latency_buckets: Option<Vec<f64>>,

    /// Routes tagged as streaming regardless of their suffix.
    #[serde(default)]
    pub stream_routes: BTreeMap<String, ChannelKind>,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            display_suffix: default_display_suffix(),
            audio_suffix: default_audio_suffix(),
            latency_buckets: None,
            stream_routes: BTreeMap::new(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if !is_metric_name(&self.namespace) {
            return Err(VdiMeterError::BadRequest(format!(
                "metrics.namespace is not a valid metric name prefix: {:?}",
                self.namespace
            )));
        }
        if let Some(buckets) = &self.latency_buckets {
            if buckets.is_empty() {
                return Err(VdiMeterError::BadRequest(
                    "metrics.latency_buckets must not be empty".into(),
                ));
            }
            if buckets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(VdiMeterError::BadRequest(
                    "metrics.latency_buckets must be strictly increasing".into(),
                ));
            }
        }
        self.classifier()?;
        Ok(())
    }

    pub fn buckets(&self) -> Vec<f64> {
        self.latency_buckets
            .clone()
            .unwrap_or_else(|| prometheus::DEFAULT_BUCKETS.to_vec())
    }

    pub fn classifier(&self) -> Result<RouteClassifier> {
        let classifier = RouteClassifier::new(&self.display_suffix, &self.audio_suffix)?;
        Ok(self
            .stream_routes
            .iter()
            .fold(classifier, |c, (route, kind)| c.with_route(route, *kind)))
    }
}

fn is_metric_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_namespace() -> String {
    "vdi".into()
}
fn default_display_suffix() -> String {
    RouteClassifier::DEFAULT_DISPLAY_SUFFIX.into()
}
fn default_audio_suffix() -> String {
    RouteClassifier::DEFAULT_AUDIO_SUFFIX.into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesktopsSection {
    /// Used when a stream route carries no namespace parameter.
    #[serde(default = "default_desktop_namespace")]
    pub default_namespace: String,

    /// Upstream address templates; `{namespace}` and `{name}` are substituted.
    #[serde(default = "default_display_upstream")]
    pub display_upstream: String,

    #[serde(default = "default_audio_upstream")]
    pub audio_upstream: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for DesktopsSection {
    fn default() -> Self {
        Self {
            default_namespace: default_desktop_namespace(),
            display_upstream: default_display_upstream(),
            audio_upstream: default_audio_upstream(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl DesktopsSection {
    pub fn validate(&self) -> Result<()> {
        if self.default_namespace.is_empty() {
            return Err(VdiMeterError::BadRequest(
                "desktops.default_namespace must not be empty".into(),
            ));
        }
        if self.display_upstream.is_empty() || self.audio_upstream.is_empty() {
            return Err(VdiMeterError::BadRequest(
                "desktops upstream templates must not be empty".into(),
            ));
        }
        if !(100..=60000).contains(&self.connect_timeout_ms) {
            return Err(VdiMeterError::BadRequest(
                "desktops.connect_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn resolver(&self) -> NamespacedNameResolver {
        NamespacedNameResolver::new(&self.default_namespace)
    }

    pub fn upstream_addr(&self, kind: ChannelKind, namespace: &str, name: &str) -> String {
        let template = match kind {
            ChannelKind::Display => &self.display_upstream,
            ChannelKind::Audio => &self.audio_upstream,
        };
        template
            .replace("{namespace}", namespace)
            .replace("{name}", name)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_desktop_namespace() -> String {
    "default".into()
}
fn default_display_upstream() -> String {
    "{name}.{namespace}.svc:5900".into()
}
fn default_audio_upstream() -> String {
    "{name}.{namespace}.svc:8000".into()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
