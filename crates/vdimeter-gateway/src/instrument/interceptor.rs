//! Handler-facing view of the response being instrumented.
//!
//! The middleware inserts a `ResponseInterceptor` into the request extensions
//! before delegating. Handlers extract it to perform a protocol upgrade; the
//! middleware reads the recorded status back once the handler returns.
//!
//! Contract: only streaming-classified requests carry the upgrade capability.
//! `upgrade()` on a standard request's interceptor always fails with
//! `UpgradeUnsupported`, so bytes are never counted without labels.
//!
//! The layer moves hyper's `OnUpgrade` out of the request extensions for
//! streaming routes. Handlers behind it must upgrade through
//! [`ResponseInterceptor::upgrade`]; axum's `WebSocketUpgrade` and
//! `hyper::upgrade::on` find no upgrade there and fail.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use http::request::Parts;
use http::StatusCode;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;

use vdimeter_core::error::{Result, VdiMeterError};
use vdimeter_core::{ChannelKind, StreamLabel};

use crate::instrument::stream::MeteredStream;
use crate::obs::{ActiveStreamGuard, Metrics};

/// Stream produced by a successful upgrade.
pub type UpgradedStream = MeteredStream<TokioIo<Upgraded>>;

#[derive(Clone)]
pub struct ResponseInterceptor {
    inner: Arc<Inner>,
}

struct Inner {
    status: OnceLock<StatusCode>,
    stream: Option<StreamSlot>,
}

struct StreamSlot {
    metrics: Arc<Metrics>,
    kind: ChannelKind,
    label: StreamLabel,
    on_upgrade: Mutex<Option<OnUpgrade>>,
    // moves into the upgraded stream; otherwise released with the last clone
    active: Mutex<Option<ActiveStreamGuard>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResponseInterceptor {
    /// Interceptor for a bounded request/response exchange.
    pub fn standard() -> Self {
        Self {
            inner: Arc::new(Inner {
                status: OnceLock::new(),
                stream: None,
            }),
        }
    }

    /// Interceptor pre-configured for a streaming request.
    ///
    /// Byte-counter series are created only once an upgrade succeeds.
    pub fn streaming(
        metrics: Arc<Metrics>,
        kind: ChannelKind,
        label: StreamLabel,
        on_upgrade: Option<OnUpgrade>,
        active: ActiveStreamGuard,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                status: OnceLock::new(),
                stream: Some(StreamSlot {
                    metrics,
                    kind,
                    label,
                    on_upgrade: Mutex::new(on_upgrade),
                    active: Mutex::new(Some(active)),
                }),
            }),
        }
    }

    /// Record `status` unless a status was already recorded.
    pub fn write_status(&self, status: StatusCode) {
        let _ = self.inner.status.set(status);
    }

    /// Recorded status, `200 OK` when nothing was written.
    pub fn status(&self) -> StatusCode {
        self.inner.status.get().copied().unwrap_or(StatusCode::OK)
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.stream.is_some()
    }

    pub fn channel(&self) -> Option<(ChannelKind, &StreamLabel)> {
        self.inner.stream.as_ref().map(|s| (s.kind, &s.label))
    }

    /// Wait for the connection upgrade and return the byte-counting stream.
    ///
    /// Resolves only after the `101` response has been written, so callers
    /// spawn this and return the response first. The capability is consumed:
    /// a second call fails with `UpgradeUnsupported`.
    pub async fn upgrade(&self) -> Result<UpgradedStream> {
        let slot = self
            .inner
            .stream
            .as_ref()
            .ok_or(VdiMeterError::UpgradeUnsupported)?;
        let on_upgrade = lock(&slot.on_upgrade)
            .take()
            .ok_or(VdiMeterError::UpgradeUnsupported)?;

        let upgraded = on_upgrade
            .await
            .map_err(|e| VdiMeterError::UpgradeFailed(e.to_string()))?;

        self.write_status(StatusCode::SWITCHING_PROTOCOLS);

        let counters = slot.metrics.stream_counters(slot.kind, &slot.label);
        let mut stream = MeteredStream::new(
            TokioIo::new(upgraded),
            slot.kind,
            slot.label.clone(),
            counters,
        );
        if let Some(active) = lock(&slot.active).take() {
            stream = stream.with_active_guard(active);
        }
        Ok(stream)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ResponseInterceptor {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResponseInterceptor>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "metrics layer not installed"))
    }
}
