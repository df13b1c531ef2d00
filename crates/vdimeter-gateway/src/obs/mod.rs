//! In-process metrics backed by an injected `prometheus::Registry`.
//!
//! Instruments are registered once at startup and rendered by the `/metrics`
//! handler. There is no global registry; callers thread `Arc<Metrics>` through
//! construction.

pub mod metrics;

pub use metrics::{ActiveStreamGuard, Metrics, StreamCounters};
