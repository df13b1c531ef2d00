//! vdimeter gateway library entry.
//!
//! This crate wires the metrics registry, the instrumentation middleware and
//! the desktop stream relay into an axum application. It is consumed by the
//! binary (`main.rs`), by integration tests, and by hosts that only want
//! `instrument::MetricsLayer` in front of their own routes.

pub mod app_state;
pub mod config;
pub mod instrument;
pub mod obs;
pub mod ops;
pub mod router;
pub mod transport;
