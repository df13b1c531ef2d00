//! vdimeter core: transport-agnostic instrumentation primitives.
//!
//! This crate defines the label types, channel classification and error
//! surface shared by the gateway and any embedding server. It intentionally
//! carries no transport or runtime dependencies so it can be reused in
//! multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Instrumentation must never be the reason a request fails.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod labels;
pub mod route;

/// Shared result type.
pub use error::{Result, VdiMeterError};
pub use labels::{ChannelKind, RequestLabel, ResponseLabel, StreamLabel};
pub use route::{RouteClass, RouteClassifier};
