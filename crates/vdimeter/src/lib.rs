//! Single-dependency entry point for vdimeter.
//!
//! `core` holds labels, route classification and errors; `gateway` holds the
//! metrics registry, the tower layer and the desktop stream relay.

pub mod core {
    pub use vdimeter_core::*;
}

pub mod gateway {
    pub use vdimeter_gateway::*;
}

pub use vdimeter_gateway::instrument::{MetricsLayer, ResponseInterceptor};
pub use vdimeter_gateway::obs::Metrics;
