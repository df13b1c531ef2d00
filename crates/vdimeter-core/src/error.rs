//! Shared error type across vdimeter crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed request or config.
    BadRequest,
    /// The transport cannot hand out a raw duplex stream.
    UpgradeUnsupported,
    /// The protocol upgrade was attempted but did not complete.
    UpgradeFailed,
    /// The upstream desktop endpoint could not be reached.
    BadGateway,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::UpgradeUnsupported => "UPGRADE_UNSUPPORTED",
            ClientCode::UpgradeFailed => "UPGRADE_FAILED",
            ClientCode::BadGateway => "BAD_GATEWAY",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, VdiMeterError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum VdiMeterError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("connection cannot be upgraded to a raw stream")]
    UpgradeUnsupported,
    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("metrics registry: {0}")]
    Metrics(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl VdiMeterError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            VdiMeterError::BadRequest(_) => ClientCode::BadRequest,
            VdiMeterError::UpgradeUnsupported => ClientCode::UpgradeUnsupported,
            VdiMeterError::UpgradeFailed(_) => ClientCode::UpgradeFailed,
            VdiMeterError::Upstream(_) => ClientCode::BadGateway,
            VdiMeterError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            VdiMeterError::Metrics(_) | VdiMeterError::Internal(_) => ClientCode::Internal,
        }
    }
}
