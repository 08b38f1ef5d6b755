use thiserror::Error;

use crate::venue::VenueError;

/// Error taxonomy for the signal-to-orders pipeline. Classified by kind so the
/// API layer can map each variant to a status code and the journal can record
/// a stable label.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Schema or numeric preconditions on the inbound payload failed.
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    /// The resolved strategy is disabled; no venue I/O was attempted.
    #[error("strategy {0} is disabled")]
    StrategyDisabled(String),
    /// Per-symbol lock acquisition timed out.
    #[error("symbol {0} is busy with another signal")]
    SymbolBusy(String),
    /// Venue or network failure before any side effect for this signal.
    #[error("connectivity error: {0}")]
    Connectivity(String),
    /// The venue refused an order; surfaced verbatim in the response record.
    #[error("venue rejected [{code}]: {message}")]
    VenueRejected { code: String, message: String },
    /// Startup-level misconfiguration (bad key, unknown account role).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<VenueError> for BridgeError {
    fn from(e: VenueError) -> Self {
        match e {
            VenueError::Exchange(message) => Self::VenueRejected {
                code: "exchange".to_string(),
                message,
            },
            other => Self::Connectivity(other.to_string()),
        }
    }
}

impl BridgeError {
    /// Stable label used in journal entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSignal(_) => "invalid_signal",
            Self::StrategyDisabled(_) => "strategy_disabled",
            Self::SymbolBusy(_) => "symbol_busy",
            Self::Connectivity(_) => "connectivity_error",
            Self::VenueRejected { .. } => "venue_rejected",
            Self::Configuration(_) => "configuration_error",
        }
    }
}
