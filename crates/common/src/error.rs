use thiserror::Error;

/// Shared error taxonomy for the fleet-console control plane.
///
/// Variants line up with the error classes in spec.md §7 (authentication,
/// protocol, authorisation, handler, evaluation, dispatch, persistence).
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("missing api key")]
    MissingApiKey,

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("api key expired")]
    ExpiredApiKey,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FleetError {
    /// Stable machine-readable code sent in `error` envelopes (spec.md §4.1/§7).
    pub fn code(&self) -> &'static str {
        match self {
            FleetError::MissingApiKey => "MISSING_API_KEY",
            FleetError::InvalidApiKey => "INVALID_API_KEY",
            FleetError::ExpiredApiKey => "EXPIRED_API_KEY",
            FleetError::Forbidden(_) => "FORBIDDEN",
            FleetError::Protocol(_) => "PARSE_ERROR",
            FleetError::NotFound(_) => "NOT_FOUND",
            FleetError::Validation(_) => "VALIDATION_ERROR",
            FleetError::Persistence(_) => "PERSISTENCE_ERROR",
            FleetError::Broker(_) => "BROKER_ERROR",
            FleetError::Dispatch(_) => "DISPATCH_ERROR",
            FleetError::Config(_) => "CONFIG_ERROR",
            FleetError::Io(_) => "IO_ERROR",
            FleetError::Serialization(_) => "SERIALIZATION_ERROR",
            FleetError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
