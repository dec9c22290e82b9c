//! Error taxonomy for remote calls.

use thiserror::Error;

/// Why an authenticated call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// The bearer token was refused (missing, expired or revoked).
    CredentialRejected,
    /// The anti-forgery ticket was refused.
    StaleTicket,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::CredentialRejected => write!(f, "credential rejected"),
            AuthFailure::StaleTicket => write!(f, "stale csrf ticket"),
        }
    }
}

/// Errors returned by the remote gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transport failure or server unavailable.
    #[error("network error: {0}")]
    Network(String),

    /// Rejected credential or stale ticket.
    #[error("auth error: {0}")]
    Auth(AuthFailure),

    /// Request or response content rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// Target of the call does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    /// Check whether this is a rejection caused by a stale anti-forgery ticket.
    pub fn is_stale_ticket(&self) -> bool {
        matches!(self, GatewayError::Auth(AuthFailure::StaleTicket))
    }
}

/// A response did not match its expected schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required field was absent or empty.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

impl From<SchemaError> for GatewayError {
    fn from(err: SchemaError) -> Self {
        GatewayError::Validation(err.to_string())
    }
}
