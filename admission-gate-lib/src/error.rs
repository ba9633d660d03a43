use thiserror::Error;

/// Errors raised by the admission core.
///
/// Quota exhaustion is not an error: it is reported through
/// [`Decision::Rejected`](crate::admission::Decision::Rejected).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("unknown admission policy: {0}")]
    UnknownPolicy(String),

    #[error("caller has no role configured for policy {policy}")]
    UnauthorizedRole { policy: String },

    #[error("admission policy already registered: {0}")]
    DuplicatePolicy(String),

    #[error("invalid admission policy {name}: {reason}")]
    InvalidPolicy { name: String, reason: String },
}

impl AdmissionError {
    /// Static label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownPolicy(_) => "unknown_policy",
            Self::UnauthorizedRole { .. } => "unauthorized_role",
            Self::DuplicatePolicy(_) => "duplicate_policy",
            Self::InvalidPolicy { .. } => "invalid_policy",
        }
    }
}

/// Errors that can occur in the gate
#[derive(Error, Debug)]
pub enum GateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

pub type Result<T> = std::result::Result<T, GateError>;
