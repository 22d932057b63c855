use std::fmt;

use hyper::StatusCode;
use thiserror::Error;

use crate::rotation::LifecycleState;

/// Error code the provider returns when a resource already exists
pub const CONFLICT_CODE: &str = "ConflictException";
/// Error code the provider returns when the caller is being throttled
pub const TOO_MANY_REQUESTS_CODE: &str = "TooManyRequestsException";
/// Error code used for failures that never reached the provider
pub const TRANSPORT_ERROR_CODE: &str = "TransportError";
/// Error code used when the provider's response cannot be used
pub const INVALID_RESPONSE_CODE: &str = "InvalidResponse";

/// A failure reported by the gateway provider's control plane
///
/// Carried to callers verbatim; the only cases handled locally are
/// [`ProviderError::is_conflict`] during stage creation and
/// [`ProviderError::is_rate_limited`] during deletion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Provider error code, e.g. `ConflictException`
    pub code: String,
    /// HTTP status of the failed control-plane call, if one was received
    pub status: Option<u16>,
    /// Human readable message from the provider
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(CONFLICT_CODE, Some(409), message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(TOO_MANY_REQUESTS_CODE, Some(429), message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(TRANSPORT_ERROR_CODE, None, message)
    }

    /// The resource being created already exists
    pub fn is_conflict(&self) -> bool {
        self.code == CONFLICT_CODE
    }

    /// The provider throttled the call
    pub fn is_rate_limited(&self) -> bool {
        self.code == TOO_MANY_REQUESTS_CODE
    }
}

/// A region whose endpoint could not be provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFailure {
    pub region: String,
    pub error: ProviderError,
}

impl fmt::Display for RegionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.region, self.error)
    }
}

/// An endpoint that could not be deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub region: String,
    pub gateway_id: String,
    pub error: ProviderError,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.region, self.gateway_id, self.error)
    }
}

fn join_failures<T: fmt::Display>(failures: &[T]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn cleanup_suffix(failures: &[EndpointFailure]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" (cleanup also failed: {})", join_failures(failures))
    }
}

/// Unified error type for the rotator
#[derive(Error, Debug)]
pub enum RotatorError {
    // Provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(
        "Activation failed in {} of {total} regions: {}{}",
        .failures.len(),
        join_failures(.failures),
        cleanup_suffix(.cleanup_failures)
    )]
    PartialActivation {
        failures: Vec<RegionFailure>,
        cleanup_failures: Vec<EndpointFailure>,
        total: usize,
    },

    #[error("Failed to delete {} endpoints: {}", .failures.len(), join_failures(.failures))]
    AggregatedTeardown { failures: Vec<EndpointFailure> },

    // Lifecycle errors
    #[error("Operation not allowed while rotator is {0}")]
    InvalidState(LifecycleState),

    #[error("No endpoints available")]
    NoEndpointsAvailable,

    // Input errors
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Unknown region: {0}")]
    InvalidRegion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upgrade requests cannot be relayed")]
    UpgradeNotSupported,

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for rotator operations
pub type Result<T> = std::result::Result<T, RotatorError>;

impl RotatorError {
    /// Get the HTTP status code the relay answers with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RotatorError::InvalidRequest(_)
            | RotatorError::InvalidTarget(_)
            | RotatorError::InvalidRegion(_)
            | RotatorError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 501 Not Implemented
            RotatorError::UpgradeNotSupported => StatusCode::NOT_IMPLEMENTED,

            // 502 Bad Gateway
            RotatorError::Provider(_)
            | RotatorError::PartialActivation { .. }
            | RotatorError::AggregatedTeardown { .. }
            | RotatorError::Http(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            RotatorError::NoEndpointsAvailable | RotatorError::InvalidState(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            RotatorError::MissingEnvVar(_) | RotatorError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The underlying provider error, if this is a plain provider failure
    pub fn as_provider(&self) -> Option<&ProviderError> {
        match self {
            RotatorError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

// Convert from HTTP client errors
impl From<reqwest::Error> for RotatorError {
    fn from(err: reqwest::Error) -> Self {
        RotatorError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for RotatorError {
    fn from(err: url::ParseError) -> Self {
        RotatorError::InvalidRequest(err.to_string())
    }
}
