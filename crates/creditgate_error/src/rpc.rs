//! Upstream RPC error types.

use crate::RetryableError;

/// JSON-RPC error code metered gateways use for "limit exceeded".
pub const JSON_RPC_LIMIT_EXCEEDED: i64 = -32005;

/// Upstream RPC error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum RpcErrorKind {
    /// Upstream rejected the call because its rate limit was hit
    #[display("Upstream rate limit hit (too many requests)")]
    TooManyRequests,

    /// HTTP error with status code and message
    #[display("HTTP {} error: {}", status_code, message)]
    Http {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// JSON-RPC error object returned by the node
    #[display("JSON-RPC error {}: {}", code, message)]
    JsonRpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Connection-level failure before a response arrived
    #[display("Transport error: {}", _0)]
    Transport(String),
}

impl RpcErrorKind {
    /// Check if this error is the upstream "too many requests" signal.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcErrorKind::TooManyRequests => true,
            RpcErrorKind::Http { status_code, .. } => *status_code == 429,
            RpcErrorKind::JsonRpc { code, .. } => {
                matches!(*code, JSON_RPC_LIMIT_EXCEEDED | 429)
            }
            RpcErrorKind::Transport(_) => false,
        }
    }
}

/// Upstream RPC error with source location tracking.
///
/// # Examples
///
/// ```
/// use creditgate_error::{RetryableError, RpcError, RpcErrorKind};
///
/// let err = RpcError::new(RpcErrorKind::Http {
///     status_code: 429,
///     message: "Your app has exceeded its compute units per second capacity".to_string(),
/// });
/// assert!(err.is_retryable());
/// assert!(format!("{}", err).contains("HTTP 429"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("RPC Error: {} at line {} in {}", kind, line, file)]
pub struct RpcError {
    /// The kind of error that occurred
    pub kind: RpcErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl RpcError {
    /// Create a new RpcError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RpcErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}

impl RetryableError for RpcError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for RpcError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        let kind = match err.status() {
            Some(status) if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                RpcErrorKind::TooManyRequests
            }
            Some(status) => RpcErrorKind::Http {
                status_code: status.as_u16(),
                message: err.to_string(),
            },
            None => RpcErrorKind::Transport(err.to_string()),
        };
        Self::new(kind)
    }
}
