//! Top-level error wrapper types.

use crate::{ConfigError, DispatchError, RetryableError, RpcError};

/// Every error condition the creditgate crates can produce.
///
/// # Examples
///
/// ```
/// use creditgate_error::{CreditgateError, RpcError, RpcErrorKind};
///
/// let rpc_err = RpcError::new(RpcErrorKind::Transport("connection reset".to_string()));
/// let err: CreditgateError = rpc_err.into();
/// assert!(format!("{}", err).contains("RPC Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum CreditgateErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Dispatch queue error
    #[from(DispatchError)]
    Dispatch(DispatchError),
    /// Upstream RPC error
    #[from(RpcError)]
    Rpc(RpcError),
}

/// Creditgate error with kind discrimination.
///
/// This is the error type most callers hand to the dispatch queue: it
/// converts from [`DispatchError`] and reports upstream rate-limit rejections
/// through [`RetryableError`].
///
/// # Examples
///
/// ```
/// use creditgate_error::{CreditgateResult, ConfigError};
///
/// fn might_fail() -> CreditgateResult<()> {
///     Err(ConfigError::new("Missing field"))?
/// }
///
/// match might_fail() {
///     Ok(_) => println!("Success"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Creditgate Error: {}", _0)]
pub struct CreditgateError(Box<CreditgateErrorKind>);

impl CreditgateError {
    /// Create a new error from a kind.
    pub fn new(kind: CreditgateErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CreditgateErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to CreditgateErrorKind
impl<T> From<T> for CreditgateError
where
    T: Into<CreditgateErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

impl RetryableError for CreditgateError {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            CreditgateErrorKind::Rpc(err) => err.is_retryable(),
            CreditgateErrorKind::Config(_) | CreditgateErrorKind::Dispatch(_) => false,
        }
    }
}

/// Result type for creditgate operations.
///
/// # Examples
///
/// ```
/// use creditgate_error::{CreditgateResult, RpcError, RpcErrorKind};
///
/// fn fetch_balance() -> CreditgateResult<u128> {
///     Err(RpcError::new(RpcErrorKind::TooManyRequests))?
/// }
/// ```
pub type CreditgateResult<T> = std::result::Result<T, CreditgateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DispatchErrorKind, RpcErrorKind};

    #[test]
    fn test_retryable_delegates_to_rpc_kind() {
        let err: CreditgateError = RpcError::new(RpcErrorKind::TooManyRequests).into();
        assert!(err.is_retryable());

        let err: CreditgateError = DispatchError::new(DispatchErrorKind::NoRuntime).into();
        assert!(!err.is_retryable());

        let err: CreditgateError = ConfigError::new("bad").into();
        assert!(!err.is_retryable());
    }
}
