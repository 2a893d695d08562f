//! Classification of upstream failures.

/// Trait for errors that can carry the upstream "too many requests" signal.
///
/// The dispatch queue requeues an operation only when its error answers
/// `true` here. Every other failure is permanent and goes straight back to
/// the caller.
///
/// # Examples
///
/// ```
/// use creditgate_error::{RetryableError, RpcError, RpcErrorKind};
///
/// let throttled = RpcError::new(RpcErrorKind::TooManyRequests);
/// assert!(throttled.is_retryable());
///
/// let reverted = RpcError::new(RpcErrorKind::JsonRpc {
///     code: 3,
///     message: "execution reverted".to_string(),
/// });
/// assert!(!reverted.is_retryable());
/// ```
pub trait RetryableError {
    /// Returns true if the upstream rejected the call for rate-limit reasons.
    ///
    /// Only explicit rate-limit rejections (HTTP 429 or the gateway's
    /// JSON-RPC equivalent) should return true. Reverts, bad parameters,
    /// authentication failures and the like should return false.
    fn is_retryable(&self) -> bool;
}
