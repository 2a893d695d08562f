//! Errors raised by the dispatch queue itself.
//!
//! Operation failures are returned to callers as their own error values.
//! These kinds only cover the cases where there is no caller error to hand
//! back.

/// Dispatch queue error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DispatchErrorKind {
    /// The limiter was constructed outside of a Tokio runtime.
    #[display("No Tokio runtime available to drive the limiter")]
    NoRuntime,

    /// The submitted operation panicked while executing.
    #[display("Operation '{}' panicked during execution", method)]
    OperationPanicked {
        /// Method name the operation was submitted under
        method: String,
    },

    /// The method costs more credits than the limiter can ever admit at once.
    #[display(
        "Call to '{}' costs {} credits, more than the {} a single call may use",
        method,
        cost,
        ceiling
    )]
    CostExceedsBudget {
        /// Method name the operation was submitted under
        method: String,
        /// Credits the method costs
        cost: u64,
        /// Most credits one call may cost
        ceiling: u64,
    },

    /// The drain loop went away without answering the call.
    #[display("Call to '{}' was abandoned before completion", method)]
    Abandoned {
        /// Method name the operation was submitted under
        method: String,
    },
}

/// Dispatch error with location tracking.
///
/// # Examples
///
/// ```
/// use creditgate_error::{DispatchError, DispatchErrorKind};
///
/// let err = DispatchError::new(DispatchErrorKind::NoRuntime);
/// assert_eq!(err.kind(), &DispatchErrorKind::NoRuntime);
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Dispatch Error: {} at line {} in {}", kind, line, file)]
pub struct DispatchError {
    kind: DispatchErrorKind,
    line: u32,
    file: &'static str,
}

impl DispatchError {
    /// Create a new dispatch error with caller location tracking.
    #[track_caller]
    pub fn new(kind: DispatchErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &DispatchErrorKind {
        &self.kind
    }
}
