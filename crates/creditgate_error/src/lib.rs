//! Error types for the creditgate library.
//!
//! This crate provides the foundation error types used throughout the creditgate workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern for clean error handling:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use creditgate_error::{CreditgateResult, ConfigError};
//!
//! fn load_limits() -> CreditgateResult<u64> {
//!     Err(ConfigError::new("safe_per_second must be below max_per_second"))?
//! }
//!
//! match load_limits() {
//!     Ok(limit) => println!("Got: {}", limit),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dispatch;
mod error;
mod retryable;
mod rpc;

pub use config::ConfigError;
pub use dispatch::{DispatchError, DispatchErrorKind};
pub use error::{CreditgateError, CreditgateErrorKind, CreditgateResult};
pub use retryable::RetryableError;
pub use rpc::{RpcError, RpcErrorKind, JSON_RPC_LIMIT_EXCEEDED};
