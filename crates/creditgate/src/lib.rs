//! Creditgate - credit-metered dispatch for rate-limited RPC providers
//!
//! Metered blockchain node gateways charge every JSON-RPC method in credits and
//! throttle accounts that exceed a per-second or per-day credit budget.
//! Creditgate sits in front of such a provider and runs every call through a
//! single FIFO queue that only releases the next call once it fits both
//! budgets, and that retries upstream "too many requests" rejections with
//! exponential backoff.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use creditgate::{CreditLimiter, CreditgateError, LimiterConfig, init_logging};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     init_logging()?;
//!     let limiter = CreditLimiter::new(LimiterConfig::load()?)?;
//!
//!     let logs = limiter
//!         .submit("eth_getLogs", || async { fetch_logs().await })
//!         .await?;
//!
//!     let plan = limiter.advise_for_method("eth_getLogs");
//!     println!("Fetch in batches of {}", plan.batch_size);
//!     Ok(())
//! }
//! ```
//!
//! # Cargo Features
//!
//! - `http` - convert `reqwest` errors into RPC errors, classifying HTTP 429
//!   as retryable
//!
//! # Architecture
//!
//! - `creditgate_error` - error types and the retryable-error classification
//! - `creditgate_rate_limit` - cost model, credit accountant, dispatch queue,
//!   batch advisor and limiter handle
//!
//! This crate (`creditgate`) re-exports both and adds logging setup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use creditgate_error::*;
pub use creditgate_rate_limit::*;

mod observability;

pub use observability::{LoggingConfig, init_logging, init_logging_with_config};
