//! Configuration structures for the credit limiter.
//!
//! This module provides TOML-based configuration for credit budgets. The configuration
//! system supports:
//! - Bundled defaults (include_str! from creditgate.toml)
//! - User overrides (./creditgate.toml or ~/.config/creditgate/creditgate.toml)
//! - Automatic merging with user values taking precedence
//!
//! Every section and field is optional in user files; anything left out falls back
//! to the documented default.

use crate::cost::DEFAULT_METHOD_COSTS;
use crate::events::MAX_EVENT_CAPACITY;
use config::{Config, File, FileFormat};
use creditgate_error::{ConfigError, CreditgateError, CreditgateResult};
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Bundled default configuration.
const DEFAULT_CONFIG: &str = include_str!("../../../creditgate.toml");

/// Credit budgets enforced against the upstream provider.
///
/// # Example
///
/// ```toml
/// [limits]
/// max_per_second = 500
/// safe_per_second = 400
/// max_per_day = 10_000_000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Getters, Setters)]
#[serde(default)]
#[setters(prefix = "with_")]
pub struct CreditLimits {
    /// Hard per-second ceiling published by the provider (informational)
    max_per_second: u64,

    /// Per-second admission ceiling, kept below the hard ceiling for headroom
    safe_per_second: u64,

    /// Per-day ceiling used for admission
    max_per_day: u64,
}

impl CreditLimits {
    /// Most credits a single call may cost and still be admitted.
    pub fn admission_ceiling(&self) -> u64 {
        self.safe_per_second.min(self.max_per_day)
    }
}

impl Default for CreditLimits {
    fn default() -> Self {
        Self {
            max_per_second: 500,
            safe_per_second: 400,
            max_per_day: 10_000_000,
        }
    }
}

/// Credit price of a single method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MethodCost {
    /// Method name, matched exactly
    pub method: String,
    /// Credits charged per call
    pub credits: u64,
}

impl MethodCost {
    /// Create a new method cost entry.
    pub fn new(method: impl Into<String>, credits: u64) -> Self {
        Self {
            method: method.into(),
            credits,
        }
    }
}

/// Method cost table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Getters, Setters)]
#[serde(default)]
#[setters(prefix = "with_")]
pub struct CostConfig {
    /// Cost charged for methods absent from the table
    default_cost: u64,

    /// Per-method costs
    methods: Vec<MethodCost>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            default_cost: crate::cost::DEFAULT_COST,
            methods: DEFAULT_METHOD_COSTS
                .iter()
                .map(|(method, credits)| MethodCost::new(*method, *credits))
                .collect(),
        }
    }
}

/// Retry and admission wait settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Getters, Setters)]
#[serde(default)]
#[setters(prefix = "with_")]
pub struct RetryConfig {
    /// Requeues allowed after upstream rate-limit rejections
    max_retries: u32,

    /// Backoff unit; retry `n` waits `2^n * base_backoff_ms`
    base_backoff_ms: u64,

    /// Wait before re-checking admission of a denied queue head
    admission_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 1000,
            admission_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Wait applied between admission checks of a denied queue head.
    pub fn admission_delay(&self) -> Duration {
        Duration::from_millis(self.admission_delay_ms)
    }
}

/// Batch sizing advice parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Getters, Setters)]
#[serde(default)]
#[setters(prefix = "with_")]
pub struct BatchingConfig {
    /// Share of the safe per-second budget a bulk caller may plan for
    headroom_factor: f64,

    /// Upper bound on any advised batch
    max_batch_size: u64,

    /// Pause between consecutive batches in milliseconds
    delay_between_batches_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            headroom_factor: 0.8,
            max_batch_size: 50,
            delay_between_batches_ms: 3000,
        }
    }
}

/// Monitoring and background task settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Getters, Setters)]
#[serde(default)]
#[setters(prefix = "with_")]
pub struct MonitoringConfig {
    /// Fraction of the daily budget that triggers the daily-limit warning
    daily_warning_ratio: f64,

    /// How often the calendar date is compared for the daily reset (at most 60)
    day_check_interval_secs: u64,

    /// How often the stats reporter logs a snapshot
    stats_interval_secs: u64,

    /// Buffered notifications per subscriber before it starts lagging
    event_capacity: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            daily_warning_ratio: 0.8,
            day_check_interval_secs: 60,
            stats_interval_secs: 30,
            event_capacity: 256,
        }
    }
}

impl MonitoringConfig {
    /// Interval of the calendar-day check.
    pub fn day_check_interval(&self) -> Duration {
        Duration::from_secs(self.day_check_interval_secs)
    }

    /// Interval of the stats reporter.
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Top-level limiter configuration.
///
/// Loads credit budgets and method costs from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from creditgate.toml)
/// 2. User override (~/.config/creditgate/creditgate.toml, then ./creditgate.toml)
///
/// # Example
///
/// ```no_run
/// use creditgate_rate_limit::LimiterConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LimiterConfig::load()?;
/// println!("Safe credits per second: {}", config.limits().safe_per_second());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default, Getters, Setters)]
#[serde(default)]
#[setters(prefix = "with_")]
pub struct LimiterConfig {
    /// Credit budgets
    limits: CreditLimits,

    /// Method cost table
    costs: CostConfig,

    /// Retry and admission wait settings
    retry: RetryConfig,

    /// Batch sizing advice parameters
    batching: BatchingConfig,

    /// Monitoring settings
    monitoring: MonitoringConfig,
}

impl LimiterConfig {
    /// Load configuration from a specific file path.
    ///
    /// Values missing from the file take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or fails validation.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> CreditgateResult<Self> {
        debug!("Loading configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                CreditgateError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                CreditgateError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load only the bundled defaults shipped with the library.
    #[instrument]
    pub fn bundled() -> CreditgateResult<Self> {
        Self::from_builder(
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml)),
        )
    }

    /// Load configuration with precedence: user override > bundled default.
    ///
    /// Configuration sources in order of precedence (later sources override earlier):
    /// 1. Bundled defaults (creditgate.toml shipped with library)
    /// 2. User config in home directory (~/.config/creditgate/creditgate.toml)
    /// 3. User config in current directory (./creditgate.toml)
    ///
    /// User config files are optional and will be silently skipped if not found.
    #[instrument]
    pub fn load() -> CreditgateResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/creditgate/creditgate.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("creditgate").required(false));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> CreditgateResult<Self> {
        let config: Self = builder
            .build()
            .map_err(|e| {
                CreditgateError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                CreditgateError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a limiter.
    ///
    /// The default cost must fit inside the safe per-second budget, since every
    /// unlisted method is charged it. Listed methods may cost more than a
    /// second's budget; such calls are refused when submitted instead.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first setting found at fault.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        for (key, value) in [
            ("limits.max_per_second", limits.max_per_second),
            ("limits.safe_per_second", limits.safe_per_second),
            ("limits.max_per_day", limits.max_per_day),
        ] {
            if value == 0 {
                return Err(ConfigError::for_key(key, "must be positive"));
            }
        }
        if limits.safe_per_second >= limits.max_per_second {
            return Err(ConfigError::for_key(
                "limits.safe_per_second",
                format!(
                    "must be below max_per_second ({}), got {}",
                    limits.max_per_second, limits.safe_per_second
                ),
            ));
        }

        let ceiling = limits.admission_ceiling();
        if !(1..=ceiling).contains(&self.costs.default_cost) {
            return Err(ConfigError::for_key(
                "costs.default_cost",
                format!("must be in 1..={}, got {}", ceiling, self.costs.default_cost),
            ));
        }
        if let Some(free) = self.costs.methods.iter().find(|cost| cost.credits == 0) {
            return Err(ConfigError::for_key(
                "costs.methods",
                format!("'{}' must cost at least one credit", free.method),
            ));
        }

        if self.retry.admission_delay_ms == 0 {
            return Err(ConfigError::for_key(
                "retry.admission_delay_ms",
                "must be at least 1",
            ));
        }

        // Written so that NaN fails too.
        let headroom = self.batching.headroom_factor;
        if !(headroom > 0.0 && headroom <= 1.0) {
            return Err(ConfigError::for_key(
                "batching.headroom_factor",
                format!("must be in (0.0, 1.0], got {}", headroom),
            ));
        }
        if self.batching.max_batch_size == 0 {
            return Err(ConfigError::for_key(
                "batching.max_batch_size",
                "must be positive",
            ));
        }

        let monitoring = &self.monitoring;
        let ratio = monitoring.daily_warning_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::for_key(
                "monitoring.daily_warning_ratio",
                format!("must be in (0.0, 1.0], got {}", ratio),
            ));
        }
        if !(1..=60).contains(&monitoring.day_check_interval_secs) {
            return Err(ConfigError::for_key(
                "monitoring.day_check_interval_secs",
                format!("must be in 1..=60, got {}", monitoring.day_check_interval_secs),
            ));
        }
        if monitoring.stats_interval_secs == 0 {
            return Err(ConfigError::for_key(
                "monitoring.stats_interval_secs",
                "must be positive",
            ));
        }
        if !(1..=MAX_EVENT_CAPACITY).contains(&monitoring.event_capacity) {
            return Err(ConfigError::for_key(
                "monitoring.event_capacity",
                format!(
                    "must be in 1..={}, got {}",
                    MAX_EVENT_CAPACITY, monitoring.event_capacity
                ),
            ));
        }

        Ok(())
    }
}
