//! Errors from loading or validating limiter settings.

use std::fmt;

/// A limiter setting could not be loaded or does not describe a usable budget.
///
/// Validation failures name the offending setting by its dotted TOML path
/// (`limits.safe_per_second`, `monitoring.event_capacity`, ...) so the
/// message can be matched back to the file the operator edited. Load
/// failures (missing file, bad TOML) carry no key.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error)]
pub struct ConfigError {
    /// Dotted path of the rejected setting, if one setting is at fault
    pub key: Option<String>,
    /// What is wrong
    pub message: String,
    /// Line number where the error was raised
    pub line: u32,
    /// Source file where the error was raised
    pub file: &'static str,
}

impl ConfigError {
    /// A load failure not tied to a single setting.
    ///
    /// # Examples
    ///
    /// ```
    /// use creditgate_error::ConfigError;
    ///
    /// let err = ConfigError::new("creditgate.toml: expected `]`");
    /// assert!(err.key.is_none());
    /// assert!(err.to_string().starts_with("Configuration Error"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::located(None, message.into())
    }

    /// A rejected value for the setting at `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use creditgate_error::ConfigError;
    ///
    /// let err = ConfigError::for_key("limits.max_per_day", "must be positive");
    /// assert_eq!(err.key(), Some("limits.max_per_day"));
    /// assert!(err.to_string().contains("limits.max_per_day: must be positive"));
    /// ```
    #[track_caller]
    pub fn for_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::located(Some(key.into()), message.into())
    }

    /// Dotted path of the rejected setting.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[track_caller]
    fn located(key: Option<String>, message: String) -> Self {
        let location = std::panic::Location::caller();
        Self {
            key,
            message,
            line: location.line(),
            file: location.file(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "Invalid setting {}: {}", key, self.message)?,
            None => write!(f, "Configuration Error: {}", self.message)?,
        }
        write!(f, " (raised at {}:{})", self.file, self.line)
    }
}
