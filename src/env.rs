//! Runtime environment detection.
//!
//! Single source of truth for whether we run under tests, based on the
//! `PUSHBRIDGE_ENV` environment variable.
//!
//! Set `PUSHBRIDGE_ENV` to one of:
//! - `test` - Test mode (file token storage instead of the OS keyring)
//! - `development` or `dev` - Development mode
//! - (anything else or unset) - Production mode

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - never touches the OS keyring.
    Test,
}

impl Environment {
    /// Detect current environment from `PUSHBRIDGE_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::var("PUSHBRIDGE_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development") | Some("dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Returns `true` if the OS keyring must be bypassed.
#[must_use]
pub fn should_skip_keyring() -> bool {
    #[cfg(test)]
    {
        true
    }

    #[cfg(not(test))]
    {
        Environment::current().is_test()
    }
}
