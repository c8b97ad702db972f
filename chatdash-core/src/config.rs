//! Dashboard configuration and per-environment defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::DashboardError, Environment};

/// Default grace period after a key update during which reconciliation is skipped.
pub const DEFAULT_TRUST_WINDOW_MS: u64 = 60_000;
/// Default client-side cooldown between verification code requests.
pub const DEFAULT_RESEND_COOLDOWN_MS: u64 = 60_000;
/// Default lifetime of a verification code as tracked by the client.
pub const DEFAULT_CODE_TTL_MS: u64 = 60_000;
/// Shortest secret key accepted for registration or reset.
pub const DEFAULT_MIN_KEY_LENGTH: usize = 4;
/// Number of digits in a verification code.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Runtime configuration for the dashboard client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    /// Base URL of the statistics API, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Retries for transient HTTP failures (total attempts = retries + 1).
    pub max_retries: u32,
    /// See [`DEFAULT_TRUST_WINDOW_MS`].
    pub trust_window_ms: u64,
    /// See [`DEFAULT_RESEND_COOLDOWN_MS`].
    pub resend_cooldown_ms: u64,
    /// See [`DEFAULT_CODE_TTL_MS`].
    pub code_ttl_ms: u64,
    /// See [`DEFAULT_MIN_KEY_LENGTH`].
    pub min_key_length: usize,
    /// See [`DEFAULT_CODE_LENGTH`].
    pub code_length: usize,
    /// Permits plain `http://` base URLs. Only meant for local development.
    pub allow_insecure_http: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::from_environment(&Environment::Production)
    }
}

impl DashboardConfig {
    /// Returns the SDK defaults for `environment`.
    #[must_use]
    pub fn from_environment(environment: &Environment) -> Self {
        let base_url = match environment {
            Environment::Staging => "https://stats.stage.chatdash.dev",
            Environment::Production => "https://stats.chatdash.dev",
        }
        .to_string();

        Self {
            base_url,
            timeout_ms: 5_000,
            max_retries: 3,
            trust_window_ms: DEFAULT_TRUST_WINDOW_MS,
            resend_cooldown_ms: DEFAULT_RESEND_COOLDOWN_MS,
            code_ttl_ms: DEFAULT_CODE_TTL_MS,
            min_key_length: DEFAULT_MIN_KEY_LENGTH,
            code_length: DEFAULT_CODE_LENGTH,
            allow_insecure_http: false,
        }
    }

    /// Parses a JSON config. Missing fields take production defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the result fails [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self, DashboardError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DashboardError::SerializationError {
                error: format!("Failed to parse dashboard config: {e}"),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces the base URL, dropping any trailing slash.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Checks the invariants the rest of the crate relies on.
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidInput`] naming the offending attribute.
    pub fn validate(&self) -> Result<(), DashboardError> {
        let secure = self.base_url.starts_with("https://");
        let insecure = self.base_url.starts_with("http://");
        if !(secure || (insecure && self.allow_insecure_http)) {
            return Err(DashboardError::InvalidInput {
                attribute: "base_url".to_string(),
                reason: format!("{} must be an https URL", self.base_url),
            });
        }
        if self.min_key_length == 0 {
            return Err(DashboardError::InvalidInput {
                attribute: "min_key_length".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.code_length == 0 {
            return Err(DashboardError::InvalidInput {
                attribute: "code_length".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
