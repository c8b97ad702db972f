//! The remote credential contract consumed by reconciliation and prompts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::CredentialResult,
    identity::{AccountId, ServerKeyState},
};

mod http;

pub use http::HttpCredentialService;

/// The signed-in user as reported by the role-lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// Account id echoed by the server.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
    /// Whether the bot-command permission layer grants admin rights.
    #[serde(default)]
    pub is_admin: bool,
}

/// Answer to a key or code validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the server accepted the value.
    pub valid: bool,
    /// Server supplied explanation, shown to the user on rejection.
    #[serde(default)]
    pub message: Option<String>,
}

impl Verdict {
    /// An accepting verdict.
    #[must_use]
    pub const fn accepted() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    /// A rejecting verdict carrying `message`.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Remote operations on an account's secret key.
///
/// Implementations classify every failure into a
/// [`CredentialErrorKind`](crate::error::CredentialErrorKind); callers never
/// look at message text to decide what to do.
#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Looks up the account's display name and role.
    ///
    /// # Errors
    /// Any classified failure.
    async fn current_user(&self, account_id: &AccountId) -> CredentialResult<CurrentUser>;

    /// Fetches what the server holds for the account's key.
    ///
    /// # Errors
    /// `NotFound` when the server has no record for the account.
    async fn fetch_key(&self, account_id: &AccountId) -> CredentialResult<ServerKeyState>;

    /// Stores `key` as the account's secret key.
    ///
    /// # Errors
    /// Any classified failure.
    async fn save_key(&self, account_id: &AccountId, key: &str) -> CredentialResult<()>;

    /// Asks the server whether `key` is the account's secret key.
    ///
    /// # Errors
    /// `Auth` may be used instead of a rejecting [`Verdict`].
    async fn validate_key(&self, account_id: &AccountId, key: &str) -> CredentialResult<Verdict>;

    /// Sends a one-time verification code. The server enforces a cooldown.
    ///
    /// # Errors
    /// Any classified failure, including the server's cooldown refusal.
    async fn send_code(&self, account_id: &AccountId) -> CredentialResult<()>;

    /// Checks a one-time verification code.
    ///
    /// # Errors
    /// Any classified failure.
    async fn verify_code(&self, account_id: &AccountId, code: &str) -> CredentialResult<Verdict>;
}
