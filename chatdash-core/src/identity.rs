//! Identity cache: the account id and local secret key persisted per profile.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::warn;

use crate::{error::DashboardError, platform::KeyValueStore};

/// Sentinel the server returns in place of a key it will not disclose.
pub const ENCRYPTED_PLACEHOLDER: &str = "encrypted-placeholder";

const ACCOUNT_ID_KEY: &str = "accountId";
const SECRET_KEY_KEY: &str = "secretKey";
const ACCOUNT_COOKIE: &str = "accountId";

fn user_name_key(account_id: &AccountId) -> String {
    format!("userName_{account_id}")
}

/// Numeric identifier of a dashboard user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(String);

impl AccountId {
    /// Parses an account id as typed by the user or carried in a link.
    ///
    /// Surrounding whitespace is ignored; the remainder must be ASCII digits.
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidInput`] if the id is empty or not numeric.
    pub fn parse(raw: &str) -> Result<Self, DashboardError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DashboardError::InvalidInput {
                attribute: "account_id".to_string(),
                reason: "Please enter your account id".to_string(),
            });
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DashboardError::InvalidInput {
                attribute: "account_id".to_string(),
                reason: format!("{trimmed} is not a numeric account id"),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The id as stored and sent over the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What the server reports about an account's secret key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerKeyState {
    /// No key registered.
    Absent,
    /// The server disclosed the key.
    Plaintext(String),
    /// A key exists but the server only returns [`ENCRYPTED_PLACEHOLDER`].
    EncryptedPlaceholder,
}

impl ServerKeyState {
    /// Interprets the `secretKey` field of a fetch response.
    #[must_use]
    pub fn from_wire(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Absent,
            Some(ENCRYPTED_PLACEHOLDER) => Self::EncryptedPlaceholder,
            Some(key) => Self::Plaintext(key.to_string()),
        }
    }

    /// Whether the server holds any key.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// Point-in-time view of the locally cached identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The remembered account, if any.
    pub account_id: Option<AccountId>,
    /// The locally cached secret key, if any.
    pub local_secret_key: Option<String>,
}

/// Persistent store of the account id, local secret key and display names.
///
/// Storage failures are logged and degrade to "nothing stored": a broken
/// `localStorage` must never keep the dashboard from rendering.
pub struct IdentityCache {
    local: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn KeyValueStore>,
}

impl IdentityCache {
    /// Creates a cache over the persistent store and the cookie jar.
    #[must_use]
    pub fn new(local: Arc<dyn KeyValueStore>, cookies: Arc<dyn KeyValueStore>) -> Self {
        Self { local, cookies }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.local.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!("identity read of {key} failed: {err}");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.local.set(key, value) {
            warn!("identity write of {key} failed: {err}");
        }
    }

    fn erase(&self, key: &str) {
        if let Err(err) = self.local.remove(key) {
            warn!("identity removal of {key} failed: {err}");
        }
    }

    /// The remembered account id. Corrupt values are treated as absent.
    #[must_use]
    pub fn account_id(&self) -> Option<AccountId> {
        let raw = self.read(ACCOUNT_ID_KEY)?;
        match AccountId::parse(&raw) {
            Ok(account_id) => Some(account_id),
            Err(err) => {
                warn!("ignoring stored account id: {err}");
                None
            }
        }
    }

    /// Remembers `account_id` in the persistent store and the account cookie.
    pub fn set_account_id(&self, account_id: &AccountId) {
        self.write(ACCOUNT_ID_KEY, account_id.as_str());
        if let Err(err) = self.cookies.set(ACCOUNT_COOKIE, account_id.as_str()) {
            warn!("account cookie write failed: {err}");
        }
    }

    /// Makes `account_id` the current account.
    ///
    /// When it differs from the remembered account the old local key is
    /// dropped, since it belongs to someone else. Returns whether the account
    /// changed.
    pub fn switch_account(&self, account_id: &AccountId) -> bool {
        let changed = self.account_id().as_ref() != Some(account_id);
        if changed {
            self.erase(SECRET_KEY_KEY);
        }
        self.set_account_id(account_id);
        changed
    }

    /// The locally cached secret key, trimmed. Blank values count as absent.
    #[must_use]
    pub fn secret_key(&self) -> Option<String> {
        self.read(SECRET_KEY_KEY)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    /// Caches `key` as this profile's secret key.
    pub fn set_secret_key(&self, key: &str) {
        self.write(SECRET_KEY_KEY, key.trim());
    }

    /// The cached display name for `account_id`.
    #[must_use]
    pub fn user_name(&self, account_id: &AccountId) -> Option<String> {
        self.read(&user_name_key(account_id))
    }

    /// Caches the display name for `account_id`.
    pub fn set_user_name(&self, account_id: &AccountId, user_name: &str) {
        self.write(&user_name_key(account_id), user_name);
    }

    /// Snapshot of account id and local key.
    #[must_use]
    pub fn snapshot(&self) -> Identity {
        Identity {
            account_id: self.account_id(),
            local_secret_key: self.secret_key(),
        }
    }

    /// Destroys the identity: account id, local key and the account cookie.
    ///
    /// Cached display names are left alone; they are not credentials.
    pub fn clear(&self) {
        self.erase(ACCOUNT_ID_KEY);
        self.erase(SECRET_KEY_KEY);
        if let Err(err) = self.cookies.remove(ACCOUNT_COOKIE) {
            warn!("account cookie removal failed: {err}");
        }
    }
}
