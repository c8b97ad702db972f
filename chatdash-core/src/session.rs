//! Session trust cache: per-tab flags that a key was already verified.
//!
//! Entries live in the session-scoped store only and are keyed per account:
//!
//! | key                           | value                        |
//! |-------------------------------|------------------------------|
//! | `token_verified_<id>`         | `"true"`                     |
//! | `achievement_verified_<id>`   | verified key                 |
//! | `background_verified_<id>`    | verified key                 |
//! | `settings_verified_<id>`      | verified key                 |
//! | `secret_key_updated_<id>`     | epoch millis of last update  |

use std::sync::Arc;

use log::warn;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{identity::AccountId, platform::KeyValueStore};

/// A dashboard feature whose sensitive writes are gated by the secret key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Feature {
    /// Achievement display and pinning.
    Achievements,
    /// Profile background uploads.
    Backgrounds,
    /// Account settings.
    Settings,
}

impl Feature {
    const fn trust_prefix(self) -> &'static str {
        match self {
            Self::Achievements => "achievement_verified",
            Self::Backgrounds => "background_verified",
            Self::Settings => "settings_verified",
        }
    }

    fn trust_key(self, account_id: &AccountId) -> String {
        format!("{}_{account_id}", self.trust_prefix())
    }
}

fn token_key(account_id: &AccountId) -> String {
    format!("token_verified_{account_id}")
}

fn updated_key(account_id: &AccountId) -> String {
    format!("secret_key_updated_{account_id}")
}

/// Everything the session knows about one (feature, account) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTrust {
    /// The key verified for this feature during this session.
    pub verified_key: Option<String>,
    /// Whether a token-link entry was confirmed during this session.
    pub token_verified: bool,
    /// When the account's key was last changed from this tab.
    pub key_updated_at: Option<u64>,
}

/// Ephemeral trust flags, never written to persistent storage.
pub struct SessionTrustCache {
    store: Arc<dyn KeyValueStore>,
}

impl SessionTrustCache {
    /// Creates a cache over the session-scoped store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|err| {
            warn!("session read of {key} failed: {err}");
            None
        })
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value) {
            warn!("session write of {key} failed: {err}");
        }
    }

    fn erase(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            warn!("session removal of {key} failed: {err}");
        }
    }

    /// The key verified for `feature` this session, if any.
    #[must_use]
    pub fn verified_key(&self, feature: Feature, account_id: &AccountId) -> Option<String> {
        self.read(&feature.trust_key(account_id))
            .filter(|key| !key.is_empty())
    }

    /// Records `key` as verified for `feature`. Other features are untouched.
    pub fn trust_feature(&self, feature: Feature, account_id: &AccountId, key: &str) {
        self.write(&feature.trust_key(account_id), key);
    }

    /// Forgets the verified key for `feature`.
    pub fn clear_feature(&self, feature: Feature, account_id: &AccountId) {
        self.erase(&feature.trust_key(account_id));
    }

    /// Forgets the verified key for every feature.
    pub fn clear_all_features(&self, account_id: &AccountId) {
        for feature in Feature::iter() {
            self.clear_feature(feature, account_id);
        }
    }

    /// Whether a token-link entry was already confirmed this session.
    #[must_use]
    pub fn is_token_verified(&self, account_id: &AccountId) -> bool {
        self.read(&token_key(account_id)).as_deref() == Some("true")
    }

    /// Marks the token-link entry as confirmed.
    pub fn mark_token_verified(&self, account_id: &AccountId) {
        self.write(&token_key(account_id), "true");
    }

    /// Clears the token-link confirmation.
    pub fn clear_token_verified(&self, account_id: &AccountId) {
        self.erase(&token_key(account_id));
    }

    /// When the key was last updated from this session.
    #[must_use]
    pub fn key_updated_at(&self, account_id: &AccountId) -> Option<u64> {
        self.read(&updated_key(account_id))
            .and_then(|raw| raw.parse().ok())
    }

    /// Opens the trust window for `account_id` starting at `now_millis`.
    pub fn stamp_key_updated(&self, account_id: &AccountId, now_millis: u64) {
        self.write(&updated_key(account_id), &now_millis.to_string());
    }

    /// Whether `now_millis` falls inside the trust window of the last update.
    #[must_use]
    pub fn within_trust_window(
        &self,
        account_id: &AccountId,
        now_millis: u64,
        window_millis: u64,
    ) -> bool {
        self.key_updated_at(account_id).is_some_and(|updated_at| {
            now_millis >= updated_at && now_millis - updated_at < window_millis
        })
    }

    /// Everything cached for (`feature`, `account_id`).
    #[must_use]
    pub fn snapshot(&self, feature: Feature, account_id: &AccountId) -> SessionTrust {
        SessionTrust {
            verified_key: self.verified_key(feature, account_id),
            token_verified: self.is_token_verified(account_id),
            key_updated_at: self.key_updated_at(account_id),
        }
    }

    /// Drops every flag held for `account_id`.
    pub fn clear_account(&self, account_id: &AccountId) {
        self.clear_all_features(account_id);
        self.clear_token_verified(account_id);
        self.erase(&updated_key(account_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryStore;

    fn account(id: &str) -> AccountId {
        AccountId::parse(id).unwrap()
    }

    #[test]
    fn test_feature_trust_is_independent() {
        let cache = SessionTrustCache::new(Arc::new(MemoryStore::new()));
        let alice = account("10001");

        cache.trust_feature(Feature::Achievements, &alice, "abcd");

        assert_eq!(
            cache.verified_key(Feature::Achievements, &alice).as_deref(),
            Some("abcd")
        );
        assert_eq!(cache.verified_key(Feature::Backgrounds, &alice), None);
        assert_eq!(cache.verified_key(Feature::Settings, &alice), None);
        assert_eq!(
            cache.verified_key(Feature::Achievements, &account("10002")),
            None
        );
    }

    #[test]
    fn test_storage_keys() {
        let store = Arc::new(MemoryStore::new());
        let cache = SessionTrustCache::new(store.clone());
        let alice = account("10001");

        cache.trust_feature(Feature::Achievements, &alice, "abcd");
        cache.trust_feature(Feature::Backgrounds, &alice, "abcd");
        cache.mark_token_verified(&alice);
        cache.stamp_key_updated(&alice, 42);

        assert_eq!(
            store.keys(),
            vec![
                "achievement_verified_10001",
                "background_verified_10001",
                "secret_key_updated_10001",
                "token_verified_10001",
            ]
        );
    }

    #[test]
    fn test_trust_window() {
        let cache = SessionTrustCache::new(Arc::new(MemoryStore::new()));
        let alice = account("10001");
        assert!(!cache.within_trust_window(&alice, 1_000, 60_000));

        cache.stamp_key_updated(&alice, 1_000);
        assert!(cache.within_trust_window(&alice, 1_000, 60_000));
        assert!(cache.within_trust_window(&alice, 60_999, 60_000));
        assert!(!cache.within_trust_window(&alice, 61_000, 60_000));
        // A clock that went backwards does not extend trust.
        assert!(!cache.within_trust_window(&alice, 999, 60_000));
    }

    #[test]
    fn test_clear_account() {
        let store = Arc::new(MemoryStore::new());
        let cache = SessionTrustCache::new(store.clone());
        let alice = account("10001");
        let bob = account("10002");

        for feature in Feature::iter() {
            cache.trust_feature(feature, &alice, "abcd");
        }
        cache.mark_token_verified(&alice);
        cache.stamp_key_updated(&alice, 7);
        cache.mark_token_verified(&bob);

        cache.clear_account(&alice);

        assert_eq!(cache.snapshot(Feature::Settings, &alice), SessionTrust::default());
        assert_eq!(store.keys(), vec!["token_verified_10002"]);
    }

    #[test]
    fn test_feature_parses_from_name() {
        assert_eq!("backgrounds".parse::<Feature>().unwrap(), Feature::Backgrounds);
        assert_eq!(Feature::Achievements.to_string(), "achievements");
    }
}
