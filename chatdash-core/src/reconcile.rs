//! Reconciliation engine: decides whether the local secret key can be trusted.
//!
//! The engine compares the locally cached key with the server's record and
//! returns the prompt (if any) the user must go through. It never shows a
//! dialog itself; [`crate::prompt`] does that.
//!
//! # Failure policy
//!
//! Reconciliation runs in the background on every page entry, so it fails
//! open: when the server cannot be reached or answers with something that is
//! neither a record nor an explicit rejection, the local key is trusted and
//! nothing is shown to the user. Only an explicit rejection (an invalid
//! [`Verdict`](crate::service::Verdict) or an `Auth` error) or a plaintext
//! mismatch leads to the mismatch prompt. A missing server record is "nothing
//! to compare", never a mismatch.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use subtle::ConstantTimeEq;

use crate::{
    context::DashboardContext,
    error::CredentialError,
    identity::{AccountId, ServerKeyState},
    session::Feature,
};

/// Shown when the local key differs from the server's record.
pub const MISMATCH_MESSAGE: &str =
    "The secret key saved on this device does not match the one on record.";

/// How the page was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Regular navigation or reload.
    Normal,
    /// Entry through a shared token link carrying the account id.
    TokenLink,
}

/// What the user has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The local key is trusted; no prompt.
    Trust,
    /// No key anywhere; the user must register one.
    Register,
    /// Token-link entry; the user must confirm the key explicitly.
    ConfirmToken,
    /// The local key contradicts the server.
    Mismatch,
}

/// The engine's decision plus what the prompt needs to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// The decision.
    pub outcome: Outcome,
    /// Diagnostic message for the mismatch dialog.
    pub message: Option<String>,
    /// The server's plaintext key, when it disclosed one that differs.
    pub server_key: Option<String>,
}

impl ReconciliationResult {
    const fn of(outcome: Outcome) -> Self {
        Self {
            outcome,
            message: None,
            server_key: None,
        }
    }

    /// No prompt needed.
    #[must_use]
    pub const fn trust() -> Self {
        Self::of(Outcome::Trust)
    }

    /// Registration required.
    #[must_use]
    pub const fn register() -> Self {
        Self::of(Outcome::Register)
    }

    /// Explicit confirmation required.
    #[must_use]
    pub const fn confirm_token() -> Self {
        Self::of(Outcome::ConfirmToken)
    }

    /// Mismatch with a diagnostic and, when known, the server's key.
    #[must_use]
    pub fn mismatch(message: impl Into<String>, server_key: Option<String>) -> Self {
        Self {
            outcome: Outcome::Mismatch,
            message: Some(message.into()),
            server_key,
        }
    }

    /// Whether the outcome is [`Outcome::Trust`].
    #[must_use]
    pub fn is_trusted(&self) -> bool {
        self.outcome == Outcome::Trust
    }
}

/// Single in-flight flag guarding top-level reconciliation.
#[derive(Debug, Default)]
pub struct ReconcileGuard {
    in_flight: AtomicBool,
}

impl ReconcileGuard {
    /// Claims the guard, or returns `None` if it is already held.
    pub fn try_begin(&self) -> Option<ReconcileToken<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReconcileToken {
                in_flight: &self.in_flight,
            })
    }

    /// Whether a reconciliation currently holds the guard.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Proof that the caller holds the reconciliation slot. Released on drop.
#[derive(Debug)]
pub struct ReconcileToken<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for ReconcileToken<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Trimmed equality without early exit on the first differing byte.
#[must_use]
pub fn keys_match(local: &str, server: &str) -> bool {
    local.trim().as_bytes().ct_eq(server.trim().as_bytes()).into()
}

/// Reconciles `account_id`, claiming the guard for the duration.
///
/// Returns `None` without doing anything if another reconciliation is in
/// flight.
pub async fn reconcile(
    ctx: &DashboardContext,
    account_id: &AccountId,
    mode: EntryMode,
) -> Option<ReconciliationResult> {
    let Some(token) = ctx.try_begin_reconcile() else {
        debug!("reconciliation for {account_id} skipped: another one is in flight");
        return None;
    };
    Some(reconcile_with(ctx, &token, account_id, mode).await)
}

/// Reconciles `account_id` under a guard the caller already holds.
pub async fn reconcile_with(
    ctx: &DashboardContext,
    _token: &ReconcileToken<'_>,
    account_id: &AccountId,
    mode: EntryMode,
) -> ReconciliationResult {
    if mode == EntryMode::TokenLink && !ctx.session.is_token_verified(account_id) {
        return reconcile_token_link(ctx, account_id).await;
    }

    match ctx.identity.secret_key() {
        None => reconcile_without_local_key(ctx, account_id).await,
        Some(local) => reconcile_local_key(ctx, account_id, &local).await,
    }
}

async fn reconcile_token_link(ctx: &DashboardContext, account_id: &AccountId) -> ReconciliationResult {
    match ctx.service.fetch_key(account_id).await {
        Ok(ServerKeyState::Absent) => ReconciliationResult::register(),
        Err(err) if err.is_not_found() => ReconciliationResult::register(),
        Ok(_) => ReconciliationResult::confirm_token(),
        Err(err) => {
            // Cannot tell whether a record exists; confirming is the safe ask.
            warn!("token link fetch for {account_id} failed: {err}");
            ReconciliationResult::confirm_token()
        }
    }
}

async fn reconcile_without_local_key(
    ctx: &DashboardContext,
    account_id: &AccountId,
) -> ReconciliationResult {
    match ctx.service.fetch_key(account_id).await {
        Ok(ServerKeyState::Absent) => ReconciliationResult::register(),
        Err(err) if err.is_not_found() => ReconciliationResult::register(),
        Ok(ServerKeyState::Plaintext(server_key)) => {
            info!("adopting server secret key for {account_id}");
            ctx.identity.set_secret_key(&server_key);
            ReconciliationResult::trust()
        }
        Ok(ServerKeyState::EncryptedPlaceholder) => ReconciliationResult::trust(),
        Err(err) => fail_open(account_id, &err),
    }
}

async fn reconcile_local_key(
    ctx: &DashboardContext,
    account_id: &AccountId,
    local: &str,
) -> ReconciliationResult {
    if ctx
        .session
        .within_trust_window(account_id, ctx.now(), ctx.config.trust_window_ms)
    {
        debug!("secret key for {account_id} updated recently; skipping remote check");
        ctx.session.clear_feature(Feature::Achievements, account_id);
        return ReconciliationResult::trust();
    }

    match ctx.service.fetch_key(account_id).await {
        // Legacy local-only keys and transient 404s must not read as a mismatch.
        Ok(ServerKeyState::Absent) => ReconciliationResult::trust(),
        Err(err) if err.is_not_found() => ReconciliationResult::trust(),
        Err(err) => fail_open(account_id, &err),
        Ok(ServerKeyState::Plaintext(server_key)) => {
            if keys_match(local, &server_key) {
                ReconciliationResult::trust()
            } else {
                info!("local secret key for {account_id} differs from server record");
                ReconciliationResult::mismatch(MISMATCH_MESSAGE, Some(server_key))
            }
        }
        Ok(ServerKeyState::EncryptedPlaceholder) => {
            match ctx.service.validate_key(account_id, local).await {
                Ok(verdict) if verdict.valid => ReconciliationResult::trust(),
                Ok(verdict) => ReconciliationResult::mismatch(
                    verdict
                        .message
                        .unwrap_or_else(|| MISMATCH_MESSAGE.to_string()),
                    None,
                ),
                Err(err) if err.is_auth() => ReconciliationResult::mismatch(
                    err.user_message().unwrap_or(MISMATCH_MESSAGE).to_string(),
                    None,
                ),
                Err(err) => fail_open(account_id, &err),
            }
        }
    }
}

fn fail_open(account_id: &AccountId, err: &CredentialError) -> ReconciliationResult {
    warn!("secret key check for {account_id} failed open: {err}");
    ReconciliationResult::trust()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account, context, MockService, T0};
    use crate::{
        clock::ManualClock,
        error::{CredentialError, CredentialErrorKind},
    };
    use std::sync::Arc;

    #[test]
    fn test_keys_match_trims() {
        assert!(keys_match(" abcd", "abcd\n"));
        assert!(!keys_match("abcd", "abce"));
        assert!(!keys_match("abcd", "abcde"));
    }

    #[test]
    fn test_guard_is_exclusive_and_released_on_drop() {
        let guard = ReconcileGuard::default();
        let token = guard.try_begin().unwrap();
        assert!(guard.is_in_flight());
        assert!(guard.try_begin().is_none());
        drop(token);
        assert!(!guard.is_in_flight());
        assert!(guard.try_begin().is_some());
    }

    #[tokio::test]
    async fn test_nothing_anywhere_requires_register() {
        let service = MockService::not_found();
        let ctx = context(service.clone(), Arc::new(ManualClock::new(T0)));

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert_eq!(result, ReconciliationResult::register());
        assert_eq!(service.calls().fetch, 1);
    }

    #[tokio::test]
    async fn test_absent_record_requires_register() {
        let service = MockService::new(Ok(ServerKeyState::Absent));
        let ctx = context(service, Arc::new(ManualClock::new(T0)));

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Register);
    }

    #[tokio::test]
    async fn test_adopts_plaintext_server_key() {
        let service = MockService::plaintext("abcd");
        let ctx = context(service, Arc::new(ManualClock::new(T0)));

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert!(result.is_trusted());
        assert_eq!(ctx.identity.secret_key().as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_encrypted_record_without_local_key_is_trusted() {
        let service = MockService::encrypted("abcd");
        let ctx = context(service.clone(), Arc::new(ManualClock::new(T0)));

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert!(result.is_trusted());
        assert_eq!(ctx.identity.secret_key(), None);
        assert_eq!(service.calls().validate, 0);
    }

    #[tokio::test]
    async fn test_equal_plaintext_keys_trust() {
        let service = MockService::plaintext("abcd ");
        let ctx = context(service.clone(), Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("abcd");

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert!(result.is_trusted());
        assert_eq!(service.calls().validate, 0);
    }

    #[tokio::test]
    async fn test_different_plaintext_keys_mismatch() {
        let service = MockService::plaintext("efgh");
        let ctx = context(service, Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("abcd");

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Mismatch);
        assert_eq!(result.server_key.as_deref(), Some("efgh"));
        assert_eq!(result.message.as_deref(), Some(MISMATCH_MESSAGE));
    }

    #[tokio::test]
    async fn test_local_key_with_missing_record_is_trusted() {
        let service = MockService::not_found();
        let ctx = context(service, Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("abcd");

        let result = reconcile(&ctx, &account("10002"), EntryMode::Normal)
            .await
            .unwrap();

        assert!(result.is_trusted());
        assert_eq!(ctx.identity.secret_key().as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_encrypted_record_validates_local_key() {
        let service = MockService::encrypted("abcd");
        let ctx = context(service.clone(), Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("abcd");

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert!(result.is_trusted());
        assert_eq!(service.calls().validate, 1);
    }

    #[tokio::test]
    async fn test_encrypted_record_rejection_is_mismatch() {
        let service = MockService::encrypted("abcd");
        let ctx = context(service, Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("wrong");

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Mismatch);
        assert_eq!(result.server_key, None);
    }

    #[tokio::test]
    async fn test_auth_error_is_mismatch() {
        let service = MockService::encrypted("abcd");
        service.with(|state| state.validate_error = Some(CredentialError::auth("locked out")));
        let ctx = context(service, Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("abcd");

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert_eq!(result, ReconciliationResult::mismatch("locked out", None));
    }

    #[tokio::test]
    async fn test_auth_status_without_message_uses_default_text() {
        let service = MockService::encrypted("abcd");
        service.with(|state| {
            state.validate_error = Some(CredentialError::internal(
                CredentialErrorKind::Auth,
                "https://stats.example/api/secret-key/validate returned 401",
            ));
        });
        let ctx = context(service, Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("abcd");

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();

        assert_eq!(result, ReconciliationResult::mismatch(MISMATCH_MESSAGE, None));
    }

    #[tokio::test]
    async fn test_transient_failures_fail_open() {
        let service = MockService::encrypted("abcd");
        service.with(|state| {
            state.validate_error = Some(CredentialError::transient("connection reset"));
        });
        let ctx = context(service.clone(), Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("wrong");

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();
        assert!(result.is_trusted());

        service.with(|state| state.fetch = Err(CredentialError::transient("timeout")));
        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();
        assert!(result.is_trusted());
    }

    #[tokio::test]
    async fn test_trust_window_skips_remote_calls() {
        let clock = Arc::new(ManualClock::new(T0));
        let service = MockService::encrypted("abcd");
        let ctx = context(service.clone(), clock.clone());
        let alice = account("10001");
        ctx.identity.set_secret_key("abcd");
        ctx.session.stamp_key_updated(&alice, T0);
        ctx.session
            .trust_feature(Feature::Achievements, &alice, "stale");

        let first = reconcile(&ctx, &alice, EntryMode::Normal).await.unwrap();
        clock.advance(30_000);
        let second = reconcile(&ctx, &alice, EntryMode::Normal).await.unwrap();

        assert_eq!(first, second);
        assert!(first.is_trusted());
        assert_eq!(service.calls().fetch, 0);
        assert_eq!(service.calls().validate, 0);
        assert_eq!(ctx.session.verified_key(Feature::Achievements, &alice), None);

        clock.advance(30_000);
        reconcile(&ctx, &alice, EntryMode::Normal).await.unwrap();
        assert_eq!(service.calls().validate, 1);
    }

    #[tokio::test]
    async fn test_in_flight_reconciliation_short_circuits() {
        let service = MockService::plaintext("abcd");
        let ctx = context(service.clone(), Arc::new(ManualClock::new(T0)));

        let token = ctx.try_begin_reconcile().unwrap();
        assert_eq!(reconcile(&ctx, &account("10001"), EntryMode::Normal).await, None);
        assert_eq!(service.calls().fetch, 0);
        drop(token);

        assert!(reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_token_link_requires_confirmation_once() {
        let service = MockService::plaintext("abcd");
        let ctx = context(service, Arc::new(ManualClock::new(T0)));
        let alice = account("10001");
        ctx.identity.set_secret_key("abcd");

        let result = reconcile(&ctx, &alice, EntryMode::TokenLink).await.unwrap();
        assert_eq!(result.outcome, Outcome::ConfirmToken);

        ctx.session.mark_token_verified(&alice);
        let result = reconcile(&ctx, &alice, EntryMode::TokenLink).await.unwrap();
        assert!(result.is_trusted());
    }

    #[tokio::test]
    async fn test_token_link_without_record_registers() {
        let service = MockService::not_found();
        let ctx = context(service, Arc::new(ManualClock::new(T0)));

        let result = reconcile(&ctx, &account("10001"), EntryMode::TokenLink)
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Register);
    }

    #[tokio::test]
    async fn test_rejecting_verdict_message_is_carried() {
        let service = MockService::encrypted("abcd");
        let ctx = context(service.clone(), Arc::new(ManualClock::new(T0)));
        ctx.identity.set_secret_key("wrong");
        service.with(|state| state.reject_message = Some("Key was reset by an admin".into()));

        let result = reconcile(&ctx, &account("10001"), EntryMode::Normal)
            .await
            .unwrap();
        assert_eq!(
            result,
            ReconciliationResult::mismatch("Key was reset by an admin", None)
        );
    }
}
