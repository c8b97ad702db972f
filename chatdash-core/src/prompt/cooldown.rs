//! One-time code bookkeeping and the resend countdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::{runtime::Handle, task::JoinHandle};

use super::PromptSurface;

/// A one-time code the server was asked to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationChallenge {
    issued_at: u64,
    cooldown_ms: u64,
    ttl_ms: u64,
    consumed: bool,
}

impl VerificationChallenge {
    /// Records a code issued at `now_millis`.
    #[must_use]
    pub const fn issue(now_millis: u64, cooldown_ms: u64, ttl_ms: u64) -> Self {
        Self {
            issued_at: now_millis,
            cooldown_ms,
            ttl_ms,
            consumed: false,
        }
    }

    /// When the code was requested.
    #[must_use]
    pub const fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Milliseconds until another code may be requested.
    #[must_use]
    pub const fn resend_remaining_ms(&self, now_millis: u64) -> u64 {
        (self.issued_at + self.cooldown_ms).saturating_sub(now_millis)
    }

    /// Whole seconds until another code may be requested, rounded up.
    #[must_use]
    pub const fn resend_remaining_secs(&self, now_millis: u64) -> u64 {
        self.resend_remaining_ms(now_millis).div_ceil(1_000)
    }

    /// Whether another code may be requested.
    #[must_use]
    pub const fn can_resend(&self, now_millis: u64) -> bool {
        self.resend_remaining_ms(now_millis) == 0
    }

    /// Whether the code is too old to be accepted.
    #[must_use]
    pub const fn is_expired(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.issued_at) >= self.ttl_ms
    }

    /// Whether the code may still be submitted.
    #[must_use]
    pub const fn is_usable(&self, now_millis: u64) -> bool {
        !self.consumed && !self.is_expired(now_millis)
    }

    /// Marks the code as used.
    pub fn consume(&mut self) {
        self.consumed = true;
    }
}

/// Drives [`PromptSurface::countdown`] once per second down to zero.
///
/// The countdown stops when the ticker is dropped, so it cannot outlive the
/// dialog that owns it.
#[derive(Debug)]
pub struct CooldownTicker {
    handle: JoinHandle<()>,
}

impl CooldownTicker {
    /// Starts counting down from `remaining_secs` on the current tokio runtime.
    ///
    /// Returns `None` outside a runtime. The resend cooldown is still enforced
    /// by [`VerificationChallenge`]; only the visible countdown is skipped.
    #[must_use]
    pub fn start(surface: Arc<dyn PromptSurface>, remaining_secs: u64) -> Option<Self> {
        let Ok(runtime) = Handle::try_current() else {
            log::debug!("no tokio runtime, resend countdown not shown");
            return None;
        };
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            let mut remaining = remaining_secs;
            loop {
                interval.tick().await;
                surface.countdown(remaining);
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
            }
        });
        Some(Self { handle })
    }

    /// Whether the countdown reached zero.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CooldownTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
