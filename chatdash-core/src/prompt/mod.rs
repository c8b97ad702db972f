//! Prompt flows: the dialogs that register, confirm, repair or reset a key.
//!
//! Each flow is a named-state machine driven by a single loop in
//! [`FlowController::run`]: present the dialog for the current state, wait for
//! the user's action, apply it, repeat until a terminal state. Rendering is
//! delegated to the host through [`PromptSurface`].
//!
//! ```text
//!              Register ─────────────┐
//!  Idle ──┬──► AwaitingRegister ─────┤
//!         ├──► AwaitingConfirm ──────┼──► Resolved
//!         │        │ forgot          │
//!         ├──► AwaitingMismatchKey ──┤
//!         │        │ rejected        │
//!         └──► AwaitingCode ──► AwaitingNewKey
//!
//!  any state ── not my account ──► Escaped
//! ```

use async_trait::async_trait;

use crate::{
    identity::AccountId,
    reconcile::{Outcome, ReconciliationResult},
};

mod cooldown;
mod flow;

pub use cooldown::{CooldownTicker, VerificationChallenge};
pub use flow::FlowController;

/// States of a prompt flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Not started.
    Idle,
    /// Waiting for a new key to register.
    AwaitingRegister,
    /// Waiting for the user to confirm the account's key.
    AwaitingConfirm,
    /// Waiting for the correct key after a mismatch.
    AwaitingMismatchKey,
    /// Waiting for a one-time code (reset path).
    AwaitingCode,
    /// Code accepted; waiting for the replacement key.
    AwaitingNewKey,
    /// A trusted key was established.
    Resolved,
    /// The user disowned the account.
    Escaped,
}

impl FlowState {
    /// Whether the flow is over in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Escaped)
    }
}

/// The flow to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Choose a first key.
    Register,
    /// Confirm the key explicitly.
    ConfirmToken,
    /// Repair a key that contradicts the server.
    Mismatch {
        /// Diagnostic shown above the input.
        message: Option<String>,
        /// The server's key, when it disclosed one.
        server_key: Option<String>,
    },
    /// Replace a forgotten key through a one-time code.
    Reset,
}

impl Prompt {
    /// The prompt a reconciliation result calls for, if any.
    #[must_use]
    pub fn for_result(result: &ReconciliationResult) -> Option<Self> {
        match result.outcome {
            Outcome::Trust => None,
            Outcome::Register => Some(Self::Register),
            Outcome::ConfirmToken => Some(Self::ConfirmToken),
            Outcome::Mismatch => Some(Self::Mismatch {
                message: result.message.clone(),
                server_key: result.server_key.clone(),
            }),
        }
    }
}

/// Everything the host needs to render the current dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    /// The state being rendered.
    pub state: FlowState,
    /// The account the dialog is about.
    pub account_id: AccountId,
    /// Display name, when known.
    pub user_name: Option<String>,
    /// Diagnostic text (mismatch explanation).
    pub message: Option<String>,
    /// The server's plaintext key, shown on mismatch.
    pub server_key: Option<String>,
    /// Inline error from the last submission.
    pub error: Option<String>,
    /// Whether a code was sent in this flow.
    pub code_sent: bool,
    /// Seconds until another code may be requested; 0 when allowed.
    pub resend_remaining_secs: u64,
}

/// What the user did in a dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Submitted the input field (key or code).
    Submit(String),
    /// Asked for a one-time code.
    RequestCode,
    /// Chose to reset a forgotten key.
    ForgotKey,
    /// Closed the dialog without finishing.
    Later,
    /// Declared the remembered account is not theirs.
    NotMyAccount,
}

/// Transient notification (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Something completed.
    Success(String),
    /// Informational.
    Info(String),
    /// An actionable failure.
    Error(String),
}

/// How a flow ended. Flows never fail; a dismissed flow is a degraded result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResolution {
    /// A key was established and is trusted for this session.
    Resolved {
        /// The trusted key.
        key: String,
    },
    /// The user postponed; the pending operation continues unauthenticated.
    Dismissed,
    /// The user disowned the account; identity was destroyed.
    Escaped,
}

impl FlowResolution {
    /// The trusted key, if the flow resolved.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Resolved { key } => Some(key),
            Self::Dismissed | Self::Escaped => None,
        }
    }
}

/// Host-side rendering of prompt dialogs (modals, toasts, disabled controls).
#[async_trait]
pub trait PromptSurface: Send + Sync {
    /// Shows `dialog` (replacing any previous one) and waits for the user.
    async fn present(&self, dialog: &Dialog) -> UserAction;

    /// Disables (`true`) or re-enables (`false`) the submit control.
    fn set_busy(&self, busy: bool);

    /// Shows a transient notification.
    fn notify(&self, notice: Notice);

    /// Updates the resend countdown; called once per second while it runs.
    fn countdown(&self, remaining_secs: u64);

    /// Closes the dialog.
    fn dismiss(&self);
}
