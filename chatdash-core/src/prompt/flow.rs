use std::future::Future;
use std::sync::Arc;

use log::{debug, info};

use super::{
    CooldownTicker, Dialog, FlowResolution, FlowState, Notice, Prompt, PromptSurface,
    UserAction, VerificationChallenge,
};
use crate::{
    context::DashboardContext,
    error::{CredentialError, CredentialErrorKind},
    identity::AccountId,
};

const SAVE_FAILED: &str = "Could not save the secret key. Please try again.";
const KEY_INCORRECT: &str = "The secret key is incorrect.";
const VALIDATE_FAILED: &str = "Could not check the secret key. Please try again.";
const SEND_CODE_FAILED: &str = "Could not send the verification code.";
const CODE_INCORRECT: &str = "The verification code is incorrect.";
const VERIFY_CODE_FAILED: &str = "Could not check the verification code.";

/// Runs one prompt flow for one account until it resolves.
pub struct FlowController<'a> {
    ctx: &'a DashboardContext,
    surface: Arc<dyn PromptSurface>,
    account_id: AccountId,
    state: FlowState,
    user_name: Option<String>,
    message: Option<String>,
    server_key: Option<String>,
    error: Option<String>,
    challenge: Option<VerificationChallenge>,
    ticker: Option<CooldownTicker>,
}

impl<'a> FlowController<'a> {
    /// Creates an idle controller for `account_id`.
    #[must_use]
    pub fn new(
        ctx: &'a DashboardContext,
        surface: Arc<dyn PromptSurface>,
        account_id: AccountId,
    ) -> Self {
        Self {
            ctx,
            surface,
            account_id,
            state: FlowState::Idle,
            user_name: None,
            message: None,
            server_key: None,
            error: None,
            challenge: None,
            ticker: None,
        }
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> FlowState {
        self.state
    }

    /// Drives `prompt` to completion. Never fails: cancelling yields
    /// [`FlowResolution::Dismissed`].
    ///
    /// The resend countdown runs on the current tokio runtime when there is
    /// one (see [`CooldownTicker::start`]).
    pub async fn run(mut self, prompt: Prompt) -> FlowResolution {
        self.enter(prompt).await;
        loop {
            let dialog = self.dialog();
            let action = self.surface.present(&dialog).await;
            if let Some(resolution) = self.handle(action).await {
                self.ticker = None;
                self.surface.dismiss();
                return resolution;
            }
        }
    }

    async fn enter(&mut self, prompt: Prompt) {
        debug!("starting {prompt:?} flow for {}", self.account_id);
        match prompt {
            Prompt::Register => self.transition(FlowState::AwaitingRegister),
            Prompt::ConfirmToken => {
                self.user_name = self.lookup_user_name().await;
                self.transition(FlowState::AwaitingConfirm);
            }
            Prompt::Mismatch {
                message,
                server_key,
            } => {
                self.message = message;
                self.server_key = server_key;
                self.transition(FlowState::AwaitingMismatchKey);
            }
            Prompt::Reset => self.transition(FlowState::AwaitingCode),
        }
    }

    fn dialog(&self) -> Dialog {
        let now = self.ctx.now();
        Dialog {
            state: self.state,
            account_id: self.account_id.clone(),
            user_name: self.user_name.clone(),
            message: self.message.clone(),
            server_key: self.server_key.clone(),
            error: self.error.clone(),
            code_sent: self.challenge.is_some(),
            resend_remaining_secs: self
                .challenge
                .map_or(0, |challenge| challenge.resend_remaining_secs(now)),
        }
    }

    fn transition(&mut self, state: FlowState) {
        debug!("{} flow: {:?} -> {state:?}", self.account_id, self.state);
        self.state = state;
        self.error = None;
        if state != FlowState::AwaitingCode {
            self.ticker = None;
        }
    }

    async fn handle(&mut self, action: UserAction) -> Option<FlowResolution> {
        match (self.state, action) {
            (_, UserAction::NotMyAccount) => Some(self.escape()),
            (state, UserAction::Later) => {
                info!("{state:?} postponed for {}", self.account_id);
                Some(FlowResolution::Dismissed)
            }
            (FlowState::AwaitingRegister, UserAction::Submit(input)) => {
                self.submit_register(&input).await
            }
            (FlowState::AwaitingConfirm, UserAction::Submit(input)) => {
                self.submit_confirm(&input).await
            }
            (FlowState::AwaitingMismatchKey, UserAction::Submit(input)) => {
                self.submit_mismatch(&input).await
            }
            (FlowState::AwaitingConfirm | FlowState::AwaitingMismatchKey, UserAction::ForgotKey) => {
                self.transition(FlowState::AwaitingCode);
                None
            }
            (FlowState::AwaitingCode, UserAction::RequestCode) => {
                self.request_code().await;
                None
            }
            (FlowState::AwaitingCode, UserAction::Submit(input)) => {
                self.submit_code(&input).await;
                None
            }
            (FlowState::AwaitingNewKey, UserAction::Submit(input)) => {
                self.submit_new_key(&input).await
            }
            (state, action) => {
                debug!("ignoring {action:?} in {state:?}");
                None
            }
        }
    }

    /// Disables submission while `call` is in flight.
    async fn busy<T>(&self, call: impl Future<Output = T>) -> T {
        self.surface.set_busy(true);
        let out = call.await;
        self.surface.set_busy(false);
        out
    }

    /// Keeps the dialog open with an inline error. Remote failures also toast.
    ///
    /// Shows `fallback` unless the error carries a message meant for the user.
    fn fail(&mut self, err: &CredentialError, fallback: &str) {
        let message = err.user_message().unwrap_or(fallback).to_string();
        if err.kind() != CredentialErrorKind::Input {
            self.surface.notify(Notice::Error(message.clone()));
        }
        self.error = Some(message);
    }

    fn resolve(&mut self, key: String, notice: &str) -> FlowResolution {
        self.transition(FlowState::Resolved);
        self.surface.notify(Notice::Success(notice.to_string()));
        FlowResolution::Resolved { key }
    }

    fn escape(&mut self) -> FlowResolution {
        info!("account {} disowned; clearing identity", self.account_id);
        self.ctx.identity.clear();
        self.ctx.session.clear_account(&self.account_id);
        self.transition(FlowState::Escaped);
        FlowResolution::Escaped
    }

    async fn lookup_user_name(&self) -> Option<String> {
        match self.ctx.service.current_user(&self.account_id).await {
            Ok(user) => {
                self.ctx
                    .identity
                    .set_user_name(&self.account_id, &user.user_name);
                Some(user.user_name)
            }
            Err(err) => {
                debug!("display name lookup for {} failed: {err}", self.account_id);
                self.ctx.identity.user_name(&self.account_id)
            }
        }
    }

    fn existing_key(input: &str) -> Result<String, CredentialError> {
        let key = input.trim();
        if key.is_empty() {
            return Err(CredentialError::input("Please enter your secret key."));
        }
        Ok(key.to_string())
    }

    fn new_key(&self, input: &str) -> Result<String, CredentialError> {
        let key = Self::existing_key(input)?;
        let min = self.ctx.config.min_key_length;
        if key.chars().count() < min {
            return Err(CredentialError::input(format!(
                "The secret key must be at least {min} characters."
            )));
        }
        Ok(key)
    }

    fn code(&self, input: &str) -> Result<String, CredentialError> {
        let code = input.trim();
        if code.is_empty() {
            return Err(CredentialError::input("Please enter the verification code."));
        }
        let len = self.ctx.config.code_length;
        if code.len() != len || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CredentialError::input(format!(
                "The verification code has {len} digits."
            )));
        }
        Ok(code.to_string())
    }

    /// Opens the trust window and invalidates every feature's cached key.
    fn stamp_key_update(&self) {
        self.ctx
            .session
            .stamp_key_updated(&self.account_id, self.ctx.now());
        self.ctx.session.clear_all_features(&self.account_id);
    }

    async fn submit_register(&mut self, input: &str) -> Option<FlowResolution> {
        let key = match self.new_key(input) {
            Ok(key) => key,
            Err(err) => {
                self.fail(&err, SAVE_FAILED);
                return None;
            }
        };

        let ctx = self.ctx;
        if let Err(err) = self.busy(ctx.service.save_key(&self.account_id, &key)).await {
            self.fail(&err, SAVE_FAILED);
            return None;
        }

        ctx.identity.set_secret_key(&key);
        self.stamp_key_update();
        ctx.session.mark_token_verified(&self.account_id);
        Some(self.resolve(key, "Secret key saved."))
    }

    async fn submit_confirm(&mut self, input: &str) -> Option<FlowResolution> {
        let key = match Self::existing_key(input) {
            Ok(key) => key,
            Err(err) => {
                self.fail(&err, KEY_INCORRECT);
                return None;
            }
        };

        let ctx = self.ctx;
        let verdict = self.busy(ctx.service.validate_key(&self.account_id, &key)).await;
        match verdict {
            Ok(verdict) if verdict.valid => {
                ctx.identity.set_secret_key(&key);
                ctx.session.mark_token_verified(&self.account_id);
                Some(self.resolve(key, "Secret key confirmed."))
            }
            Ok(verdict) => {
                let err = CredentialError::auth(verdict.message.unwrap_or_default());
                self.fail(&err, KEY_INCORRECT);
                None
            }
            Err(err) => {
                self.fail(&err, VALIDATE_FAILED);
                None
            }
        }
    }

    async fn submit_mismatch(&mut self, input: &str) -> Option<FlowResolution> {
        let key = match Self::existing_key(input) {
            Ok(key) => key,
            Err(err) => {
                self.fail(&err, KEY_INCORRECT);
                return None;
            }
        };

        let ctx = self.ctx;
        let verdict = self.busy(ctx.service.validate_key(&self.account_id, &key)).await;
        match verdict {
            Ok(verdict) if verdict.valid => {
                ctx.identity.set_secret_key(&key);
                self.stamp_key_update();
                ctx.session.mark_token_verified(&self.account_id);
                Some(self.resolve(key, "Secret key updated on this device."))
            }
            Ok(_) => {
                self.reset_after_rejection();
                None
            }
            Err(err) if err.is_auth() => {
                self.reset_after_rejection();
                None
            }
            Err(err) => {
                self.fail(&err, VALIDATE_FAILED);
                None
            }
        }
    }

    fn reset_after_rejection(&mut self) {
        info!("{} could not prove the key; switching to reset", self.account_id);
        self.surface.notify(Notice::Error(
            "That key is not correct either. Verify with a one-time code to set a new one."
                .to_string(),
        ));
        self.transition(FlowState::AwaitingCode);
    }

    async fn request_code(&mut self) {
        let now = self.ctx.now();
        if let Some(challenge) = self.challenge.filter(|c| !c.can_resend(now)) {
            debug!(
                "code resend for {} ignored; {}s left",
                self.account_id,
                challenge.resend_remaining_secs(now)
            );
            return;
        }

        let ctx = self.ctx;
        let sent = self.busy(ctx.service.send_code(&self.account_id)).await;
        match sent {
            Ok(()) => {
                let challenge = VerificationChallenge::issue(
                    now,
                    ctx.config.resend_cooldown_ms,
                    ctx.config.code_ttl_ms,
                );
                self.challenge = Some(challenge);
                self.error = None;
                self.ticker = CooldownTicker::start(
                    Arc::clone(&self.surface),
                    challenge.resend_remaining_secs(now),
                );
                self.surface
                    .notify(Notice::Info("A verification code has been sent.".to_string()));
            }
            Err(err) => self.fail(&err, SEND_CODE_FAILED),
        }
    }

    async fn submit_code(&mut self, input: &str) {
        let code = match self.code(input) {
            Ok(code) => code,
            Err(err) => return self.fail(&err, CODE_INCORRECT),
        };

        let now = self.ctx.now();
        match self.challenge {
            None => {
                return self.fail(
                    &CredentialError::input("Request a verification code first."),
                    CODE_INCORRECT,
                );
            }
            Some(challenge) if !challenge.is_usable(now) => {
                return self.fail(
                    &CredentialError::input(
                        "The verification code has expired. Request a new one.",
                    ),
                    CODE_INCORRECT,
                );
            }
            Some(_) => {}
        }

        let ctx = self.ctx;
        let verdict = self.busy(ctx.service.verify_code(&self.account_id, &code)).await;
        match verdict {
            Ok(verdict) if verdict.valid => {
                if let Some(challenge) = self.challenge.as_mut() {
                    challenge.consume();
                }
                self.transition(FlowState::AwaitingNewKey);
            }
            Ok(verdict) => {
                let err = CredentialError::auth(verdict.message.unwrap_or_default());
                self.fail(&err, CODE_INCORRECT);
            }
            Err(err) => self.fail(&err, VERIFY_CODE_FAILED),
        }
    }

    async fn submit_new_key(&mut self, input: &str) -> Option<FlowResolution> {
        let key = match self.new_key(input) {
            Ok(key) => key,
            Err(err) => {
                self.fail(&err, SAVE_FAILED);
                return None;
            }
        };

        let ctx = self.ctx;
        if let Err(err) = self.busy(ctx.service.save_key(&self.account_id, &key)).await {
            self.fail(&err, SAVE_FAILED);
            return None;
        }

        ctx.identity.set_secret_key(&key);
        self.stamp_key_update();
        ctx.session.clear_token_verified(&self.account_id);
        Some(self.resolve(key, "Secret key reset."))
    }
}
