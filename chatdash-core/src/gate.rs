//! Per-feature verification in front of sensitive writes.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    context::DashboardContext,
    identity::{AccountId, ServerKeyState},
    prompt::{FlowController, FlowResolution, Prompt, PromptSurface},
    session::Feature,
};

/// What the guarded action may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed, authenticating with `key`.
    Granted {
        /// The key trusted for this feature.
        key: String,
    },
    /// The user did not establish a key; do not perform the action.
    Blocked,
}

impl GateDecision {
    /// The granted key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Granted { key } => Some(key),
            Self::Blocked => None,
        }
    }
}

/// Verifies the secret key once per session for one [`Feature`].
///
/// Trust earned here is cached under this feature only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionGate {
    feature: Feature,
}

impl SessionGate {
    /// Creates the gate for `feature`.
    #[must_use]
    pub const fn new(feature: Feature) -> Self {
        Self { feature }
    }

    /// The guarded feature.
    #[must_use]
    pub const fn feature(&self) -> Feature {
        self.feature
    }

    /// Returns a trusted key for `account_id`, prompting if needed.
    pub async fn ensure(
        &self,
        ctx: &DashboardContext,
        surface: Arc<dyn PromptSurface>,
        account_id: &AccountId,
    ) -> GateDecision {
        if let Some(key) = ctx.session.verified_key(self.feature, account_id) {
            debug!("{} already verified for {account_id}", self.feature);
            return GateDecision::Granted { key };
        }

        if let Some(key) = ctx.identity.secret_key() {
            match ctx.service.validate_key(account_id, &key).await {
                Ok(verdict) if verdict.valid => return self.grant(ctx, account_id, key),
                Ok(_) => debug!("{} key for {account_id} rejected", self.feature),
                Err(err) if err.is_auth() => {
                    debug!("{} key for {account_id} rejected: {err}", self.feature);
                }
                Err(err) => {
                    // Fail open without caching: the next action checks again.
                    warn!("{} check for {account_id} failed open: {err}", self.feature);
                    return GateDecision::Granted { key };
                }
            }
        }

        let prompt = match ctx.service.fetch_key(account_id).await {
            Ok(ServerKeyState::Absent) => Prompt::Register,
            Err(err) if err.is_not_found() => Prompt::Register,
            Ok(_) | Err(_) => Prompt::ConfirmToken,
        };

        match FlowController::new(ctx, surface, account_id.clone())
            .run(prompt)
            .await
        {
            FlowResolution::Resolved { key } => self.grant(ctx, account_id, key),
            FlowResolution::Dismissed | FlowResolution::Escaped => {
                debug!("{} blocked for {account_id}", self.feature);
                GateDecision::Blocked
            }
        }
    }

    fn grant(&self, ctx: &DashboardContext, account_id: &AccountId, key: String) -> GateDecision {
        ctx.session.trust_feature(self.feature, account_id, &key);
        GateDecision::Granted { key }
    }
}
