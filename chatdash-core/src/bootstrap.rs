//! Page-load entry point that owns the context and runs reconciliation.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::DashboardConfig,
    context::DashboardContext,
    error::DashboardError,
    gate::{GateDecision, SessionGate},
    identity::{AccountId, IdentityCache},
    platform::KeyValueStore,
    prompt::{FlowController, FlowResolution, Prompt, PromptSurface},
    reconcile::{reconcile_with, EntryMode},
    service::{CredentialService, HttpCredentialService},
    session::{Feature, SessionTrustCache},
};

/// How the dashboard was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Regular page load with the remembered account.
    Normal,
    /// A link carrying an account id.
    TokenLink {
        /// The raw account id from the link.
        account_id: String,
    },
}

/// Result of a page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// The key is trusted.
    Ready {
        /// The signed-in account.
        account_id: AccountId,
    },
    /// The user postponed the prompt; pages render unauthenticated.
    Degraded {
        /// The signed-in account.
        account_id: AccountId,
    },
    /// No usable account id; show account-id capture.
    NeedsAccountId,
    /// Another load is still reconciling.
    Busy,
}

/// The dashboard's credential layer, wired to a host.
pub struct Dashboard {
    ctx: DashboardContext,
    surface: Arc<dyn PromptSurface>,
}

impl Dashboard {
    /// Wires the dashboard from its collaborators.
    #[must_use]
    pub fn new(
        config: DashboardConfig,
        local: Arc<dyn KeyValueStore>,
        cookies: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        service: Arc<dyn CredentialService>,
        surface: Arc<dyn PromptSurface>,
    ) -> Self {
        let ctx = DashboardContext::new(
            config,
            IdentityCache::new(local, cookies),
            SessionTrustCache::new(session),
            service,
            Arc::new(SystemClock),
        );
        Self { ctx, surface }
    }

    /// Wires the dashboard against the HTTP API named in `config`.
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidInput`] if `config` is invalid.
    pub fn connect(
        config: DashboardConfig,
        local: Arc<dyn KeyValueStore>,
        cookies: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        surface: Arc<dyn PromptSurface>,
    ) -> Result<Self, DashboardError> {
        let service = Arc::new(HttpCredentialService::new(&config)?);
        Ok(Self::new(config, local, cookies, session, service, surface))
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx.clock = clock;
        self
    }

    /// The context handed to every operation.
    #[must_use]
    pub const fn context(&self) -> &DashboardContext {
        &self.ctx
    }

    /// Validates and remembers an account id typed or linked by the user.
    ///
    /// A different account than the remembered one drops the old local key.
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidInput`] if `raw` is not an account id.
    pub fn capture_account_id(&self, raw: &str) -> Result<AccountId, DashboardError> {
        let account_id = AccountId::parse(raw)?;
        if self.ctx.identity.switch_account(&account_id) {
            info!("switched to account {account_id}");
        }
        Ok(account_id)
    }

    /// Reconciles the remembered (or linked) account and drives any prompt.
    pub async fn load(&self, entry: Entry) -> BootOutcome {
        let (account_id, mode) = match entry {
            Entry::Normal => match self.ctx.identity.account_id() {
                Some(account_id) => (account_id, EntryMode::Normal),
                None => return BootOutcome::NeedsAccountId,
            },
            Entry::TokenLink { account_id } => match self.capture_account_id(&account_id) {
                Ok(account_id) => (account_id, EntryMode::TokenLink),
                Err(err) => {
                    warn!("ignoring token link: {err}");
                    return BootOutcome::NeedsAccountId;
                }
            },
        };

        let Some(token) = self.ctx.try_begin_reconcile() else {
            debug!("load for {account_id} skipped: reconciliation in flight");
            return BootOutcome::Busy;
        };

        let result = reconcile_with(&self.ctx, &token, &account_id, mode).await;
        debug!("{account_id} reconciled to {:?}", result.outcome);
        let Some(prompt) = Prompt::for_result(&result) else {
            return BootOutcome::Ready { account_id };
        };

        let resolution = FlowController::new(&self.ctx, Arc::clone(&self.surface), account_id.clone())
            .run(prompt)
            .await;
        drop(token);

        match resolution {
            FlowResolution::Resolved { .. } => {
                // A reset inside the flow clears the flag; the link is still resolved.
                if mode == EntryMode::TokenLink {
                    self.ctx.session.mark_token_verified(&account_id);
                }
                BootOutcome::Ready { account_id }
            }
            FlowResolution::Dismissed => BootOutcome::Degraded { account_id },
            FlowResolution::Escaped => BootOutcome::NeedsAccountId,
        }
    }

    /// Runs the session gate for `feature` on the remembered account.
    pub async fn gate(&self, feature: Feature) -> GateDecision {
        let Some(account_id) = self.ctx.identity.account_id() else {
            return GateDecision::Blocked;
        };
        SessionGate::new(feature)
            .ensure(&self.ctx, Arc::clone(&self.surface), &account_id)
            .await
    }

    /// Whether the remembered account has admin rights. Failures read as `false`.
    pub async fn is_admin(&self) -> bool {
        let Some(account_id) = self.ctx.identity.account_id() else {
            return false;
        };
        match self.ctx.service.current_user(&account_id).await {
            Ok(user) => {
                self.ctx
                    .identity
                    .set_user_name(&account_id, &user.user_name);
                user.is_admin
            }
            Err(err) => {
                debug!("role lookup for {account_id} failed: {err}");
                false
            }
        }
    }

    /// Cached display name of the remembered account.
    #[must_use]
    pub fn user_name(&self) -> Option<String> {
        let account_id = self.ctx.identity.account_id()?;
        self.ctx.identity.user_name(&account_id)
    }

    /// Forgets the account on this device (logout).
    pub fn escape(&self) {
        if let Some(account_id) = self.ctx.identity.account_id() {
            info!("logging out {account_id}");
            self.ctx.session.clear_account(&account_id);
        }
        self.ctx.identity.clear();
    }
}
