//! The explicit context passed to every reconciliation, prompt and gate.

use std::sync::Arc;

use crate::{
    clock::Clock,
    config::DashboardConfig,
    identity::IdentityCache,
    reconcile::{ReconcileGuard, ReconcileToken},
    service::CredentialService,
    session::SessionTrustCache,
};

/// Everything the credential subsystem reads or writes, owned by the bootstrap.
pub struct DashboardContext {
    /// Runtime configuration.
    pub config: DashboardConfig,
    /// Persistent account id and key.
    pub identity: IdentityCache,
    /// Per-session trust flags.
    pub session: SessionTrustCache,
    /// Remote key operations.
    pub service: Arc<dyn CredentialService>,
    /// Time source for trust windows and cooldowns.
    pub clock: Arc<dyn Clock>,
    reconcile_guard: ReconcileGuard,
}

impl DashboardContext {
    /// Assembles a context from its parts.
    #[must_use]
    pub fn new(
        config: DashboardConfig,
        identity: IdentityCache,
        session: SessionTrustCache,
        service: Arc<dyn CredentialService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            identity,
            session,
            service,
            clock,
            reconcile_guard: ReconcileGuard::default(),
        }
    }

    /// Claims the single top-level reconciliation slot.
    ///
    /// Returns `None` while another reconciliation holds it.
    pub fn try_begin_reconcile(&self) -> Option<ReconcileToken<'_>> {
        self.reconcile_guard.try_begin()
    }

    /// Current time in epoch millis.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }
}
