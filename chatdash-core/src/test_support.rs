//! Scripted doubles for the credential service and the prompt surface.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    clock::ManualClock,
    config::DashboardConfig,
    context::DashboardContext,
    error::{CredentialError, CredentialResult},
    identity::{AccountId, IdentityCache, ServerKeyState},
    platform::MemoryStore,
    prompt::{Dialog, Notice, PromptSurface, UserAction},
    service::{CredentialService, CurrentUser, Verdict},
    session::SessionTrustCache,
};

pub const T0: u64 = 1_700_000_000_000;

pub fn account(id: &str) -> AccountId {
    AccountId::parse(id).unwrap()
}

pub fn context(service: Arc<MockService>, clock: Arc<ManualClock>) -> DashboardContext {
    let config = DashboardConfig {
        allow_insecure_http: true,
        ..DashboardConfig::default()
    };
    DashboardContext::new(
        config,
        IdentityCache::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new())),
        SessionTrustCache::new(Arc::new(MemoryStore::new())),
        service,
        clock,
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub current_user: usize,
    pub fetch: usize,
    pub save: usize,
    pub validate: usize,
    pub send_code: usize,
    pub verify_code: usize,
}

pub struct MockState {
    pub fetch: CredentialResult<ServerKeyState>,
    pub accepted_key: Option<String>,
    pub validate_error: Option<CredentialError>,
    pub reject_message: Option<String>,
    pub save_error: Option<CredentialError>,
    pub send_code_error: Option<CredentialError>,
    pub code: String,
    pub code_verdict: Option<Verdict>,
    pub user: CredentialResult<CurrentUser>,
    pub saved: Vec<String>,
    pub calls: Calls,
}

/// In-memory server: one account, one key.
pub struct MockService {
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new(fetch: CredentialResult<ServerKeyState>) -> Arc<Self> {
        let accepted_key = match &fetch {
            Ok(ServerKeyState::Plaintext(key)) => Some(key.trim().to_string()),
            _ => None,
        };
        Arc::new(Self {
            state: Mutex::new(MockState {
                fetch,
                accepted_key,
                validate_error: None,
                reject_message: None,
                save_error: None,
                send_code_error: None,
                code: "123456".to_string(),
                code_verdict: None,
                user: Ok(CurrentUser {
                    user_id: "10001".to_string(),
                    user_name: "Alice".to_string(),
                    is_admin: false,
                }),
                saved: Vec::new(),
                calls: Calls::default(),
            }),
        })
    }

    pub fn not_found() -> Arc<Self> {
        Self::new(Err(CredentialError::not_found("Secret key not found")))
    }

    pub fn plaintext(key: &str) -> Arc<Self> {
        Self::new(Ok(ServerKeyState::Plaintext(key.to_string())))
    }

    /// The server only stores a hash; `key` is what validation accepts.
    pub fn encrypted(key: &str) -> Arc<Self> {
        let service = Self::new(Ok(ServerKeyState::EncryptedPlaceholder));
        service.with(|state| state.accepted_key = Some(key.to_string()));
        service
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Calls {
        self.with(|state| state.calls)
    }

    pub fn saved(&self) -> Vec<String> {
        self.with(|state| state.saved.clone())
    }
}

#[async_trait]
impl CredentialService for MockService {
    async fn current_user(&self, _account_id: &AccountId) -> CredentialResult<CurrentUser> {
        self.with(|state| {
            state.calls.current_user += 1;
            state.user.clone()
        })
    }

    async fn fetch_key(&self, _account_id: &AccountId) -> CredentialResult<ServerKeyState> {
        self.with(|state| {
            state.calls.fetch += 1;
            state.fetch.clone()
        })
    }

    async fn save_key(&self, _account_id: &AccountId, key: &str) -> CredentialResult<()> {
        self.with(|state| {
            state.calls.save += 1;
            if let Some(err) = state.save_error.clone() {
                return Err(err);
            }
            state.saved.push(key.to_string());
            state.accepted_key = Some(key.to_string());
            if !matches!(state.fetch, Ok(ServerKeyState::EncryptedPlaceholder)) {
                state.fetch = Ok(ServerKeyState::Plaintext(key.to_string()));
            }
            Ok(())
        })
    }

    async fn validate_key(&self, _account_id: &AccountId, key: &str) -> CredentialResult<Verdict> {
        self.with(|state| {
            state.calls.validate += 1;
            if let Some(err) = state.validate_error.clone() {
                return Err(err);
            }
            if state.accepted_key.as_deref() == Some(key.trim()) {
                Ok(Verdict::accepted())
            } else {
                Ok(Verdict {
                    valid: false,
                    message: state.reject_message.clone(),
                })
            }
        })
    }

    async fn send_code(&self, _account_id: &AccountId) -> CredentialResult<()> {
        self.with(|state| {
            state.calls.send_code += 1;
            state.send_code_error.clone().map_or(Ok(()), Err)
        })
    }

    async fn verify_code(&self, _account_id: &AccountId, code: &str) -> CredentialResult<Verdict> {
        self.with(|state| {
            state.calls.verify_code += 1;
            if let Some(verdict) = state.code_verdict.clone() {
                return Ok(verdict);
            }
            Ok(Verdict {
                valid: state.code == code,
                message: None,
            })
        })
    }
}

pub enum Step {
    Act(UserAction),
    /// Advances the surface's clock before the next step.
    Wait(u64),
}

#[derive(Debug, Default, Clone)]
pub struct SurfaceLog {
    pub dialogs: Vec<Dialog>,
    pub notices: Vec<Notice>,
    pub busy: Vec<bool>,
    pub countdowns: Vec<u64>,
    pub dismissed: usize,
}

/// Plays back user actions; answers `Later` once the script runs out.
pub struct ScriptedSurface {
    clock: Option<Arc<ManualClock>>,
    steps: Mutex<VecDeque<Step>>,
    log: Mutex<SurfaceLog>,
}

impl ScriptedSurface {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            clock: None,
            steps: Mutex::new(steps.into()),
            log: Mutex::new(SurfaceLog::default()),
        })
    }

    pub fn with_clock(clock: Arc<ManualClock>, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            clock: Some(clock),
            steps: Mutex::new(steps.into()),
            log: Mutex::new(SurfaceLog::default()),
        })
    }

    pub fn log(&self) -> SurfaceLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptSurface for ScriptedSurface {
    async fn present(&self, dialog: &Dialog) -> UserAction {
        self.log.lock().unwrap().dialogs.push(dialog.clone());
        let mut steps = self.steps.lock().unwrap();
        loop {
            match steps.pop_front() {
                Some(Step::Act(action)) => return action,
                Some(Step::Wait(millis)) => {
                    if let Some(clock) = &self.clock {
                        clock.advance(millis);
                    }
                }
                None => return UserAction::Later,
            }
        }
    }

    fn set_busy(&self, busy: bool) {
        self.log.lock().unwrap().busy.push(busy);
    }

    fn notify(&self, notice: Notice) {
        self.log.lock().unwrap().notices.push(notice);
    }

    fn countdown(&self, remaining_secs: u64) {
        self.log.lock().unwrap().countdowns.push(remaining_secs);
    }

    fn dismiss(&self) {
        self.log.lock().unwrap().dismissed += 1;
    }
}
