//! Common test utilities shared across integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatdash_core::{
    platform::MemoryStore,
    prompt::{Dialog, Notice, PromptSurface, UserAction},
    Dashboard, DashboardConfig,
};

/// Answers dialogs from a fixed list, then with `Later`.
pub struct QueueSurface {
    actions: Mutex<VecDeque<UserAction>>,
    dialogs: Mutex<Vec<Dialog>>,
    notices: Mutex<Vec<Notice>>,
}

impl QueueSurface {
    /// Creates a surface that replays the given actions.
    pub fn new(actions: Vec<UserAction>) -> Arc<Self> {
        Arc::new(Self {
            actions: Mutex::new(actions.into()),
            dialogs: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
        })
    }

    /// Returns the dialogs presented so far.
    pub fn dialogs(&self) -> Vec<Dialog> {
        self.dialogs.lock().unwrap().clone()
    }

    /// Returns the notices emitted so far.
    #[allow(dead_code)]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptSurface for QueueSurface {
    async fn present(&self, dialog: &Dialog) -> UserAction {
        self.dialogs.lock().unwrap().push(dialog.clone());
        self.actions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UserAction::Later)
    }

    fn set_busy(&self, _busy: bool) {}

    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn countdown(&self, _remaining_secs: u64) {}

    fn dismiss(&self) {}
}

/// Builds a submit action with the given input.
#[allow(dead_code)]
pub fn submit(input: &str) -> UserAction {
    UserAction::Submit(input.to_string())
}

/// A dashboard talking HTTP to `base_url`, with fresh in-memory stores.
pub fn dashboard(base_url: &str, surface: Arc<QueueSurface>) -> (Dashboard, Arc<MemoryStore>) {
    let config = DashboardConfig {
        allow_insecure_http: true,
        max_retries: 0,
        ..DashboardConfig::default()
    }
    .with_base_url(base_url);
    let local = Arc::new(MemoryStore::new());
    let dashboard = Dashboard::connect(
        config,
        local.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        surface,
    )
    .expect("valid config");
    (dashboard, local)
}
