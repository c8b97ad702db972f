//! Terminal rendering of the key dialogs.

use std::fmt::Write as _;
use std::io::BufRead;

use async_trait::async_trait;
use chatdash_core::prompt::{Dialog, FlowState, Notice, PromptSurface, UserAction};
use tracing::debug;

const HELP: &str = "commands: :code (send code)  :forgot  :later  :not-me";

/// Renders dialogs on stdout and reads answers from stdin.
#[derive(Debug, Default)]
pub struct TerminalSurface;

impl TerminalSurface {
    async fn read_line() -> Option<String> {
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
        .await
        .ok()
        .flatten()
    }
}

fn title(state: FlowState) -> &'static str {
    match state {
        FlowState::AwaitingRegister => "Set a secret key",
        FlowState::AwaitingConfirm => "Confirm your secret key",
        FlowState::AwaitingMismatchKey => "Secret key mismatch",
        FlowState::AwaitingCode => "Reset your secret key",
        FlowState::AwaitingNewKey => "Choose a new secret key",
        FlowState::Idle | FlowState::Resolved | FlowState::Escaped => "Secret key",
    }
}

/// The text shown for `dialog`.
pub fn render(dialog: &Dialog) -> String {
    let mut out = format!("== {} ==\naccount: {}", title(dialog.state), dialog.account_id);
    if let Some(name) = &dialog.user_name {
        let _ = write!(out, " ({name})");
    }
    if let Some(message) = &dialog.message {
        let _ = write!(out, "\n{message}");
    }
    if let Some(server_key) = &dialog.server_key {
        let _ = write!(out, "\nserver key: {server_key}");
    }
    if dialog.state == FlowState::AwaitingCode {
        if dialog.resend_remaining_secs > 0 {
            let _ = write!(out, "\nresend available in {}s", dialog.resend_remaining_secs);
        } else if !dialog.code_sent {
            out.push_str("\ntype :code to receive a verification code");
        }
    }
    if let Some(error) = &dialog.error {
        let _ = write!(out, "\nerror: {error}");
    }
    let _ = write!(out, "\n{HELP}\n> ");
    out
}

/// Maps a line of input to an action. Anything that is not a command is a submission.
pub fn parse_action(line: &str) -> UserAction {
    match line.trim() {
        ":later" | ":q" => UserAction::Later,
        ":code" => UserAction::RequestCode,
        ":forgot" => UserAction::ForgotKey,
        ":not-me" => UserAction::NotMyAccount,
        input => UserAction::Submit(input.to_string()),
    }
}

#[async_trait]
impl PromptSurface for TerminalSurface {
    async fn present(&self, dialog: &Dialog) -> UserAction {
        print!("\n{}", render(dialog));
        let _ = std::io::Write::flush(&mut std::io::stdout());
        Self::read_line()
            .await
            .map_or(UserAction::Later, |line| parse_action(&line))
    }

    fn set_busy(&self, busy: bool) {
        debug!(busy, "submit control");
    }

    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Success(message) => eprintln!("ok: {message}"),
            Notice::Info(message) => eprintln!("info: {message}"),
            Notice::Error(message) => eprintln!("error: {message}"),
        }
    }

    fn countdown(&self, remaining_secs: u64) {
        if remaining_secs == 0 {
            eprintln!("info: you can request a new code");
        }
    }

    fn dismiss(&self) {
        debug!("dialog closed");
    }
}
