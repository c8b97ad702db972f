#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Secret-key reconciliation for the chat statistics dashboard.
//!
//! The dashboard authenticates sensitive writes with a lightweight secret key
//! kept next to the account id. This crate decides on every load whether the
//! locally cached key can be trusted relative to the server's record, and
//! drives the register, confirm, mismatch and reset dialogs when it cannot.
//!
//! Start at [`bootstrap::Dashboard`].

use strum::{Display, EnumString};

/// Deployment the dashboard talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Pre-release API.
    Staging,
    /// Live API.
    Production,
}

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod identity;
pub mod logger;
pub mod platform;
pub mod prompt;
pub mod reconcile;
pub mod service;
pub mod session;

pub use bootstrap::{BootOutcome, Dashboard, Entry};
pub use config::DashboardConfig;
pub use error::{CredentialError, CredentialErrorKind, DashboardError};
pub use gate::{GateDecision, SessionGate};
pub use identity::AccountId;
pub use session::Feature;

// private modules
mod http_request;

#[cfg(test)]
mod test_support;
