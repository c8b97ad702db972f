//! Crate errors and the credential failure taxonomy.

use thiserror::Error;

use crate::platform::StorageError;

/// Error outputs from `chatdash-core`
#[derive(Debug, Error)]
pub enum DashboardError {
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute that failed validation.
        attribute: String,
        /// Human readable explanation.
        reason: String,
    },
    /// Network connection error with details
    #[error("network_error: {url} (status: {status:?}): {error}")]
    NetworkError {
        /// The URL that was requested.
        url: String,
        /// The HTTP status, if a response was received.
        status: Option<u16>,
        /// The error body or transport failure.
        error: String,
    },
    /// Unexpected error serializing or parsing information
    #[error("serialization_error: {error}")]
    SerializationError {
        /// Details of the failure.
        error: String,
    },
    /// Persistent or session storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// HTTP request failure
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// The classes of failure a credential operation can end in.
///
/// Every remote call made by the reconciliation engine and the prompt flows
/// is reduced to one of these kinds before any decision is taken on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CredentialErrorKind {
    /// The server holds no record. Not a failure: there is nothing to compare.
    NotFound,
    /// The server explicitly rejected the credential.
    Auth,
    /// Network, timeout or otherwise unclassified failure.
    Transient,
    /// The user supplied malformed input (empty or short key, bad code).
    Input,
}

impl CredentialErrorKind {
    /// Classifies an HTTP error status.
    #[must_use]
    pub const fn for_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            401 | 403 => Self::Auth,
            _ => Self::Transient,
        }
    }
}

/// A classified credential failure.
///
/// The message is either text fit for the user (the server's own message, or
/// one written by this crate) or an internal diagnostic such as a transport
/// error. Only the former is returned by [`CredentialError::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CredentialError {
    kind: CredentialErrorKind,
    message: String,
    presentable: bool,
}

/// Result type for credential operations.
pub type CredentialResult<T> = Result<T, CredentialError>;

impl CredentialError {
    /// Creates an error of the given kind with a message the user may see.
    pub fn new(kind: CredentialErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            presentable: true,
        }
    }

    /// Creates an error whose message is only meant for logs.
    pub fn internal(kind: CredentialErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            message: detail.into(),
            presentable: false,
        }
    }

    /// No record exists on the server.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::NotFound, message)
    }

    /// The server rejected the credential.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::Auth, message)
    }

    /// Network or unclassified failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::Transient, message)
    }

    /// Malformed user input.
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(CredentialErrorKind::Input, message)
    }

    /// The failure class.
    #[must_use]
    pub const fn kind(&self) -> CredentialErrorKind {
        self.kind
    }

    /// The message, whether or not it is fit for the user.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The message to show the user, if there is a non-empty one.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        Some(self.message.trim()).filter(|message| self.presentable && !message.is_empty())
    }

    /// Whether this failure means "the server has no record".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == CredentialErrorKind::NotFound
    }

    /// Whether the server explicitly rejected the credential.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind == CredentialErrorKind::Auth
    }
}

/// Crate errors carry URLs and transport details, so they only become
/// internal credential errors. Invalid input keeps its reason for the user.
impl From<DashboardError> for CredentialError {
    fn from(value: DashboardError) -> Self {
        match value {
            DashboardError::InvalidInput { reason, .. } => Self::input(reason),
            DashboardError::NetworkError {
                status: Some(status),
                ..
            } => Self::internal(CredentialErrorKind::for_status(status), value.to_string()),
            other => Self::internal(CredentialErrorKind::Transient, other.to_string()),
        }
    }
}
