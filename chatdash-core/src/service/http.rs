//! HTTP implementation of [`CredentialService`].
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use super::{CredentialService, CurrentUser, Verdict};
use crate::{
    config::DashboardConfig,
    error::{CredentialError, CredentialErrorKind, CredentialResult, DashboardError},
    http_request::Request,
    identity::{AccountId, ServerKeyState},
};

/// Response of `GET /api/secret-key`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretKeyResponse {
    #[serde(default)]
    secret_key: Option<String>,
}

/// Acknowledgement of save / send-code. A missing `success` counts as success.
#[derive(Debug, Deserialize)]
struct AckResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// The message a failed call's body carries for the user: the JSON `message`
/// field, or a plain-text body. Empty bodies and HTML error pages carry none.
fn server_message(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return Some(parsed.message.trim().to_string()).filter(|message| !message.is_empty());
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') || trimmed.starts_with('{') {
        return None;
    }
    Some(trimmed.to_string())
}

/// How many times a call may reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Retried on transient failures. For reads and validation.
    Retry,
    /// Sent once. For calls with side effects such as issuing a code.
    Once,
}

/// Statistics API client for the secret-key endpoints.
pub struct HttpCredentialService {
    base_url: String,
    request: Request,
}

impl HttpCredentialService {
    /// Creates a client for `config.base_url`.
    ///
    /// # Errors
    /// Returns an error if the config fails validation.
    pub fn new(config: &DashboardConfig) -> Result<Self, DashboardError> {
        config.validate()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request: Request::new(config.timeout(), config.max_retries),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        request_builder: RequestBuilder,
        delivery: Delivery,
    ) -> CredentialResult<T> {
        let response = match delivery {
            Delivery::Retry => self.request.handle(request_builder).await?,
            Delivery::Once => self.request.handle_once(request_builder).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let kind = CredentialErrorKind::for_status(status.as_u16());
            let body = response.text().await.unwrap_or_default();
            return Err(server_message(&body).map_or_else(
                || CredentialError::internal(kind, format!("{url} returned {status}")),
                |message| CredentialError::new(kind, message),
            ));
        }

        response.json::<T>().await.map_err(|e| {
            CredentialError::internal(
                CredentialErrorKind::Transient,
                format!("Failed to parse response from {url}: {e}"),
            )
        })
    }

    async fn acknowledge(&self, url: &str, request_builder: RequestBuilder) -> CredentialResult<()> {
        let ack: AckResponse = self.send(url, request_builder, Delivery::Once).await?;
        if ack.success == Some(false) {
            return Err(CredentialError::transient(
                ack.message.unwrap_or_else(|| "Request was refused".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialService for HttpCredentialService {
    async fn current_user(&self, account_id: &AccountId) -> CredentialResult<CurrentUser> {
        let url = self.url("/api/user/current");
        let builder = self
            .request
            .get(&url)
            .query(&[("userId", account_id.as_str())]);
        self.send(&url, builder, Delivery::Retry).await
    }

    async fn fetch_key(&self, account_id: &AccountId) -> CredentialResult<ServerKeyState> {
        let url = self.url("/api/secret-key");
        let builder = self
            .request
            .get(&url)
            .query(&[("userId", account_id.as_str())]);
        let response: SecretKeyResponse = self.send(&url, builder, Delivery::Retry).await?;
        Ok(ServerKeyState::from_wire(response.secret_key.as_deref()))
    }

    async fn save_key(&self, account_id: &AccountId, key: &str) -> CredentialResult<()> {
        let url = self.url("/api/secret-key");
        let builder = self.request.post(&url).json(&json!({
            "userId": account_id.as_str(),
            "secretKey": key,
        }));
        self.acknowledge(&url, builder).await
    }

    async fn validate_key(&self, account_id: &AccountId, key: &str) -> CredentialResult<Verdict> {
        let url = self.url("/api/secret-key/validate");
        let builder = self.request.post(&url).json(&json!({
            "userId": account_id.as_str(),
            "secretKey": key,
        }));
        self.send(&url, builder, Delivery::Retry).await
    }

    async fn send_code(&self, account_id: &AccountId) -> CredentialResult<()> {
        let url = self.url("/api/secret-key/send-code");
        let builder = self
            .request
            .post(&url)
            .json(&json!({ "userId": account_id.as_str() }));
        self.acknowledge(&url, builder).await
    }

    async fn verify_code(&self, account_id: &AccountId, code: &str) -> CredentialResult<Verdict> {
        let url = self.url("/api/secret-key/verify-code");
        let builder = self.request.post(&url).json(&json!({
            "userId": account_id.as_str(),
            "code": code,
        }));
        self.send(&url, builder, Delivery::Once).await
    }
}
