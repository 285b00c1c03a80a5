use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use maqraa_common::{AppError, ProviderConfig, SessionPollConfig, UserRole};

/// Identity metadata stored with the provider user at sign-up time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The provider's user object.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: IdentityMetadata,
    pub created_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl ProviderUser {
    /// Role recorded at sign-up; identities without role metadata are
    /// students.
    pub fn role(&self) -> UserRole {
        self.user_metadata.role.unwrap_or_default()
    }
}

/// Password or refresh grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: ProviderUser,
}

/// Sign-up response. The session half is only present when the provider
/// auto-confirms accounts; otherwise only the user object comes back.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpPayload {
    Session(ProviderTokens),
    UserOnly(ProviderUser),
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ProviderErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// HTTP client for the hosted identity API.
#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    poll: SessionPollConfig,
}

impl IdentityClient {
    pub fn new(url: &str, anon_key: &str, config: &ProviderConfig) -> Result<Self, AppError> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::Internal(format!("Invalid provider URL {url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            poll: config.session_poll.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Best-effort reachability probe. A failure means "disconnected",
    /// never a fatal error.
    pub async fn health_check(&self) -> bool {
        let request = self
            .http
            .get(self.endpoint("health"))
            .header("apikey", &self.anon_key)
            .send()
            .await;

        match request {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::warn!("Provider health check failed: {}", err);
                false
            }
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &IdentityMetadata,
    ) -> Result<SignUpPayload, AppError> {
        let response = self
            .http
            .post(self.endpoint("signup"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderTokens, AppError> {
        let response = self
            .http
            .post(self.endpoint("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderTokens, AppError> {
        let response = self
            .http
            .post(self.endpoint("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "refresh_token": refresh_token,
            }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejection(response).await)
        }
    }

    pub async fn get_user(&self, access_token: &str) -> Result<ProviderUser, AppError> {
        let response = self
            .http
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Wait for a freshly created identity to become visible.
    ///
    /// Provider writes propagate asynchronously, so the user endpoint can
    /// lag the sign-up response. Polls with doubling delay, bounded by the
    /// configured attempt count.
    pub async fn await_user_visible(&self, access_token: &str) -> Result<ProviderUser, AppError> {
        let mut delay = Duration::from_millis(self.poll.base_delay_ms);
        let mut last_err = AppError::Internal("Session never became visible".to_string());

        for attempt in 1..=self.poll.max_attempts {
            match self.get_user(access_token).await {
                Ok(user) => return Ok(user),
                Err(err) => {
                    tracing::debug!(attempt, "New identity not visible yet: {}", err);
                    last_err = err;
                }
            }

            if attempt < self.poll.max_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(last_err)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::Internal(format!("Malformed provider response: {e}")))
        } else {
            Err(Self::rejection(response).await)
        }
    }

    async fn rejection(response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(ProviderErrorBody::into_message)
            .unwrap_or_else(|| format!("Provider returned status {status}"));

        AppError::Provider(message)
    }
}
