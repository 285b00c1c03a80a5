use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use maqraa_common::{AppError, ProviderConfig};
use maqraa_provider::{
    IdentityClient, IdentityMetadata, ProviderTokens, ProviderUser, SignUpPayload, TableClient,
};

use crate::backend::AuthBackend;
use crate::events::AuthEvent;
use crate::models::{Identity, Profile, ProfilePatch, Session, SignUpRequest};
use crate::resolver::ProfileResolver;

/// Floor for the scheduled token refresh interval.
const MIN_REFRESH_SECS: u64 = 5;

/// Tokens held between calls. Never part of the Session surface.
#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: String,
    identity: Identity,
}

/// Gateway to the hosted identity provider and its profile tables.
///
/// Owns the token state and the auto-refresh loop; the refresh loop is the
/// source of provider-originated session events (`TokenRefreshed` on
/// success, `SignedOut` when a refresh fails and the session is lost).
pub struct LiveBackend {
    identity_api: IdentityClient,
    resolver: ProfileResolver,
    tokens: Arc<tokio::sync::Mutex<Option<TokenState>>>,
    events: broadcast::Sender<AuthEvent>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveBackend {
    pub fn new(url: &str, anon_key: &str, config: &ProviderConfig) -> Result<Self, AppError> {
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            identity_api: IdentityClient::new(url, anon_key, config)?,
            resolver: ProfileResolver::new(TableClient::new(url, anon_key, config)?),
            tokens: Arc::new(tokio::sync::Mutex::new(None)),
            events,
            refresh_task: Mutex::new(None),
        })
    }

    fn identity_of(user: &ProviderUser) -> Identity {
        Identity {
            id: user.id.to_string(),
            email: user.email.clone().unwrap_or_default(),
            role: user.role(),
        }
    }

    fn refresh_interval(expires_in: u64) -> Duration {
        Duration::from_secs((expires_in.saturating_mul(3) / 4).max(MIN_REFRESH_SECS))
    }

    async fn install_tokens(&self, tokens: &ProviderTokens, identity: &Identity) {
        *self.tokens.lock().await = Some(TokenState {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            identity: identity.clone(),
        });
        self.schedule_refresh(tokens.expires_in);
    }

    async fn access_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(|state| state.access_token.clone())
    }

    /// (Re)start the refresh loop for the current token state.
    fn schedule_refresh(&self, expires_in: u64) {
        let api = self.identity_api.clone();
        let tokens = Arc::clone(&self.tokens);
        let events = self.events.clone();
        let mut interval = Self::refresh_interval(expires_in);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let refresh_token = match tokens.lock().await.as_ref() {
                    Some(state) => state.refresh_token.clone(),
                    None => return,
                };

                match api.refresh_session(&refresh_token).await {
                    Ok(fresh) => {
                        let identity = LiveBackend::identity_of(&fresh.user);
                        *tokens.lock().await = Some(TokenState {
                            access_token: fresh.access_token.clone(),
                            refresh_token: fresh.refresh_token.clone(),
                            identity: identity.clone(),
                        });
                        interval = LiveBackend::refresh_interval(fresh.expires_in);
                        let _ = events.send(AuthEvent::TokenRefreshed(identity));
                    }
                    Err(err) => {
                        // A dead refresh token means the session is gone.
                        tracing::warn!("Session refresh failed, signing out: {}", err);
                        *tokens.lock().await = None;
                        let _ = events.send(AuthEvent::SignedOut);
                        return;
                    }
                }
            }
        });

        let mut slot = match self.refresh_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn cancel_refresh(&self) {
        let mut slot = match self.refresh_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl AuthBackend for LiveBackend {
    async fn test_connection(&self) -> bool {
        self.identity_api.health_check().await
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<Session, AppError> {
        let metadata = IdentityMetadata {
            role: Some(request.role),
            name: Some(request.name.clone()),
        };
        let payload = self
            .identity_api
            .sign_up(&request.email, &request.password, &metadata)
            .await?;

        let (user, tokens) = match payload {
            SignUpPayload::Session(tokens) => {
                // Wait for the new identity to propagate before touching the
                // profile table; the sign-up payload is the fallback.
                let user = match self
                    .identity_api
                    .await_user_visible(&tokens.access_token)
                    .await
                {
                    Ok(user) => user,
                    Err(err) => {
                        tracing::warn!(
                            "New identity not visible after sign-up, using payload: {}",
                            err
                        );
                        tokens.user.clone()
                    }
                };
                (user, Some(tokens))
            }
            SignUpPayload::UserOnly(user) => (user, None),
        };

        let identity = Identity {
            id: user.id.to_string(),
            email: user.email.clone().unwrap_or_else(|| request.email.clone()),
            role: request.role,
        };
        let access_token = tokens.as_ref().map(|t| t.access_token.clone());

        // The profile row is application-initiated. A failure here does not
        // roll back the identity: the caller gets a profile-less session
        // and the first profile edit heals the row via upsert.
        let profile = match self
            .resolver
            .create_for_signup(
                request.role,
                &identity.id,
                &request.name,
                access_token.as_deref(),
            )
            .await
        {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::error!(
                    "Profile creation failed after sign-up for {}: {}",
                    identity.email,
                    err
                );
                None
            }
        };

        if let Some(tokens) = &tokens {
            self.install_tokens(tokens, &identity).await;
        }

        Ok(Session::new(identity, profile))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let tokens = self
            .identity_api
            .sign_in_with_password(email, password)
            .await?;

        let mut identity = Self::identity_of(&tokens.user);
        if identity.email.is_empty() {
            identity.email = email.to_string();
        }

        let profile = match self
            .resolver
            .resolve(identity.role, &identity.id, Some(&tokens.access_token))
            .await
        {
            Ok(profile) => profile,
            Err(err) => {
                tracing::error!("Profile lookup failed for {}: {}", identity.email, err);
                None
            }
        };

        self.install_tokens(&tokens, &identity).await;

        Ok(Session::new(identity, profile))
    }

    async fn sign_out(&self) {
        self.cancel_refresh();
        let state = self.tokens.lock().await.take();
        if let Some(state) = state {
            // Local sign-out proceeds even when the provider is unreachable.
            if let Err(err) = self.identity_api.sign_out(&state.access_token).await {
                tracing::warn!("Provider sign-out failed: {}", err);
            }
        }
    }

    async fn restore_session(&self) -> Result<Option<Session>, AppError> {
        let state = self.tokens.lock().await.clone();
        let Some(state) = state else {
            return Ok(None);
        };

        let user = self.identity_api.get_user(&state.access_token).await?;
        let identity = Self::identity_of(&user);
        let profile = match self
            .resolver
            .resolve(identity.role, &identity.id, Some(&state.access_token))
            .await
        {
            Ok(profile) => profile,
            Err(err) => {
                tracing::error!("Profile lookup failed on restore: {}", err);
                None
            }
        };

        Ok(Some(Session::new(identity, profile)))
    }

    async fn resolve_profile(&self, identity: &Identity) -> Result<Option<Profile>, AppError> {
        let access_token = self.access_token().await;
        self.resolver
            .resolve(identity.role, &identity.id, access_token.as_deref())
            .await
    }

    async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile, AppError> {
        let state = self.tokens.lock().await.clone().ok_or(AppError::NotSignedIn)?;
        if patch.role() != state.identity.role {
            return Err(AppError::Validation(
                "Patch role does not match the signed-in role".to_string(),
            ));
        }

        self.resolver
            .apply_patch(patch, &state.identity.id, Some(&state.access_token))
            .await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

impl Drop for LiveBackend {
    fn drop(&mut self) {
        self.cancel_refresh();
    }
}
