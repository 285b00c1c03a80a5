use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use maqraa_common::{AppError, ProviderConfig};

use crate::events::AuthEvent;
use crate::live::LiveBackend;
use crate::local::LocalBackend;
use crate::models::{Identity, Profile, ProfilePatch, Session, SignUpRequest};

/// Capability boundary between the orchestrator and an identity backend.
///
/// Two implementations exist: `LiveBackend` against the hosted provider and
/// `LocalBackend`, the non-persistent mock used when the provider is
/// unconfigured. The variant is chosen once at startup, never per call.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Best-effort reachability probe; `false` means "disconnected".
    async fn test_connection(&self) -> bool;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<Session, AppError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError>;

    /// Drops the backend's token state unconditionally; a provider failure
    /// is logged by the implementation, never returned.
    async fn sign_out(&self);

    /// Re-materialize a session from current backend state, if any.
    async fn restore_session(&self) -> Result<Option<Session>, AppError>;

    /// Profile lookup for an identity; used by the session-event path.
    async fn resolve_profile(&self, identity: &Identity) -> Result<Option<Profile>, AppError>;

    /// Upsert partial profile fields for the signed-in identity.
    async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile, AppError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Select the backend once from configuration.
pub fn backend_from_config(config: &ProviderConfig) -> Result<Arc<dyn AuthBackend>, AppError> {
    match (&config.url, &config.anon_key) {
        (Some(url), Some(anon_key)) => {
            tracing::info!("Using hosted identity provider at {}", url);
            Ok(Arc::new(LiveBackend::new(url, anon_key, config)?))
        }
        _ => {
            tracing::info!("Identity provider unconfigured, using local mock backend");
            Ok(Arc::new(LocalBackend::new(config)))
        }
    }
}
