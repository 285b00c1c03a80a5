use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use validator::Validate;

use maqraa_common::{AppError, ProviderConfig};

use crate::backend::{backend_from_config, AuthBackend};
use crate::events::AuthEvent;
use crate::models::{ProfilePatch, Session, SignUpRequest};
use crate::store::{AuthState, SessionStore};

/// Orchestrates the auth backend and the session store: the one surface the
/// application talks to. Every operation takes its store ticket up front and
/// holds a loading guard for its whole extent, so `loading` settles on every
/// exit path and a slow call can never overwrite a newer session state.
pub struct AuthClient {
    backend: Arc<dyn AuthBackend>,
    store: Arc<SessionStore>,
    events_task: JoinHandle<()>,
}

impl AuthClient {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let store = Arc::new(SessionStore::new());
        let events_task = Self::spawn_event_consumer(Arc::clone(&backend), Arc::clone(&store));
        Self {
            backend,
            store,
            events_task,
        }
    }

    /// Build the client with the backend selected from configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, AppError> {
        Ok(Self::new(backend_from_config(config)?))
    }

    fn spawn_event_consumer(
        backend: Arc<dyn AuthBackend>,
        store: Arc<SessionStore>,
    ) -> JoinHandle<()> {
        let mut events = backend.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedOut) => {
                        let ticket = store.begin();
                        store.apply(ticket, None);
                    }
                    Ok(AuthEvent::SignedIn(identity))
                    | Ok(AuthEvent::TokenRefreshed(identity)) => {
                        let ticket = store.begin();
                        let profile = match backend.resolve_profile(&identity).await {
                            Ok(profile) => profile,
                            Err(err) => {
                                tracing::error!(
                                    "Profile lookup failed after session event: {}",
                                    err
                                );
                                None
                            }
                        };
                        store.apply(ticket, Some(Session::new(identity, profile)));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Session event consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> Result<Session, AppError> {
        request
            .validate()
            .map_err(|errors| AppError::Validation(format!("{errors:?}")))?;

        let _guard = self.store.loading_guard();
        let ticket = self.store.begin();
        let session = self.backend.sign_up(&request).await?;
        self.store.apply(ticket, Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let _guard = self.store.loading_guard();
        let ticket = self.store.begin();
        let session = self.backend.sign_in(email, password).await?;
        self.store.apply(ticket, Some(session.clone()));
        Ok(session)
    }

    /// Clears the session regardless of the provider call's outcome.
    /// Idempotent: signing out while signed out is a no-op.
    pub async fn sign_out(&self) {
        let _guard = self.store.loading_guard();
        let ticket = self.store.begin();
        self.backend.sign_out().await;
        self.store.apply(ticket, None);
    }

    /// Upsert partial profile fields and replace the session wholesale with
    /// the stored result.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Session, AppError> {
        let current = self
            .store
            .snapshot()
            .session
            .ok_or(AppError::NotSignedIn)?;

        let _guard = self.store.loading_guard();
        let ticket = self.store.begin();
        let profile = self.backend.update_profile(&patch).await?;
        let session = Session::new(current.identity(), Some(profile));
        self.store.apply(ticket, Some(session.clone()));
        Ok(session)
    }

    /// Session-restore path: re-materialize the session from backend state.
    pub async fn restore(&self) -> Result<Option<Session>, AppError> {
        let _guard = self.store.loading_guard();
        let ticket = self.store.begin();
        let session = self.backend.restore_session().await?;
        self.store.apply(ticket, session.clone());
        Ok(session)
    }

    pub async fn test_connection(&self) -> bool {
        self.backend.test_connection().await
    }

    pub fn current_session(&self) -> Option<Session> {
        self.store.snapshot().session
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.snapshot().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.store.snapshot().loading
    }

    /// Reactive view of `{session, loading}` for UI bindings.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.store.subscribe()
    }
}

impl Drop for AuthClient {
    /// Tear down the event consumer so a dropped client cannot keep acting
    /// on session events.
    fn drop(&mut self) {
        self.events_task.abort();
    }
}
