use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::models::Session;

/// Observable auth state: the current session (if any) and whether any
/// gateway call is in flight.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub session: Option<Session>,
    pub loading: bool,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Owned session store with subscribe/notify semantics.
///
/// Every update carries a ticket taken when its originating operation
/// started; a write whose ticket is older than the last applied one is
/// discarded. A slow explicit call that was already in flight when a
/// provider event arrived therefore loses to the event instead of
/// clobbering the newer state.
pub struct SessionStore {
    state: watch::Sender<AuthState>,
    next_ticket: AtomicU64,
    applied: Mutex<u64>,
    in_flight: AtomicUsize,
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            state,
            next_ticket: AtomicU64::new(1),
            applied: Mutex::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Take the ticket for an operation that may later write the session.
    pub fn begin(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    /// Apply a session update unless a newer one already landed. Returns
    /// whether the update was taken.
    pub fn apply(&self, ticket: u64, session: Option<Session>) -> bool {
        let mut applied = match self.applied.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if ticket < *applied {
            tracing::debug!(ticket, newest = *applied, "Discarding stale session update");
            return false;
        }
        *applied = ticket;
        self.state.send_modify(|state| state.session = session);
        true
    }

    /// Mark a gateway call in flight. The returned guard clears the flag on
    /// every exit path, including early returns and propagated errors.
    pub fn loading_guard(self: &Arc<Self>) -> LoadingGuard {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.state.send_modify(|state| state.loading = true);
        }
        LoadingGuard {
            store: Arc::clone(self),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped loading flag: dropping the guard settles the call.
pub struct LoadingGuard {
    store: Arc<SessionStore>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.store.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.store.state.send_modify(|state| state.loading = false);
        }
    }
}
