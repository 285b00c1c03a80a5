use crate::models::Identity;

/// Provider-originated session changes, fanned out from the backend to the
/// orchestrator over a broadcast channel. Explicit sign-in/sign-up calls
/// apply their result directly and do not pass through here.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Identity),
    TokenRefreshed(Identity),
    SignedOut,
}
