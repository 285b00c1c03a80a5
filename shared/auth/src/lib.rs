pub mod backend;
pub mod client;
pub mod events;
pub mod live;
pub mod local;
pub mod models;
pub mod resolver;
pub mod store;

pub use backend::{backend_from_config, AuthBackend};
pub use client::AuthClient;
pub use events::AuthEvent;
pub use live::LiveBackend;
pub use local::LocalBackend;
pub use models::*;
pub use resolver::ProfileResolver;
pub use store::{AuthState, LoadingGuard, SessionStore};
