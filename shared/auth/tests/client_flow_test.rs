use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use maqraa_auth::{
    AuthBackend, AuthClient, AuthEvent, Identity, LocalBackend, Profile, ProfilePatch, Session,
    SignUpRequest, StudentProfilePatch,
};
use maqraa_common::{AppError, LearningLevel, ProviderConfig, SessionPollConfig, UserRole};

fn local_config(delay_ms: u64) -> ProviderConfig {
    ProviderConfig {
        url: None,
        anon_key: None,
        http_timeout_secs: 5,
        session_poll: SessionPollConfig {
            max_attempts: 3,
            base_delay_ms: 10,
        },
        mock_delay_ms: delay_ms,
    }
}

fn local_client(delay_ms: u64) -> AuthClient {
    AuthClient::new(Arc::new(LocalBackend::new(&local_config(delay_ms))))
}

// The local backend is a development stand-in: sessions here are synthesized
// in memory and nothing is persisted anywhere.
#[tokio::test]
async fn mock_sign_in_synthesizes_a_student_session() {
    let client = local_client(50);

    let started = Instant::now();
    let session = client.sign_in("a@b.com", "x").await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(session.email, "a@b.com");
    assert_eq!(session.role, UserRole::Student);
    assert_eq!(session.profile.as_ref().unwrap().name(), "a");
    assert!(session.id.starts_with("local-"));
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn sign_up_returns_the_requested_role_and_name() {
    let client = local_client(0);

    let session = client
        .sign_up(SignUpRequest {
            email: "umm.kulthum@example.com".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Teacher,
            name: "Umm Kulthum".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(session.role, UserRole::Teacher);
    let profile = session.profile.expect("sign-up seeds a profile");
    assert_eq!(profile.name(), "Umm Kulthum");
    match profile {
        Profile::Teacher(teacher) => {
            assert!(!teacher.is_verified);
            assert_eq!(teacher.rating, rust_decimal::Decimal::ZERO);
            assert_eq!(teacher.languages, vec!["Arabic".to_string()]);
        }
        Profile::Student(_) => panic!("expected a teacher profile"),
    }
}

#[tokio::test]
async fn sign_out_is_idempotent_when_signed_out() {
    let client = local_client(0);

    client.sign_out().await;
    assert!(client.current_session().is_none());

    client.sign_out().await;
    assert!(client.current_session().is_none());
    assert!(!client.is_loading());
}

#[tokio::test]
async fn loading_settles_after_success_and_failure() {
    let client = Arc::new(local_client(100));
    assert!(!client.is_loading());

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.sign_in("hafsa@example.com", "pw").await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(client.is_loading());

    pending.await.unwrap().unwrap();
    assert!(!client.is_loading());

    // A rejected call settles too.
    let err = client
        .sign_up(SignUpRequest {
            email: "not-an-email".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Student,
            name: "X".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(!client.is_loading());

    client.sign_out().await;
    assert!(!client.is_loading());
}

#[tokio::test]
async fn update_profile_replaces_the_session_profile() {
    let client = local_client(0);
    client
        .sign_up(SignUpRequest {
            email: "imran@example.com".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Student,
            name: "Imran".to_string(),
        })
        .await
        .unwrap();

    let session = client
        .update_profile(ProfilePatch::Student(StudentProfilePatch {
            age: Some(9),
            level: Some(LearningLevel::Intermediate),
            ..Default::default()
        }))
        .await
        .unwrap();

    match session.profile.unwrap() {
        Profile::Student(student) => {
            assert_eq!(student.name, "Imran");
            assert_eq!(student.age, Some(9));
            assert_eq!(student.level, LearningLevel::Intermediate);
        }
        Profile::Teacher(_) => panic!("expected a student profile"),
    }
}

#[tokio::test]
async fn update_profile_requires_a_session() {
    let client = local_client(0);
    let err = client
        .update_profile(ProfilePatch::Student(Default::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotSignedIn));
}

#[tokio::test]
async fn restore_rebuilds_the_session_from_backend_state() {
    let backend = Arc::new(LocalBackend::new(&local_config(0)));
    let client = AuthClient::new(backend);

    assert!(client.restore().await.unwrap().is_none());

    client.sign_in("maryam@example.com", "pw").await.unwrap();
    let restored = client.restore().await.unwrap().unwrap();
    assert_eq!(restored.email, "maryam@example.com");
    assert_eq!(client.current_session().unwrap().email, "maryam@example.com");
}

#[tokio::test]
async fn subscribers_see_sign_in_and_sign_out() {
    let client = local_client(0);
    let mut state = client.subscribe();

    client.sign_in("observer@example.com", "pw").await.unwrap();
    state.changed().await.unwrap();
    assert!(state.borrow().session.is_some());

    client.sign_out().await;
    assert!(state.borrow_and_update().session.is_none());
}

/// Backend that holds sign-in calls until released, with an externally
/// drivable event channel. Everything else delegates to the local backend.
struct StallingBackend {
    inner: LocalBackend,
    release: Arc<Notify>,
    events: broadcast::Sender<AuthEvent>,
}

#[async_trait]
impl AuthBackend for StallingBackend {
    async fn test_connection(&self) -> bool {
        self.inner.test_connection().await
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<Session, AppError> {
        self.inner.sign_up(request).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        self.release.notified().await;
        self.inner.sign_in(email, password).await
    }

    async fn sign_out(&self) {
        self.inner.sign_out().await;
    }

    async fn restore_session(&self) -> Result<Option<Session>, AppError> {
        self.inner.restore_session().await
    }

    async fn resolve_profile(&self, identity: &Identity) -> Result<Option<Profile>, AppError> {
        self.inner.resolve_profile(identity).await
    }

    async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile, AppError> {
        self.inner.update_profile(patch).await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[tokio::test]
async fn signed_out_event_wins_over_a_pending_sign_in() {
    let release = Arc::new(Notify::new());
    let (events, _) = broadcast::channel(8);
    let backend = Arc::new(StallingBackend {
        inner: LocalBackend::new(&local_config(0)),
        release: Arc::clone(&release),
        events: events.clone(),
    });
    let client = Arc::new(AuthClient::new(backend as Arc<dyn AuthBackend>));

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.sign_in("late@example.com", "pw").await }
    });

    // Let the sign-in take its ticket, then deliver a sign-out event.
    tokio::time::sleep(Duration::from_millis(30)).await;
    events.send(AuthEvent::SignedOut).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    release.notify_one();
    let session = pending.await.unwrap().unwrap();

    // The call itself resolves, but its result is stale: the store kept the
    // newer signed-out state.
    assert_eq!(session.email, "late@example.com");
    assert!(client.current_session().is_none());
    assert!(!client.is_loading());
}

#[tokio::test]
async fn token_refresh_events_replace_the_session() {
    let release = Arc::new(Notify::new());
    let (events, _) = broadcast::channel(8);
    let inner = LocalBackend::new(&local_config(0));
    let backend = Arc::new(StallingBackend {
        inner,
        release: Arc::clone(&release),
        events: events.clone(),
    });
    let client = AuthClient::new(Arc::clone(&backend) as Arc<dyn AuthBackend>);

    // Seed a record the event path can resolve against.
    let session = backend
        .sign_up(&SignUpRequest {
            email: "khalid@example.com".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Teacher,
            name: "Khalid".to_string(),
        })
        .await
        .unwrap();

    events
        .send(AuthEvent::TokenRefreshed(session.identity()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let current = client.current_session().expect("event populated the session");
    assert_eq!(current.email, "khalid@example.com");
    assert_eq!(current.profile.unwrap().name(), "Khalid");
}
