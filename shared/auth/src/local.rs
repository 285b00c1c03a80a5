use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use maqraa_common::{AppError, AvailabilityStatus, LearningLevel, ProviderConfig, UserRole};

use crate::backend::AuthBackend;
use crate::events::AuthEvent;
use crate::models::{
    default_languages, Identity, Profile, ProfilePatch, Session, SignUpRequest, StudentProfile,
    TeacherProfile,
};

/// Non-persistent stand-in for the hosted provider, selected when the
/// provider is unconfigured. Development and demo use only: nothing
/// survives the process, and the fixed delay simulates network latency.
pub struct LocalBackend {
    records: DashMap<String, LocalRecord>,
    current: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
    delay: Duration,
}

#[derive(Debug, Clone)]
struct LocalRecord {
    identity: Identity,
    profile: Option<Profile>,
}

impl LocalBackend {
    pub fn new(config: &ProviderConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            records: DashMap::new(),
            current: Mutex::new(None),
            events,
            delay: Duration::from_millis(config.mock_delay_ms),
        }
    }

    fn local_id() -> String {
        format!("local-{}", Utc::now().timestamp_millis())
    }

    fn seeded_profile(role: UserRole, user_id: &str, name: &str) -> Profile {
        let now = Utc::now();
        match role {
            UserRole::Student => Profile::Student(StudentProfile {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                name: name.to_string(),
                profile_image_url: None,
                age: None,
                level: LearningLevel::Beginner,
                goals: Vec::new(),
                preferred_schedule: None,
                created_at: now,
                updated_at: now,
            }),
            UserRole::Teacher => Profile::Teacher(TeacherProfile {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                name: name.to_string(),
                profile_image_url: None,
                specialization: None,
                experience_years: 0,
                hourly_rate: rust_decimal::Decimal::ZERO,
                bio: None,
                certificates: Vec::new(),
                languages: default_languages(),
                is_verified: false,
                rating: rust_decimal::Decimal::ZERO,
                students_count: 0,
                availability_status: AvailabilityStatus::Available,
                created_at: now,
                updated_at: now,
            }),
        }
    }

    fn set_current(&self, email: Option<String>) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = email;
    }

    fn current_email(&self) -> Option<String> {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuthBackend for LocalBackend {
    async fn test_connection(&self) -> bool {
        true
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<Session, AppError> {
        tokio::time::sleep(self.delay).await;

        let id = Self::local_id();
        let identity = Identity {
            id: id.clone(),
            email: request.email.clone(),
            role: request.role,
        };
        let profile = Self::seeded_profile(request.role, &id, &request.name);

        self.records.insert(
            request.email.clone(),
            LocalRecord {
                identity: identity.clone(),
                profile: Some(profile.clone()),
            },
        );
        self.set_current(Some(request.email.clone()));

        Ok(Session::new(identity, Some(profile)))
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<Session, AppError> {
        tokio::time::sleep(self.delay).await;

        let record = match self.records.get(email).map(|entry| entry.value().clone()) {
            Some(existing) => existing,
            None => {
                // Synthesized from the email alone: student role, name from
                // the local part.
                let id = Self::local_id();
                let name = email.split('@').next().unwrap_or(email).to_string();
                let record = LocalRecord {
                    identity: Identity {
                        id: id.clone(),
                        email: email.to_string(),
                        role: UserRole::Student,
                    },
                    profile: Some(Self::seeded_profile(UserRole::Student, &id, &name)),
                };
                self.records.insert(email.to_string(), record.clone());
                record
            }
        };
        self.set_current(Some(email.to_string()));

        Ok(Session::new(record.identity.clone(), record.profile))
    }

    async fn sign_out(&self) {
        self.set_current(None);
    }

    async fn restore_session(&self) -> Result<Option<Session>, AppError> {
        let Some(email) = self.current_email() else {
            return Ok(None);
        };
        Ok(self
            .records
            .get(&email)
            .map(|entry| entry.value().clone())
            .map(|record| Session::new(record.identity, record.profile)))
    }

    async fn resolve_profile(&self, identity: &Identity) -> Result<Option<Profile>, AppError> {
        Ok(self
            .records
            .get(&identity.email)
            .and_then(|entry| entry.value().profile.clone()))
    }

    async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile, AppError> {
        let email = self.current_email().ok_or(AppError::NotSignedIn)?;
        let mut record = self
            .records
            .get_mut(&email)
            .ok_or(AppError::NotSignedIn)?;

        let profile = record
            .value_mut()
            .profile
            .as_mut()
            .ok_or_else(|| AppError::ProfileStore("No profile to update".to_string()))?;

        match (profile, patch) {
            (Profile::Student(row), ProfilePatch::Student(fields)) => {
                row.apply(fields);
                Ok(Profile::Student(row.clone()))
            }
            (Profile::Teacher(row), ProfilePatch::Teacher(fields)) => {
                row.apply(fields);
                Ok(Profile::Teacher(row.clone()))
            }
            _ => Err(AppError::Validation(
                "Patch role does not match the signed-in role".to_string(),
            )),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
