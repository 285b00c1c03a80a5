use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use maqraa_common::{AvailabilityStatus, LearningLevel, UserRole};

/// The authenticated identity: issued by the hosted provider, or
/// synthesized by the local backend when the provider is unconfigured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: UserRole,
}

/// In-memory join of an Identity with its Profile, the shape the
/// application consumes. An empty profile is a valid signed-in state
/// (the UI prompts for profile completion); it is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub profile: Option<Profile>,
}

impl Session {
    pub fn new(identity: Identity, profile: Option<Profile>) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            role: identity.role,
            profile,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Role-specific profile row. Exactly one row exists per identity, in the
/// table matching its role, keyed by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Profile {
    Student(StudentProfile),
    Teacher(TeacherProfile),
}

impl Profile {
    pub fn name(&self) -> &str {
        match self {
            Profile::Student(profile) => &profile.name,
            Profile::Teacher(profile) => &profile.name,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Profile::Student(profile) => &profile.user_id,
            Profile::Teacher(profile) => &profile.user_id,
        }
    }

    pub fn role(&self) -> UserRole {
        match self {
            Profile::Student(_) => UserRole::Student,
            Profile::Teacher(_) => UserRole::Teacher,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub profile_image_url: Option<String>,
    pub age: Option<i32>,
    pub level: LearningLevel,
    #[serde(default)]
    pub goals: Vec<String>,
    pub preferred_schedule: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentProfile {
    /// In-place merge of a partial update, used by the local backend.
    pub fn apply(&mut self, patch: &StudentProfilePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(url) = &patch.profile_image_url {
            self.profile_image_url = Some(url.clone());
        }
        if let Some(age) = patch.age {
            self.age = Some(age);
        }
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(goals) = &patch.goals {
            self.goals = goals.clone();
        }
        if let Some(schedule) = &patch.preferred_schedule {
            self.preferred_schedule = Some(schedule.clone());
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub profile_image_url: Option<String>,
    pub specialization: Option<String>,
    pub experience_years: i32,
    pub hourly_rate: Decimal,
    pub bio: Option<String>,
    #[serde(default)]
    pub certificates: Vec<String>,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    pub is_verified: bool,
    pub rating: Decimal,
    pub students_count: i32,
    pub availability_status: AvailabilityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeacherProfile {
    pub fn apply(&mut self, patch: &TeacherProfilePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(url) = &patch.profile_image_url {
            self.profile_image_url = Some(url.clone());
        }
        if let Some(specialization) = &patch.specialization {
            self.specialization = Some(specialization.clone());
        }
        if let Some(years) = patch.experience_years {
            self.experience_years = years;
        }
        if let Some(rate) = patch.hourly_rate {
            self.hourly_rate = rate;
        }
        if let Some(bio) = &patch.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(certificates) = &patch.certificates {
            self.certificates = certificates.clone();
        }
        if let Some(languages) = &patch.languages {
            self.languages = languages.clone();
        }
        if let Some(status) = patch.availability_status {
            self.availability_status = status;
        }
        self.updated_at = Utc::now();
    }
}

pub fn default_languages() -> Vec<String> {
    vec!["Arabic".to_string()]
}

/// Insert seed for the student profile row created at sign-up.
#[derive(Debug, Clone, Serialize)]
pub struct NewStudentProfile {
    pub user_id: String,
    pub name: String,
    pub level: LearningLevel,
    pub goals: Vec<String>,
}

impl NewStudentProfile {
    pub fn new(user_id: &str, name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            level: LearningLevel::Beginner,
            goals: Vec::new(),
        }
    }
}

/// Insert seed for the teacher profile row created at sign-up. New teachers
/// start unverified with a zero rating and no students.
#[derive(Debug, Clone, Serialize)]
pub struct NewTeacherProfile {
    pub user_id: String,
    pub name: String,
    pub experience_years: i32,
    pub hourly_rate: Decimal,
    pub certificates: Vec<String>,
    pub languages: Vec<String>,
    pub is_verified: bool,
    pub rating: Decimal,
    pub students_count: i32,
    pub availability_status: AvailabilityStatus,
}

impl NewTeacherProfile {
    pub fn new(user_id: &str, name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            experience_years: 0,
            hourly_rate: Decimal::ZERO,
            certificates: Vec::new(),
            languages: default_languages(),
            is_verified: false,
            rating: Decimal::ZERO,
            students_count: 0,
            availability_status: AvailabilityStatus::Available,
        }
    }
}

/// Partial student profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LearningLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_schedule: Option<String>,
}

/// Partial teacher profile update. Verification, rating and student count
/// are platform-managed and not patchable from the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeacherProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_status: Option<AvailabilityStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProfilePatch {
    Student(StudentProfilePatch),
    Teacher(TeacherProfilePatch),
}

impl ProfilePatch {
    pub fn role(&self) -> UserRole {
        match self {
            ProfilePatch::Student(_) => UserRole::Student,
            ProfilePatch::Teacher(_) => UserRole::Teacher,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 6))]
    pub password: String,

    pub role: UserRole,

    #[validate(length(min = 1, max = 100))]
    pub name: String,
}
