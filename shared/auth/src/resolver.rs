use chrono::Utc;
use serde_json::json;

use maqraa_common::{AppError, UserRole};
use maqraa_provider::TableClient;

use crate::models::{
    NewStudentProfile, NewTeacherProfile, Profile, ProfilePatch, StudentProfile, TeacherProfile,
};

pub const STUDENT_TABLE: &str = "student_profiles";
pub const TEACHER_TABLE: &str = "teacher_profiles";

/// Role-aware profile lookup, shared by sign-in, sign-up, session restore
/// and the session-event path. Selects the table from the role and queries
/// by `user_id` — never by the row's own primary id.
#[derive(Clone)]
pub struct ProfileResolver {
    tables: TableClient,
}

impl ProfileResolver {
    pub fn new(tables: TableClient) -> Self {
        Self { tables }
    }

    pub fn table_for(role: UserRole) -> &'static str {
        match role {
            UserRole::Student => STUDENT_TABLE,
            UserRole::Teacher => TEACHER_TABLE,
        }
    }

    /// Single row by `user_id`; `Ok(None)` when the profile does not exist
    /// yet. Transport and permission failures propagate for the caller to
    /// log and degrade on.
    pub async fn resolve(
        &self,
        role: UserRole,
        user_id: &str,
        access_token: Option<&str>,
    ) -> Result<Option<Profile>, AppError> {
        match role {
            UserRole::Student => Ok(self
                .tables
                .select_one::<StudentProfile>(STUDENT_TABLE, user_id, access_token)
                .await?
                .map(Profile::Student)),
            UserRole::Teacher => Ok(self
                .tables
                .select_one::<TeacherProfile>(TEACHER_TABLE, user_id, access_token)
                .await?
                .map(Profile::Teacher)),
        }
    }

    /// Insert the role-default profile row created at sign-up.
    pub async fn create_for_signup(
        &self,
        role: UserRole,
        user_id: &str,
        name: &str,
        access_token: Option<&str>,
    ) -> Result<Profile, AppError> {
        match role {
            UserRole::Student => {
                let seed = NewStudentProfile::new(user_id, name);
                let row: StudentProfile = self
                    .tables
                    .insert_one(STUDENT_TABLE, &seed, access_token)
                    .await?;
                Ok(Profile::Student(row))
            }
            UserRole::Teacher => {
                let seed = NewTeacherProfile::new(user_id, name);
                let row: TeacherProfile = self
                    .tables
                    .insert_one(TEACHER_TABLE, &seed, access_token)
                    .await?;
                Ok(Profile::Teacher(row))
            }
        }
    }

    /// Merge-upsert partial fields keyed by `user_id`, stamping
    /// `updated_at`, and return the stored row.
    pub async fn apply_patch(
        &self,
        patch: &ProfilePatch,
        user_id: &str,
        access_token: Option<&str>,
    ) -> Result<Profile, AppError> {
        let body = Self::patch_body(patch, user_id)?;
        match patch.role() {
            UserRole::Student => {
                let row: StudentProfile = self
                    .tables
                    .upsert_one(STUDENT_TABLE, &body, "user_id", access_token)
                    .await?;
                Ok(Profile::Student(row))
            }
            UserRole::Teacher => {
                let row: TeacherProfile = self
                    .tables
                    .upsert_one(TEACHER_TABLE, &body, "user_id", access_token)
                    .await?;
                Ok(Profile::Teacher(row))
            }
        }
    }

    fn patch_body(patch: &ProfilePatch, user_id: &str) -> Result<serde_json::Value, AppError> {
        let mut body = match patch {
            ProfilePatch::Student(fields) => serde_json::to_value(fields),
            ProfilePatch::Teacher(fields) => serde_json::to_value(fields),
        }
        .map_err(|e| AppError::Internal(format!("Failed to encode profile patch: {e}")))?;

        match body.as_object_mut() {
            Some(map) => {
                map.insert("user_id".to_string(), json!(user_id));
                map.insert("updated_at".to_string(), json!(Utc::now()));
                Ok(body)
            }
            None => Err(AppError::Internal(
                "Profile patch did not encode to an object".to_string(),
            )),
        }
    }
}
