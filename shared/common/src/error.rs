use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Cannot reach server: {0}")]
    Connectivity(String),

    /// Rejection from the identity provider; the message is relayed
    /// verbatim so the UI can show it.
    #[error("{0}")]
    Provider(String),

    #[error("Profile store error: {0}")]
    ProfileStore(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Connectivity(_) => "CONNECTIVITY_ERROR",
            AppError::Provider(_) => "PROVIDER_REJECTED",
            AppError::ProfileStore(_) => "PROFILE_STORE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotSignedIn => "NOT_SIGNED_IN",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AppError::Connectivity(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}
