use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;

use maqraa_auth::{AuthClient, Profile, SignUpRequest};
use maqraa_common::{AppError, ProviderConfig, SessionPollConfig, UserRole};

const USER_ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

fn live_config(base: &str) -> ProviderConfig {
    ProviderConfig {
        url: Some(base.to_string()),
        anon_key: Some("anon-key".to_string()),
        http_timeout_secs: 5,
        session_poll: SessionPollConfig {
            max_attempts: 3,
            base_delay_ms: 10,
        },
        mock_delay_ms: 0,
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Echo the sign-up metadata back the way the provider does.
async fn signup_handler(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!({
        "access_token": "at-1",
        "refresh_token": "rt-1",
        "expires_in": 3600,
        "user": {
            "id": USER_ID,
            "email": body["email"],
            "user_metadata": body["data"],
            "created_at": "2026-02-01T10:00:00Z",
        },
    }))
}

/// Store a profile row: echo the insert body plus server-side columns.
async fn insert_row(Json(mut body): Json<serde_json::Value>) -> (StatusCode, Json<serde_json::Value>) {
    let row = body.as_object_mut().unwrap();
    row.insert("id".to_string(), json!("0a1b6f51-9d4c-4f5e-8a3d-2c7b1e9f0a4d"));
    row.insert("created_at".to_string(), json!("2026-02-01T10:00:00Z"));
    row.insert("updated_at".to_string(), json!("2026-02-01T10:00:00Z"));
    (StatusCode::CREATED, Json(body))
}

fn user_json(role: &str, name: &str) -> serde_json::Value {
    json!({
        "id": USER_ID,
        "email": "user@example.com",
        "user_metadata": { "role": role, "name": name },
        "created_at": "2026-02-01T10:00:00Z",
    })
}

#[tokio::test]
async fn live_sign_up_creates_a_seeded_teacher_profile() {
    let app = Router::new()
        .route("/auth/v1/signup", post(signup_handler))
        .route(
            "/auth/v1/user",
            get(|| async { Json(user_json("teacher", "Aisha")) }),
        )
        .route("/rest/v1/teacher_profiles", post(insert_row));
    let base = serve(app).await;

    let client = AuthClient::from_config(&live_config(&base)).unwrap();
    let session = client
        .sign_up(SignUpRequest {
            email: "aisha@example.com".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Teacher,
            name: "Aisha".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(session.role, UserRole::Teacher);
    assert_eq!(session.id, USER_ID);
    match session.profile.expect("profile row inserted") {
        Profile::Teacher(teacher) => {
            assert_eq!(teacher.name, "Aisha");
            assert_eq!(teacher.user_id, USER_ID);
            assert!(!teacher.is_verified);
            assert_eq!(teacher.rating, rust_decimal::Decimal::ZERO);
            assert_eq!(teacher.languages, vec!["Arabic".to_string()]);
        }
        Profile::Student(_) => panic!("expected a teacher profile"),
    }
    assert!(!client.is_loading());
}

#[tokio::test]
async fn live_sign_in_defaults_to_student_without_role_metadata() {
    let app = Router::new()
        .route(
            "/auth/v1/token",
            post(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("grant_type").map(String::as_str), Some("password"));
                Json(json!({
                    "access_token": "at-2",
                    "refresh_token": "rt-2",
                    "expires_in": 3600,
                    "user": {
                        "id": USER_ID,
                        "email": "norole@example.com",
                        "user_metadata": {},
                        "created_at": "2026-02-01T10:00:00Z",
                    },
                }))
            }),
        )
        .route(
            "/rest/v1/student_profiles",
            get(|| async {
                (
                    StatusCode::NOT_ACCEPTABLE,
                    Json(json!({
                        "code": "PGRST116",
                        "message": "JSON object requested, multiple (or no) rows returned",
                    })),
                )
            }),
        );
    let base = serve(app).await;

    let client = AuthClient::from_config(&live_config(&base)).unwrap();
    let session = client.sign_in("norole@example.com", "secret1").await.unwrap();

    // No role metadata resolves as student; a missing profile row is a
    // valid signed-in state, not an error.
    assert_eq!(session.role, UserRole::Student);
    assert!(session.profile.is_none());
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn profile_insert_failure_still_resolves_sign_up() {
    let app = Router::new()
        .route("/auth/v1/signup", post(signup_handler))
        .route(
            "/auth/v1/user",
            get(|| async { Json(user_json("student", "Bilal")) }),
        )
        .route(
            "/rest/v1/student_profiles",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "permission denied for table student_profiles" })),
                )
            }),
        );
    let base = serve(app).await;

    let client = AuthClient::from_config(&live_config(&base)).unwrap();
    let session = client
        .sign_up(SignUpRequest {
            email: "bilal@example.com".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Student,
            name: "Bilal".to_string(),
        })
        .await
        .expect("identity creation succeeded, profile failure is tolerated");

    assert_eq!(session.role, UserRole::Student);
    assert!(session.profile.is_none());
    assert!(client.is_authenticated());
    assert!(!client.is_loading());
}

#[tokio::test]
async fn provider_rejection_surfaces_verbatim_and_settles() {
    let app = Router::new().route(
        "/auth/v1/signup",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "msg": "User already registered" })),
            )
        }),
    );
    let base = serve(app).await;

    let client = AuthClient::from_config(&live_config(&base)).unwrap();
    let err = client
        .sign_up(SignUpRequest {
            email: "taken@example.com".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Student,
            name: "Taken".to_string(),
        })
        .await
        .unwrap_err();

    match err {
        AppError::Provider(message) => assert_eq!(message, "User already registered"),
        other => panic!("expected provider rejection, got {other:?}"),
    }
    assert!(client.current_session().is_none());
    assert!(!client.is_loading());
}

#[tokio::test]
async fn live_sign_out_clears_locally_even_if_the_provider_fails() {
    let app = Router::new()
        .route(
            "/auth/v1/token",
            post(|| async {
                Json(json!({
                    "access_token": "at-3",
                    "refresh_token": "rt-3",
                    "expires_in": 3600,
                    "user": {
                        "id": USER_ID,
                        "email": "leaver@example.com",
                        "user_metadata": { "role": "student", "name": "Leaver" },
                        "created_at": "2026-02-01T10:00:00Z",
                    },
                }))
            }),
        )
        .route(
            "/rest/v1/student_profiles",
            get(|| async {
                (
                    StatusCode::NOT_ACCEPTABLE,
                    Json(json!({ "code": "PGRST116", "message": "no rows" })),
                )
            }),
        )
        .route(
            "/auth/v1/logout",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "msg": "logout backend unavailable" })),
                )
            }),
        );
    let base = serve(app).await;

    let client = AuthClient::from_config(&live_config(&base)).unwrap();
    client.sign_in("leaver@example.com", "secret1").await.unwrap();
    assert!(client.is_authenticated());

    client.sign_out().await;
    assert!(client.current_session().is_none());
    assert!(!client.is_loading());
}
