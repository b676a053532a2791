mod common;

use bookstore_api::{
    dto::auth::{LoginRequest, RegisterRequest},
    error::AppError,
    middleware::auth::decode_token,
    services::auth_service,
};
use chrono::Utc;

use common::{JWT_SECRET, setup_state};

fn login(login: &str, password: &str, remember_me: bool) -> LoginRequest {
    LoginRequest {
        login: login.to_string(),
        password: password.to_string(),
        remember_me,
    }
}

#[tokio::test]
async fn register_then_login_by_username_or_email() {
    let state = setup_state().await;

    let user = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "ana@example.com".to_string(),
            password: "correct horse".to_string(),
            username: None,
        },
    )
    .await
    .unwrap()
    .data
    .unwrap();
    assert_eq!(user.username, "ana");
    assert_eq!(user.roles, vec!["User"]);

    for identifier in ["ana", "ana@example.com"] {
        let session = auth_service::login_user(&state, login(identifier, "correct horse", false))
            .await
            .unwrap()
            .data
            .unwrap();
        assert_eq!(session.roles, vec!["User"]);

        let caller = decode_token(&session.token, JWT_SECRET).unwrap();
        assert_eq!(caller.user_id, user.id);
        assert!(!caller.is_admin());

        let ttl = session.expires_at - Utc::now().timestamp();
        assert!((29 * 60..=30 * 60).contains(&ttl), "ttl was {ttl}");
    }
}

#[tokio::test]
async fn remember_me_extends_the_token() {
    let state = setup_state().await;
    auth_service::register_user(
        &state,
        RegisterRequest {
            email: "ben@example.com".to_string(),
            password: "pw".to_string(),
            username: Some("benny".to_string()),
        },
    )
    .await
    .unwrap();

    let session = auth_service::login_user(&state, login("benny", "pw", true))
        .await
        .unwrap()
        .data
        .unwrap();
    let ttl = session.expires_at - Utc::now().timestamp();
    let week = 7 * 24 * 60 * 60;
    assert!((week - 60..=week).contains(&ttl), "ttl was {ttl}");
}

#[tokio::test]
async fn bad_credentials_share_one_message() {
    let state = setup_state().await;
    auth_service::register_user(
        &state,
        RegisterRequest {
            email: "ana@example.com".to_string(),
            password: "secret".to_string(),
            username: None,
        },
    )
    .await
    .unwrap();

    let wrong_password = auth_service::login_user(&state, login("ana", "nope", false)).await;
    let unknown_user = auth_service::login_user(&state, login("zoe", "secret", false)).await;
    match (wrong_password, unknown_user) {
        (Err(AppError::Unauthorized(a)), Err(AppError::Unauthorized(b))) => assert_eq!(a, b),
        other => panic!("expected two Unauthorized errors, got {other:?}"),
    }
}

#[tokio::test]
async fn registration_rejects_blank_and_duplicate_identities() {
    let state = setup_state().await;
    let register = |email: &str, username: Option<&str>| RegisterRequest {
        email: email.to_string(),
        password: "pw".to_string(),
        username: username.map(str::to_string),
    };

    let blank = auth_service::register_user(&state, register("  ", None)).await;
    assert!(matches!(blank, Err(AppError::BadRequest(_))));

    auth_service::register_user(&state, register("ana@example.com", None))
        .await
        .unwrap();

    let same_email = auth_service::register_user(&state, register("ana@example.com", Some("other"))).await;
    assert!(matches!(same_email, Err(AppError::BadRequest(_))));

    let same_username = auth_service::register_user(&state, register("ana@elsewhere.org", None)).await;
    assert!(matches!(same_username, Err(AppError::BadRequest(_))));
}
