use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use emberboard::config::Config;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

/// HMAC key used so tests can mint their own reset tokens.
const TEST_TOKEN_KEY: &str = "integration-test-token-key";

async fn spawn_app() -> (Router, Arc<emberboard::api::AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // A single pooled connection keeps every query on the same in-memory db.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.security.reset_token_key = TEST_TOKEN_KEY.to_string();
    config.server.secure_cookies = false;

    let state = emberboard::api::create_app_state_from_config(config)
        .await
        .expect("Failed to create app state");
    (emberboard::api::router(state.clone()), state)
}

fn form_request(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

async fn signup(app: &Router, username: &str, password: &str, email: &str) -> StatusCode {
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/signup",
            format!("username={username}&password={password}&email={email}"),
        ))
        .await
        .unwrap();
    response.status()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_signup_logs_in_and_redirects() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/signup",
            "username=alice&password=hunter2&email=alice@example.com&next=/submit".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/submit");
    assert!(response.headers().contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_signup_validation_failures() {
    let (app, _) = spawn_app().await;

    assert_eq!(
        signup(&app, "bob", "pw", "bob@example.com").await,
        StatusCode::SEE_OTHER
    );

    // Same username again, even with a different email.
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/signup",
            "username=bob&password=other&email=other@example.com".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "User already exists");

    // Empty password.
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/signup",
            "username=carol&password=&email=carol@example.com".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Malformed email.
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/signup",
            "username=dave&password=pw&email=not-an-email".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Email already registered to an active account.
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/signup",
            "username=bob2&password=pw&email=bob@example.com".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn test_login_with_username_and_email() {
    let (app, _) = spawn_app().await;
    signup(&app, "erin", "s3cret", "erin@example.com").await;

    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/login",
            "username=erin&password=s3cret".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    // Email works as the identifier, case-insensitively.
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/login",
            "username=Erin@Example.com&password=s3cret".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_login_failures_are_uniform() {
    let (app, _) = spawn_app().await;
    signup(&app, "frank", "rightpw", "frank@example.com").await;

    let cases = [
        "username=frank&password=wrongpw",
        "username=nobody&password=whatever",
        "username=ghost@example.com&password=whatever",
    ];

    for body in cases {
        let response = app
            .clone()
            .oneshot(form_request("/accounts/login", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "body: {body}");
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid credentials");
    }
}

#[tokio::test]
async fn test_logout() {
    let (app, _) = spawn_app().await;
    signup(&app, "grace", "pw123", "grace@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/accounts/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_activation_redirects_uniformly() {
    let (app, state) = spawn_app().await;
    signup(&app, "heidi", "pw123", "heidi@example.com").await;

    let user = state
        .store
        .get_user_by_username("heidi")
        .await
        .unwrap()
        .unwrap();

    // Wrong key: same redirect as success, no error leaked.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/accounts/activate/{}/{}", user.id, "0".repeat(64)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    // Unknown user id: still the same redirect.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/accounts/activate/99999/{}", user.activation_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    // Correct key.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/accounts/activate/{}/{}",
                    user.id, user.activation_key
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert!(response.headers().contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_reset_request_unknown_user() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/reset_password",
            "username=nobody".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "This username does not exist.");
}

#[tokio::test]
async fn test_reset_request_known_user_succeeds_without_mail_gateway() {
    let (app, _) = spawn_app().await;
    signup(&app, "ivan", "pw123", "ivan@example.com").await;

    // No BREVO key configured: delivery is skipped but the flow still
    // reports success.
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/reset_password",
            "username=ivan".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(
        json["data"]["message"],
        "A password reset link has been sent to your email."
    );
}

#[tokio::test]
async fn test_reset_confirm_rejects_bad_links() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/accounts/reset_password_confirm/!!!/whatever-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_full_password_reset_flow() {
    use emberboard::services::ResetTokenService;
    use emberboard::services::reset_token::encode_uid;

    let (app, state) = spawn_app().await;
    signup(&app, "judy", "oldpassword", "judy@example.com").await;

    let (user, password_hash) = state
        .store
        .get_user_by_username_with_password("judy")
        .await
        .unwrap()
        .unwrap();

    // Mint the same token the emailed link would carry.
    let tokens = ResetTokenService::new(TEST_TOKEN_KEY.as_bytes().to_vec(), 72);
    let token = tokens.issue(user.id, &password_hash);
    let uid = encode_uid(user.id);
    let confirm_uri = format!("/accounts/reset_password_confirm/{uid}/{token}");

    // Step 1: the link validates.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&confirm_uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["valid_link"], true);

    // Step 2: submit the new password.
    let response = app
        .clone()
        .oneshot(form_request(
            &confirm_uri,
            "new_password=newpassword".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json["data"]["message"],
        "Your password has been reset successfully."
    );

    // The consumed link is dead for both steps.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&confirm_uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    let response = app
        .clone()
        .oneshot(form_request(
            &confirm_uri,
            "new_password=sneaky".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    // Old password no longer works, new one does.
    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/login",
            "username=judy&password=oldpassword".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(form_request(
            "/accounts/login",
            "username=judy&password=newpassword".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["database"], "ok");
    assert_eq!(json["data"]["version"], env!("CARGO_PKG_VERSION"));
}
