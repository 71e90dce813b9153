use axum::{
    Json,
    extract::{Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse, ResetLinkStatus};
use crate::services::{ActivationOutcome, ResetStage};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetRequestForm {
    pub username: String,
}

#[derive(Deserialize)]
pub struct ResetConfirmForm {
    pub new_password: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /accounts/signup
/// Register a new account; logs the user in and redirects on success.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(payload): Form<SignupForm>,
) -> Result<Redirect, ApiError> {
    let user = state
        .accounts
        .signup(&payload.username, &payload.password, &payload.email)
        .await?;

    establish_session(&session, &user.username).await?;

    Ok(Redirect::to(&safe_next(payload.next.as_deref())))
}

/// POST /accounts/login
/// Authenticate with username or email, redirects to `next` on success.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(payload): Form<LoginForm>,
) -> Result<Redirect, ApiError> {
    let user = state
        .accounts
        .login(&payload.username, &payload.password)
        .await?;

    establish_session(&session, &user.username).await?;

    Ok(Redirect::to(&safe_next(payload.next.as_deref())))
}

/// POST /accounts/logout
/// Invalidate the current session
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.flush().await;
    (StatusCode::OK, "Logged out")
}

/// GET /accounts/activate/{user_id}/{activation_key}
/// Best-effort activation: the redirect is uniform whether or not the key
/// matched, so the URL can't be probed for valid user ids.
pub async fn activate(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((user_id, activation_key)): Path<(i32, String)>,
) -> Result<Redirect, ApiError> {
    match state.accounts.activate(user_id, &activation_key).await? {
        ActivationOutcome::Activated(user) => {
            establish_session(&session, &user.username).await?;
        }
        ActivationOutcome::Failed => {}
    }

    Ok(Redirect::to("/"))
}

/// POST /accounts/reset_password
/// Issue a reset link by email. Mail problems are logged server-side; the
/// response claims success whenever the username exists.
pub async fn request_reset(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<ResetRequestForm>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .accounts
        .request_password_reset(&payload.username)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "A password reset link has been sent to your email.".to_string(),
    })))
}

/// GET /accounts/reset_password_confirm/{uid}/{token}
/// First step of the confirmation: prove the link is valid before the
/// client shows the new-password form.
pub async fn reset_confirm_form(
    State(state): State<Arc<AppState>>,
    Path((uid, token)): Path<(String, String)>,
) -> Result<Json<ApiResponse<ResetLinkStatus>>, ApiError> {
    state
        .accounts
        .confirm_password_reset(&uid, &token, None)
        .await?;

    Ok(Json(ApiResponse::success(ResetLinkStatus {
        valid_link: true,
    })))
}

/// POST /accounts/reset_password_confirm/{uid}/{token}
/// Second step: store the new password, which consumes the token.
pub async fn reset_confirm_submit(
    State(state): State<Arc<AppState>>,
    Path((uid, token)): Path<(String, String)>,
    Form(payload): Form<ResetConfirmForm>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let stage = state
        .accounts
        .confirm_password_reset(&uid, &token, Some(&payload.new_password))
        .await?;

    debug_assert_eq!(stage, ResetStage::PasswordChanged);

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Your password has been reset successfully.".to_string(),
    })))
}

// ============================================================================
// Helpers
// ============================================================================

async fn establish_session(session: &Session, username: &str) -> Result<(), ApiError> {
    session
        .insert("user", username)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))
}

/// Clamp a caller-supplied redirect target to a site-internal path.
/// Anything absolute, protocol-relative, or scheme-carrying falls back to
/// the index, closing the open-redirect hole.
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.contains("://") =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
