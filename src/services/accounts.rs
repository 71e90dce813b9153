//! Domain service for the account lifecycle.
//!
//! Handles signup, login, activation, and the password-reset flow.

use serde::Serialize;
use thiserror::Error;

/// Errors specific to account operations.
///
/// Validation failures carry enough detail to show the user what went wrong;
/// credential failures deliberately do not distinguish "no such user" from
/// "wrong password" (the two map to identical responses upstream).
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("User already exists")]
    DuplicateUsername,

    #[error("empty password")]
    EmptyPassword,

    #[error("not valid email: {0}")]
    InvalidEmail(String),

    #[error("email {0} already exists for a user, please try to login")]
    DuplicateActiveEmail(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Email identifier resolved to zero or multiple active accounts.
    /// Rendered identically to [`AccountError::InvalidCredentials`] so the
    /// response does not leak which addresses exist.
    #[error("Invalid credentials")]
    AmbiguousOrMissingAccount,

    #[error("This username does not exist.")]
    NoSuchUser,

    #[error("The password reset link is invalid.")]
    InvalidLink,

    #[error("The password reset link is invalid or has expired.")]
    ExpiredOrInvalidLink,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Authenticated user handed to the session layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: i32,
    pub username: String,
}

/// Internal result of an activation attempt. The HTTP layer responds
/// uniformly either way; the distinction exists for logging and tests.
#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    Activated(SessionUser),
    Failed,
}

/// Where a reset confirmation landed in the two-step flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStage {
    /// Link validated, no password submitted yet: show the reset form.
    FormReady,
    /// New password accepted and stored; the link is now dead.
    PasswordChanged,
}

/// Domain service trait for the account lifecycle.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    /// Registers a user. The account is activated immediately and the
    /// caller should establish a session.
    ///
    /// # Errors
    ///
    /// Returns the specific validation failure (duplicate username, empty
    /// password, invalid or already-registered email).
    async fn signup(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<SessionUser, AccountError>;

    /// Authenticates by username or email address.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidCredentials`] (or its indistinguishable
    /// sibling [`AccountError::AmbiguousOrMissingAccount`]) on any failure.
    async fn login(&self, identifier: &str, password: &str) -> Result<SessionUser, AccountError>;

    /// Activates the account if the key matches. Best-effort: a missing user
    /// or wrong key is reported as [`ActivationOutcome::Failed`], not an error.
    async fn activate(
        &self,
        user_id: i32,
        activation_key: &str,
    ) -> Result<ActivationOutcome, AccountError>;

    /// Issues a reset token and emails the confirmation link. Mail delivery
    /// problems are logged, not surfaced; the flow reports success as long
    /// as the username exists.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::NoSuchUser`] for unknown usernames.
    async fn request_password_reset(&self, username: &str) -> Result<(), AccountError>;

    /// Validates a reset link, and if `new_password` is supplied, stores the
    /// new password (which retires the token).
    async fn confirm_password_reset(
        &self,
        uid_b64: &str,
        token: &str,
        new_password: Option<&str>,
    ) -> Result<ResetStage, AccountError>;
}
