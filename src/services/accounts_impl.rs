//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::clients::{Dispatch, MailClient};
use crate::config::SecurityConfig;
use crate::db::{CreateUserError, Store, User};
use crate::services::accounts::{
    AccountError, AccountService, ActivationOutcome, ResetStage, SessionUser,
};
use crate::services::reset_token::{ResetTokenService, decode_uid, encode_uid};

/// Pragmatic email-syntax check, equivalent in spirit to the usual
/// one-@-with-a-dotted-domain validators. Not RFC 5321 complete.
pub fn is_valid_email(candidate: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$")
            .expect("Invalid regex pattern defined in code")
    });
    re.is_match(candidate)
}

pub struct SeaOrmAccountService {
    store: Store,
    tokens: Arc<ResetTokenService>,
    mail: Arc<MailClient>,
    security: SecurityConfig,
    public_url: String,
}

impl SeaOrmAccountService {
    #[must_use]
    pub fn new(
        store: Store,
        tokens: Arc<ResetTokenService>,
        mail: Arc<MailClient>,
        security: SecurityConfig,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tokens,
            mail,
            security,
            public_url: public_url.into(),
        }
    }

    fn session_user(user: &User) -> SessionUser {
        SessionUser {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn signup(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<SessionUser, AccountError> {
        let username = username.trim();
        let password = password.trim();
        let email = email.trim();

        // Uniqueness is checked on the raw username; login-by-email lookups
        // lower-case separately.
        if self.store.get_user_by_username(username).await?.is_some() {
            info!("username {username} already exists");
            return Err(AccountError::DuplicateUsername);
        }

        if password.is_empty() {
            info!("signup rejected: empty password");
            return Err(AccountError::EmptyPassword);
        }

        if !is_valid_email(email) {
            info!("signup rejected: not valid email: {email}");
            return Err(AccountError::InvalidEmail(email.to_string()));
        }

        if !self.store.find_active_users_by_email(email).await?.is_empty() {
            info!("email {email} already exists");
            return Err(AccountError::DuplicateActiveEmail(email.to_string()));
        }

        // Accounts are activated immediately on signup; the emailed
        // activation pathway stays available for deferred flows.
        let user = self
            .store
            .create_user(username, email, password, true, &self.security)
            .await
            .map_err(|e| match e {
                // A concurrent signup won the race after our pre-checks
                // passed; report it exactly like the pre-check would have.
                CreateUserError::DuplicateUsername => AccountError::DuplicateUsername,
                CreateUserError::DuplicateActiveEmail => {
                    AccountError::DuplicateActiveEmail(email.to_string())
                }
                CreateUserError::Database(err) => AccountError::Database(err.to_string()),
                CreateUserError::Internal(err) => AccountError::Internal(err.to_string()),
            })?;

        info!("{username} has just signed up and is now logged in");
        Ok(Self::session_user(&user))
    }

    async fn login(&self, identifier: &str, password: &str) -> Result<SessionUser, AccountError> {
        let identifier = identifier.trim().to_lowercase();

        let username = if is_valid_email(&identifier) {
            let matches = self.store.find_active_users_by_email(&identifier).await?;
            match matches.as_slice() {
                [user] => user.username.clone(),
                [] => {
                    info!("{identifier} cannot be authenticated: no active account");
                    return Err(AccountError::AmbiguousOrMissingAccount);
                }
                _ => {
                    // Should be impossible under the partial unique index.
                    warn!("multiple active accounts share email {identifier}");
                    return Err(AccountError::AmbiguousOrMissingAccount);
                }
            }
        } else {
            identifier.clone()
        };

        let is_valid = self.store.verify_user_password(&username, password).await?;
        if !is_valid {
            info!("{identifier} cannot be authenticated");
            return Err(AccountError::InvalidCredentials);
        }

        let user = self
            .store
            .get_user_by_username(&username)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        info!("{} has just logged in", user.username);
        Ok(Self::session_user(&user))
    }

    async fn activate(
        &self,
        user_id: i32,
        activation_key: &str,
    ) -> Result<ActivationOutcome, AccountError> {
        let Some(user) = self.store.get_user_by_id(user_id).await? else {
            info!("unable to activate user {user_id}: not found");
            return Ok(ActivationOutcome::Failed);
        };

        if user.activation_key != activation_key {
            info!("unable to activate user {user_id}: key mismatch");
            return Ok(ActivationOutcome::Failed);
        }

        info!("activating user {user_id}");
        self.store.activate_user(user_id).await?;

        Ok(ActivationOutcome::Activated(Self::session_user(&user)))
    }

    async fn request_password_reset(&self, username: &str) -> Result<(), AccountError> {
        let username = username.trim();

        let Some((user, password_hash)) = self
            .store
            .get_user_by_username_with_password(username)
            .await?
        else {
            return Err(AccountError::NoSuchUser);
        };

        let uid = encode_uid(user.id);
        let token = self.tokens.issue(user.id, &password_hash);
        let reset_link = format!(
            "{}/accounts/reset_password_confirm/{uid}/{token}",
            self.public_url.trim_end_matches('/')
        );

        match self
            .mail
            .send_reset_email(&user.email, &user.username, &reset_link)
            .await
        {
            Dispatch::Sent => {}
            Dispatch::Failed => {
                warn!("reset email for {username} failed to send; user was told it succeeded");
            }
            Dispatch::NotConfigured => {
                warn!("reset email for {username} skipped: mail gateway not configured");
            }
        }

        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        uid_b64: &str,
        token: &str,
        new_password: Option<&str>,
    ) -> Result<ResetStage, AccountError> {
        let Some(user_id) = decode_uid(uid_b64) else {
            return Err(AccountError::InvalidLink);
        };

        let Some((user, password_hash)) = self.store.get_user_by_id_with_password(user_id).await?
        else {
            return Err(AccountError::InvalidLink);
        };

        if !self.tokens.validate(token, user.id, &password_hash) {
            return Err(AccountError::ExpiredOrInvalidLink);
        }

        let Some(new_password) = new_password else {
            return Ok(ResetStage::FormReady);
        };

        let new_password = new_password.trim();
        if new_password.is_empty() {
            return Err(AccountError::EmptyPassword);
        }

        // Overwriting the hash retires this token and any siblings.
        self.store
            .update_user_password(user.id, new_password, &self.security)
            .await?;

        info!("password reset completed for {}", user.username);
        Ok(ResetStage::PasswordChanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        assert!(is_valid_email("alice@x.com"));
        assert!(is_valid_email("first.last+tag@sub.domain.co"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("@nouser.com"));
        assert!(!is_valid_email("two@@ats.com"));
        assert!(!is_valid_email(""));
    }
}
