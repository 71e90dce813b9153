//! Transactional email client (Brevo-compatible HTTP API).
//!
//! Dispatch is best-effort: a missing credential or a failed request is
//! logged and reported through [`Dispatch`], never bubbled up as an error.
//! Account flows must not hinge on the mail provider being reachable.

use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::MailConfig;

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    Failed,
    /// No API credential configured; nothing was attempted.
    NotConfigured,
}

#[derive(Clone)]
pub struct MailClient {
    client: Client,
    config: MailConfig,
}

impl MailClient {
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
                .user_agent("Emberboard/1.0")
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    /// Send one HTML email, retrying transient failures with backoff.
    pub async fn send(&self, to: &str, subject: &str, html_body: &str) -> Dispatch {
        if self.config.api_key.is_empty() {
            warn!("Mail API key not configured; set BREVO_API_KEY. Email not sent.");
            return Dispatch::NotConfigured;
        }

        let payload = json!({
            "sender": {
                "name": self.config.sender_name,
                "email": self.config.sender_email,
            },
            "to": [{ "email": to }],
            "subject": subject,
            "htmlContent": html_body,
        });

        let mut delay = std::time::Duration::from_millis(self.config.retry_base_delay_ms);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            let result = self
                .client
                .post(&self.config.api_url)
                .header("api-key", &self.config.api_key)
                .header("Accept", "application/json")
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!("Email accepted by mail API (attempt {})", attempt + 1);
                    return Dispatch::Sent;
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!(
                        "Mail API rejected email (attempt {}): {} {}",
                        attempt + 1,
                        status,
                        body
                    );
                    // Client errors won't improve on retry
                    if status.is_client_error() {
                        return Dispatch::Failed;
                    }
                }
                Err(e) => {
                    warn!("Mail API request failed (attempt {}): {}", attempt + 1, e);
                }
            }
        }

        Dispatch::Failed
    }

    /// Password-reset email with the confirmation link.
    pub async fn send_reset_email(
        &self,
        to: &str,
        username: &str,
        reset_link: &str,
    ) -> Dispatch {
        let body = format!(
            "<p>Hi {username},</p>\
             <p>Someone requested a password reset for your account. \
             Follow this link to choose a new password:</p>\
             <p><a href=\"{reset_link}\">{reset_link}</a></p>\
             <p>If this wasn't you, you can ignore this email.</p>"
        );

        let outcome = self.send(to, "Password Reset Request", &body).await;
        if outcome == Dispatch::Sent {
            info!("Password reset email sent to {to}");
        }
        outcome
    }

    /// Account activation email. Signup currently activates immediately, so
    /// nothing sends this yet; the deferred-activation pathway uses it.
    pub async fn send_activation_email(
        &self,
        to: &str,
        username: &str,
        activation_link: &str,
    ) -> Dispatch {
        let body = format!(
            "<p>Hi {username},</p>\
             <p>Here is the link to activate your account:</p>\
             <p><a href=\"{activation_link}\">{activation_link}</a></p>\
             <p>Welcome aboard!</p>"
        );

        self.send(to, "Confirm your account", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credential_short_circuits() {
        let client = MailClient::new(MailConfig::default());

        let outcome = client.send("user@example.com", "subject", "<p>hi</p>").await;
        assert_eq!(outcome, Dispatch::NotConfigured);
    }
}
