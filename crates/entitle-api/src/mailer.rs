//! # HTTP Mailer
//!
//! Sends confirmation messages through a Resend-compatible mail API:
//! a JSON `POST` with a bearer key.

use async_trait::async_trait;
use entitle_core::{ConfirmationMessage, NotifyError, Notifier};
use entitle_stripe::ConfigError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_MAIL_API_URL: &str = "https://api.resend.com/emails";

/// Mail API configuration
#[derive(Debug)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: SecretString,
    /// Sender, e.g. `Entitle <billing@example.com>`
    pub from: String,
}

impl MailConfig {
    /// Load from `MAIL_API_KEY`, `MAIL_FROM` and optional `MAIL_API_URL`.
    ///
    /// Returns `Ok(None)` when no key is set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = lookup("MAIL_API_KEY").filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        let from = lookup("MAIL_FROM")
            .filter(|f| !f.is_empty())
            .ok_or(ConfigError::Missing("MAIL_FROM"))?;
        let api_url = lookup("MAIL_API_URL")
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_MAIL_API_URL.to_string());

        Ok(Some(Self {
            api_url,
            api_key: SecretString::new(api_key.into_boxed_str()),
            from,
        }))
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct MailErrorResponse {
    message: String,
}

pub struct HttpMailer {
    config: MailConfig,
    client: Client,
}

impl HttpMailer {
    pub fn new(config: MailConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    #[instrument(skip_all)]
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<(), NotifyError> {
        let text = message.text_body();
        let body = SendEmailRequest {
            from: &self.config.from,
            to: [&message.recipient],
            subject: message.subject(),
            text: &text,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<MailErrorResponse>(&raw)
                .map(|r| r.message)
                .unwrap_or(raw);
            return Err(NotifyError::Rejected {
                service: "mail",
                status: status.as_u16(),
                message,
            });
        }

        let id = serde_json::from_str::<SendEmailResponse>(&raw)
            .ok()
            .and_then(|r| r.id);
        debug!(message_id = ?id, "Mail API accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> ConfirmationMessage {
        ConfirmationMessage {
            recipient: "ada@example.com".into(),
            display_name: "Ada Lovelace".into(),
            renewal_date: None,
            amount: Some("$5.00".into()),
        }
    }

    fn mailer_for(server: &MockServer) -> HttpMailer {
        let config = MailConfig {
            api_url: format!("{}/emails", server.uri()),
            api_key: SecretString::new("re_test_key".into()),
            from: "Billing <billing@example.com>".into(),
        };
        HttpMailer::new(config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_sends_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("Authorization", "Bearer re_test_key"))
            .and(body_partial_json(json!({
                "from": "Billing <billing@example.com>",
                "to": ["ada@example.com"],
                "subject": "Thank you for subscribing!"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
            .expect(1)
            .mount(&server)
            .await;

        mailer_for(&server).send_confirmation(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "statusCode": 422,
                "name": "validation_error",
                "message": "Invalid `to` field."
            })))
            .mount(&server)
            .await;

        let err = mailer_for(&server).send_confirmation(&message()).await.unwrap_err();
        match err {
            NotifyError::Rejected { service, status, message } => {
                assert_eq!(service, "mail");
                assert_eq!(status, 422);
                assert_eq!(message, "Invalid `to` field.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mail_config_from_lookup() {
        let none: HashMap<&str, &str> = HashMap::new();
        assert!(MailConfig::from_lookup(|k| none.get(k).map(|v| v.to_string()))
            .unwrap()
            .is_none());

        let no_from: HashMap<&str, &str> = [("MAIL_API_KEY", "re_x")].into_iter().collect();
        assert_eq!(
            MailConfig::from_lookup(|k| no_from.get(k).map(|v| v.to_string())).unwrap_err(),
            ConfigError::Missing("MAIL_FROM")
        );

        let full: HashMap<&str, &str> = [("MAIL_API_KEY", "re_x"), ("MAIL_FROM", "a@b.c")]
            .into_iter()
            .collect();
        let config = MailConfig::from_lookup(|k| full.get(k).map(|v| v.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(config.api_url, DEFAULT_MAIL_API_URL);
        assert_eq!(config.api_key.expose_secret(), "re_x");
    }
}
