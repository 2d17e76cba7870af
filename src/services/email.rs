use crate::core::config::EmailConfig;
use crate::core::context::RequestContext;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// A single outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Email-dispatch collaborator
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, ctx: &RequestContext, message: EmailMessage) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: Sender<'a>,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Sender<'a> {
    address: &'a str,
    name: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_address: String,
    from_name: String,
}

impl HttpEmailSender {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn request_body<'a>(&'a self, message: &'a EmailMessage) -> SendRequest<'a> {
        SendRequest {
            from: Sender {
                address: &self.from_address,
                name: &self.from_name,
            },
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, ctx: &RequestContext, message: EmailMessage) -> Result<()> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&message))
            .send();

        let response = tokio::select! {
            biased;
            _ = ctx.cancellation_token().cancelled() => bail!("request cancelled"),
            response = request => response.context("Failed to send request to mail relay")?,
        };

        if !response.status().is_success() {
            bail!(
                "Mail relay returned error status: {}",
                response.status()
            );
        }

        Ok(())
    }
}

/// Body of the password reset email
pub fn reset_password_message(to: &str, reset_url: &str, token: &str) -> EmailMessage {
    let separator = if reset_url.contains('?') { '&' } else { '?' };
    let link = format!("{}{}token={}", reset_url, separator, token);

    EmailMessage {
        to: to.to_string(),
        subject: "Hammergen password reset".to_string(),
        text: format!(
            "A password reset was requested for your Hammergen account.\n\n\
             Follow this link to choose a new password:\n{}\n\n\
             If you did not ask for this, ignore this email.",
            link
        ),
    }
}
