use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use emissary_core::PersonContext;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("resume delivery failed: {0}")]
    Delivery(String),
}

/// Email collaborator for resume requests. Delivery content is owned by the
/// endpoint behind the implementation; the orchestrator only hands over the
/// recipient and the person profile.
#[async_trait]
pub trait ResumeMailer: Send + Sync {
    async fn send_resume(&self, to_email: &str, person: &PersonContext) -> Result<(), MailerError>;
}

#[async_trait]
impl ResumeMailer for Box<dyn ResumeMailer> {
    async fn send_resume(&self, to_email: &str, person: &PersonContext) -> Result<(), MailerError> {
        (**self).send_resume(to_email, person).await
    }
}

/// Posts resume requests to an external delivery endpoint.
pub struct HttpResumeMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpResumeMailer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| MailerError::Delivery(error.to_string()))?;

        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }
}

#[async_trait]
impl ResumeMailer for HttpResumeMailer {
    async fn send_resume(&self, to_email: &str, person: &PersonContext) -> Result<(), MailerError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "toEmail": to_email, "context": person }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| MailerError::Delivery(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailerError::Delivery(format!("delivery endpoint returned {status}")));
        }

        info!(to_email, "resume dispatched");
        Ok(())
    }
}

/// Test double that records recipients and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    fail: bool,
    sent: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true, sent: Mutex::new(Vec::new()) }
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ResumeMailer for RecordingMailer {
    async fn send_resume(
        &self,
        to_email: &str,
        _person: &PersonContext,
    ) -> Result<(), MailerError> {
        if self.fail {
            return Err(MailerError::Delivery("recording mailer set to fail".to_string()));
        }
        self.sent.lock().expect("sent lock").push(to_email.to_string());
        Ok(())
    }
}
