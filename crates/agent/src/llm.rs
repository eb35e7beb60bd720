use std::time::Duration;

use async_trait::async_trait;
use emissary_core::PartialMeetingInfo;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AiProviderError {
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model returned an unexpected response: {0}")]
    Protocol(String),
}

/// Language-model collaborator. `parse_meeting_info` fails only on transport
/// or protocol problems; a message with no meeting details in it yields an
/// empty [`PartialMeetingInfo`], not an error.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, AiProviderError>;

    async fn parse_meeting_info(
        &self,
        user_text: &str,
    ) -> Result<PartialMeetingInfo, AiProviderError>;
}

#[async_trait]
impl ChatModel for Box<dyn ChatModel> {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, AiProviderError> {
        (**self).complete(system_prompt, user_text).await
    }

    async fn parse_meeting_info(
        &self,
        user_text: &str,
    ) -> Result<PartialMeetingInfo, AiProviderError> {
        (**self).parse_meeting_info(user_text).await
    }
}

const EXTRACTION_PROMPT: &str = "Extract meeting details from the user's message. \
Respond with a single JSON object using only these keys: \
\"purpose\" (one of \"interview\", \"followup\", \"technical\", \"other\"), \
\"datetime\" (ISO-8601 with offset), \"duration_minutes\" (integer), \
\"attendees\" (array of email addresses). \
Omit every key the message does not provide. Respond with {} when nothing is present. \
No prose, no code fences.";

pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, AiProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AiProviderError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature,
        })
    }

    async fn chat(&self, system_prompt: &str, user_text: &str) -> Result<String, AiProviderError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_text },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| AiProviderError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AiProviderError::Transport(format!("completion returned {status}")));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| AiProviderError::Protocol(error.to_string()))?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiProviderError::Protocol("completion without content".to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, AiProviderError> {
        self.chat(system_prompt, user_text).await
    }

    async fn parse_meeting_info(
        &self,
        user_text: &str,
    ) -> Result<PartialMeetingInfo, AiProviderError> {
        let raw = self.chat(EXTRACTION_PROMPT, user_text).await?;
        Ok(parse_extraction(&raw))
    }
}

pub struct GeminiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
}

impl GeminiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, AiProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AiProviderError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature,
        })
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, AiProviderError> {
        // Gemini takes one flat prompt rather than role-tagged messages.
        let prompt = format!("{system_prompt}\n\nUser: {user_text}");
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": "text/plain",
            },
        });

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| AiProviderError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AiProviderError::Transport(format!("generation returned {status}")));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| AiProviderError::Protocol(error.to_string()))?;

        parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiProviderError::Protocol("candidate without text".to_string()))
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, AiProviderError> {
        self.generate(system_prompt, user_text).await
    }

    async fn parse_meeting_info(
        &self,
        user_text: &str,
    ) -> Result<PartialMeetingInfo, AiProviderError> {
        let raw = self.generate(EXTRACTION_PROMPT, user_text).await?;
        Ok(parse_extraction(&raw))
    }
}

/// Best-effort decode of the extraction reply. Models occasionally wrap the
/// object in code fences or prose despite instructions, so the first JSON
/// object found in the text is used. Undecodable replies count as "nothing
/// found".
fn parse_extraction(raw: &str) -> PartialMeetingInfo {
    let Some(start) = raw.find('{') else {
        return PartialMeetingInfo::default();
    };
    let Some(end) = raw.rfind('}') else {
        return PartialMeetingInfo::default();
    };
    if end < start {
        return PartialMeetingInfo::default();
    }

    serde_json::from_str(&raw[start..=end]).unwrap_or_else(|error| {
        warn!(%error, "extraction reply did not decode, treating as empty");
        PartialMeetingInfo::default()
    })
}

#[cfg(test)]
mod tests {
    use emissary_core::MeetingPurpose;

    use super::parse_extraction;

    #[test]
    fn plain_json_object_decodes() {
        let partial = parse_extraction(
            r#"{"purpose":"interview","duration_minutes":45,"attendees":["x@y.com"]}"#,
        );
        assert_eq!(partial.purpose, Some(MeetingPurpose::Interview));
        assert_eq!(partial.duration_minutes, Some(45));
        assert_eq!(partial.attendees, Some(vec!["x@y.com".to_string()]));
        assert_eq!(partial.datetime, None);
    }

    #[test]
    fn fenced_json_decodes() {
        let partial =
            parse_extraction("```json\n{\"purpose\":\"technical\"}\n```");
        assert_eq!(partial.purpose, Some(MeetingPurpose::Technical));
    }

    #[test]
    fn empty_object_means_nothing_found() {
        assert!(parse_extraction("{}").is_empty());
    }

    #[test]
    fn prose_without_json_means_nothing_found() {
        assert!(parse_extraction("the user did not mention a meeting").is_empty());
    }

    #[test]
    fn undecodable_reply_means_nothing_found() {
        assert!(parse_extraction("{\"purpose\": \"coffee chat\"}").is_empty());
    }
}
