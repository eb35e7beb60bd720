use std::sync::Arc;
use std::time::Duration;

use emissary_agent::{
    AiProviderError, ChatModel, ConversationOrchestrator, GeminiChatModel, HttpResumeMailer,
    MailerError, OpenAiChatModel, ResumeMailer,
};
use emissary_calendar::{CalendarError, CalendarProvider, GoogleCalendarClient, MeetingScheduler};
use emissary_core::config::{AppConfig, ConfigError, LlmProvider, RateLimitBackend};
use emissary_core::{PersonContext, PersonLoadError};
use emissary_ratelimit::{CounterStore, MemoryStore, RateLimiter, StoreError, UpstashStore};
use thiserror::Error;
use tracing::info;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Orchestrator over the collaborator variants chosen at startup.
pub type Orchestrator = ConversationOrchestrator<
    Box<dyn ChatModel>,
    Box<dyn CalendarProvider>,
    Box<dyn ResumeMailer>,
    Box<dyn CounterStore>,
>;

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application").field("config", &self.config).finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Person(#[from] PersonLoadError),
    #[error("rate limit store setup failed: {0}")]
    Store(#[from] StoreError),
    #[error("calendar client setup failed: {0}")]
    Calendar(#[from] CalendarError),
    #[error("model client setup failed: {0}")]
    Model(#[from] AiProviderError),
    #[error("resume mailer setup failed: {0}")]
    Mailer(#[from] MailerError),
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),
}

pub fn build_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let person = PersonContext::load(&config.person.path)?;
    info!(
        event_name = "system.bootstrap.person_loaded",
        person = %person.information.name,
        assistant = %person.assistant.name,
        "person profile loaded"
    );

    let limiter = RateLimiter::new(
        build_store(&config)?,
        config.rate_limit.limit,
        config.rate_limit.window_secs,
    );
    let orchestrator = ConversationOrchestrator::new(
        build_model(&config)?,
        MeetingScheduler::new(build_calendar(&config)?),
        build_mailer(&config)?,
        limiter,
        person,
    );

    info!(
        event_name = "system.bootstrap.ready",
        llm_provider = ?config.llm.provider,
        rate_limit_backend = ?config.rate_limit.backend,
        "application collaborators constructed"
    );
    Ok(Application { config, orchestrator: Arc::new(orchestrator) })
}

fn build_store(config: &AppConfig) -> Result<Box<dyn CounterStore>, BootstrapError> {
    match config.rate_limit.backend {
        RateLimitBackend::Memory => Ok(Box::new(MemoryStore::new())),
        RateLimitBackend::Upstash => {
            let url = config
                .rate_limit
                .url
                .clone()
                .ok_or(BootstrapError::MissingSetting("rate_limit.url"))?;
            let token = config
                .rate_limit
                .token
                .clone()
                .ok_or(BootstrapError::MissingSetting("rate_limit.token"))?;
            Ok(Box::new(UpstashStore::new(url, token, STORE_TIMEOUT)?))
        }
    }
}

fn build_model(config: &AppConfig) -> Result<Box<dyn ChatModel>, BootstrapError> {
    let api_key =
        config.llm.api_key.clone().ok_or(BootstrapError::MissingSetting("llm.api_key"))?;
    let timeout = Duration::from_secs(config.llm.timeout_secs);

    match config.llm.provider {
        LlmProvider::OpenAi => {
            let base_url =
                config.llm.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Ok(Box::new(OpenAiChatModel::new(
                base_url,
                api_key,
                config.llm.model.clone(),
                config.llm.temperature,
                timeout,
            )?))
        }
        LlmProvider::Gemini => {
            let base_url =
                config.llm.base_url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string());
            Ok(Box::new(GeminiChatModel::new(
                base_url,
                api_key,
                config.llm.model.clone(),
                config.llm.temperature,
                timeout,
            )?))
        }
    }
}

fn build_calendar(config: &AppConfig) -> Result<Box<dyn CalendarProvider>, BootstrapError> {
    let access_token = config
        .calendar
        .access_token
        .clone()
        .ok_or(BootstrapError::MissingSetting("calendar.access_token"))?;

    Ok(Box::new(GoogleCalendarClient::new(
        config.calendar.base_url.clone(),
        config.calendar.calendar_id.clone(),
        access_token,
        Duration::from_secs(config.calendar.timeout_secs),
    )?))
}

fn build_mailer(config: &AppConfig) -> Result<Box<dyn ResumeMailer>, BootstrapError> {
    let endpoint =
        config.email.endpoint.clone().ok_or(BootstrapError::MissingSetting("email.endpoint"))?;

    Ok(Box::new(HttpResumeMailer::new(
        endpoint,
        config.email.api_key.clone(),
        Duration::from_secs(config.email.timeout_secs),
    )?))
}
