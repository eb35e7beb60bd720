pub mod directives;
pub mod llm;
pub mod mailer;
pub mod orchestrator;
pub mod prompt;
pub mod session;

pub use directives::{extract_directive, Directive, DirectiveError, ScheduleCommand};
pub use llm::{AiProviderError, ChatModel, GeminiChatModel, OpenAiChatModel};
pub use mailer::{HttpResumeMailer, MailerError, RecordingMailer, ResumeMailer};
pub use orchestrator::{ConversationOrchestrator, TurnError, TurnOutcome};
pub use session::{mentions_scheduling, ConversationSession};
