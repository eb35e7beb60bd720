use chrono::{Duration, NaiveTime, Utc};
use emissary_calendar::{CalendarProvider, MeetingScheduler};
use emissary_core::{ChatMessage, MeetingDetails, MeetingStatus, PersonContext, TimeRange};
use emissary_ratelimit::{CounterStore, RateLimitError, RateLimiter, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::directives::{extract_directive, Directive, ScheduleCommand};
use crate::llm::{AiProviderError, ChatModel};
use crate::mailer::ResumeMailer;
use crate::prompt;
use crate::session::{mentions_scheduling, ConversationSession};

/// Failures that abort the turn. The session stays usable for the next turn;
/// directive side effects never surface here, they become transcript
/// messages instead.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] AiProviderError),
}

/// Messages appended during one turn, in transcript order, plus the flags
/// the caller surfaces to the UI.
#[derive(Clone, Debug, Default)]
pub struct TurnOutcome {
    pub messages: Vec<ChatMessage>,
    pub show_meeting_form: bool,
    pub rate_limited: bool,
}

/// Drives one conversation turn end to end: rate-limit gate, transcript
/// bookkeeping, the model call, and directive dispatch.
pub struct ConversationOrchestrator<M, P, R, S> {
    model: M,
    scheduler: MeetingScheduler<P>,
    mailer: R,
    limiter: RateLimiter<S>,
    person: PersonContext,
}

impl<M, P, R, S> ConversationOrchestrator<M, P, R, S>
where
    M: ChatModel,
    P: CalendarProvider,
    R: ResumeMailer,
    S: CounterStore,
{
    pub fn new(
        model: M,
        scheduler: MeetingScheduler<P>,
        mailer: R,
        limiter: RateLimiter<S>,
        person: PersonContext,
    ) -> Self {
        Self { model, scheduler, mailer, limiter, person }
    }

    pub fn limiter(&self) -> &RateLimiter<S> {
        &self.limiter
    }

    /// One turn, in fixed order: rate-limit check, append the user message,
    /// obtain and append the assistant message, then dispatch directives.
    /// Side effects only run once the assistant text is already part of the
    /// transcript, so a failed side effect never hides what the assistant
    /// claimed to do.
    pub async fn process_turn(
        &self,
        session: &mut ConversationSession,
        user_text: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let mut outcome = TurnOutcome::default();

        match self.limiter.check(session.identifier()).await {
            Ok(decision) => {
                debug!(identifier = session.identifier(), remaining = decision.remaining, "rate limit check passed");
            }
            Err(RateLimitError::Exceeded { limit, .. }) => {
                append(
                    session,
                    &mut outcome,
                    ChatMessage::assistant(format!(
                        "You have reached the message limit of {limit}. Please try again later."
                    )),
                );
                outcome.rate_limited = true;
                outcome.show_meeting_form = session.show_meeting_form;
                return Ok(outcome);
            }
            Err(RateLimitError::Store(error)) => return Err(error.into()),
        }

        append(session, &mut outcome, ChatMessage::user(user_text));

        if session.meeting.status == MeetingStatus::Collecting || mentions_scheduling(user_text) {
            session.meeting.begin_collecting();
            match self.model.parse_meeting_info(user_text).await {
                Ok(partial) if !partial.is_empty() => session.meeting.merge(partial),
                Ok(_) => {}
                Err(error) => {
                    warn!(%error, "meeting extraction failed, continuing without it");
                }
            }
        }

        let system_prompt = prompt::system_prompt(&self.person, &session.meeting);
        let assistant_text = self.model.complete(&system_prompt, user_text).await?;
        append(session, &mut outcome, ChatMessage::assistant(assistant_text.clone()));

        self.dispatch_directive(session, &assistant_text, &mut outcome).await;

        outcome.show_meeting_form = session.show_meeting_form;
        Ok(outcome)
    }

    /// Every dispatch failure is converted to a transcript message here; the
    /// turn itself never fails because a side effect did.
    async fn dispatch_directive(
        &self,
        session: &mut ConversationSession,
        assistant_text: &str,
        outcome: &mut TurnOutcome,
    ) {
        match extract_directive(assistant_text) {
            Ok(None) => {}
            Ok(Some(Directive::ShowMeetingForm)) => {
                session.show_meeting_form = true;
                session.meeting.begin_collecting();
            }
            Ok(Some(Directive::SendResume(email))) => {
                self.send_resume(session, &email, outcome).await;
            }
            Ok(Some(Directive::ScheduleMeeting(command))) => {
                self.schedule(session, &command, outcome).await;
            }
            Err(error) => {
                warn!(%error, "assistant emitted an unreadable scheduling directive");
                append(
                    session,
                    outcome,
                    ChatMessage::assistant(
                        "I couldn't read the meeting details. Please share the purpose, \
                         date and time, duration, and attendee emails again.",
                    ),
                );
                session.meeting.reset();
            }
        }
    }

    async fn send_resume(
        &self,
        session: &mut ConversationSession,
        email: &str,
        outcome: &mut TurnOutcome,
    ) {
        let name = self.person.information.name.clone();
        append(
            session,
            outcome,
            ChatMessage::assistant(format!("I'm sending {name}'s resume to {email} now...")),
        );

        match self.mailer.send_resume(email, &self.person).await {
            Ok(()) => {
                info!(email, "resume sent");
                append(
                    session,
                    outcome,
                    ChatMessage::assistant(format!(
                        "I've sent {name}'s resume to {email}. Please check your inbox. \
                         Let me know if you need anything else!"
                    )),
                );
            }
            Err(error) => {
                warn!(%error, email, "resume delivery failed");
                append(
                    session,
                    outcome,
                    ChatMessage::assistant(format!(
                        "I apologize, but I couldn't send the resume to {email}. Could you \
                         please try again or use a different email address?"
                    )),
                );
            }
        }
    }

    async fn schedule(
        &self,
        session: &mut ConversationSession,
        command: &ScheduleCommand,
        outcome: &mut TurnOutcome,
    ) {
        append(session, outcome, ChatMessage::assistant("Scheduling your meeting..."));

        let details = meeting_details(command);
        match self.scheduler.schedule_meeting(&details).await {
            Ok(event) => {
                let mut confirmation = format!(
                    "Meeting scheduled successfully!\nPurpose: {}\nTime: {}\nAttendees: {}",
                    command.purpose.as_str(),
                    command.datetime.format("%Y-%m-%d %H:%M %:z"),
                    command.attendees.join(", "),
                );
                if let Some(link) = &event.meet_link {
                    confirmation.push_str(&format!("\nMeet link: {link}"));
                }
                append(session, outcome, ChatMessage::assistant(confirmation));
            }
            Err(error) => {
                warn!(%error, "meeting scheduling failed");
                append(
                    session,
                    outcome,
                    ChatMessage::assistant(
                        "Sorry, I encountered an error while scheduling the meeting. \
                         Please try again or reach out directly.",
                    ),
                );
            }
        }

        // Terminal per attempt: the next request starts a fresh cycle.
        session.meeting.reset();
    }
}

/// The directive carries one concrete start time; the scheduler works on
/// date and time-range preferences, so the command becomes a single-slot
/// window of exactly the requested duration. A time range never spans two
/// days, so a window that would cross midnight is clamped at the end of the
/// meeting's own day and resolves to the no-slot reply.
fn meeting_details(command: &ScheduleCommand) -> MeetingDetails {
    let start = command.datetime.with_timezone(&Utc);
    let requested_end = start.time() + Duration::minutes(i64::from(command.duration));
    let end = if requested_end > start.time() {
        requested_end
    } else {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(start.time())
    };

    MeetingDetails {
        purpose: command.purpose,
        duration_minutes: command.duration,
        preferred_dates: vec![start.date_naive()],
        preferred_time_ranges: vec![TimeRange { start: start.time(), end }],
        attendees: command.attendees.clone(),
        notes: None,
    }
}

fn append(session: &mut ConversationSession, outcome: &mut TurnOutcome, message: ChatMessage) {
    session.push(message.clone());
    outcome.messages.push(message);
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use emissary_calendar::{BusyInterval, FixedBusyCalendar, MeetingScheduler};
    use emissary_core::{MeetingPurpose, MeetingStatus, PartialMeetingInfo, Role};
    use emissary_ratelimit::{CounterSnapshot, CounterStore, MemoryStore, RateLimiter, StoreError};

    use super::{ConversationOrchestrator, TurnError};
    use crate::directives::ScheduleCommand;
    use crate::llm::{AiProviderError, ChatModel};
    use crate::mailer::RecordingMailer;
    use crate::session::tests_support::person_fixture;
    use crate::session::ConversationSession;

    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        partial: PartialMeetingInfo,
    }

    impl ScriptedModel {
        fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
                partial: PartialMeetingInfo::default(),
            }
        }

        fn with_partial(mut self, partial: PartialMeetingInfo) -> Self {
            self.partial = partial;
            self
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_text: &str,
        ) -> Result<String, AiProviderError> {
            Ok(self
                .replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| "Happy to help.".to_string()))
        }

        async fn parse_meeting_info(
            &self,
            _user_text: &str,
        ) -> Result<PartialMeetingInfo, AiProviderError> {
            Ok(self.partial.clone())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn increment_with_window(
            &self,
            _key: &str,
            _window_secs: u64,
        ) -> Result<i64, StoreError> {
            Err(StoreError::Transport("store offline".to_string()))
        }

        async fn read(&self, _key: &str) -> Result<CounterSnapshot, StoreError> {
            Err(StoreError::Transport("store offline".to_string()))
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_text: &str,
        ) -> Result<String, AiProviderError> {
            Err(AiProviderError::Transport("connection refused".to_string()))
        }

        async fn parse_meeting_info(
            &self,
            _user_text: &str,
        ) -> Result<PartialMeetingInfo, AiProviderError> {
            Ok(PartialMeetingInfo::default())
        }
    }

    fn orchestrator<M: ChatModel>(
        model: M,
        mailer: RecordingMailer,
        busy: Vec<BusyInterval>,
        limit: u32,
    ) -> ConversationOrchestrator<M, FixedBusyCalendar, RecordingMailer, MemoryStore> {
        ConversationOrchestrator::new(
            model,
            MeetingScheduler::new(FixedBusyCalendar::new(busy)),
            mailer,
            RateLimiter::new(MemoryStore::new(), limit, 3600),
            person_fixture(),
        )
    }

    const SCHEDULE_REPLY: &str = concat!(
        "Booking that now. SCHEDULE_MEETING:",
        r#"{"purpose":"interview","datetime":"2025-01-10T15:00:00Z","duration":30,"attendees":["x@y.com"]}"#,
    );

    #[tokio::test]
    async fn schedule_directive_appends_a_confirmation() {
        let orchestrator = orchestrator(
            ScriptedModel::replying(&[SCHEDULE_REPLY]),
            RecordingMailer::new(),
            Vec::new(),
            10,
        );
        let mut session = ConversationSession::new("client");

        let outcome =
            orchestrator.process_turn(&mut session, "book it please").await.expect("turn runs");

        // user message, assistant directive, progress note, confirmation
        assert_eq!(outcome.messages.len(), 4);
        assert_eq!(outcome.messages[0].role, Role::User);
        let confirmation = &outcome.messages[3].content;
        assert!(confirmation.contains("interview"), "missing purpose: {confirmation}");
        assert!(confirmation.contains("x@y.com"), "missing attendee: {confirmation}");
        assert!(confirmation.contains("Meet link"), "missing link: {confirmation}");
        assert_eq!(session.meeting.status, MeetingStatus::Idle);
    }

    #[tokio::test]
    async fn resume_directive_sends_and_confirms() {
        let orchestrator = orchestrator(
            ScriptedModel::replying(&["On it. SEND_RESUME:recruiter@corp.com"]),
            RecordingMailer::new(),
            Vec::new(),
            10,
        );
        let mut session = ConversationSession::new("client");

        let outcome = orchestrator
            .process_turn(&mut session, "send it to recruiter@corp.com")
            .await
            .expect("turn runs");

        assert_eq!(orchestrator.mailer.sent_to(), vec!["recruiter@corp.com".to_string()]);
        // user, assistant, sending note, success note
        assert_eq!(outcome.messages.len(), 4);
        assert!(outcome.messages[2].content.contains("sending Dana's resume"));
        assert!(outcome.messages[3].content.contains("recruiter@corp.com"));
    }

    #[tokio::test]
    async fn resume_failure_becomes_an_apology_message() {
        let orchestrator = orchestrator(
            ScriptedModel::replying(&["On it. SEND_RESUME:recruiter@corp.com"]),
            RecordingMailer::failing(),
            Vec::new(),
            10,
        );
        let mut session = ConversationSession::new("client");

        let outcome =
            orchestrator.process_turn(&mut session, "send it").await.expect("turn still runs");

        let apology = &outcome.messages.last().expect("messages appended").content;
        assert!(apology.contains("couldn't send the resume to recruiter@corp.com"));
    }

    #[tokio::test]
    async fn spaced_resume_tag_triggers_nothing() {
        let orchestrator = orchestrator(
            ScriptedModel::replying(&["SEND_RESUME: recruiter@corp.com"]),
            RecordingMailer::new(),
            Vec::new(),
            10,
        );
        let mut session = ConversationSession::new("client");

        let outcome =
            orchestrator.process_turn(&mut session, "send it").await.expect("turn runs");

        assert!(orchestrator.mailer.sent_to().is_empty());
        assert_eq!(outcome.messages.len(), 2);
    }

    #[tokio::test]
    async fn malformed_schedule_payload_asks_to_try_again() {
        let orchestrator = orchestrator(
            ScriptedModel::replying(&["SCHEDULE_MEETING:tomorrow at noon"]),
            RecordingMailer::new(),
            Vec::new(),
            10,
        );
        let mut session = ConversationSession::new("client");

        let outcome =
            orchestrator.process_turn(&mut session, "book it").await.expect("turn still runs");

        assert!(outcome.messages.last().unwrap().content.contains("couldn't read the meeting details"));
        assert_eq!(session.meeting.status, MeetingStatus::Idle);
    }

    #[tokio::test]
    async fn third_message_over_a_limit_of_two_is_rejected() {
        let orchestrator =
            orchestrator(ScriptedModel::replying(&[]), RecordingMailer::new(), Vec::new(), 2);
        let mut session = ConversationSession::new("client");

        orchestrator.process_turn(&mut session, "one").await.expect("first turn");
        orchestrator.process_turn(&mut session, "two").await.expect("second turn");
        let outcome = orchestrator.process_turn(&mut session, "three").await.expect("third turn");

        assert!(outcome.rate_limited);
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0].content.contains("message limit"));
        // The rejected user message is not part of the transcript.
        assert_eq!(session.transcript().len(), 5);
    }

    #[tokio::test]
    async fn form_directive_flips_the_flag_and_starts_collecting() {
        let orchestrator = orchestrator(
            ScriptedModel::replying(&[
                "I'll help you schedule a meeting with Dana. SHOW_MEETING_FORM",
            ]),
            RecordingMailer::new(),
            Vec::new(),
            10,
        );
        let mut session = ConversationSession::new("client");

        let outcome = orchestrator
            .process_turn(&mut session, "tell me about Dana")
            .await
            .expect("turn runs");

        assert!(outcome.show_meeting_form);
        assert_eq!(session.meeting.status, MeetingStatus::Collecting);
    }

    #[tokio::test]
    async fn scheduling_intent_starts_collection_and_merges_extracted_fields() {
        let model = ScriptedModel::replying(&["What time works for you?"]).with_partial(
            PartialMeetingInfo {
                purpose: Some(MeetingPurpose::Interview),
                ..PartialMeetingInfo::default()
            },
        );
        let orchestrator = orchestrator(model, RecordingMailer::new(), Vec::new(), 10);
        let mut session = ConversationSession::new("client");

        orchestrator
            .process_turn(&mut session, "I'd like to schedule an interview")
            .await
            .expect("turn runs");

        assert_eq!(session.meeting.status, MeetingStatus::Collecting);
        assert_eq!(session.meeting.purpose, Some(MeetingPurpose::Interview));
        assert_eq!(session.meeting.missing_fields(), vec!["datetime", "duration", "attendees"]);
    }

    #[tokio::test]
    async fn unreachable_store_blocks_the_turn_without_appending() {
        let orchestrator = ConversationOrchestrator::new(
            ScriptedModel::replying(&["never reached"]),
            MeetingScheduler::new(FixedBusyCalendar::new(Vec::new())),
            RecordingMailer::new(),
            RateLimiter::new(FailingStore, 10, 3600),
            person_fixture(),
        );
        let mut session = ConversationSession::new("client");

        let error =
            orchestrator.process_turn(&mut session, "hello").await.expect_err("turn blocks");

        assert!(matches!(error, TurnError::Store(_)));
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn model_failure_aborts_the_turn_but_keeps_the_user_message() {
        let orchestrator = orchestrator(FailingModel, RecordingMailer::new(), Vec::new(), 10);
        let mut session = ConversationSession::new("client");

        let error =
            orchestrator.process_turn(&mut session, "hello").await.expect_err("turn aborts");

        assert!(matches!(error, TurnError::Model(_)));
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].content, "hello");

        // The next turn still works.
        let outcome = ConversationOrchestrator::new(
            ScriptedModel::replying(&["hi!"]),
            MeetingScheduler::new(FixedBusyCalendar::new(Vec::new())),
            RecordingMailer::new(),
            RateLimiter::new(MemoryStore::new(), 10, 3600),
            person_fixture(),
        )
        .process_turn(&mut session, "hello again")
        .await
        .expect("conversation recovers");
        assert_eq!(outcome.messages.len(), 2);
    }

    #[test]
    fn cross_midnight_directive_window_is_clamped_within_the_day() {
        let command = ScheduleCommand {
            purpose: MeetingPurpose::Interview,
            datetime: "2025-01-10T23:45:00+00:00".parse().expect("valid timestamp"),
            duration: 30,
            attendees: vec!["x@y.com".to_string()],
        };

        let details = super::meeting_details(&command);
        let range = details.preferred_time_ranges[0];
        assert!(range.start < range.end, "range must stay ordered: {range:?}");
        assert_eq!(
            details.preferred_dates,
            vec![chrono::NaiveDate::from_ymd_opt(2025, 1, 10).expect("valid date")]
        );
    }

    #[tokio::test]
    async fn cross_midnight_schedule_resolves_to_the_failure_reply() {
        const LATE_REPLY: &str = concat!(
            "Booking that now. SCHEDULE_MEETING:",
            r#"{"purpose":"interview","datetime":"2025-01-10T23:45:00Z","duration":30,"attendees":["x@y.com"]}"#,
        );
        let orchestrator = orchestrator(
            ScriptedModel::replying(&[LATE_REPLY]),
            RecordingMailer::new(),
            Vec::new(),
            10,
        );
        let mut session = ConversationSession::new("client");

        let outcome =
            orchestrator.process_turn(&mut session, "book it").await.expect("turn still runs");

        assert!(outcome.messages.last().unwrap().content.contains("error while scheduling"));
        assert_eq!(session.meeting.status, MeetingStatus::Idle);
    }

    #[tokio::test]
    async fn busy_calendar_turns_schedule_into_a_failure_message() {
        let busy = vec![BusyInterval {
            start: "2025-01-10T14:00:00Z".parse().unwrap(),
            end: "2025-01-10T16:00:00Z".parse().unwrap(),
        }];
        let orchestrator =
            orchestrator(ScriptedModel::replying(&[SCHEDULE_REPLY]), RecordingMailer::new(), busy, 10);
        let mut session = ConversationSession::new("client");

        let outcome =
            orchestrator.process_turn(&mut session, "book it").await.expect("turn still runs");

        assert!(outcome.messages.last().unwrap().content.contains("error while scheduling"));
        assert_eq!(session.meeting.status, MeetingStatus::Idle);
    }
}
