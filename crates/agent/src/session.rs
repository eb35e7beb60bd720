use emissary_core::{ChatMessage, MeetingContext};

const SCHEDULING_KEYWORDS: &[&str] =
    &["schedule", "meeting", "book a call", "appointment", "calendar", "availability"];

/// True when the user text looks like a scheduling request. Deliberately
/// loose: a false positive only triggers an extraction pass that finds
/// nothing.
pub fn mentions_scheduling(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    SCHEDULING_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// Everything the orchestrator tracks for one identifier: the transcript,
/// the meeting-collection machine, and the form flag the UI reads. The
/// caller owns the session and serializes access to it.
#[derive(Clone, Debug, Default)]
pub struct ConversationSession {
    identifier: String,
    transcript: Vec<ChatMessage>,
    pub meeting: MeetingContext,
    pub show_meeting_form: bool,
}

impl ConversationSession {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), ..Self::default() }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.transcript.push(message);
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }
}


#[cfg(test)]
mod tests {
    use emissary_core::ChatMessage;

    use super::{mentions_scheduling, ConversationSession};

    #[test]
    fn scheduling_keywords_are_detected_case_insensitively() {
        assert!(mentions_scheduling("Can we Schedule a call next week?"));
        assert!(mentions_scheduling("I'd like to set up a MEETING"));
        assert!(mentions_scheduling("what's your availability?"));
        assert!(!mentions_scheduling("Tell me about Dana's Rust experience"));
    }

    #[test]
    fn transcript_preserves_append_order() {
        let mut session = ConversationSession::new("203.0.113.9");
        session.push(ChatMessage::user("hello"));
        session.push(ChatMessage::assistant("hi, how can I help?"));

        assert_eq!(session.identifier(), "203.0.113.9");
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.transcript()[0].content, "hello");
    }
}
