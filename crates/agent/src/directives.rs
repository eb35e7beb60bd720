use chrono::{DateTime, FixedOffset};
use emissary_core::MeetingPurpose;
use serde::Deserialize;
use thiserror::Error;

const SHOW_MEETING_FORM_TAG: &str = "SHOW_MEETING_FORM";
const SEND_RESUME_TAG: &str = "SEND_RESUME:";
const SCHEDULE_MEETING_TAG: &str = "SCHEDULE_MEETING:";

#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("malformed SCHEDULE_MEETING payload: {0}")]
    Malformed(String),
}

/// Payload of a `SCHEDULE_MEETING:` directive as the model emits it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ScheduleCommand {
    pub purpose: MeetingPurpose,
    pub datetime: DateTime<FixedOffset>,
    pub duration: u32,
    pub attendees: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    ShowMeetingForm,
    SendResume(String),
    ScheduleMeeting(ScheduleCommand),
}

/// Scans assistant text for the single actionable directive. The tags are a
/// verbatim contract with the model: no whitespace is tolerated around the
/// colon, and only the first matching tag counts. Match order is fixed as
/// form, then resume, then scheduling.
pub fn extract_directive(text: &str) -> Result<Option<Directive>, DirectiveError> {
    if text.contains(SHOW_MEETING_FORM_TAG) {
        return Ok(Some(Directive::ShowMeetingForm));
    }

    if let Some(email) = token_after(text, SEND_RESUME_TAG) {
        return Ok(Some(Directive::SendResume(email.to_string())));
    }

    if let Some(start) = text.find(SCHEDULE_MEETING_TAG) {
        let rest = &text[start + SCHEDULE_MEETING_TAG.len()..];
        let payload = rest.lines().next().unwrap_or("").trim();
        if payload.is_empty() {
            return Ok(None);
        }
        let command = serde_json::from_str(payload)
            .map_err(|error| DirectiveError::Malformed(error.to_string()))?;
        return Ok(Some(Directive::ScheduleMeeting(command)));
    }

    Ok(None)
}

/// The contiguous non-whitespace run immediately after `tag`, or `None` when
/// the tag is absent or directly followed by whitespace.
fn token_after<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let start = text.find(tag)? + tag.len();
    let rest = &text[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let token = &rest[..end];
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use emissary_core::MeetingPurpose;

    use super::{extract_directive, Directive, DirectiveError};

    #[test]
    fn resume_email_is_extracted_exactly() {
        let directive = extract_directive(
            "I'll send Dana's resume to a@b.com right away. SEND_RESUME:a@b.com",
        )
        .expect("parses");
        assert_eq!(directive, Some(Directive::SendResume("a@b.com".to_string())));
    }

    #[test]
    fn space_after_the_resume_colon_does_not_match() {
        let directive = extract_directive("SEND_RESUME: a@b.com").expect("parses");
        assert_eq!(directive, None);
    }

    #[test]
    fn resume_email_stops_at_whitespace() {
        let directive =
            extract_directive("SEND_RESUME:a@b.com and that's done").expect("parses");
        assert_eq!(directive, Some(Directive::SendResume("a@b.com".to_string())));
    }

    #[test]
    fn schedule_payload_is_parsed_from_the_rest_of_the_line() {
        let text = concat!(
            "Booking it now. SCHEDULE_MEETING:",
            r#"{"purpose":"interview","datetime":"2025-01-10T15:00:00Z","duration":30,"attendees":["x@y.com"]}"#,
            "\nSee you there."
        );

        let directive = extract_directive(text).expect("parses");
        let Some(Directive::ScheduleMeeting(command)) = directive else {
            panic!("expected a schedule directive, got {directive:?}");
        };
        assert_eq!(command.purpose, MeetingPurpose::Interview);
        assert_eq!(command.duration, 30);
        assert_eq!(command.attendees, vec!["x@y.com".to_string()]);
    }

    #[test]
    fn invalid_schedule_json_is_a_malformed_directive() {
        let error = extract_directive("SCHEDULE_MEETING:tomorrow at noon").expect_err("must fail");
        assert!(matches!(error, DirectiveError::Malformed(_)));
    }

    #[test]
    fn schedule_tag_with_nothing_after_it_is_ignored() {
        assert_eq!(extract_directive("SCHEDULE_MEETING:").expect("parses"), None);
    }

    #[test]
    fn form_tag_wins_over_other_directives() {
        let directive =
            extract_directive("SHOW_MEETING_FORM SEND_RESUME:a@b.com").expect("parses");
        assert_eq!(directive, Some(Directive::ShowMeetingForm));
    }

    #[test]
    fn resume_wins_over_scheduling_when_both_are_present() {
        let text = r#"SEND_RESUME:a@b.com SCHEDULE_MEETING:{"purpose":"other"}"#;
        let directive = extract_directive(text).expect("parses");
        assert_eq!(directive, Some(Directive::SendResume("a@b.com".to_string())));
    }

    #[test]
    fn plain_text_contains_no_directive() {
        assert_eq!(extract_directive("Happy to help with anything else.").expect("parses"), None);
    }
}
