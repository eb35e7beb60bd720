use emissary_core::{MeetingContext, MeetingStatus, PersonContext};

/// System prompt for the next completion. The base persona prompt is fixed
/// per person profile; while meeting details are being collected it gains a
/// block telling the model which fields to ask for next.
pub fn system_prompt(person: &PersonContext, meeting: &MeetingContext) -> String {
    let mut prompt = base_prompt(person);

    if meeting.status == MeetingStatus::Collecting {
        prompt.push_str("\nCurrently collecting meeting details:\n");
        if meeting.purpose.is_none() {
            prompt.push_str("- Ask for the purpose of the meeting\n");
        }
        if meeting.datetime.is_none() {
            prompt.push_str("- Ask for preferred date and time (with timezone)\n");
        }
        if meeting.duration_minutes.is_none() {
            prompt.push_str("- Ask for meeting duration\n");
        }
        if meeting.attendees.is_empty() {
            prompt.push_str("- Ask for attendee email addresses\n");
        }
        prompt.push_str(
            "Only ask for missing information one at a time. \
             Do not repeat questions for information already provided.",
        );
    }

    prompt
}

fn base_prompt(person: &PersonContext) -> String {
    let name = &person.information.name;
    let skills = person
        .professional
        .skills
        .iter()
        .map(|skill| format!("{} ({} years)", skill.name, skill.experience_years))
        .collect::<Vec<_>>()
        .join(", ");
    let remote = if person.preferences.remote_work {
        "Open to remote work"
    } else {
        "Prefers office-based"
    };

    format!(
        "You are {assistant}, {name}'s personal AI assistant. \
Your role is to represent {name} professionally and assist recruiters by answering \
questions about their background and career preferences.

Here's what you know about {name}:
- Current Position: {role} at {company}
- Location: {city}, {country}
- Technical Skills: {skills}
- Total Professional Experience: {experience} years
- Work Schedule: {routine}
- Job Search Status: {job_search}

Career Preferences:
- Preferred Location: {preferred_location}
- Minimum Expected Salary: {min_salary}
- Remote Work: {remote}

Your personality:
- Professional and courteous
- Knowledgeable about {name}'s experience and skills
- Direct but friendly in your responses
- Enthusiastic about {name}'s capabilities

Important Actions:
1. Resume Handling:
  - When someone asks for the resume, immediately respond with: \"I'll send {name}'s resume to [email] right away. SEND_RESUME:[email]\"
  - Do not ask for the email again if it's already provided
  - Always include the SEND_RESUME command when you have an email address
  - Format must be exactly: \"SEND_RESUME:email@example.com\" (no spaces around the colon)

2. Meeting Scheduling:
  - When someone wants to schedule a meeting, respond with: \"I'll help you schedule a meeting with {name}. SHOW_MEETING_FORM\"
  - Do not ask for meeting details, the form will collect them

Important Guidelines:
- Refer to {name} in the third person
- Do not share sensitive personal information
- If asked about skills or experience not listed, politely state that you can only speak to the information provided
- Encourage recruiters to reach out through proper professional channels for more detailed discussions
- Always confirm all details before scheduling and be flexible with rescheduling requests

Remember: You are speaking TO recruiters ABOUT {name}, not as them.
Always include SEND_RESUME:[email] in your response when you have an email address.",
        assistant = person.assistant.name,
        role = person.professional.current_role,
        company = person.professional.company,
        city = person.information.location.city,
        country = person.information.location.country,
        experience = person.professional.experience_years,
        routine = person.professional.current_routine,
        job_search = person.professional.job_search_status.as_str(),
        preferred_location = person.preferences.location,
        min_salary = person.preferences.min_salary,
    )
}

#[cfg(test)]
mod tests {
    use emissary_core::{MeetingContext, MeetingPurpose, PartialMeetingInfo};

    use super::system_prompt;
    use crate::session::tests_support::person_fixture;

    #[test]
    fn base_prompt_names_the_person_and_assistant() {
        let prompt = system_prompt(&person_fixture(), &MeetingContext::default());
        assert!(prompt.contains("You are Aria, Dana's personal AI assistant"));
        assert!(prompt.contains("Rust (5 years)"));
        assert!(!prompt.contains("Currently collecting meeting details"));
    }

    #[test]
    fn collecting_state_asks_only_for_missing_fields() {
        let mut meeting = MeetingContext::default();
        meeting.merge(PartialMeetingInfo {
            purpose: Some(MeetingPurpose::Interview),
            duration_minutes: Some(30),
            ..PartialMeetingInfo::default()
        });

        let prompt = system_prompt(&person_fixture(), &meeting);
        assert!(prompt.contains("Currently collecting meeting details"));
        assert!(prompt.contains("- Ask for preferred date and time (with timezone)\n"));
        assert!(prompt.contains("- Ask for attendee email addresses\n"));
        assert!(!prompt.contains("- Ask for the purpose of the meeting\n"));
        assert!(!prompt.contains("- Ask for meeting duration\n"));
        assert!(prompt.contains("one at a time"));
    }
}
