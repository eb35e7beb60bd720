use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingPurpose {
    Interview,
    Followup,
    Technical,
    Other,
}

impl MeetingPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interview => "interview",
            Self::Followup => "followup",
            Self::Technical => "technical",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "interview" => Some(Self::Interview),
            "followup" | "follow-up" | "follow_up" => Some(Self::Followup),
            "technical" => Some(Self::Technical),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Wall-clock window within a single day, `start < end`, minute precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Everything needed to place a meeting on the calendar. Built up across
/// turns by the orchestrator and treated as immutable once handed to the
/// scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingDetails {
    pub purpose: MeetingPurpose,
    pub duration_minutes: u32,
    pub preferred_dates: Vec<NaiveDate>,
    pub preferred_time_ranges: Vec<TimeRange>,
    pub attendees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[default]
    Idle,
    Collecting,
    Complete,
}

/// Fields the extraction pass may pull out of a single user message. All
/// optional; an empty value means "nothing found", which is not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMeetingInfo {
    #[serde(default)]
    pub purpose: Option<MeetingPurpose>,
    #[serde(default)]
    pub datetime: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

impl PartialMeetingInfo {
    pub fn is_empty(&self) -> bool {
        self.purpose.is_none()
            && self.datetime.is_none()
            && self.duration_minutes.is_none()
            && self.attendees.as_ref().map(Vec::is_empty).unwrap_or(true)
    }
}

/// Per-conversation meeting-collection state. One instance per session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingContext {
    pub status: MeetingStatus,
    pub purpose: Option<MeetingPurpose>,
    pub datetime: Option<DateTime<FixedOffset>>,
    pub duration_minutes: Option<u32>,
    pub attendees: Vec<String>,
}

impl MeetingContext {
    pub fn begin_collecting(&mut self) {
        if self.status == MeetingStatus::Idle {
            self.status = MeetingStatus::Collecting;
        }
    }

    /// Merges extracted fields into the context. A present field is never
    /// replaced by an absent one, and merging always keeps the context in
    /// (at least) the collecting state.
    pub fn merge(&mut self, partial: PartialMeetingInfo) {
        if let Some(purpose) = partial.purpose {
            self.purpose = Some(purpose);
        }
        if let Some(datetime) = partial.datetime {
            self.datetime = Some(datetime);
        }
        if let Some(duration) = partial.duration_minutes {
            self.duration_minutes = Some(duration);
        }
        if let Some(attendees) = partial.attendees {
            if !attendees.is_empty() {
                self.attendees = attendees;
            }
        }

        if self.status == MeetingStatus::Idle {
            self.status = MeetingStatus::Collecting;
        }
        if self.status == MeetingStatus::Collecting && self.missing_fields().is_empty() {
            self.status = MeetingStatus::Complete;
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.purpose.is_none() {
            missing.push("purpose");
        }
        if self.datetime.is_none() {
            missing.push("datetime");
        }
        if self.duration_minutes.is_none() {
            missing.push("duration");
        }
        if self.attendees.is_empty() {
            missing.push("attendees");
        }
        missing
    }

    /// Terminal per schedule attempt: success or failure, the next attempt
    /// starts a fresh collecting cycle.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
