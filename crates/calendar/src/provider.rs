use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::availability::BusyInterval;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar request failed: {0}")]
    Transport(String),
    #[error("calendar returned an unexpected response: {0}")]
    Protocol(String),
}

/// Event to create on the calendar. Attendees are plain email addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRequest {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub id: String,
    pub meet_link: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// External calendar backend. The scheduler only needs busy lookups and
/// event creation; everything else about the calendar stays behind this seam.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn query_busy(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError>;

    async fn insert_event(&self, event: EventRequest) -> Result<ScheduledEvent, CalendarError>;
}

#[async_trait]
impl CalendarProvider for Box<dyn CalendarProvider> {
    async fn query_busy(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        (**self).query_busy(range_start, range_end).await
    }

    async fn insert_event(&self, event: EventRequest) -> Result<ScheduledEvent, CalendarError> {
        (**self).insert_event(event).await
    }
}

/// Google Calendar v3 REST client. Busy lookups use `freeBusy.query`;
/// event creation attaches a Meet conference to every event.
pub struct GoogleCalendarClient {
    client: reqwest::Client,
    base_url: String,
    calendar_id: String,
    access_token: SecretString,
}

impl GoogleCalendarClient {
    pub fn new(
        base_url: impl Into<String>,
        calendar_id: impl Into<String>,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CalendarError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            calendar_id: calendar_id.into(),
            access_token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<FreeBusyPeriod>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
    #[serde(rename = "hangoutLink")]
    hangout_link: Option<String>,
    start: EventTime,
    end: EventTime,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: DateTime<Utc>,
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn query_busy(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let body = json!({
            "timeMin": range_start.to_rfc3339(),
            "timeMax": range_end.to_rfc3339(),
            "items": [{ "id": self.calendar_id }],
        });

        let response = self
            .client
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| CalendarError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CalendarError::Transport(format!("freeBusy query returned {status}")));
        }

        let parsed: FreeBusyResponse = response
            .json()
            .await
            .map_err(|error| CalendarError::Protocol(error.to_string()))?;

        let busy: Vec<BusyInterval> = parsed
            .calendars
            .get(&self.calendar_id)
            .map(|calendar| {
                calendar
                    .busy
                    .iter()
                    .map(|period| BusyInterval { start: period.start, end: period.end })
                    .collect()
            })
            .unwrap_or_default();

        debug!(calendar_id = %self.calendar_id, intervals = busy.len(), "fetched busy intervals");
        Ok(busy)
    }

    async fn insert_event(&self, event: EventRequest) -> Result<ScheduledEvent, CalendarError> {
        let attendees: Vec<_> =
            event.attendees.iter().map(|email| json!({ "email": email })).collect();

        let body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": event.start.to_rfc3339() },
            "end": { "dateTime": event.end.to_rfc3339() },
            "attendees": attendees,
            "conferenceData": {
                "createRequest": {
                    "requestId": uuid::Uuid::new_v4().to_string(),
                    "conferenceSolutionKey": { "type": "hangoutsMeet" },
                },
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/calendars/{}/events?conferenceDataVersion=1",
                self.base_url, self.calendar_id
            ))
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| CalendarError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CalendarError::Transport(format!("event insert returned {status}")));
        }

        let inserted: InsertedEvent = response
            .json()
            .await
            .map_err(|error| CalendarError::Protocol(error.to_string()))?;

        Ok(ScheduledEvent {
            id: inserted.id,
            meet_link: inserted.hangout_link,
            start: inserted.start.date_time,
            end: inserted.end.date_time,
        })
    }
}

/// In-memory provider for tests: serves a fixed busy list filtered to the
/// queried range and records every inserted event.
#[derive(Debug, Default)]
pub struct FixedBusyCalendar {
    busy: Vec<BusyInterval>,
    inserted: Mutex<Vec<EventRequest>>,
}

impl FixedBusyCalendar {
    pub fn new(busy: Vec<BusyInterval>) -> Self {
        Self { busy, inserted: Mutex::new(Vec::new()) }
    }

    pub fn inserted_events(&self) -> Vec<EventRequest> {
        self.inserted.lock().expect("inserted lock").clone()
    }
}

#[async_trait]
impl CalendarProvider for FixedBusyCalendar {
    async fn query_busy(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        Ok(self
            .busy
            .iter()
            .filter(|interval| interval.start < range_end && interval.end > range_start)
            .copied()
            .collect())
    }

    async fn insert_event(&self, event: EventRequest) -> Result<ScheduledEvent, CalendarError> {
        let scheduled = ScheduledEvent {
            id: format!("fixed-{}", self.inserted.lock().expect("inserted lock").len() + 1),
            meet_link: Some("https://meet.example.com/fixed".to_string()),
            start: event.start,
            end: event.end,
        };
        self.inserted.lock().expect("inserted lock").push(event);
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::{CalendarProvider, EventRequest, FixedBusyCalendar};
    use crate::availability::BusyInterval;

    fn at(raw: &str) -> DateTime<Utc> {
        format!("2025-01-10T{raw}:00Z").parse().expect("valid timestamp")
    }

    #[tokio::test]
    async fn fixed_calendar_filters_busy_to_the_queried_range() {
        let calendar = FixedBusyCalendar::new(vec![
            BusyInterval { start: at("08:00"), end: at("09:00") },
            BusyInterval { start: at("10:00"), end: at("10:30") },
            BusyInterval { start: at("13:00"), end: at("14:00") },
        ]);

        let busy = calendar.query_busy(at("09:00"), at("12:00")).await.unwrap();
        assert_eq!(busy, vec![BusyInterval { start: at("10:00"), end: at("10:30") }]);
    }

    #[tokio::test]
    async fn fixed_calendar_records_inserted_events() {
        let calendar = FixedBusyCalendar::new(Vec::new());
        let event = EventRequest {
            summary: "INTERVIEW Meeting".to_string(),
            description: None,
            start: at("09:00"),
            end: at("09:30"),
            attendees: vec!["recruiter@example.com".to_string()],
        };

        let scheduled = calendar.insert_event(event.clone()).await.unwrap();
        assert_eq!(scheduled.start, at("09:00"));
        assert!(scheduled.meet_link.is_some());
        assert_eq!(calendar.inserted_events(), vec![event]);
    }
}
