use chrono::{DateTime, NaiveDate, Utc};
use emissary_core::{MeetingDetails, TimeRange};
use thiserror::Error;
use tracing::info;

use crate::availability::{find_free_slots, BusyInterval, FreeSlot};
use crate::provider::{CalendarError, CalendarProvider, EventRequest, ScheduledEvent};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no free slot matches the requested dates and times")]
    NoAvailableSlot,
    #[error("the chosen slot was booked by someone else in the meantime")]
    SlotNoLongerAvailable,
    #[error(transparent)]
    Provider(#[from] CalendarError),
}

/// Turns meeting preferences into concrete calendar bookings. Suggestion
/// order follows the caller's preference order: dates outer, time ranges
/// inner.
pub struct MeetingScheduler<P> {
    provider: P,
}

impl<P> MeetingScheduler<P>
where
    P: CalendarProvider,
{
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Free slots across every preferred date and time range, each window
    /// checked against the calendar's busy intervals.
    pub async fn suggest_meeting_slots(
        &self,
        details: &MeetingDetails,
    ) -> Result<Vec<FreeSlot>, ScheduleError> {
        let mut slots = Vec::new();

        for date in &details.preferred_dates {
            for range in &details.preferred_time_ranges {
                let (window_start, window_end) = day_window(*date, range);
                let busy = self.provider.query_busy(window_start, window_end).await?;
                slots.extend(find_free_slots(
                    window_start,
                    window_end,
                    &busy,
                    details.duration_minutes,
                ));
            }
        }

        Ok(slots)
    }

    /// Books the earliest suggested slot. The slot window is re-checked
    /// right before insertion; a conflict that appeared since suggestion
    /// surfaces as [`ScheduleError::SlotNoLongerAvailable`].
    pub async fn schedule_meeting(
        &self,
        details: &MeetingDetails,
    ) -> Result<ScheduledEvent, ScheduleError> {
        let slots = self.suggest_meeting_slots(details).await?;
        let slot = slots.first().ok_or(ScheduleError::NoAvailableSlot)?;

        let busy = self.provider.query_busy(slot.start(), slot.end()).await?;
        if busy.iter().any(|interval| overlaps(interval, slot)) {
            return Err(ScheduleError::SlotNoLongerAvailable);
        }

        let event = EventRequest {
            summary: format!("{} Meeting", details.purpose.as_str().to_uppercase()),
            description: details.notes.clone(),
            start: slot.start(),
            end: slot.end(),
            attendees: details.attendees.clone(),
        };

        let scheduled = self.provider.insert_event(event).await?;
        info!(
            event_id = %scheduled.id,
            start = %scheduled.start,
            attendees = details.attendees.len(),
            "meeting scheduled"
        );
        Ok(scheduled)
    }
}

fn day_window(date: NaiveDate, range: &TimeRange) -> (DateTime<Utc>, DateTime<Utc>) {
    (date.and_time(range.start).and_utc(), date.and_time(range.end).and_utc())
}

fn overlaps(interval: &BusyInterval, slot: &FreeSlot) -> bool {
    interval.start < slot.end() && interval.end > slot.start()
}
