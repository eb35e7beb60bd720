pub mod availability;
pub mod provider;
pub mod scheduler;

pub use availability::{find_free_slots, BusyInterval, FreeSlot};
pub use provider::{
    CalendarError, CalendarProvider, EventRequest, FixedBusyCalendar, GoogleCalendarClient,
    ScheduledEvent,
};
pub use scheduler::{MeetingScheduler, ScheduleError};
