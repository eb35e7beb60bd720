pub mod config;
pub mod domain;

pub use config::{AppConfig, ConfigError, LlmProvider, LoadOptions, LogFormat};
pub use domain::meeting::{
    MeetingContext, MeetingDetails, MeetingPurpose, MeetingStatus, PartialMeetingInfo, TimeRange,
};
pub use domain::message::{ChatMessage, Role};
pub use domain::person::{PersonContext, PersonLoadError};
