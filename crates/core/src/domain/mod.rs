pub mod meeting;
pub mod message;
pub mod person;
