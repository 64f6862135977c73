pub mod attendance;
pub mod backup;
pub mod classes;
pub mod core;
pub mod documents;
pub mod events;
pub mod grades;
pub mod reports;
pub mod schedule;
pub mod staff;
pub mod students;
pub mod templates;

mod common;
