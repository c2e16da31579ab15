//! Watering schedules: the persisted record format and the store that
//! registers them with the calendar engine.

pub mod record;
pub mod store;

pub use record::{DayMask, Profile, PumpMask, ScheduleEntry, ScheduleName, SolarEvent, Trigger};
pub use store::{ReloadReport, ScheduleStore, ScheduleToken};
