//! Outbound application events.
//!
//! The domain services emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them — log to serial, push to the HTTP
//! status page, etc.

use crate::drivers::pump::Channel;
use crate::error::Error;
use crate::power::ChargeState;
use crate::schedule::record::{Profile, ScheduleName};
use crate::schedule::store::{ReloadReport, ScheduleToken};
use crate::sensors::AverageReading;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The application service has started.
    Started { schedules: ReloadReport },

    /// The schedule table was rebuilt.
    SchedulesReloaded(ReloadReport),

    /// A due schedule was resolved and its pumps commanded.
    Dispatched {
        name: ScheduleName,
        profile: Profile,
        duration_ms: u32,
        /// `None` if no valid average existed yet.
        humidity: Option<f32>,
    },

    /// A trigger arrived for a table generation that no longer exists.
    StaleTrigger(ScheduleToken),

    /// A pump channel refused or failed a scheduled run.
    PumpRunFailed { channel: Channel, error: Error },

    /// Motor driver fault: both channels stopped.
    PumpFault,

    /// Manual test mode switched.
    ManualTest(bool),

    /// Periodic environment snapshot.
    Environment(AverageReading),

    /// Charger state changed.
    Charge(ChargeState),
}
