//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SensorEngine / ScheduleStore / PumpController
//! ```
//!
//! Driven adapters (sensor, motor bridge, timers, calendar, storage, event
//! sinks) implement these traits.  The domain services consume them via
//! generics, so the irrigation core never touches hardware directly and
//! every collaborator can be replaced by a test double.

use std::sync::Arc;

use crate::config::SystemConfig;
use crate::drivers::pump::Channel;
use crate::error::{HwError, SensorError, TimingError};
use crate::schedule::record::Trigger;
use crate::schedule::store::{ResolvedSchedule, ScheduleToken};

// ───────────────────────────────────────────────────────────────
// Climate sensor port (driven adapter: HDC2080 → SensorEngine)
// ───────────────────────────────────────────────────────────────

/// Humidity/temperature sensor as consumed by the averaging engine.
pub trait ClimateSensorPort: Send {
    /// Soft-reset the device.
    fn reset(&mut self) -> Result<(), SensorError>;

    /// Write the measurement configuration; `trigger` starts a conversion.
    fn set_measure_config(&mut self, trigger: bool) -> Result<(), SensorError>;

    /// Last converted temperature in °C.
    fn read_temperature(&mut self) -> Result<f32, SensorError>;

    /// Last converted relative humidity in %RH.
    fn read_humidity(&mut self) -> Result<f32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Motor port (driven adapter: PumpController → H-bridge)
// ───────────────────────────────────────────────────────────────

/// Dual-channel brushed motor bridge with a shared enable (sleep) line.
pub trait MotorPort: Send {
    fn enable(&mut self, channel: Channel) -> Result<(), HwError>;
    fn disable(&mut self, channel: Channel) -> Result<(), HwError>;
    fn forward(&mut self, channel: Channel) -> Result<(), HwError>;
    fn brake(&mut self, channel: Channel) -> Result<(), HwError>;

    /// Duty cycle 0–100.
    fn set_speed(&mut self, channel: Channel, duty: u8) -> Result<(), HwError>;

    /// Drive the shared enable line (`true` = bridge awake).
    fn set_enable_line(&mut self, asserted: bool) -> Result<(), HwError>;
}

// ───────────────────────────────────────────────────────────────
// Off-timer port (driven adapter: PumpController → timer service)
// ───────────────────────────────────────────────────────────────

/// One-shot per-channel off-timers.
///
/// On expiry the implementation must post
/// [`IoEvent::PumpOffTimer`](crate::events::IoEvent::PumpOffTimer) carrying
/// the `generation` it was armed with; it must never touch the motor itself.
pub trait OffTimerPort: Send {
    /// Arm (or re-arm, replacing any pending expiry) the channel's timer.
    fn arm(&mut self, channel: Channel, duration_ms: u32, generation: u32)
    -> Result<(), TimingError>;

    /// Cancel a pending expiry.  No-op when the timer is idle.
    fn cancel(&mut self, channel: Channel);
}

// ───────────────────────────────────────────────────────────────
// Calendar port (driven adapter: ScheduleStore → calendar engine)
// ───────────────────────────────────────────────────────────────

/// Invoked by the calendar engine once per due occurrence, from a
/// constrained context.  Must not block.
pub type TriggerCallback = Arc<dyn Fn(ScheduleToken) + Send + Sync>;

/// Opaque registration handle issued by the calendar engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalendarHandle(pub u32);

/// The calendar engine refused a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarError {
    /// No free registration slots.
    Exhausted,
}

/// Local wall-clock time as seen by the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    /// 0 = Monday … 6 = Sunday.
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
}

/// Maps trigger specifications to due times and invokes callbacks.
pub trait CalendarPort: Send {
    fn create(
        &mut self,
        name: &str,
        trigger: &Trigger,
        callback: TriggerCallback,
        token: ScheduleToken,
    ) -> Result<CalendarHandle, CalendarError>;

    fn enable(&mut self, handle: CalendarHandle);

    fn delete(&mut self, handle: CalendarHandle);

    /// Wall-clock tick for engines that evaluate triggers by polling.
    /// Engines with their own timer service ignore it.
    fn poll(&mut self, _now: &LocalTime) {}
}

/// Local wall-clock source.  `None` until the clock has been set.
pub trait ClockPort {
    fn now(&self) -> Option<LocalTime>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Maximum key length accepted by the store (NVS limit, excluding NUL).
pub const MAX_KEY_LEN: usize = 15;

/// One key found while iterating a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: heapless::String<MAX_KEY_LEN>,
}

/// Namespaced persistent key-value blob storage.
///
/// - Write operations MUST be atomic — no partial writes on power loss.
/// - [`find_entries`](Self::find_entries) returns keys in the store's own
///   iteration order, which callers treat as load order.
pub trait StoragePort: Send {
    /// Open (creating if needed) a namespace.  Fails if the backend is unusable.
    fn open(&mut self, namespace: &str) -> Result<(), StorageError>;

    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// All blob keys in `namespace`, in iteration order.
    fn find_entries(&self, namespace: &str) -> Result<Vec<EntryInfo>, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Dispatcher seams (domain ↔ domain)
// ───────────────────────────────────────────────────────────────

/// Resolves a trigger token to the schedule it was issued for.
pub trait ScheduleLookup {
    /// `None` when the token is stale (the table was reloaded since).
    fn resolve(&self, token: ScheduleToken) -> Option<ResolvedSchedule>;
}

/// Read side of the averaging engine.
pub trait HumiditySource {
    fn has_valid_reading(&self) -> bool;
    fn average_humidity(&self) -> f32;
}

/// Scheduled pump runs.
pub trait PumpActuator {
    fn run(&self, channel: Channel, duration_ms: u32) -> crate::error::Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// A stored value failed to decode.
    Corrupted,
    /// The backend could not be initialised or the namespace opened.
    Unavailable,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored value corrupted"),
            Self::Unavailable => write!(f, "storage unavailable"),
        }
    }
}
