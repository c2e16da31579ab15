//! Unified error types for the Misty firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the schedule
//! API, the dispatch worker and the pump controller all report failures the
//! same way.  All variants are `Copy` so they can cross the interrupt/timer/
//! worker hand-offs without allocation.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An I2C/GPIO/PWM transaction failed.
    HardwareIo(HwError),
    /// The persistent store is unavailable or returned garbage.
    Storage(StorageError),
    /// A fixed-capacity resource is exhausted.
    Capacity(CapacityError),
    /// Unknown schedule name.
    NotFound,
    /// Duplicate schedule name on insert.
    AlreadyExists,
    /// A timer could not be armed or re-armed.
    Timing(TimingError),
    /// Caller supplied a value outside the accepted range.
    InvalidArgument(&'static str),
    /// The resource is owned by another path (e.g. manual pump test).
    Busy(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardwareIo(e) => write!(f, "hardware: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Capacity(e) => write!(f, "capacity: {e}"),
            Self::NotFound => write!(f, "not found"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::Timing(e) => write!(f, "timing: {e}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Hardware I/O errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// I2C transfer NACKed or timed out.
    I2cTransferFailed,
    /// GPIO level write failed.
    GpioWriteFailed,
    /// PWM duty write failed.
    PwmWriteFailed,
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2cTransferFailed => write!(f, "I2C transfer failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
        }
    }
}

impl From<HwError> for Error {
    fn from(e: HwError) -> Self {
        Self::HardwareIo(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

/// Failures of a single physical reading.  Never fatal: the averaging layer
/// discards the reading and retries on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The I2C transaction with the sensor failed.
    I2c,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c => write!(f, "I2C read failed"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(_: SensorError) -> Self {
        Self::HardwareIo(HwError::I2cTransferFailed)
    }
}

// ---------------------------------------------------------------------------
// Capacity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    /// The schedule table already holds its maximum number of entries.
    TableFull,
    /// The calendar engine refused a well-formed registration.
    OutOfResources,
    /// Caller-provided output buffer is below the worst-case size.
    BufferTooSmall { required: usize, provided: usize },
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => write!(f, "schedule table full"),
            Self::OutOfResources => write!(f, "calendar engine out of resources"),
            Self::BufferTooSmall { required, provided } => {
                write!(f, "buffer too small ({provided} < {required} bytes)")
            }
        }
    }
}

impl From<CapacityError> for Error {
    fn from(e: CapacityError) -> Self {
        Self::Capacity(e)
    }
}

// ---------------------------------------------------------------------------
// Timing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingError {
    /// The timer service did not accept the arm/re-arm command.
    Timeout,
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timer arm timed out"),
        }
    }
}

impl From<TimingError> for Error {
    fn from(e: TimingError) -> Self {
        Self::Timing(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
