//! Persisted schedule records.
//!
//! Wire layout (little-endian, packed, 17 bytes):
//!
//! ```text
//!  0      1        2..4                       4..16              16
//! ┌──────┬────────┬──────────────────────────┬──────────────────┬──────┐
//! │pumps │day_mask│ hour,minute | offset i16 │ duration_ms[3]   │ type │
//! └──────┴────────┴──────────────────────────┴──────────────────┴──────┘
//! ```
//!
//! The `type` byte selects how bytes 2..4 are read; in memory that union
//! is the [`Trigger`] enum and cannot be built inconsistent.

use core::fmt;

use crate::drivers::pump::Channel;

/// Exact size of an encoded record.
pub const RECORD_LEN: usize = 17;

/// Longest schedule name (storage key limit).
pub const MAX_NAME_LEN: usize = 15;

pub type ScheduleName = heapless::String<MAX_NAME_LEN>;

const TYPE_DAY_OF_WEEK: u8 = 1;
const TYPE_SUNRISE: u8 = 4;
const TYPE_SUNSET: u8 = 5;

// ── Pump selection ───────────────────────────────────────────

/// Non-empty subset of the pump channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpMask(u8);

impl PumpMask {
    pub const A: PumpMask = PumpMask(Channel::A.mask());
    pub const B: PumpMask = PumpMask(Channel::B.mask());
    pub const BOTH: PumpMask = PumpMask(Channel::A.mask() | Channel::B.mask());

    /// `None` for an empty mask or bits beyond the two channels.
    pub fn new(bits: u8) -> Option<Self> {
        (bits != 0 && bits & !Self::BOTH.0 == 0).then_some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, channel: Channel) -> bool {
        self.0 & channel.mask() != 0
    }

    pub fn channels(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

// ── Days ─────────────────────────────────────────────────────

/// Weekday bitmask, bit 0 = Monday … bit 6 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayMask(pub u8);

impl DayMask {
    pub const EVERY_DAY: DayMask = DayMask(0x7F);

    /// `weekday`: 0 = Monday … 6 = Sunday.
    pub fn contains(self, weekday: u8) -> bool {
        weekday < 7 && self.0 & (1 << weekday) != 0
    }
}

// ── Trigger ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolarEvent {
    Sunrise,
    Sunset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DayOfWeek {
        days: DayMask,
        hour: u8,
        minute: u8,
    },
    Solar {
        days: DayMask,
        event: SolarEvent,
        offset_minutes: i16,
    },
}

impl Trigger {
    pub fn days(&self) -> DayMask {
        match *self {
            Trigger::DayOfWeek { days, .. } | Trigger::Solar { days, .. } => days,
        }
    }

    fn is_valid(&self) -> bool {
        match *self {
            Trigger::DayOfWeek { hour, minute, .. } => hour < 24 && minute < 60,
            Trigger::Solar { offset_minutes, .. } => offset_minutes.unsigned_abs() < 24 * 60,
        }
    }
}

// ── Profile ──────────────────────────────────────────────────

/// Duration profile, chosen from the rolling humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dry = 0,
    Moderate = 1,
    Wet = 2,
}

impl Profile {
    pub fn index(self) -> usize {
        self as usize
    }
}

// ── Entry ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub pumps: PumpMask,
    pub trigger: Trigger,
    /// Indexed by [`Profile`]: Dry, Moderate, Wet.  Not clamped here.
    pub durations_ms: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    BadLength(usize),
    UnknownTrigger(u8),
    NoPumps,
    BadTime,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(n) => write!(f, "blob is {} bytes, expected {}", n, RECORD_LEN),
            Self::UnknownTrigger(t) => write!(f, "unsupported trigger type {}", t),
            Self::NoPumps => write!(f, "empty or invalid pump mask"),
            Self::BadTime => write!(f, "trigger time out of range"),
        }
    }
}

impl ScheduleEntry {
    pub fn duration_for(&self, profile: Profile) -> u32 {
        self.durations_ms[profile.index()]
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.trigger.is_valid() {
            Ok(())
        } else {
            Err(RecordError::BadTime)
        }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0] = self.pumps.bits();
        out[1] = self.trigger.days().0;
        out[16] = match self.trigger {
            Trigger::DayOfWeek { hour, minute, .. } => {
                out[2] = hour;
                out[3] = minute;
                TYPE_DAY_OF_WEEK
            }
            Trigger::Solar {
                event,
                offset_minutes,
                ..
            } => {
                out[2..4].copy_from_slice(&offset_minutes.to_le_bytes());
                match event {
                    SolarEvent::Sunrise => TYPE_SUNRISE,
                    SolarEvent::Sunset => TYPE_SUNSET,
                }
            }
        };
        for (i, d) in self.durations_ms.iter().enumerate() {
            let at = 4 + i * 4;
            out[at..at + 4].copy_from_slice(&d.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let b: &[u8; RECORD_LEN] = bytes
            .try_into()
            .map_err(|_| RecordError::BadLength(bytes.len()))?;

        let pumps = PumpMask::new(b[0]).ok_or(RecordError::NoPumps)?;
        let days = DayMask(b[1]);
        let trigger = match b[16] {
            TYPE_DAY_OF_WEEK => Trigger::DayOfWeek {
                days,
                hour: b[2],
                minute: b[3],
            },
            t @ (TYPE_SUNRISE | TYPE_SUNSET) => Trigger::Solar {
                days,
                event: if t == TYPE_SUNRISE {
                    SolarEvent::Sunrise
                } else {
                    SolarEvent::Sunset
                },
                offset_minutes: i16::from_le_bytes([b[2], b[3]]),
            },
            other => return Err(RecordError::UnknownTrigger(other)),
        };

        let mut durations_ms = [0u32; 3];
        for (i, d) in durations_ms.iter_mut().enumerate() {
            let at = 4 + i * 4;
            *d = u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]]);
        }

        let entry = Self {
            pumps,
            trigger,
            durations_ms,
        };
        entry.validate()?;
        Ok(entry)
    }
}

/// Names double as storage keys and are rendered into JSON unescaped.
pub fn validate_name(name: &str) -> Result<ScheduleName, &'static str> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err("name must be 1–15 bytes");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b'"' && b != b'\\')
    {
        return Err("name must be printable ASCII without quotes or backslashes");
    }
    let mut out = ScheduleName::new();
    out.push_str(name).map_err(|_| "name must be 1–15 bytes")?;
    Ok(out)
}
