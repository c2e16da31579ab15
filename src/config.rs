//! System configuration parameters
//!
//! All tunable parameters for the Misty irrigation core.
//! Values can be overridden via NVS; see [`crate::adapters::nvs`].

use serde::{Deserialize, Serialize};

/// Upper bound on rolling-window slots (fixed-capacity storage).
pub const MAX_WINDOW_SLOTS: usize = 96;

/// Hard ceiling for a single pump run, applied at dispatch time.
pub const MAX_RUN_MS: u32 = 3_600_000;

/// What the dispatch queue does when a trigger arrives while it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Keep the queued triggers, drop the one that just arrived.
    DropNewest,
    /// Evict the oldest queued trigger to make room.
    DropOldest,
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Sensing ---
    /// Length of the rolling humidity/temperature window (hours)
    pub window_hours: u16,
    /// Resolution of one window slot (minutes)
    pub window_interval_minutes: u16,
    /// Raw samples averaged into one slot
    pub accum_count: u8,

    // --- Profile selection ---
    /// Humidity (%RH) at or below which the Dry profile is used
    pub humid_dry_thresh: f32,
    /// Humidity (%RH) at or below which the Moderate profile is used
    pub humid_moderate_thresh: f32,

    // --- Pump ---
    /// Clamp for any stored duration (milliseconds)
    pub max_run_ms: u32,
    /// Motor PWM duty cycle (0-100%)
    pub pump_duty_percent: u8,

    // --- Dispatch ---
    /// Overflow behaviour of the bounded dispatch queue
    pub dispatch_overflow: OverflowPolicy,
    /// Wall-clock polling period for the calendar (seconds)
    pub calendar_tick_secs: u16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Sensing: 24 h window at 30 min resolution, 5 samples per slot
            window_hours: 24,
            window_interval_minutes: 30,
            accum_count: 5,

            // Profile thresholds
            humid_dry_thresh: 39.0,
            humid_moderate_thresh: 79.0,

            // Pump
            max_run_ms: MAX_RUN_MS,
            pump_duty_percent: 100,

            // Dispatch
            dispatch_overflow: OverflowPolicy::DropNewest,
            calendar_tick_secs: 20,
        }
    }
}

impl SystemConfig {
    /// Number of slots in the rolling window.
    pub fn window_slots(&self) -> usize {
        (self.window_hours as usize * 60) / self.window_interval_minutes.max(1) as usize
    }

    /// Period between raw sensor samples (milliseconds).
    pub fn sense_interval_ms(&self) -> u32 {
        let minutes = self.window_interval_minutes as u32 / self.accum_count.max(1) as u32;
        minutes * 60 * 1000
    }
}

/// Range-check every field.  Invalid values are rejected, never clamped.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), &'static str> {
    if cfg.window_interval_minutes == 0 || cfg.window_hours == 0 {
        return Err("window_hours and window_interval_minutes must be non-zero");
    }
    if !(1..=MAX_WINDOW_SLOTS).contains(&cfg.window_slots()) {
        return Err("window must hold 1–96 slots");
    }
    if cfg.accum_count == 0 {
        return Err("accum_count must be non-zero");
    }
    if cfg.window_interval_minutes % cfg.accum_count as u16 != 0 {
        return Err("window_interval_minutes must be divisible by accum_count");
    }
    if !(0.0..=100.0).contains(&cfg.humid_dry_thresh)
        || !(0.0..=100.0).contains(&cfg.humid_moderate_thresh)
    {
        return Err("humidity thresholds must be 0–100 %RH");
    }
    if cfg.humid_dry_thresh >= cfg.humid_moderate_thresh {
        return Err("humid_dry_thresh must be < humid_moderate_thresh");
    }
    if cfg.max_run_ms == 0 || cfg.max_run_ms > MAX_RUN_MS {
        return Err("max_run_ms must be 1–3600000");
    }
    if cfg.pump_duty_percent == 0 || cfg.pump_duty_percent > 100 {
        return Err("pump_duty_percent must be 1–100");
    }
    if cfg.calendar_tick_secs == 0 || cfg.calendar_tick_secs > 60 {
        return Err("calendar_tick_secs must be 1–60");
    }
    Ok(())
}
