//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! The HTTP status page would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { schedules } => {
                info!(
                    "START | schedules loaded={} skipped={} truncated={}",
                    schedules.loaded, schedules.skipped_corrupt, schedules.truncated
                );
            }
            AppEvent::SchedulesReloaded(r) => {
                info!(
                    "SCHED | reloaded={} skipped={} truncated={}",
                    r.loaded, r.skipped_corrupt, r.truncated
                );
            }
            AppEvent::Dispatched {
                name,
                profile,
                duration_ms,
                humidity,
            } => match humidity {
                Some(h) => info!(
                    "WATER | '{}' profile={:?} RH={:.1}% run={}ms",
                    name, profile, h, duration_ms
                ),
                None => info!(
                    "WATER | '{}' profile={:?} RH=n/a run={}ms",
                    name, profile, duration_ms
                ),
            },
            AppEvent::StaleTrigger(token) => {
                info!(
                    "WATER | stale trigger slot={} gen={}",
                    token.slot, token.generation
                );
            }
            AppEvent::PumpRunFailed { channel, error } => {
                warn!("PUMP  | channel {:?} run failed: {}", channel, error);
            }
            AppEvent::PumpFault => {
                warn!("FAULT | motor driver fault, both channels stopped");
            }
            AppEvent::ManualTest(on) => {
                info!("PUMP  | manual test {}", if *on { "ON" } else { "OFF" });
            }
            AppEvent::Environment(avg) => {
                info!(
                    "ENV   | T={:.1}\u{00b0}C RH={:.1}%",
                    avg.temperature, avg.humidity
                );
            }
            AppEvent::Charge(state) => {
                info!("POWER | {:?}", state);
            }
        }
    }
}
