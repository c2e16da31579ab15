//! Tick-driven calendar engine.
//!
//! A minimal [`CalendarPort`] that evaluates day-of-week triggers against
//! the wall clock each time it is polled.  The event loop polls it on every
//! `CalendarTick` (default every 20 s), so a due minute is always observed
//! at least twice; `last_fired` keeps each registration to one callback per
//! matching minute.
//!
//! ```text
//!   CalendarTick ──▶ WallClock::now() ──▶ poll(now)
//!                                           │  match days/hour/minute
//!                                           ▼
//!                                      callback(token) ──▶ DispatchQueue
//! ```
//!
//! Solar triggers need sunrise/sunset tables this engine does not have.
//! They register normally but stay dormant.

use log::{debug, warn};

use crate::app::ports::{CalendarError, CalendarHandle, CalendarPort, LocalTime, TriggerCallback};
use crate::schedule::record::{MAX_NAME_LEN, Trigger};
use crate::schedule::store::ScheduleToken;

struct Registration {
    handle: CalendarHandle,
    name: heapless::String<MAX_NAME_LEN>,
    trigger: Trigger,
    callback: TriggerCallback,
    token: ScheduleToken,
    enabled: bool,
    last_fired: Option<LocalTime>,
}

impl Registration {
    fn is_due(&self, now: &LocalTime) -> bool {
        match self.trigger {
            Trigger::DayOfWeek { days, hour, minute } => {
                days.contains(now.weekday) && hour == now.hour && minute == now.minute
            }
            Trigger::Solar { .. } => false,
        }
    }
}

pub struct TickCalendar {
    capacity: usize,
    next_handle: u32,
    regs: Vec<Registration>,
}

impl TickCalendar {
    /// Engine with room for `capacity` registrations.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_handle: 1,
            regs: Vec::with_capacity(capacity),
        }
    }

    /// Live registrations, enabled or not.
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }
}

impl CalendarPort for TickCalendar {
    fn create(
        &mut self,
        name: &str,
        trigger: &Trigger,
        callback: TriggerCallback,
        token: ScheduleToken,
    ) -> Result<CalendarHandle, CalendarError> {
        if self.regs.len() >= self.capacity {
            return Err(CalendarError::Exhausted);
        }
        if matches!(trigger, Trigger::Solar { .. }) {
            warn!("sched: '{}' uses a solar trigger, no sun tables; dormant", name);
        }
        let mut label = heapless::String::new();
        // Names are validated by the store; truncate anything else.
        for c in name.chars() {
            if label.push(c).is_err() {
                break;
            }
        }
        let handle = CalendarHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.regs.push(Registration {
            handle,
            name: label,
            trigger: *trigger,
            callback,
            token,
            enabled: false,
            last_fired: None,
        });
        Ok(handle)
    }

    fn enable(&mut self, handle: CalendarHandle) {
        if let Some(r) = self.regs.iter_mut().find(|r| r.handle == handle) {
            r.enabled = true;
        }
    }

    fn delete(&mut self, handle: CalendarHandle) {
        self.regs.retain(|r| r.handle != handle);
    }

    fn poll(&mut self, now: &LocalTime) {
        for r in self.regs.iter_mut().filter(|r| r.enabled) {
            if !r.is_due(now) {
                // `LocalTime` carries no date; forget the last match once
                // its minute has passed so next week's identical minute fires.
                r.last_fired = None;
                continue;
            }
            if r.last_fired == Some(*now) {
                continue;
            }
            r.last_fired = Some(*now);
            debug!(
                "sched: '{}' due at {:02}:{:02} (slot {})",
                r.name, now.hour, now.minute, r.token.slot
            );
            (r.callback)(r.token);
        }
    }
}
