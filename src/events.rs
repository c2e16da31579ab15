//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - GPIO ISRs (pump fault, test button, config button, charger status)
//! - Timer callbacks (sensing tick, calendar tick, per-channel off-timers)
//!
//! Events are consumed by the main event loop, which routes each one to
//! the owning service through [`AppService::handle_io_event`].
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│              │     │              │
//! │ esp_timer   │────▶│ IoEventQueue │────▶│  Event Loop  │
//! │ off-timers  │────▶│  (bounded)   │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Producers never block.  A full queue drops the event and bumps a
//! counter, except for the two events that switch pumps off: `PumpFault`
//! and `PumpOffTimer` are latched beside the queue and are always
//! delivered, ahead of anything already queued.
//!
//! [`AppService::handle_io_event`]: crate::app::service::AppService::handle_io_event

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel;

use crate::drivers::pump::Channel;

/// Maximum number of pending events.
pub const IO_EVENT_QUEUE_CAP: usize = 16;

/// Hardware and timer events, posted from constrained contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoEvent {
    // ── Timers ────────────────────────────────────────────
    /// Periodic sensing timer fired.
    SenseTick,
    /// Wall-clock calendar evaluation tick.
    CalendarTick,
    /// A pump channel's one-shot off-timer expired.
    PumpOffTimer { channel: Channel, generation: u32 },

    // ── GPIO ──────────────────────────────────────────────
    /// Motor driver nFAULT asserted.
    PumpFault,
    /// Pump test button pressed.
    PumpTrigButton,
    /// Configuration button pressed.
    ConfigButton,
    /// Charger nCHARGING changed (`true` = charging).
    ChargingChanged(bool),
    /// Charger nCHG_DONE changed (`true` = charge complete).
    ChargeDoneChanged(bool),
}

/// Bounded multi-producer queue of [`IoEvent`]s.
///
/// `const`-constructible so it can live in a `static` reachable from ISR
/// and timer callbacks.
///
/// Shutdown events never depend on free queue space.  A fault sets a flag;
/// an off-timer stores its generation in a per-channel slot.  The copy
/// pushed into the queue is only a wake-up for a blocked consumer and is
/// discarded on receipt.  Two expiries of one channel collapse into the
/// newer generation, which is the only one the pump controller honours.
pub struct IoEventQueue {
    channel: channel::Channel<CriticalSectionRawMutex, IoEvent, IO_EVENT_QUEUE_CAP>,
    fault: AtomicBool,
    off_pending: [AtomicBool; 2],
    off_generation: [AtomicU32; 2],
    dropped: AtomicU32,
}

impl Default for IoEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IoEventQueue {
    pub const fn new() -> Self {
        Self {
            channel: channel::Channel::new(),
            fault: AtomicBool::new(false),
            off_pending: [AtomicBool::new(false), AtomicBool::new(false)],
            off_generation: [AtomicU32::new(0), AtomicU32::new(0)],
            dropped: AtomicU32::new(0),
        }
    }

    /// Post an event.  Safe from ISR context; never blocks.
    /// Returns `false` if the queue was full and the event was dropped;
    /// `PumpFault` and `PumpOffTimer` are never dropped.
    pub fn post(&self, event: IoEvent) -> bool {
        match event {
            IoEvent::PumpFault => {
                self.fault.store(true, Ordering::Release);
                let _ = self.channel.try_send(event);
                true
            }
            IoEvent::PumpOffTimer {
                channel,
                generation,
            } => {
                let i = channel.index();
                self.off_generation[i].store(generation, Ordering::Relaxed);
                self.off_pending[i].store(true, Ordering::Release);
                let _ = self.channel.try_send(event);
                true
            }
            _ => {
                if self.channel.try_send(event).is_ok() {
                    true
                } else {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
        }
    }

    fn take_latched(&self) -> Option<IoEvent> {
        if self.fault.swap(false, Ordering::Acquire) {
            return Some(IoEvent::PumpFault);
        }
        for channel in Channel::ALL {
            let i = channel.index();
            if self.off_pending[i].swap(false, Ordering::Acquire) {
                return Some(IoEvent::PumpOffTimer {
                    channel,
                    generation: self.off_generation[i].load(Ordering::Relaxed),
                });
            }
        }
        None
    }

    fn is_latched_kind(event: &IoEvent) -> bool {
        matches!(event, IoEvent::PumpFault | IoEvent::PumpOffTimer { .. })
    }

    /// Pop the next event without waiting.
    pub fn try_next(&self) -> Option<IoEvent> {
        loop {
            if let Some(event) = self.take_latched() {
                return Some(event);
            }
            let event = self.channel.try_receive().ok()?;
            if !Self::is_latched_kind(&event) {
                return Some(event);
            }
        }
    }

    /// Block the calling thread until an event arrives.
    pub fn next_blocking(&self) -> IoEvent {
        loop {
            if let Some(event) = self.take_latched() {
                return event;
            }
            let event = futures_lite::future::block_on(self.channel.receive());
            if !Self::is_latched_kind(&event) {
                return event;
            }
        }
    }

    /// Drain all pending events into a callback.  Latched shutdown events
    /// come first, the rest in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(IoEvent)) {
        while let Some(event) = self.try_next() {
            handler(event);
        }
    }

    /// Events lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}
