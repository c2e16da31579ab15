//! Battery charge-state tracking.
//!
//! The charger exposes two active-low status pins (nCHARGING, nCHG_DONE).
//! Their ISRs post levels as [`IoEvent`](crate::events::IoEvent)s; the event
//! loop feeds them here.  Readers poll the flags lock-free.

use core::sync::atomic::{AtomicBool, Ordering};

use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    OnBattery,
    Charging,
    Charged,
}

#[derive(Debug, Default)]
pub struct ChargeMonitor {
    charging: AtomicBool,
    done: AtomicBool,
}

impl ChargeMonitor {
    pub const fn new() -> Self {
        Self {
            charging: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }

    pub fn set_charging(&self, charging: bool) {
        if self.charging.swap(charging, Ordering::AcqRel) != charging {
            info!("power: charging={}", charging);
        }
    }

    pub fn set_charge_done(&self, done: bool) {
        if self.done.swap(done, Ordering::AcqRel) != done {
            info!("power: charge_done={}", done);
        }
    }

    pub fn state(&self) -> ChargeState {
        if self.done.load(Ordering::Acquire) {
            ChargeState::Charged
        } else if self.charging.load(Ordering::Acquire) {
            ChargeState::Charging
        } else {
            ChargeState::OnBattery
        }
    }
}
