//! Dual-channel pump actuation controller.
//!
//! Owns the per-channel run state, the shared bridge enable line and the
//! one-shot off-timers.  Scheduled runs arrive from the dispatch worker;
//! off-timer expiries, the nFAULT interrupt and the test button arrive as
//! [`IoEvent`](crate::events::IoEvent)s routed by the application service.
//!
//! ```text
//!            run(ch, ms)                     off-timer(gen) == current
//!   Idle ─────────────────────▶ Running ───────────────────────────▶ Idle
//!     ▲                           │  │
//!     │         fault / manual-off│  │run(ch, ms') re-arms, last wins
//!     └───────────────────────────┘  └──────▶ Running
//! ```
//!
//! ## Actuator ownership
//!
//! A running channel records who started it ([`Owner`]).  While a manual
//! test run is active, scheduled runs are refused with [`Error::Busy`]
//! instead of fighting over the bridge.  A fault always wins.
//!
//! ## Stale expiries
//!
//! Every arm bumps the channel's generation.  An off-timer event carrying
//! an older generation (re-armed, cancelled by a fault, superseded by a
//! manual run) is ignored.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::app::ports::{MotorPort, OffTimerPort, PumpActuator};
use crate::error::{Error, Result};

/// One of the two independently controlled pump outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    pub const fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }

    /// Bit in a schedule's pump-select mask.
    pub const fn mask(self) -> u8 {
        1 << self.index()
    }
}

/// Who started a running channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Running { owner: Owner, generation: u32 },
}

impl ChannelState {
    pub fn is_running(self) -> bool {
        matches!(self, ChannelState::Running { .. })
    }
}

struct Inner<M, T> {
    motor: M,
    timers: T,
    channels: [ChannelState; 2],
    generations: [u32; 2],
    manual: bool,
    line_asserted: bool,
    duty: u8,
}

impl<M: MotorPort, T: OffTimerPort> Inner<M, T> {
    fn any_running(&self) -> bool {
        self.channels.iter().any(|c| c.is_running())
    }

    fn next_generation(&mut self, channel: Channel) -> u32 {
        let g = self.generations[channel.index()].wrapping_add(1);
        self.generations[channel.index()] = g;
        g
    }

    fn assert_line(&mut self) -> Result<()> {
        if !self.line_asserted {
            self.motor.set_enable_line(true)?;
            self.line_asserted = true;
        }
        Ok(())
    }

    /// De-assert the shared line, but only once both channels are idle.
    fn release_line(&mut self) {
        if self.any_running() {
            return;
        }
        match self.motor.set_enable_line(false) {
            Ok(()) => self.line_asserted = false,
            Err(e) => error!("pump: failed to de-assert enable line: {}", e),
        }
    }

    fn drive_forward(&mut self, channel: Channel) -> Result<()> {
        self.motor.enable(channel)?;
        self.motor.set_speed(channel, self.duty)?;
        self.motor.forward(channel)?;
        Ok(())
    }

    /// Brake + disable, mark Idle.  Hardware errors are logged, never
    /// propagated: the channel is considered stopped regardless.
    fn stop_channel(&mut self, channel: Channel) {
        if let Err(e) = self.motor.brake(channel) {
            error!("pump: brake {:?} failed: {}", channel, e);
        }
        if let Err(e) = self.motor.disable(channel) {
            error!("pump: disable {:?} failed: {}", channel, e);
        }
        self.channels[channel.index()] = ChannelState::Idle;
    }
}

// ───────────────────────────────────────────────────────────────
// PumpController
// ───────────────────────────────────────────────────────────────

pub struct PumpController<M: MotorPort, T: OffTimerPort> {
    inner: Mutex<Inner<M, T>>,
}

impl<M: MotorPort, T: OffTimerPort> PumpController<M, T> {
    /// `duty` is the fixed drive level (0–100) for every run.
    pub fn new(motor: M, timers: T, duty: u8) -> Self {
        Self {
            inner: Mutex::new(Inner {
                motor,
                timers,
                channels: [ChannelState::Idle; 2],
                generations: [0; 2],
                manual: false,
                line_asserted: false,
                duty: duty.min(100),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<M, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `channel` forward for `duration_ms`, then stop it via its off-timer.
    ///
    /// Re-running an already running channel re-arms its timer to the new
    /// duration.  If the timer cannot be armed the channel is not started,
    /// or is stopped if it was already running, and [`Error::Timing`] is
    /// returned.
    pub fn run(&self, channel: Channel, duration_ms: u32) -> Result<()> {
        if duration_ms == 0 {
            return Err(Error::InvalidArgument("duration_ms must be non-zero"));
        }
        let mut inner = self.lock();
        if inner.manual {
            warn!("pump: scheduled run on {:?} refused, manual test active", channel);
            return Err(Error::Busy("manual test run active"));
        }

        inner.assert_line()?;

        let generation = inner.generations[channel.index()].wrapping_add(1);
        if let Err(e) = inner.timers.arm(channel, duration_ms, generation) {
            error!("pump: off-timer arm for {:?} failed: {}", channel, e);
            if inner.channels[channel.index()].is_running() {
                // The previous off-timer may already be gone; never leave a
                // channel running without one.
                inner.timers.cancel(channel);
                inner.stop_channel(channel);
                inner.next_generation(channel);
                error!("pump: {:?} stopped, off-timer could not be re-armed", channel);
            }
            inner.release_line();
            return Err(e.into());
        }
        inner.generations[channel.index()] = generation;

        if let Err(e) = inner.drive_forward(channel) {
            error!("pump: drive {:?} failed: {}", channel, e);
            inner.timers.cancel(channel);
            inner.stop_channel(channel);
            inner.release_line();
            return Err(e);
        }

        let was_running = inner.channels[channel.index()].is_running();
        inner.channels[channel.index()] = ChannelState::Running {
            owner: Owner::Scheduled,
            generation,
        };
        if was_running {
            info!("pump: {:?} re-armed for {} ms", channel, duration_ms);
        } else {
            info!("pump: {:?} started for {} ms", channel, duration_ms);
        }
        Ok(())
    }

    /// Off-timer expiry for `channel`, armed with `generation`.
    pub fn on_off_timer(&self, channel: Channel, generation: u32) {
        let mut inner = self.lock();
        match inner.channels[channel.index()] {
            ChannelState::Running { generation: g, .. } if g == generation => {
                inner.stop_channel(channel);
                inner.release_line();
                info!("pump: {:?} stopped (timer)", channel);
            }
            _ => debug!("pump: stale off-timer for {:?} (gen {})", channel, generation),
        }
    }

    /// nFAULT asserted: stop everything, from any state.
    pub fn on_fault(&self) {
        let mut inner = self.lock();
        for ch in Channel::ALL {
            inner.timers.cancel(ch);
            inner.stop_channel(ch);
            inner.next_generation(ch);
        }
        inner.manual = false;
        inner.release_line();
        error!("pump: FAULT, both channels stopped");
    }

    /// Flip the manual test mode.  Returns the new mode.
    ///
    /// Enabling cancels pending off-timers and drives both channels
    /// indefinitely; disabling stops both.
    pub fn toggle_manual(&self) -> Result<bool> {
        let mut inner = self.lock();
        if inner.manual {
            for ch in Channel::ALL {
                inner.stop_channel(ch);
            }
            inner.manual = false;
            inner.release_line();
            info!("pump: manual test off");
            return Ok(false);
        }

        for ch in Channel::ALL {
            inner.timers.cancel(ch);
        }
        if let Err(e) = inner.assert_line() {
            inner.release_line();
            return Err(e);
        }
        for ch in Channel::ALL {
            let generation = inner.next_generation(ch);
            if let Err(e) = inner.drive_forward(ch) {
                error!("pump: manual drive {:?} failed: {}", ch, e);
                for c in Channel::ALL {
                    inner.stop_channel(c);
                }
                inner.release_line();
                return Err(e);
            }
            inner.channels[ch.index()] = ChannelState::Running {
                owner: Owner::Manual,
                generation,
            };
        }
        inner.manual = true;
        info!("pump: manual test on");
        Ok(true)
    }

    pub fn channel_state(&self, channel: Channel) -> ChannelState {
        self.lock().channels[channel.index()]
    }

    pub fn is_line_asserted(&self) -> bool {
        self.lock().line_asserted
    }

    pub fn is_manual(&self) -> bool {
        self.lock().manual
    }
}

impl<M: MotorPort, T: OffTimerPort> PumpActuator for PumpController<M, T> {
    fn run(&self, channel: Channel, duration_ms: u32) -> Result<()> {
        PumpController::run(self, channel, duration_ms)
    }
}
