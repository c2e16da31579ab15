//! Hardware timers using ESP-IDF's esp_timer API.
//!
//! Two kinds of timers, both of which only post into the [`IoEventQueue`]:
//!
//! - **Tick timers** (periodic): `SenseTick` at the sensing interval and
//!   `CalendarTick` at the calendar polling period.
//! - **Off-timers** (one-shot, one per pump channel): implement
//!   [`OffTimerPort`].  Expiry posts `PumpOffTimer { channel, generation }`
//!   with the generation the timer was armed with, so the pump controller
//!   can discard an expiry from a run that was superseded.
//!
//! Timer callbacks execute in the ESP timer task context (not ISR), so
//! they can safely call [`IoEventQueue::post`].  On simulation targets the
//! same behaviour is approximated with sleeping threads.

use crate::app::ports::OffTimerPort;
use crate::drivers::pump::Channel;
use crate::error::TimingError;
use crate::events::{IoEvent, IoEventQueue};

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::{error, info};

// ───────────────────────────────────────────────────────────────
// Tick timers
// ───────────────────────────────────────────────────────────────

/// Running periodic timers.  Dropping the value stops them.
pub struct TickTimers {
    #[cfg(target_os = "espidf")]
    handles: [esp_timer_handle_t; 2],
    #[cfg(not(target_os = "espidf"))]
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn sense_tick_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the `&'static IoEventQueue` passed at creation.
    let queue = unsafe { &*(arg as *const IoEventQueue) };
    queue.post(IoEvent::SenseTick);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn calendar_tick_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: as above.
    let queue = unsafe { &*(arg as *const IoEventQueue) };
    queue.post(IoEvent::CalendarTick);
}

#[cfg(target_os = "espidf")]
fn create_timer(
    callback: unsafe extern "C" fn(*mut core::ffi::c_void),
    arg: *mut core::ffi::c_void,
    name: &'static [u8],
) -> Result<esp_timer_handle_t, TimingError> {
    let args = esp_timer_create_args_t {
        callback: Some(callback),
        arg,
        dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
        name: name.as_ptr() as *const _,
        skip_unhandled_events: true,
    };
    let mut handle: esp_timer_handle_t = core::ptr::null_mut();
    // SAFETY: `args` outlives the call; `arg` points at 'static data.
    let ret = unsafe { esp_timer_create(&args, &mut handle) };
    if ret != ESP_OK {
        error!("hw_timer: create failed (rc={})", ret);
        return Err(TimingError::Timeout);
    }
    Ok(handle)
}

/// Start the sensing and calendar tick timers.
#[cfg(target_os = "espidf")]
pub fn start_tick_timers(
    queue: &'static IoEventQueue,
    sense_interval_ms: u32,
    calendar_tick_ms: u32,
) -> Result<TickTimers, TimingError> {
    let arg = queue as *const IoEventQueue as *mut core::ffi::c_void;
    let sense = create_timer(sense_tick_cb, arg, b"sense\0")?;
    let calendar = create_timer(calendar_tick_cb, arg, b"calendar\0")?;
    let timers = TickTimers {
        handles: [sense, calendar],
    };

    // SAFETY: handles were just created and are owned by `timers`.
    unsafe {
        let ret = esp_timer_start_periodic(sense, u64::from(sense_interval_ms) * 1000);
        if ret != ESP_OK {
            error!("hw_timer: sense timer start failed (rc={})", ret);
            return Err(TimingError::Timeout);
        }
        let ret = esp_timer_start_periodic(calendar, u64::from(calendar_tick_ms) * 1000);
        if ret != ESP_OK {
            error!("hw_timer: calendar timer start failed (rc={})", ret);
            return Err(TimingError::Timeout);
        }
    }

    info!(
        "hw_timer: sense every {}ms, calendar every {}ms",
        sense_interval_ms, calendar_tick_ms
    );
    Ok(timers)
}

#[cfg(not(target_os = "espidf"))]
pub fn start_tick_timers(
    queue: &'static IoEventQueue,
    sense_interval_ms: u32,
    calendar_tick_ms: u32,
) -> Result<TickTimers, TimingError> {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    let stop = Arc::new(AtomicBool::new(false));
    for (period_ms, event, name) in [
        (sense_interval_ms, IoEvent::SenseTick, "sense-tick"),
        (calendar_tick_ms, IoEvent::CalendarTick, "calendar-tick"),
    ] {
        let stop = stop.clone();
        std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let period = std::time::Duration::from_millis(u64::from(period_ms.max(1)));
                while !stop.load(Ordering::Acquire) {
                    std::thread::sleep(period);
                    if !stop.load(Ordering::Acquire) {
                        queue.post(event);
                    }
                }
            })
            .map_err(|_| TimingError::Timeout)?;
    }
    log::info!(
        "hw_timer(sim): sense every {}ms, calendar every {}ms",
        sense_interval_ms, calendar_tick_ms
    );
    Ok(TickTimers { stop })
}

impl Drop for TickTimers {
    fn drop(&mut self) {
        #[cfg(target_os = "espidf")]
        for h in self.handles {
            // SAFETY: handles are valid until deleted here, exactly once.
            unsafe {
                esp_timer_stop(h);
                esp_timer_delete(h);
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.stop.store(true, std::sync::atomic::Ordering::Release);
    }
}

// ───────────────────────────────────────────────────────────────
// Per-channel off-timers
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
struct OffTimerSlot {
    queue: &'static IoEventQueue,
    channel: Channel,
    generation: AtomicU32,
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn off_timer_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is a leaked `OffTimerSlot`, valid for the program's life.
    let slot = unsafe { &*(arg as *const OffTimerSlot) };
    slot.queue.post(IoEvent::PumpOffTimer {
        channel: slot.channel,
        generation: slot.generation.load(Ordering::Acquire),
    });
}

/// One-shot off-timers for both pump channels.
pub struct OffTimers {
    #[cfg(target_os = "espidf")]
    handles: [esp_timer_handle_t; 2],
    #[cfg(target_os = "espidf")]
    slots: [&'static OffTimerSlot; 2],

    #[cfg(not(target_os = "espidf"))]
    queue: &'static IoEventQueue,
    /// Bumped on every arm/cancel; a sleeping thread only posts if its
    /// sequence number is still current.
    #[cfg(not(target_os = "espidf"))]
    seq: std::sync::Arc<[std::sync::atomic::AtomicU32; 2]>,
}

// SAFETY: esp_timer handles may be used from any task; the slot data is
// immutable apart from the atomic generation.
#[cfg(target_os = "espidf")]
unsafe impl Send for OffTimers {}

impl OffTimers {
    #[cfg(target_os = "espidf")]
    pub fn new(queue: &'static IoEventQueue) -> Result<Self, TimingError> {
        let a: &'static OffTimerSlot = Box::leak(Box::new(OffTimerSlot {
            queue,
            channel: Channel::A,
            generation: AtomicU32::new(0),
        }));
        let b: &'static OffTimerSlot = Box::leak(Box::new(OffTimerSlot {
            queue,
            channel: Channel::B,
            generation: AtomicU32::new(0),
        }));
        let ha = create_timer(off_timer_cb, a as *const _ as *mut _, b"pump_off_a\0")?;
        let hb = create_timer(off_timer_cb, b as *const _ as *mut _, b"pump_off_b\0")?;
        Ok(Self {
            handles: [ha, hb],
            slots: [a, b],
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(queue: &'static IoEventQueue) -> Result<Self, TimingError> {
        use std::sync::atomic::AtomicU32;
        Ok(Self {
            queue,
            seq: std::sync::Arc::new([AtomicU32::new(0), AtomicU32::new(0)]),
        })
    }
}

impl OffTimerPort for OffTimers {
    #[cfg(target_os = "espidf")]
    fn arm(&mut self, channel: Channel, duration_ms: u32, generation: u32) -> Result<(), TimingError> {
        let i = channel.index();
        self.slots[i].generation.store(generation, Ordering::Release);
        // SAFETY: handle is valid for the lifetime of `self`.
        unsafe {
            // Stopping an idle timer returns ESP_ERR_INVALID_STATE; ignore it.
            esp_timer_stop(self.handles[i]);
            let ret = esp_timer_start_once(self.handles[i], u64::from(duration_ms) * 1000);
            if ret != ESP_OK {
                error!("pump: off-timer {:?} arm failed (rc={})", channel, ret);
                return Err(TimingError::Timeout);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn arm(&mut self, channel: Channel, duration_ms: u32, generation: u32) -> Result<(), TimingError> {
        use std::sync::atomic::Ordering;

        let i = channel.index();
        let my_seq = self.seq[i].fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        let seq = self.seq.clone();
        let queue = self.queue;
        std::thread::Builder::new()
            .name("pump-off".into())
            .spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(u64::from(duration_ms)));
                if seq[i].load(Ordering::Acquire) == my_seq {
                    queue.post(IoEvent::PumpOffTimer {
                        channel,
                        generation,
                    });
                }
            })
            .map(|_| ())
            .map_err(|_| TimingError::Timeout)
    }

    #[cfg(target_os = "espidf")]
    fn cancel(&mut self, channel: Channel) {
        // SAFETY: handle is valid for the lifetime of `self`.
        unsafe {
            esp_timer_stop(self.handles[channel.index()]);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn cancel(&mut self, channel: Channel) {
        self.seq[channel.index()].fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    }
}
