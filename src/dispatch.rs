//! Trigger dispatch: bounded queue, profile selection, worker.
//!
//! ```text
//!  calendar callback ──enqueue(token)──▶ DispatchQueue (cap 3)
//!                                              │ receive (blocking)
//!                                              ▼
//!                     Dispatcher ── resolve ─▶ ScheduleLookup
//!                         │      ── humidity ▶ HumiditySource
//!                         └───── run(ch, ms) ▶ PumpActuator
//! ```
//!
//! The calendar callback must return promptly, so [`DispatchQueue::enqueue`]
//! never waits: a full queue applies the configured [`OverflowPolicy`].

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, HumiditySource, PumpActuator, ScheduleLookup};
use crate::config::{OverflowPolicy, SystemConfig};
use crate::schedule::record::{Profile, ScheduleName};
use crate::schedule::store::ScheduleToken;

/// Maximum number of triggers waiting for the worker.
pub const DISPATCH_QUEUE_CAP: usize = 3;

// ───────────────────────────────────────────────────────────────
// Queue
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue full under `DropNewest`: the new token was discarded.
    DroppedNewest,
    /// Queue full under `DropOldest`: this token was evicted.
    EvictedOldest(ScheduleToken),
}

pub struct DispatchQueue {
    channel: Channel<CriticalSectionRawMutex, ScheduleToken, DISPATCH_QUEUE_CAP>,
    policy: OverflowPolicy,
    dropped: AtomicU32,
}

impl DispatchQueue {
    pub const fn new(policy: OverflowPolicy) -> Self {
        Self {
            channel: Channel::new(),
            policy,
            dropped: AtomicU32::new(0),
        }
    }

    /// Non-blocking; safe from the calendar callback.
    pub fn enqueue(&self, token: ScheduleToken) -> EnqueueOutcome {
        if self.channel.try_send(token).is_ok() {
            return EnqueueOutcome::Queued;
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        match self.policy {
            OverflowPolicy::DropNewest => {
                warn!("dispatch: queue full, trigger {:?} dropped", token);
                EnqueueOutcome::DroppedNewest
            }
            OverflowPolicy::DropOldest => {
                let evicted = self.channel.try_receive().ok();
                if self.channel.try_send(token).is_err() {
                    // Another producer refilled the slot in between.
                    warn!("dispatch: queue full, trigger {:?} dropped", token);
                    return EnqueueOutcome::DroppedNewest;
                }
                match evicted {
                    Some(old) => {
                        warn!("dispatch: queue full, evicted {:?}", old);
                        EnqueueOutcome::EvictedOldest(old)
                    }
                    None => EnqueueOutcome::Queued,
                }
            }
        }
    }

    /// Block the calling thread until a trigger is available.
    pub fn receive_blocking(&self) -> ScheduleToken {
        futures_lite::future::block_on(self.channel.receive())
    }

    pub fn try_receive(&self) -> Option<ScheduleToken> {
        self.channel.try_receive().ok()
    }

    /// Discard everything pending.  Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut n = 0;
        while self.channel.try_receive().is_ok() {
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Triggers lost to overflow since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ───────────────────────────────────────────────────────────────
// Profile selection
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileThresholds {
    /// At or below → Dry.
    pub dry: f32,
    /// At or below → Moderate; above → Wet.
    pub moderate: f32,
}

impl ProfileThresholds {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            dry: cfg.humid_dry_thresh,
            moderate: cfg.humid_moderate_thresh,
        }
    }
}

impl Default for ProfileThresholds {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

/// Pure: no valid reading yet → Moderate.
pub fn select_profile(has_valid: bool, humidity: f32, th: &ProfileThresholds) -> Profile {
    if !has_valid {
        Profile::Moderate
    } else if humidity <= th.dry {
        Profile::Dry
    } else if humidity <= th.moderate {
        Profile::Moderate
    } else {
        Profile::Wet
    }
}

pub fn clamp_duration(duration_ms: u32, max_run_ms: u32) -> u32 {
    duration_ms.min(max_run_ms)
}

// ───────────────────────────────────────────────────────────────
// Worker
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Dispatched {
        name: ScheduleName,
        profile: Profile,
        duration_ms: u32,
        /// Channels that accepted the run.
        started: u8,
        /// Channels whose run failed.
        failed: u8,
    },
    /// The token's table generation is gone.
    Stale,
}

pub struct Dispatcher<L, H, P> {
    queue: Arc<DispatchQueue>,
    lookup: Arc<L>,
    humidity: Arc<H>,
    pumps: Arc<P>,
    thresholds: ProfileThresholds,
    max_run_ms: u32,
}

impl<L, H, P> Dispatcher<L, H, P>
where
    L: ScheduleLookup,
    H: HumiditySource,
    P: PumpActuator,
{
    pub fn new(
        queue: Arc<DispatchQueue>,
        lookup: Arc<L>,
        humidity: Arc<H>,
        pumps: Arc<P>,
        config: &SystemConfig,
    ) -> Self {
        Self {
            queue,
            lookup,
            humidity,
            pumps,
            thresholds: ProfileThresholds::from_config(config),
            max_run_ms: config.max_run_ms,
        }
    }

    /// Resolve one trigger and command its pumps.
    pub fn dispatch(&self, token: ScheduleToken, sink: &mut impl EventSink) -> DispatchOutcome {
        let Some(resolved) = self.lookup.resolve(token) else {
            info!("dispatch: stale trigger {:?} skipped", token);
            sink.emit(&AppEvent::StaleTrigger(token));
            return DispatchOutcome::Stale;
        };
        let entry = resolved.entry;

        let has_valid = self.humidity.has_valid_reading();
        let humidity = self.humidity.average_humidity();
        let profile = select_profile(has_valid, humidity, &self.thresholds);

        let stored = entry.duration_for(profile);
        let duration_ms = clamp_duration(stored, self.max_run_ms);
        if duration_ms != stored {
            warn!(
                "dispatch: '{}' {:?} duration {} ms clamped to {} ms",
                resolved.name, profile, stored, duration_ms
            );
        }
        info!(
            "dispatch: '{}' profile={:?} RH={} duration={} ms",
            resolved.name,
            profile,
            if has_valid { humidity } else { f32::NAN },
            duration_ms
        );
        sink.emit(&AppEvent::Dispatched {
            name: resolved.name.clone(),
            profile,
            duration_ms,
            humidity: has_valid.then_some(humidity),
        });

        let mut started = 0;
        let mut failed = 0;
        if duration_ms == 0 {
            debug!("dispatch: '{}' has no run time for {:?}", resolved.name, profile);
        } else {
            for channel in entry.pumps.channels() {
                match self.pumps.run(channel, duration_ms) {
                    Ok(()) => started += 1,
                    Err(error) => {
                        warn!("dispatch: pump {:?} failed: {}", channel, error);
                        sink.emit(&AppEvent::PumpRunFailed { channel, error });
                        failed += 1;
                    }
                }
            }
        }

        DispatchOutcome::Dispatched {
            name: resolved.name,
            profile,
            duration_ms,
            started,
            failed,
        }
    }

    /// Dispatch everything currently queued without blocking.
    pub fn process_pending(&self, sink: &mut impl EventSink) -> usize {
        let mut n = 0;
        while let Some(token) = self.queue.try_receive() {
            self.dispatch(token, sink);
            n += 1;
        }
        n
    }

    /// Worker loop: block on the queue forever.
    pub fn run(&self, sink: &mut impl EventSink) -> ! {
        info!("dispatch: worker started");
        loop {
            let token = self.queue.receive_blocking();
            self.dispatch(token, sink);
        }
    }
}
