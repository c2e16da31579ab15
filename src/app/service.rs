//! Application service — the hexagonal core.
//!
//! [`AppService`] is the explicitly constructed application context: it
//! owns the sensor engine, the schedule store, the pump controller and the
//! dispatch queue, and wires them to each other.  There are no global
//! service instances; everything reaches its collaborators through the
//! `Arc`s handed out here, so every port can be replaced by a test double.
//!
//! ```text
//!  ClimateSensorPort ──▶ SensorEngine ─────────────┐ humidity
//!                                                  ▼
//!  CalendarPort ──▶ ScheduleStore ──token──▶ DispatchQueue ──▶ Dispatcher
//!       ▲                ▲                                        │ run
//!  CalendarTick    set/delete/reload                              ▼
//!                                              MotorPort ◀── PumpController
//!  IoEvent ──▶ handle_io_event ─────────────────────────────────────┘
//! ```

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::config::SystemConfig;
use crate::dispatch::{DispatchQueue, Dispatcher, EnqueueOutcome};
use crate::drivers::pump::PumpController;
use crate::drivers::task::{self, Core};
use crate::error::Result;
use crate::events::IoEvent;
use crate::power::{ChargeMonitor, ChargeState};
use crate::schedule::record::ScheduleEntry;
use crate::schedule::store::{ReloadReport, ScheduleStore};
use crate::sensors::SensorEngine;

use super::events::AppEvent;
use super::ports::{
    CalendarPort, ClimateSensorPort, ClockPort, EventSink, MotorPort, OffTimerPort, StoragePort,
    TriggerCallback,
};

/// Dispatch worker: priority above the event loop, small stack.
const DISPATCH_TASK_PRIORITY: u8 = 6;
const DISPATCH_TASK_STACK_KB: usize = 6;

pub type AppDispatcher<S, St, C, M, T> =
    Dispatcher<ScheduleStore<St, C>, SensorEngine<S>, PumpController<M, T>>;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<S, St, C, M, T>
where
    S: ClimateSensorPort,
    St: StoragePort,
    C: CalendarPort,
    M: MotorPort,
    T: OffTimerPort,
{
    config: SystemConfig,
    sensors: Arc<SensorEngine<S>>,
    schedules: Arc<ScheduleStore<St, C>>,
    pumps: Arc<PumpController<M, T>>,
    queue: Arc<DispatchQueue>,
    charge: ChargeMonitor,
}

impl<S, St, C, M, T> AppService<S, St, C, M, T>
where
    S: ClimateSensorPort,
    St: StoragePort,
    C: CalendarPort,
    M: MotorPort,
    T: OffTimerPort,
{
    /// Construct every service from its ports.
    ///
    /// Fails only if the schedule namespace cannot be opened.  The table
    /// is empty until [`start`](Self::start).
    pub fn new(
        config: SystemConfig,
        sensor: S,
        storage: St,
        calendar: C,
        motor: M,
        timers: T,
    ) -> Result<Self> {
        let queue = Arc::new(DispatchQueue::new(config.dispatch_overflow));

        let q = queue.clone();
        let on_trigger: TriggerCallback = Arc::new(move |token| {
            if q.enqueue(token) == EnqueueOutcome::Queued {
                debug!("dispatch: queued {:?}", token);
            }
        });

        let q = queue.clone();
        let schedules = ScheduleStore::open(storage, calendar, on_trigger)?.with_reload_hook(
            move || {
                let n = q.clear();
                if n > 0 {
                    info!("dispatch: {} pending trigger(s) discarded by reload", n);
                }
            },
        );

        Ok(Self {
            sensors: Arc::new(SensorEngine::new(sensor, &config)),
            schedules: Arc::new(schedules),
            pumps: Arc::new(PumpController::new(motor, timers, config.pump_duty_percent)),
            queue,
            charge: ChargeMonitor::new(),
            config,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Reset the sensor and load the schedule table.
    ///
    /// A sensor failure is logged and tolerated (sensing retries on every
    /// tick); a schedule load failure is returned.
    pub fn start(&self, sink: &mut impl EventSink) -> Result<ReloadReport> {
        if self.sensors.init().is_err() {
            warn!("sensor: starting without a successful reset");
        }
        let report = self.schedules.reload()?;
        sink.emit(&AppEvent::Started { schedules: report });
        info!(
            "AppService started: {} schedule(s), window {} slots",
            report.loaded,
            self.config.window_slots()
        );
        Ok(report)
    }

    /// Worker that resolves queued triggers and drives the pumps.
    pub fn dispatcher(&self) -> AppDispatcher<S, St, C, M, T> {
        Dispatcher::new(
            self.queue.clone(),
            self.schedules.clone(),
            self.sensors.clone(),
            self.pumps.clone(),
            &self.config,
        )
    }

    /// Run [`dispatcher`](Self::dispatcher) on its own thread, forever.
    pub fn spawn_dispatcher(
        &self,
        mut sink: impl EventSink + Send + 'static,
    ) -> io::Result<JoinHandle<()>>
    where
        S: 'static,
        St: 'static,
        C: 'static,
        M: 'static,
        T: 'static,
    {
        let dispatcher = self.dispatcher();
        task::spawn_on_core(
            Core::Pro,
            DISPATCH_TASK_PRIORITY,
            DISPATCH_TASK_STACK_KB,
            "dispatch\0",
            move || dispatcher.run(&mut sink),
        )
    }

    // ── Event routing ─────────────────────────────────────────

    /// Route one hardware/timer event to the service that owns it.
    pub fn handle_io_event(&self, event: IoEvent, clock: &impl ClockPort, sink: &mut impl EventSink) {
        match event {
            IoEvent::SenseTick => {
                if self.sensors.sense().is_ok() {
                    sink.emit(&AppEvent::Environment(self.sensors.latest()));
                }
            }
            IoEvent::CalendarTick => match clock.now() {
                Some(now) => self.schedules.poll_calendar(&now),
                None => debug!("sched: wall clock not set, calendar idle"),
            },
            IoEvent::PumpOffTimer {
                channel,
                generation,
            } => self.pumps.on_off_timer(channel, generation),
            IoEvent::PumpFault => {
                self.pumps.on_fault();
                sink.emit(&AppEvent::PumpFault);
            }
            IoEvent::PumpTrigButton => match self.pumps.toggle_manual() {
                Ok(on) => sink.emit(&AppEvent::ManualTest(on)),
                Err(e) => warn!("pump: manual test toggle failed: {}", e),
            },
            IoEvent::ConfigButton => {
                info!("config: button pressed (no network configurator in this build)");
            }
            IoEvent::ChargingChanged(charging) => {
                self.charge.set_charging(charging);
                sink.emit(&AppEvent::Charge(self.charge.state()));
            }
            IoEvent::ChargeDoneChanged(done) => {
                self.charge.set_charge_done(done);
                sink.emit(&AppEvent::Charge(self.charge.state()));
            }
        }
    }

    // ── Schedule management ───────────────────────────────────

    /// Persist a new schedule and reload.  Pending triggers are discarded.
    pub fn set_schedule(
        &self,
        name: &str,
        entry: &ScheduleEntry,
        sink: &mut impl EventSink,
    ) -> Result<ReloadReport> {
        let report = self.schedules.set_schedule(name, entry)?;
        sink.emit(&AppEvent::SchedulesReloaded(report));
        Ok(report)
    }

    /// Erase a schedule.  Takes effect at the next [`reload`](Self::reload).
    pub fn delete_schedule(&self, name: &str) -> Result<()> {
        self.schedules.delete_schedule(name)
    }

    pub fn reload(&self, sink: &mut impl EventSink) -> Result<ReloadReport> {
        let report = self.schedules.reload()?;
        sink.emit(&AppEvent::SchedulesReloaded(report));
        Ok(report)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn sensors(&self) -> &Arc<SensorEngine<S>> {
        &self.sensors
    }

    pub fn schedules(&self) -> &Arc<ScheduleStore<St, C>> {
        &self.schedules
    }

    pub fn pumps(&self) -> &Arc<PumpController<M, T>> {
        &self.pumps
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    pub fn charge_state(&self) -> ChargeState {
        self.charge.state()
    }
}
