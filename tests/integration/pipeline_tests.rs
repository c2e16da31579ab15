//! Integration tests for the sense → decide → actuate pipeline through
//! `AppService`.

use std::time::{Duration, Instant};

use misty::adapters::calendar::TickCalendar;
use misty::app::events::AppEvent;
use misty::app::service::AppService;
use misty::config::{OverflowPolicy, SystemConfig};
use misty::drivers::pump::{Channel, ChannelState, Owner};
use misty::error::SensorError;
use misty::events::IoEvent;
use misty::schedule::record::{DayMask, Profile, PumpMask, ScheduleEntry, Trigger};

use crate::mock_hw::{FixedClock, ManualTimers, MemStorage, RecordingMotor, RecordingSink, ScriptedSensor};

type App = AppService<ScriptedSensor, MemStorage, TickCalendar, RecordingMotor, ManualTimers>;

struct Rig {
    app: App,
    sensor: ScriptedSensor,
    motor: RecordingMotor,
    timers: ManualTimers,
    sink: RecordingSink,
}

fn rig_with(config: SystemConfig, humidity: f32) -> Rig {
    let sensor = ScriptedSensor::steady(22.0, humidity);
    let motor = RecordingMotor::default();
    let timers = ManualTimers::default();
    let app = AppService::new(
        config,
        sensor.clone(),
        MemStorage::default(),
        TickCalendar::new(16),
        motor.clone(),
        timers.clone(),
    )
    .unwrap();
    let mut sink = RecordingSink::default();
    app.start(&mut sink).unwrap();
    Rig {
        app,
        sensor,
        motor,
        timers,
        sink,
    }
}

fn rig(humidity: f32) -> Rig {
    rig_with(SystemConfig::default(), humidity)
}

fn at(hour: u8, minute: u8, pumps: PumpMask, durations_ms: [u32; 3]) -> ScheduleEntry {
    ScheduleEntry {
        pumps,
        trigger: Trigger::DayOfWeek {
            days: DayMask::EVERY_DAY,
            hour,
            minute,
        },
        durations_ms,
    }
}

fn dispatched(sink: &RecordingSink) -> Vec<(Profile, u32)> {
    sink.events()
        .into_iter()
        .filter_map(|e| match e {
            AppEvent::Dispatched {
                profile,
                duration_ms,
                ..
            } => Some((profile, duration_ms)),
            _ => None,
        })
        .collect()
}

// ── Full pipeline ─────────────────────────────────────────────

#[test]
fn humid_air_selects_wet_profile_and_timer_stops_pump() {
    let mut r = rig(85.0);
    let clock = FixedClock::at(2, 7, 0);
    r.app
        .set_schedule("morning", &at(7, 0, PumpMask::A, [9_000, 6_000, 2_000]), &mut r.sink)
        .unwrap();

    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    assert_eq!(r.app.dispatcher().process_pending(&mut r.sink), 1);

    assert_eq!(dispatched(&r.sink), [(Profile::Wet, 2_000)]);
    assert!(r.motor.driving(Channel::A));
    assert!(!r.motor.driving(Channel::B));
    assert!(r.motor.line());

    let armed = r.timers.armed(Channel::A).unwrap();
    assert_eq!(armed.duration_ms, 2_000);
    r.app.handle_io_event(
        IoEvent::PumpOffTimer {
            channel: Channel::A,
            generation: armed.generation,
        },
        &clock,
        &mut r.sink,
    );
    assert_eq!(r.app.pumps().channel_state(Channel::A), ChannelState::Idle);
    assert!(!r.motor.driving(Channel::A));
    assert!(!r.motor.line());
}

#[test]
fn no_reading_yet_selects_moderate() {
    let mut r = rig(10.0);
    let clock = FixedClock::at(0, 6, 30);
    r.app
        .set_schedule("s", &at(6, 30, PumpMask::BOTH, [9_000, 6_000, 2_000]), &mut r.sink)
        .unwrap();
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    r.app.dispatcher().process_pending(&mut r.sink);

    assert_eq!(dispatched(&r.sink), [(Profile::Moderate, 6_000)]);
    assert!(r.motor.driving(Channel::A));
    assert!(r.motor.driving(Channel::B));
}

#[test]
fn failed_reading_keeps_previous_average() {
    let mut r = rig(20.0);
    let clock = FixedClock::at(0, 6, 30);
    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);
    r.sensor.push(Err(SensorError::I2c));
    r.sensor.push(Ok((22.0, 150.0)));
    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);
    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);

    assert!(r.app.sensors().has_valid_reading());
    assert_eq!(r.app.sensors().average_humidity(), 20.0);
    let env = r
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, AppEvent::Environment(_)))
        .count();
    assert_eq!(env, 1);
}

#[test]
fn rolling_average_drives_profile_change() {
    let mut r = rig(30.0);
    let clock = FixedClock::at(4, 12, 0);
    r.app
        .set_schedule("noon", &at(12, 0, PumpMask::B, [3_000, 2_000, 1_000]), &mut r.sink)
        .unwrap();

    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);
    r.sensor.set_fallback(22.0, 70.0);
    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);
    // (30 + 70) / 2 = 50 → Moderate
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    r.app.dispatcher().process_pending(&mut r.sink);
    assert_eq!(dispatched(&r.sink), [(Profile::Moderate, 2_000)]);
}

#[test]
fn durations_are_clamped_to_max_run() {
    let config = SystemConfig {
        max_run_ms: 60_000,
        ..Default::default()
    };
    let mut r = rig_with(config, 20.0);
    let clock = FixedClock::at(0, 5, 0);
    r.app
        .set_schedule("long", &at(5, 0, PumpMask::A, [u32::MAX, 0, 0]), &mut r.sink)
        .unwrap();
    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    r.app.dispatcher().process_pending(&mut r.sink);

    assert_eq!(dispatched(&r.sink), [(Profile::Dry, 60_000)]);
    assert_eq!(r.timers.armed(Channel::A).unwrap().duration_ms, 60_000);
}

#[test]
fn zero_duration_profile_runs_nothing() {
    let mut r = rig(90.0);
    let clock = FixedClock::at(0, 5, 0);
    r.app
        .set_schedule("dryonly", &at(5, 0, PumpMask::A, [4_000, 2_000, 0]), &mut r.sink)
        .unwrap();
    r.app.handle_io_event(IoEvent::SenseTick, &clock, &mut r.sink);
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    r.app.dispatcher().process_pending(&mut r.sink);

    assert_eq!(dispatched(&r.sink), [(Profile::Wet, 0)]);
    assert!(!r.motor.driving(Channel::A));
    assert!(r.timers.armed(Channel::A).is_none());
}

// ── Calendar + queue ──────────────────────────────────────────

#[test]
fn trigger_fires_once_per_minute_on_matching_days_only() {
    let mut r = rig(50.0);
    let entry = ScheduleEntry {
        pumps: PumpMask::A,
        trigger: Trigger::DayOfWeek {
            days: DayMask(0b001_0000), // Friday
            hour: 18,
            minute: 15,
        },
        durations_ms: [1_000; 3],
    };
    r.app.set_schedule("fri", &entry, &mut r.sink).unwrap();

    let clock = FixedClock::at(4, 18, 15);
    for _ in 0..3 {
        r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    }
    assert_eq!(r.app.queue().len(), 1);

    clock.set(5, 18, 15);
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    assert_eq!(r.app.queue().len(), 1);
}

#[test]
fn unset_clock_fires_nothing() {
    let mut r = rig(50.0);
    r.app
        .set_schedule("s", &at(0, 0, PumpMask::A, [1_000; 3]), &mut r.sink)
        .unwrap();
    r.app
        .handle_io_event(IoEvent::CalendarTick, &FixedClock::unset(), &mut r.sink);
    assert!(r.app.queue().is_empty());
}

#[test]
fn overflow_drop_newest_keeps_first_three() {
    let mut r = rig(50.0);
    let clock = FixedClock::at(0, 9, 0);
    for name in ["a", "b", "c", "d"] {
        r.app
            .set_schedule(name, &at(9, 0, PumpMask::A, [1_000; 3]), &mut r.sink)
            .unwrap();
    }
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    assert_eq!(r.app.queue().len(), 3);
    assert_eq!(r.app.queue().dropped(), 1);

    let slots: Vec<u8> = core::iter::from_fn(|| r.app.queue().try_receive())
        .map(|t| t.slot)
        .collect();
    assert_eq!(slots, [0, 1, 2]);
}

#[test]
fn overflow_drop_oldest_keeps_last_three() {
    let config = SystemConfig {
        dispatch_overflow: OverflowPolicy::DropOldest,
        ..Default::default()
    };
    let mut r = rig_with(config, 50.0);
    let clock = FixedClock::at(0, 9, 0);
    for name in ["a", "b", "c", "d"] {
        r.app
            .set_schedule(name, &at(9, 0, PumpMask::A, [1_000; 3]), &mut r.sink)
            .unwrap();
    }
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    let slots: Vec<u8> = core::iter::from_fn(|| r.app.queue().try_receive())
        .map(|t| t.slot)
        .collect();
    assert_eq!(slots, [1, 2, 3]);
}

#[test]
fn token_from_before_reload_is_stale() {
    let mut r = rig(50.0);
    let clock = FixedClock::at(0, 9, 0);
    r.app
        .set_schedule("a", &at(9, 0, PumpMask::A, [1_000; 3]), &mut r.sink)
        .unwrap();
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    let token = r.app.queue().try_receive().unwrap();

    r.app.reload(&mut r.sink).unwrap();
    let d = r.app.dispatcher();
    d.dispatch(token, &mut r.sink);

    assert!(r.sink.events().contains(&AppEvent::StaleTrigger(token)));
    assert!(!r.motor.driving(Channel::A));
}

#[test]
fn deleted_schedule_keeps_firing_until_reload() {
    let mut r = rig(50.0);
    let clock = FixedClock::at(0, 9, 0);
    r.app
        .set_schedule("a", &at(9, 0, PumpMask::A, [1_000; 3]), &mut r.sink)
        .unwrap();
    r.app.delete_schedule("a").unwrap();
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    assert_eq!(r.app.queue().len(), 1);

    r.app.reload(&mut r.sink).unwrap();
    clock.set(1, 9, 0);
    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);
    assert!(r.app.queue().is_empty());
}

// ── Worker thread ─────────────────────────────────────────────

#[test]
fn dispatch_worker_thread_runs_queued_trigger() {
    let mut r = rig(50.0);
    let clock = FixedClock::at(3, 21, 45);
    r.app
        .set_schedule("eve", &at(21, 45, PumpMask::B, [1_000; 3]), &mut r.sink)
        .unwrap();
    let worker_sink = RecordingSink::default();
    let _worker = r.app.spawn_dispatcher(worker_sink.clone()).unwrap();

    r.app.handle_io_event(IoEvent::CalendarTick, &clock, &mut r.sink);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !r.app.pumps().channel_state(Channel::B).is_running() {
        assert!(Instant::now() < deadline, "worker never started the pump");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(
        r.app.pumps().channel_state(Channel::B),
        ChannelState::Running {
            owner: Owner::Scheduled,
            generation: r.timers.armed(Channel::B).unwrap().generation,
        }
    );
    assert_eq!(dispatched(&worker_sink).len(), 1);
}
