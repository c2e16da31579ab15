//! Integration tests for pump actuation driven through `AppService` event
//! routing: off-timers, nFAULT, the manual test button and failure paths.

use misty::adapters::calendar::TickCalendar;
use misty::app::events::AppEvent;
use misty::app::service::AppService;
use misty::config::SystemConfig;
use misty::drivers::pump::{Channel, ChannelState, Owner};
use misty::error::{Error, HwError, TimingError};
use misty::events::IoEvent;
use misty::power::ChargeState;
use misty::schedule::record::{DayMask, PumpMask, ScheduleEntry, Trigger};

use crate::mock_hw::{
    FixedClock, ManualTimers, MemStorage, MotorCall, RecordingMotor, RecordingSink,
    ScriptedSensor,
};

type App = AppService<ScriptedSensor, MemStorage, TickCalendar, RecordingMotor, ManualTimers>;

fn app() -> (App, RecordingMotor, ManualTimers, RecordingSink) {
    let motor = RecordingMotor::default();
    let timers = ManualTimers::default();
    let app = AppService::new(
        SystemConfig::default(),
        ScriptedSensor::steady(22.0, 50.0),
        MemStorage::default(),
        TickCalendar::new(16),
        motor.clone(),
        timers.clone(),
    )
    .unwrap();
    let mut sink = RecordingSink::default();
    app.start(&mut sink).unwrap();
    (app, motor, timers, sink)
}

fn nine_am(pumps: PumpMask) -> ScheduleEntry {
    ScheduleEntry {
        pumps,
        trigger: Trigger::DayOfWeek {
            days: DayMask::EVERY_DAY,
            hour: 9,
            minute: 0,
        },
        durations_ms: [5_000; 3],
    }
}

/// Fire the 09:00 schedule and drain the dispatch queue.
fn fire(app: &App, sink: &mut RecordingSink) {
    let clock = FixedClock::at(0, 9, 0);
    app.handle_io_event(IoEvent::CalendarTick, &clock, sink);
    app.dispatcher().process_pending(sink);
}

fn off_timer(channel: Channel, generation: u32) -> IoEvent {
    IoEvent::PumpOffTimer {
        channel,
        generation,
    }
}

#[test]
fn fault_stops_both_channels_and_ends_manual_mode() {
    let (app, motor, timers, mut sink) = app();
    let clock = FixedClock::unset();
    app.handle_io_event(IoEvent::PumpTrigButton, &clock, &mut sink);
    assert!(app.pumps().is_manual());
    assert!(motor.driving(Channel::A) && motor.driving(Channel::B));

    app.handle_io_event(IoEvent::PumpFault, &clock, &mut sink);
    assert!(!app.pumps().is_manual());
    for ch in Channel::ALL {
        assert_eq!(app.pumps().channel_state(ch), ChannelState::Idle);
        assert!(!motor.driving(ch));
        assert!(timers.armed(ch).is_none());
    }
    assert!(!motor.line());
    assert_eq!(
        sink.events()[1..],
        [AppEvent::ManualTest(true), AppEvent::PumpFault]
    );
}

#[test]
fn manual_test_refuses_scheduled_runs() {
    let (app, motor, timers, mut sink) = app();
    app.set_schedule("a", &nine_am(PumpMask::A), &mut sink).unwrap();
    app.handle_io_event(IoEvent::PumpTrigButton, &FixedClock::unset(), &mut sink);

    fire(&app, &mut sink);
    assert!(sink.events().contains(&AppEvent::PumpRunFailed {
        channel: Channel::A,
        error: Error::Busy("manual test run active"),
    }));
    assert!(matches!(
        app.pumps().channel_state(Channel::A),
        ChannelState::Running {
            owner: Owner::Manual,
            ..
        }
    ));
    assert!(timers.armed(Channel::A).is_none());

    // Second press ends the test; the next trigger runs normally.
    app.handle_io_event(IoEvent::PumpTrigButton, &FixedClock::unset(), &mut sink);
    assert!(!motor.line());
    app.handle_io_event(
        IoEvent::CalendarTick,
        &FixedClock::at(1, 9, 0),
        &mut sink,
    );
    app.dispatcher().process_pending(&mut sink);
    assert!(matches!(
        app.pumps().channel_state(Channel::A),
        ChannelState::Running {
            owner: Owner::Scheduled,
            ..
        }
    ));
}

#[test]
fn timer_arm_failure_releases_line() {
    let (app, motor, timers, mut sink) = app();
    app.set_schedule("a", &nine_am(PumpMask::B), &mut sink).unwrap();
    *timers.fail_arm.lock().unwrap() = true;

    fire(&app, &mut sink);
    assert!(sink.events().contains(&AppEvent::PumpRunFailed {
        channel: Channel::B,
        error: Error::Timing(TimingError::Timeout),
    }));
    assert_eq!(app.pumps().channel_state(Channel::B), ChannelState::Idle);
    assert!(!motor.calls().contains(&MotorCall::Forward(Channel::B)));
    assert!(!motor.line());
}

#[test]
fn drive_failure_leaves_channel_idle() {
    let (app, motor, _timers, mut sink) = app();
    app.set_schedule("a", &nine_am(PumpMask::BOTH), &mut sink).unwrap();
    *motor.fail_forward.lock().unwrap() = true;

    fire(&app, &mut sink);
    let failures = sink
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                AppEvent::PumpRunFailed {
                    error: Error::HardwareIo(HwError::PwmWriteFailed),
                    ..
                }
            )
        })
        .count();
    assert_eq!(failures, 2);
    for ch in Channel::ALL {
        assert_eq!(app.pumps().channel_state(ch), ChannelState::Idle);
    }
    assert!(!app.pumps().is_line_asserted());
}

#[test]
fn stale_off_timer_does_not_stop_rearmed_channel() {
    let (app, motor, timers, mut sink) = app();
    app.set_schedule("a", &nine_am(PumpMask::A), &mut sink).unwrap();
    fire(&app, &mut sink);
    let first = timers.armed(Channel::A).unwrap().generation;

    // Same minute on the next day re-arms the running channel.
    app.handle_io_event(IoEvent::CalendarTick, &FixedClock::at(1, 9, 0), &mut sink);
    app.dispatcher().process_pending(&mut sink);
    let second = timers.armed(Channel::A).unwrap().generation;
    assert_ne!(first, second);

    let clock = FixedClock::unset();
    app.handle_io_event(off_timer(Channel::A, first), &clock, &mut sink);
    assert!(app.pumps().channel_state(Channel::A).is_running());
    assert!(motor.driving(Channel::A));

    app.handle_io_event(off_timer(Channel::A, second), &clock, &mut sink);
    assert_eq!(app.pumps().channel_state(Channel::A), ChannelState::Idle);
    assert!(!motor.line());
}

#[test]
fn off_timer_for_the_other_channel_is_ignored() {
    let (app, _motor, timers, mut sink) = app();
    app.set_schedule("a", &nine_am(PumpMask::A), &mut sink).unwrap();
    fire(&app, &mut sink);
    let generation = timers.armed(Channel::A).unwrap().generation;

    app.handle_io_event(
        off_timer(Channel::B, generation),
        &FixedClock::unset(),
        &mut sink,
    );
    assert!(app.pumps().channel_state(Channel::A).is_running());
    assert!(app.pumps().is_line_asserted());
}

#[test]
fn charger_levels_update_charge_state() {
    let (app, _motor, _timers, mut sink) = app();
    let clock = FixedClock::unset();
    assert_eq!(app.charge_state(), ChargeState::OnBattery);

    app.handle_io_event(IoEvent::ChargingChanged(true), &clock, &mut sink);
    assert_eq!(app.charge_state(), ChargeState::Charging);
    app.handle_io_event(IoEvent::ChargeDoneChanged(true), &clock, &mut sink);
    assert_eq!(app.charge_state(), ChargeState::Charged);
    assert_eq!(
        sink.events().last(),
        Some(&AppEvent::Charge(ChargeState::Charged))
    );
}
