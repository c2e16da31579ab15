//! Mock hardware adapters for integration tests.
//!
//! Every mock hands out a cloneable handle to its recorded state, because
//! the real object is moved into [`AppService`](misty::app::service::AppService)
//! and tests still need to script it and assert on the full call history.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use misty::app::events::AppEvent;
use misty::app::ports::{
    ClimateSensorPort, ClockPort, EntryInfo, EventSink, LocalTime, MotorPort, OffTimerPort,
    StorageError, StoragePort,
};
use misty::drivers::pump::Channel;
use misty::error::{HwError, SensorError, TimingError};

// ── Sensor ────────────────────────────────────────────────────

/// Returns scripted readings in order, then repeats `fallback`.
#[derive(Clone)]
pub struct ScriptedSensor {
    script: Arc<Mutex<VecDeque<Result<(f32, f32), SensorError>>>>,
    fallback: Arc<Mutex<(f32, f32)>>,
    pending: Option<(f32, f32)>,
}

#[allow(dead_code)]
impl ScriptedSensor {
    pub fn steady(temperature: f32, humidity: f32) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new((temperature, humidity))),
            pending: None,
        }
    }

    pub fn push(&self, reading: Result<(f32, f32), SensorError>) {
        self.script.lock().unwrap().push_back(reading);
    }

    pub fn set_fallback(&self, temperature: f32, humidity: f32) {
        *self.fallback.lock().unwrap() = (temperature, humidity);
    }
}

impl ClimateSensorPort for ScriptedSensor {
    fn reset(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn set_measure_config(&mut self, trigger: bool) -> Result<(), SensorError> {
        if trigger {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(r)) => self.pending = Some(r),
                Some(Err(e)) => return Err(e),
                None => self.pending = Some(*self.fallback.lock().unwrap()),
            }
        }
        Ok(())
    }

    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.pending.map(|r| r.0).ok_or(SensorError::I2c)
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        self.pending.map(|r| r.1).ok_or(SensorError::I2c)
    }
}

// ── Motor bridge ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCall {
    Enable(Channel),
    Disable(Channel),
    Forward(Channel),
    Brake(Channel),
    Speed(Channel, u8),
    Line(bool),
}

#[derive(Clone, Default)]
pub struct RecordingMotor {
    pub calls: Arc<Mutex<Vec<MotorCall>>>,
    pub fail_forward: Arc<Mutex<bool>>,
}

#[allow(dead_code)]
impl RecordingMotor {
    pub fn calls(&self) -> Vec<MotorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Last commanded level of the shared enable line.
    pub fn line(&self) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                MotorCall::Line(on) => Some(*on),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Whether `ch` was last driven forward (vs. braked/disabled).
    pub fn driving(&self, ch: Channel) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                MotorCall::Forward(c) if *c == ch => Some(true),
                MotorCall::Brake(c) | MotorCall::Disable(c) if *c == ch => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl MotorPort for RecordingMotor {
    fn enable(&mut self, ch: Channel) -> Result<(), HwError> {
        self.calls.lock().unwrap().push(MotorCall::Enable(ch));
        Ok(())
    }

    fn disable(&mut self, ch: Channel) -> Result<(), HwError> {
        self.calls.lock().unwrap().push(MotorCall::Disable(ch));
        Ok(())
    }

    fn forward(&mut self, ch: Channel) -> Result<(), HwError> {
        if *self.fail_forward.lock().unwrap() {
            return Err(HwError::PwmWriteFailed);
        }
        self.calls.lock().unwrap().push(MotorCall::Forward(ch));
        Ok(())
    }

    fn brake(&mut self, ch: Channel) -> Result<(), HwError> {
        self.calls.lock().unwrap().push(MotorCall::Brake(ch));
        Ok(())
    }

    fn set_speed(&mut self, ch: Channel, duty: u8) -> Result<(), HwError> {
        self.calls.lock().unwrap().push(MotorCall::Speed(ch, duty));
        Ok(())
    }

    fn set_enable_line(&mut self, on: bool) -> Result<(), HwError> {
        self.calls.lock().unwrap().push(MotorCall::Line(on));
        Ok(())
    }
}

// ── Off-timers ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Armed {
    pub duration_ms: u32,
    pub generation: u32,
}

/// Records arm/cancel; tests deliver expiries by hand.
#[derive(Clone, Default)]
pub struct ManualTimers {
    pub armed: Arc<Mutex<[Option<Armed>; 2]>>,
    pub fail_arm: Arc<Mutex<bool>>,
}

#[allow(dead_code)]
impl ManualTimers {
    pub fn armed(&self, ch: Channel) -> Option<Armed> {
        self.armed.lock().unwrap()[ch.index()]
    }
}

impl OffTimerPort for ManualTimers {
    fn arm(&mut self, ch: Channel, duration_ms: u32, generation: u32) -> Result<(), TimingError> {
        if *self.fail_arm.lock().unwrap() {
            return Err(TimingError::Timeout);
        }
        self.armed.lock().unwrap()[ch.index()] = Some(Armed {
            duration_ms,
            generation,
        });
        Ok(())
    }

    fn cancel(&mut self, ch: Channel) {
        self.armed.lock().unwrap()[ch.index()] = None;
    }
}

// ── Storage ───────────────────────────────────────────────────

/// Insertion-ordered in-memory store, shared between the service and the
/// test so raw blobs can be planted behind the store's back.
#[derive(Clone, Default)]
pub struct MemStorage {
    pub entries: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
    pub unavailable: bool,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn plant(&self, ns: &str, key: &str, data: &[u8]) {
        let mut s = self.clone();
        s.write(ns, key, data).unwrap();
    }
}

impl StoragePort for MemStorage {
    fn open(&mut self, _ns: &str) -> Result<(), StorageError> {
        if self.unavailable {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let entries = self.entries.lock().unwrap();
        let (_, _, v) = entries
            .iter()
            .find(|(n, k, _)| n == ns && k == key)
            .ok_or(StorageError::NotFound)?;
        let len = v.len().min(buf.len());
        buf[..len].copy_from_slice(&v[..len]);
        Ok(len)
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|(n, k, _)| n == ns && k == key) {
            Some(e) => e.2 = data.to_vec(),
            None => entries.push((ns.into(), key.into(), data.to_vec())),
        }
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap()
            .retain(|(n, k, _)| !(n == ns && k == key));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(n, k, _)| n == ns && k == key)
    }

    fn find_entries(&self, ns: &str) -> Result<Vec<EntryInfo>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, _)| n == ns)
            .filter_map(|(_, k, _)| {
                let mut key = heapless::String::new();
                key.push_str(k).ok()?;
                Some(EntryInfo { key })
            })
            .collect())
    }
}

// ── Clock ─────────────────────────────────────────────────────

pub struct FixedClock(pub Mutex<Option<LocalTime>>);

#[allow(dead_code)]
impl FixedClock {
    pub fn at(weekday: u8, hour: u8, minute: u8) -> Self {
        Self(Mutex::new(Some(LocalTime {
            weekday,
            hour,
            minute,
        })))
    }

    pub fn unset() -> Self {
        Self(Mutex::new(None))
    }

    pub fn set(&self, weekday: u8, hour: u8, minute: u8) {
        *self.0.lock().unwrap() = Some(LocalTime {
            weekday,
            hour,
            minute,
        });
    }
}

impl ClockPort for FixedClock {
    fn now(&self) -> Option<LocalTime> {
        *self.0.lock().unwrap()
    }
}

// ── Event sink ────────────────────────────────────────────────

/// Collects events; cloneable so a copy can go to the dispatch thread.
#[derive(Clone, Default)]
pub struct RecordingSink(pub Arc<Mutex<Vec<AppEvent>>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn events(&self) -> Vec<AppEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}
