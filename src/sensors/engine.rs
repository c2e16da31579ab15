//! Sensor averaging engine.
//!
//! Drives one [`ClimateSensorPort`] from the sensing tick and publishes the
//! rolling average.  The published value is replaced as a whole under a
//! critical section, so the dispatch worker never observes a half-written
//! pair.  `AtomicU64` is not available on the 32-bit target, hence the
//! `blocking_mutex` instead of bit-packing.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, warn};

use super::window::{AverageReading, SensorWindow};
use crate::app::ports::{ClimateSensorPort, HumiditySource};
use crate::config::SystemConfig;
use crate::error::SensorError;

pub struct SensorEngine<S: ClimateSensorPort> {
    sensor: Mutex<S>,
    window: Mutex<SensorWindow>,
    latest: BlockingMutex<CriticalSectionRawMutex, Cell<AverageReading>>,
    has_valid: AtomicBool,
}

impl<S: ClimateSensorPort> SensorEngine<S> {
    pub fn new(sensor: S, config: &SystemConfig) -> Self {
        Self {
            sensor: Mutex::new(sensor),
            window: Mutex::new(SensorWindow::new(config.window_slots(), config.accum_count)),
            latest: BlockingMutex::new(Cell::new(AverageReading::default())),
            has_valid: AtomicBool::new(false),
        }
    }

    /// Soft-reset the sensor.  Called once at startup.
    pub fn init(&self) -> Result<(), SensorError> {
        let mut sensor = self.sensor.lock().unwrap_or_else(PoisonError::into_inner);
        sensor.reset().inspect_err(|e| warn!("sensor: reset failed: {}", e))
    }

    /// Take one reading and fold it into the window.
    ///
    /// Failures are non-fatal: the reading is discarded, the accumulator and
    /// the published average are left untouched.
    pub fn sense(&self) -> Result<(), SensorError> {
        let sample = self
            .read_once()
            .inspect_err(|e| warn!("sensor: reading discarded: {}", e))?;

        let avg = {
            let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            if window.push_sample(sample) {
                debug!("sensor: slot written, cursor={}", window.write_cursor());
            }
            window.average()
        };

        if let Some(avg) = avg {
            self.latest.lock(|cell| cell.set(avg));
            self.has_valid.store(true, Ordering::Release);
            debug!(
                "sensor: T={:.1}\u{00b0}C RH={:.1}% avg T={:.1}\u{00b0}C RH={:.1}%",
                sample.temperature, sample.humidity, avg.temperature, avg.humidity
            );
        }
        Ok(())
    }

    fn read_once(&self) -> Result<AverageReading, SensorError> {
        let mut sensor = self.sensor.lock().unwrap_or_else(PoisonError::into_inner);
        sensor.set_measure_config(true)?;
        let reading = AverageReading {
            temperature: sensor.read_temperature()?,
            humidity: sensor.read_humidity()?,
        };
        if !reading.is_physical() {
            return Err(SensorError::OutOfRange);
        }
        Ok(reading)
    }

    /// Last published average (zero before the first reading).
    pub fn latest(&self) -> AverageReading {
        self.latest.lock(Cell::get)
    }

    pub fn average_temperature(&self) -> f32 {
        self.latest().temperature
    }

    pub fn average_humidity(&self) -> f32 {
        self.latest().humidity
    }

    /// Sticky: once true, never false again.
    pub fn has_valid_reading(&self) -> bool {
        self.has_valid.load(Ordering::Acquire)
    }

    /// Copy of the window, for diagnostics and tests.
    pub fn window(&self) -> SensorWindow {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S: ClimateSensorPort> HumiditySource for SensorEngine<S> {
    fn has_valid_reading(&self) -> bool {
        SensorEngine::has_valid_reading(self)
    }

    fn average_humidity(&self) -> f32 {
        SensorEngine::average_humidity(self)
    }
}
