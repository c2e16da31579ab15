//! TI HDC2080 humidity/temperature sensor over I2C.
//!
//! Generic over the `embedded-hal` 1.0 blocking [`I2c`] and [`DelayNs`]
//! traits, so the same driver runs on `esp-idf-hal`'s `I2cDriver` and on a
//! host-side fake bus in tests.
//!
//! One-shot mode: [`set_measure_config(true)`] triggers a conversion, the
//! driver waits out the conversion time, then the result registers are read
//! low byte first.
//!
//! [`set_measure_config(true)`]: ClimateSensorPort::set_measure_config

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};
use log::error;

use crate::app::ports::ClimateSensorPort;
use crate::error::SensorError;

/// 7-bit address with ADDR tied low.
pub const DEFAULT_ADDR: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    TemperatureLow = 0x00,
    TemperatureHigh = 0x01,
    HumidityLow = 0x02,
    HumidityHigh = 0x03,
    ResetDrdyConf = 0x0E,
    MeasureConfig = 0x0F,
    DeviceIdLow = 0xFE,
    DeviceIdHigh = 0xFF,
}

const SOFT_RESET: u8 = 0x80;
const MEAS_TRIG: u8 = 0x01;
const RESET_SETTLE_MS: u32 = 50;
/// 14-bit temperature + 14-bit humidity conversion, with margin.
const CONVERSION_MS: u32 = 2;

/// Temperature offset for a 3.3 V supply (datasheet supply-dependent term).
const TEMP_OFFSET_C: f32 = 40.5 + 0.08 * (3.3 - 1.8);

pub fn temperature_from_raw(raw: u16) -> f32 {
    f32::from(raw) * 165.0 / 65536.0 - TEMP_OFFSET_C
}

pub fn humidity_from_raw(raw: u16) -> f32 {
    f32::from(raw) * 100.0 / 65536.0
}

pub struct Hdc2080<I, D> {
    i2c: I,
    delay: D,
    addr: u8,
}

impl<I: I2c, D: DelayNs> Hdc2080<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDR)
    }

    pub fn with_address(i2c: I, delay: D, addr: u8) -> Self {
        Self { i2c, delay, addr }
    }

    fn write_reg(&mut self, reg: Reg, value: u8) -> Result<(), SensorError> {
        self.i2c.write(self.addr, &[reg as u8, value]).map_err(|e| {
            error!("hdc2080: write {:?} failed: {:?}", reg, e.kind());
            SensorError::I2c
        })
    }

    fn read_reg(&mut self, reg: Reg) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.addr, &[reg as u8], &mut buf)
            .map_err(|e| {
                error!("hdc2080: read {:?} failed: {:?}", reg, e.kind());
                SensorError::I2c
            })?;
        Ok(buf[0])
    }

    fn read_u16(&mut self, low: Reg, high: Reg) -> Result<u16, SensorError> {
        let lo = self.read_reg(low)?;
        let hi = self.read_reg(high)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub fn device_id(&mut self) -> Result<u16, SensorError> {
        self.read_u16(Reg::DeviceIdLow, Reg::DeviceIdHigh)
    }

    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

impl<I, D> ClimateSensorPort for Hdc2080<I, D>
where
    I: I2c + Send,
    D: DelayNs + Send,
{
    fn reset(&mut self) -> Result<(), SensorError> {
        let ret = self.write_reg(Reg::ResetDrdyConf, SOFT_RESET);
        self.delay.delay_ms(RESET_SETTLE_MS);
        ret
    }

    fn set_measure_config(&mut self, trigger: bool) -> Result<(), SensorError> {
        // 14-bit resolution for both channels, temperature + humidity.
        let val = if trigger { MEAS_TRIG } else { 0 };
        self.write_reg(Reg::MeasureConfig, val)?;
        if trigger {
            self.delay.delay_ms(CONVERSION_MS);
        }
        Ok(())
    }

    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_u16(Reg::TemperatureLow, Reg::TemperatureHigh)?;
        Ok(temperature_from_raw(raw))
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_u16(Reg::HumidityLow, Reg::HumidityHigh)?;
        Ok(humidity_from_raw(raw))
    }
}
