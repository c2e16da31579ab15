//! DRV8833 dual H-bridge motor driver.
//!
//! Each channel has two inputs (IN1/IN2), both on LEDC so either can be
//! held fully high.  The shared nSLEEP pin is the controller's "enable
//! line": both outputs are high-Z while it is low.
//!
//! | Mode    | IN1      | IN2  |
//! |---------|----------|------|
//! | coast   | 0        | 0    |
//! | forward | PWM duty | 0    |
//! | brake   | 1        | 1    |
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives real PWM and GPIO via hw_init helpers.
//! On host/test: the same calls are no-ops; state is tracked in-memory.

use log::debug;

use crate::app::ports::MotorPort;
use crate::drivers::hw_init;
use crate::drivers::pump::Channel;
use crate::error::HwError;
use crate::pins;

const FULL_ON: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Coast,
    Forward { duty: u8 },
    Brake,
}

pub struct Drv8833 {
    bridges: [BridgeState; 2],
    /// Percent, per channel.
    duty: [u8; 2],
    enabled: [bool; 2],
    awake: bool,
}

impl Default for Drv8833 {
    fn default() -> Self {
        Self::new()
    }
}

impl Drv8833 {
    /// Expects [`hw_init::init_peripherals`] to have configured LEDC/GPIO.
    pub fn new() -> Self {
        Self {
            bridges: [BridgeState::Coast; 2],
            duty: [0; 2],
            enabled: [false; 2],
            awake: false,
        }
    }

    fn ledc_channels(channel: Channel) -> (u32, u32) {
        match channel {
            Channel::A => (hw_init::LEDC_CH_AIN1, hw_init::LEDC_CH_AIN2),
            Channel::B => (hw_init::LEDC_CH_BIN1, hw_init::LEDC_CH_BIN2),
        }
    }

    fn apply(&mut self, channel: Channel, state: BridgeState) -> Result<(), HwError> {
        let (in1, in2) = Self::ledc_channels(channel);
        let (d1, d2) = match state {
            BridgeState::Coast => (0, 0),
            BridgeState::Forward { duty } => (percent_to_8bit(duty), 0),
            BridgeState::Brake => (FULL_ON, FULL_ON),
        };
        hw_init::ledc_set(in2, d2)?;
        hw_init::ledc_set(in1, d1)?;
        self.bridges[channel.index()] = state;
        Ok(())
    }

    pub fn bridge(&self, channel: Channel) -> BridgeState {
        self.bridges[channel.index()]
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.enabled[channel.index()]
    }
}

fn percent_to_8bit(duty: u8) -> u8 {
    ((u16::from(duty.min(100)) * 255) / 100) as u8
}

impl MotorPort for Drv8833 {
    fn enable(&mut self, channel: Channel) -> Result<(), HwError> {
        // No per-channel enable pin: the bridge follows its inputs.
        self.enabled[channel.index()] = true;
        Ok(())
    }

    fn disable(&mut self, channel: Channel) -> Result<(), HwError> {
        self.apply(channel, BridgeState::Coast)?;
        self.enabled[channel.index()] = false;
        Ok(())
    }

    fn forward(&mut self, channel: Channel) -> Result<(), HwError> {
        let duty = self.duty[channel.index()];
        self.apply(channel, BridgeState::Forward { duty })
    }

    fn brake(&mut self, channel: Channel) -> Result<(), HwError> {
        self.apply(channel, BridgeState::Brake)
    }

    fn set_speed(&mut self, channel: Channel, duty: u8) -> Result<(), HwError> {
        let duty = duty.min(100);
        self.duty[channel.index()] = duty;
        if let BridgeState::Forward { .. } = self.bridges[channel.index()] {
            self.apply(channel, BridgeState::Forward { duty })?;
        }
        Ok(())
    }

    fn set_enable_line(&mut self, asserted: bool) -> Result<(), HwError> {
        hw_init::gpio_write(pins::PUMP_SLEEP_GPIO, asserted)?;
        self.awake = asserted;
        debug!("pump: bridge {}", if asserted { "awake" } else { "asleep" });
        Ok(())
    }
}
