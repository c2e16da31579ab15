//! Sensor and actuator drivers, hardware initialisation, and timing helpers.

pub mod drv8833;
pub mod hdc2080;
pub mod hw_init;
pub mod hw_timer;
pub mod isr;
pub mod pump;
pub mod task;
