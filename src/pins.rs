//! GPIO / peripheral pin assignments for the Misty main board (ESP32-C6).
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// HDC2080 humidity/temperature sensor (I2C0)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 4;
pub const I2C_SCL_GPIO: i32 = 5;
/// Data-ready output of the HDC2080 (unused while polling).
pub const SENSOR_DRDY_GPIO: i32 = 6;

// ---------------------------------------------------------------------------
// Pump motor driver (DRV8833 dual H-bridge)
// ---------------------------------------------------------------------------

/// nSLEEP — the shared enable line for both channels (HIGH = awake).
pub const PUMP_SLEEP_GPIO: i32 = 18;
/// nFAULT — open-drain, pulled low on over-current / over-temperature.
pub const PUMP_FAULT_GPIO: i32 = 19;
pub const PUMP_AIN1_GPIO: i32 = 20;
pub const PUMP_AIN2_GPIO: i32 = 21;
pub const PUMP_BIN1_GPIO: i32 = 22;
pub const PUMP_BIN2_GPIO: i32 = 23;

// ---------------------------------------------------------------------------
// User inputs and charger status (active low)
// ---------------------------------------------------------------------------

pub const PUMP_TRIG_BTN_GPIO: i32 = 9;
pub const CONFIG_BTN_GPIO: i32 = 8;
pub const N_CHARGING_GPIO: i32 = 2;
pub const N_CHG_DONE_GPIO: i32 = 3;

/// DRV8833 input PWM frequency (above audible range).
pub const PUMP_PWM_FREQ_HZ: u32 = 20_000;
