//! Application core.
//!
//! This module contains the wiring of the Misty irrigation pipeline:
//! sense → decide → actuate. All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
