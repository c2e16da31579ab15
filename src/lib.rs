//! Misty irrigation firmware library.
//!
//! Exposes the domain logic (sensing, schedules, dispatch, pump control)
//! for integration testing and fuzzing. All ESP-IDF-specific code is
//! guarded by `#[cfg(target_os = "espidf")]` within each module, with an
//! in-memory simulation path for host builds.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pins;
pub mod power;
pub mod schedule;
pub mod sensors;

pub mod adapters;
pub mod drivers;
