//! Environmental sensing — the rolling window and the engine that feeds it.
//!
//! [`SensorWindow`] is pure math; [`SensorEngine`] owns the sensor port,
//! the window and the published average read by the dispatch worker.

pub mod engine;
pub mod window;

pub use engine::SensorEngine;
pub use window::{AverageReading, SensorWindow};
