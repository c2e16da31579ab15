//! Rolling humidity/temperature window.
//!
//! Pure arithmetic, no I/O: raw samples accumulate into an interval
//! average; every `accum_count` samples the interval average is written
//! into the circular slot array.  The rolling average is the mean of all
//! valid slots plus the in-progress partial interval (counted as one more
//! slot).  Slots that were never written hold sentinel values and are
//! excluded.

use heapless::Vec;

use crate::config::MAX_WINDOW_SLOTS;

/// Marks a temperature slot that was never written (below absolute zero).
pub const TEMP_SENTINEL: f32 = -274.0;
/// Marks a humidity slot that was never written.
pub const HUMID_SENTINEL: f32 = -1.0;

/// A temperature (°C) / relative humidity (%RH) pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AverageReading {
    pub temperature: f32,
    pub humidity: f32,
}

impl AverageReading {
    const SENTINEL: Self = Self {
        temperature: TEMP_SENTINEL,
        humidity: HUMID_SENTINEL,
    };

    /// Both fields within physical range.
    pub fn is_physical(&self) -> bool {
        self.temperature.is_finite()
            && self.temperature > -273.0
            && self.humidity.is_finite()
            && (0.0..=100.0).contains(&self.humidity)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    temp_sum: f32,
    humid_sum: f32,
    count: u8,
}

impl Accumulator {
    fn mean(&self) -> Option<AverageReading> {
        (self.count > 0).then(|| AverageReading {
            temperature: self.temp_sum / f32::from(self.count),
            humidity: self.humid_sum / f32::from(self.count),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SensorWindow {
    slots: Vec<AverageReading, MAX_WINDOW_SLOTS>,
    accum: Accumulator,
    accum_count: u8,
    write_cursor: usize,
}

impl SensorWindow {
    /// `slots` is clamped to `1..=MAX_WINDOW_SLOTS`, `accum_count` to ≥ 1.
    pub fn new(slots: usize, accum_count: u8) -> Self {
        let n = slots.clamp(1, MAX_WINDOW_SLOTS);
        let mut v = Vec::new();
        for _ in 0..n {
            // Cannot fail: n ≤ capacity.
            let _ = v.push(AverageReading::SENTINEL);
        }
        Self {
            slots: v,
            accum: Accumulator::default(),
            accum_count: accum_count.max(1),
            write_cursor: 0,
        }
    }

    /// Fold one raw sample in.  Returns `true` if it completed an interval
    /// and a slot was written.
    pub fn push_sample(&mut self, sample: AverageReading) -> bool {
        self.accum.temp_sum += sample.temperature;
        self.accum.humid_sum += sample.humidity;
        self.accum.count += 1;

        if self.accum.count < self.accum_count {
            return false;
        }
        if let Some(mean) = self.accum.mean() {
            self.slots[self.write_cursor] = mean;
        }
        self.write_cursor = (self.write_cursor + 1) % self.slots.len();
        self.accum = Accumulator::default();
        true
    }

    /// Mean over valid slots plus the partial interval.  `None` until the
    /// first sample.
    pub fn average(&self) -> Option<AverageReading> {
        let mut n = 0u32;
        let mut t = 0.0f32;
        let mut h = 0.0f32;
        for s in self
            .slots
            .iter()
            .copied()
            .chain(self.accum.mean())
            .filter(AverageReading::is_physical)
        {
            t += s.temperature;
            h += s.humidity;
            n += 1;
        }
        (n > 0).then(|| AverageReading {
            temperature: t / n as f32,
            humidity: h / n as f32,
        })
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn valid_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_physical()).count()
    }

    /// Raw samples in the current, unfinished interval.
    pub fn pending_samples(&self) -> u8 {
        self.accum.count
    }
}
