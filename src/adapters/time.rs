//! Wall-clock adapter.
//!
//! Supplies the [`LocalTime`] the calendar engine matches triggers against.
//!
//! - **`target_os = "espidf"`** — `gettimeofday()` + `localtime_r()`, so the
//!   configured `TZ` applies.  Times before 2020 are treated as "clock not
//!   yet set" and yield `None`.
//! - **`not(target_os = "espidf")`** — `SystemTime` interpreted as UTC.

use crate::app::ports::{ClockPort, LocalTime};

/// 2020-01-01T00:00:00Z.  Anything earlier means SNTP has not synced.
const EPOCH_2020: i64 = 1_577_836_800;

#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl WallClock {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "espidf")]
    pub fn now(&self) -> Option<LocalTime> {
        use esp_idf_svc::sys;

        let mut tv = sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        if (tv.tv_sec as i64) < EPOCH_2020 {
            return None;
        }
        let secs = tv.tv_sec as sys::time_t;
        let mut tm: sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        if !(0..7).contains(&tm.tm_wday) || !(0..24).contains(&tm.tm_hour) || !(0..60).contains(&tm.tm_min)
        {
            return None;
        }
        Some(LocalTime {
            // tm_wday counts from Sunday
            weekday: ((tm.tm_wday + 6) % 7) as u8,
            hour: tm.tm_hour as u8,
            minute: tm.tm_min as u8,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn now(&self) -> Option<LocalTime> {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        local_time_from_unix(i64::try_from(secs).ok()?)
    }
}

impl ClockPort for WallClock {
    fn now(&self) -> Option<LocalTime> {
        WallClock::now(self)
    }
}

/// Break a Unix timestamp into UTC weekday/hour/minute.
pub fn local_time_from_unix(secs: i64) -> Option<LocalTime> {
    if secs < EPOCH_2020 {
        return None;
    }
    let days = secs.div_euclid(86_400);
    let of_day = secs.rem_euclid(86_400);
    Some(LocalTime {
        // 1970-01-01 was a Thursday (weekday 3)
        weekday: ((days + 3) % 7) as u8,
        hour: (of_day / 3600) as u8,
        minute: ((of_day % 3600) / 60) as u8,
    })
}
