//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements         | Connects to                  |
//! |-------------|--------------------|------------------------------|
//! | `calendar`  | CalendarPort       | Wall-clock ticks             |
//! | `log_sink`  | EventSink          | Serial log output            |
//! | `nvs`       | ConfigPort         | NVS / in-memory store        |
//! |             | StoragePort        |                              |
//! | `time`      | —                  | `localtime_r` / host clock   |

pub mod calendar;
pub mod log_sink;
pub mod nvs;
pub mod time;
