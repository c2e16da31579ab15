//! Misty Firmware — Main Entry Point
//!
//! Hexagonal architecture with an interrupt/timer-driven event loop and a
//! dedicated dispatch worker.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Hdc2080 (I2C)   Drv8833 + OffTimers   NvsAdapter   WallClock  │
//! │  TickCalendar    LogEventSink                                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │ AppService: SensorEngine · ScheduleStore · PumpControl │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  ISRs + esp_timer ──▶ IoEventQueue ──▶ event loop (this task)  │
//! │  calendar ──▶ DispatchQueue ──▶ dispatch worker (own task)     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use esp_idf_hal::delay::Delay;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::FromValueType;
use log::{info, warn};

use misty::adapters::calendar::TickCalendar;
use misty::adapters::log_sink::LogEventSink;
use misty::adapters::nvs::NvsAdapter;
use misty::adapters::time::WallClock;
use misty::app::ports::ConfigPort;
use misty::app::service::AppService;
use misty::config::SystemConfig;
use misty::drivers::drv8833::Drv8833;
use misty::drivers::hdc2080::Hdc2080;
use misty::drivers::hw_timer::{self, OffTimers};
use misty::drivers::{hw_init, isr};
use misty::events::IoEventQueue;
use misty::schedule::store::TABLE_CAPACITY;

/// ISR/timer → event loop hand-off.  Static so callbacks can reach it.
static IO_EVENTS: IoEventQueue = IoEventQueue::new();

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Misty v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Peripherals ────────────────────────────────────────
    hw_init::init_peripherals().context("peripheral init")?;
    let peripherals = Peripherals::take().context("peripherals already taken")?;

    // ── 3. Storage + config ───────────────────────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 4. Adapters ───────────────────────────────────────────
    // pins::I2C_SDA_GPIO / pins::I2C_SCL_GPIO
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio4,
        peripherals.pins.gpio5,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )?;
    let sensor = Hdc2080::new(i2c, Delay::new_default());
    let timers = OffTimers::new(&IO_EVENTS).map_err(|e| anyhow::anyhow!("off-timers: {}", e))?;
    // Headroom over the table so a reload never races a stale registration.
    let calendar = TickCalendar::new(TABLE_CAPACITY * 2);

    // ── 5. Application core ───────────────────────────────────
    let app = AppService::new(config.clone(), sensor, nvs, calendar, Drv8833::new(), timers)
        .context("schedule store")?;
    let mut log_sink = LogEventSink::new();
    app.start(&mut log_sink).context("schedule load")?;
    let _dispatch = app.spawn_dispatcher(LogEventSink::new())?;

    // ── 6. Event sources ──────────────────────────────────────
    let _ticks = hw_timer::start_tick_timers(
        &IO_EVENTS,
        config.sense_interval_ms(),
        u32::from(config.calendar_tick_secs) * 1000,
    )
    .map_err(|e| anyhow::anyhow!("tick timers: {}", e))?;
    isr::install(&IO_EVENTS).context("GPIO ISRs")?;

    // Take a first reading now rather than one interval from now.
    IO_EVENTS.post(misty::events::IoEvent::SenseTick);

    // ── 7. Event loop ─────────────────────────────────────────
    let clock = WallClock::new();
    let mut reported_drops = 0;
    info!("Entering event loop");
    loop {
        let event = IO_EVENTS.next_blocking();
        app.handle_io_event(event, &clock, &mut log_sink);

        let dropped = IO_EVENTS.dropped();
        if dropped != reported_drops {
            warn!("event queue overflowed, {} event(s) lost since boot", dropped);
            reported_drops = dropped;
        }
    }
}
