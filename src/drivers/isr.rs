//! GPIO interrupt sources.
//!
//! | Pin          | Edge    | Event                          |
//! |--------------|---------|--------------------------------|
//! | nFAULT       | falling | `PumpFault`                    |
//! | test button  | falling | `PumpTrigButton`               |
//! | config btn   | falling | `ConfigButton`                 |
//! | nCHARGING    | any     | `ChargingChanged(level == 0)`  |
//! | nCHG_DONE    | any     | `ChargeDoneChanged(level == 0)`|
//!
//! Handlers read at most one pin level and post to the [`IoEventQueue`];
//! everything else happens on the event loop.

use crate::events::{IoEvent, IoEventQueue};
use crate::pins;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init::{self, HwInitError};

/// Map an edge on `pin` (with the level read after the edge) to its event.
/// All sources are active low.
pub fn edge_event(pin: i32, level_high: bool) -> Option<IoEvent> {
    match pin {
        pins::PUMP_FAULT_GPIO => Some(IoEvent::PumpFault),
        pins::PUMP_TRIG_BTN_GPIO => Some(IoEvent::PumpTrigButton),
        pins::CONFIG_BTN_GPIO => Some(IoEvent::ConfigButton),
        pins::N_CHARGING_GPIO => Some(IoEvent::ChargingChanged(!level_high)),
        pins::N_CHG_DONE_GPIO => Some(IoEvent::ChargeDoneChanged(!level_high)),
        _ => None,
    }
}

/// Post the event for an edge on `pin`.  ISR-safe.
pub fn on_edge(queue: &IoEventQueue, pin: i32, level_high: bool) {
    if let Some(event) = edge_event(pin, level_high) {
        queue.post(event);
    }
}

#[cfg(target_os = "espidf")]
struct IsrContext {
    queue: &'static IoEventQueue,
    pin: i32,
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is a leaked `IsrContext`, valid for the program's life.
    let ctx = unsafe { &*(arg as *const IsrContext) };
    on_edge(ctx.queue, ctx.pin, hw_init::gpio_read(ctx.pin));
}

/// Install the per-pin GPIO ISR service and register every handler.
/// Call after `hw_init::init_peripherals()` and before the event loop.
#[cfg(target_os = "espidf")]
pub fn install(queue: &'static IoEventQueue) -> Result<(), HwInitError> {
    use esp_idf_svc::sys::*;

    let sources = [
        (pins::PUMP_FAULT_GPIO, gpio_int_type_t_GPIO_INTR_NEGEDGE),
        (pins::PUMP_TRIG_BTN_GPIO, gpio_int_type_t_GPIO_INTR_NEGEDGE),
        (pins::CONFIG_BTN_GPIO, gpio_int_type_t_GPIO_INTR_NEGEDGE),
        (pins::N_CHARGING_GPIO, gpio_int_type_t_GPIO_INTR_ANYEDGE),
        (pins::N_CHG_DONE_GPIO, gpio_int_type_t_GPIO_INTR_ANYEDGE),
    ];

    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed. Handlers only post to the queue.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        for (pin, intr) in sources {
            let ctx: &'static IsrContext = Box::leak(Box::new(IsrContext { queue, pin }));
            gpio_set_intr_type(pin, intr);
            let ret = gpio_isr_handler_add(pin, Some(gpio_isr), ctx as *const _ as *mut _);
            if ret != ESP_OK {
                return Err(HwInitError::IsrInstallFailed(ret));
            }
            gpio_intr_enable(pin);
        }
    }

    // Seed charger state: no edge has fired yet.
    for pin in [pins::N_CHARGING_GPIO, pins::N_CHG_DONE_GPIO] {
        on_edge(queue, pin, hw_init::gpio_read(pin));
    }

    log::info!("isr: handlers installed (fault, buttons x2, charger x2)");
    Ok(())
}
