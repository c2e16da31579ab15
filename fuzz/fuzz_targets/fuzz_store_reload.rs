//! Fuzz target: `ScheduleStore::reload` over arbitrary stored blobs
//!
//! The input is split into length-prefixed chunks, each planted under its
//! own key in the simulated NVS namespace.  Reload must never panic, must
//! account for every key exactly once and must never exceed table capacity.
//!
//! cargo fuzz run fuzz_store_reload

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use misty::adapters::calendar::TickCalendar;
use misty::adapters::nvs::NvsAdapter;
use misty::app::ports::StoragePort;
use misty::schedule::store::{SCHEDULE_NAMESPACE, ScheduleStore, TABLE_CAPACITY};

fuzz_target!(|data: &[u8]| {
    let Ok(mut nvs) = NvsAdapter::new() else {
        return;
    };
    if nvs.open(SCHEDULE_NAMESPACE).is_err() {
        return;
    }

    let mut keys = 0usize;
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len % 24).min(tail.len());
        let (blob, tail) = tail.split_at(len);
        if nvs
            .write(SCHEDULE_NAMESPACE, &format!("k{}", keys), blob)
            .is_ok()
        {
            keys += 1;
        }
        rest = tail;
    }

    let Ok(store) = ScheduleStore::open(nvs, TickCalendar::new(TABLE_CAPACITY), Arc::new(|_| {}))
    else {
        return;
    };
    let report = store.reload().expect("calendar sized to table capacity");
    assert!(report.loaded <= TABLE_CAPACITY);
    assert_eq!(report.loaded + report.skipped_corrupt + report.truncated, keys);
    assert_eq!(store.loaded_count(), report.loaded);
});
