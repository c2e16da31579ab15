//! Integration tests for schedule persistence and table reloads against a
//! shared in-memory store, including blobs planted behind the store's back.

use std::sync::{Arc, Mutex};

use misty::adapters::calendar::TickCalendar;
use misty::app::ports::{
    CalendarError, CalendarHandle, CalendarPort, ScheduleLookup, StorageError, TriggerCallback,
};
use misty::error::{CapacityError, Error};
use misty::schedule::record::{DayMask, PumpMask, ScheduleEntry, SolarEvent, Trigger};
use misty::schedule::store::{
    ReloadReport, SCHEDULE_NAMESPACE, ScheduleStore, ScheduleToken, TABLE_CAPACITY,
};

use crate::mock_hw::MemStorage;

fn noop() -> TriggerCallback {
    Arc::new(|_| {})
}

fn entry(hour: u8) -> ScheduleEntry {
    ScheduleEntry {
        pumps: PumpMask::BOTH,
        trigger: Trigger::DayOfWeek {
            days: DayMask::EVERY_DAY,
            hour,
            minute: 0,
        },
        durations_ms: [1_000, 2_000, 3_000],
    }
}

fn open(storage: &MemStorage) -> ScheduleStore<MemStorage, TickCalendar> {
    ScheduleStore::open(storage.clone(), TickCalendar::new(32), noop()).unwrap()
}

#[test]
fn corrupt_blobs_are_skipped_on_reload() {
    let storage = MemStorage::default();
    let good = entry(6).encode();
    storage.plant(SCHEDULE_NAMESPACE, "good", &good);
    storage.plant(SCHEDULE_NAMESPACE, "short", &good[..16]);
    let mut long = good.to_vec();
    long.push(0);
    storage.plant(SCHEDULE_NAMESPACE, "long", &long);
    let mut bad_type = good;
    bad_type[16] = 2;
    storage.plant(SCHEDULE_NAMESPACE, "badtype", &bad_type);
    let mut no_pumps = good;
    no_pumps[0] = 0;
    storage.plant(SCHEDULE_NAMESPACE, "nopumps", &no_pumps);

    let store = open(&storage);
    let report = store.reload().unwrap();
    assert_eq!(
        report,
        ReloadReport {
            loaded: 1,
            skipped_corrupt: 4,
            truncated: 0
        }
    );
    let loaded = store.loaded_names();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].as_str(), "good");
    assert_eq!(
        store.get_schedule("short"),
        Err(Error::Storage(StorageError::Corrupted))
    );
}

#[test]
fn entries_beyond_capacity_are_reported_as_truncated() {
    let storage = MemStorage::default();
    for i in 0..TABLE_CAPACITY + 2 {
        storage.plant(SCHEDULE_NAMESPACE, &format!("s{:02}", i), &entry(i as u8).encode());
    }
    let store = open(&storage);
    let report = store.reload().unwrap();
    assert_eq!(report.loaded, TABLE_CAPACITY);
    assert_eq!(report.truncated, 2);
    // Storage order decides who gets in.
    assert_eq!(store.loaded_names().last().unwrap().as_str(), "s09");
    assert_eq!(
        store.set_schedule("extra", &entry(1)),
        Err(Error::Capacity(CapacityError::TableFull))
    );
}

#[test]
fn corrupt_blobs_past_capacity_count_as_corrupt() {
    let storage = MemStorage::default();
    for i in 0..TABLE_CAPACITY {
        storage.plant(SCHEDULE_NAMESPACE, &format!("s{:02}", i), &entry(i as u8).encode());
    }
    storage.plant(SCHEDULE_NAMESPACE, "t_bad", &entry(1).encode()[..8]);
    storage.plant(SCHEDULE_NAMESPACE, "t_good", &entry(2).encode());

    let store = open(&storage);
    assert_eq!(
        store.reload().unwrap(),
        ReloadReport {
            loaded: TABLE_CAPACITY,
            skipped_corrupt: 1,
            truncated: 1
        }
    );
}

#[test]
fn loaded_slots_follow_storage_order() {
    let storage = MemStorage::default();
    let store = open(&storage);
    store.set_schedule("zeta", &entry(1)).unwrap();
    store.set_schedule("alpha", &entry(2)).unwrap();
    let generation = store.generation();

    let r0 = store.resolve(ScheduleToken { slot: 0, generation }).unwrap();
    let r1 = store.resolve(ScheduleToken { slot: 1, generation }).unwrap();
    assert_eq!(r0.name.as_str(), "zeta");
    assert_eq!(r1.entry, entry(2));
    assert!(store.resolve(ScheduleToken { slot: 2, generation }).is_none());
}

#[test]
fn solar_entries_round_trip_through_storage() {
    let storage = MemStorage::default();
    let store = open(&storage);
    let sunset = ScheduleEntry {
        pumps: PumpMask::B,
        trigger: Trigger::Solar {
            days: DayMask(0b110_0000),
            event: SolarEvent::Sunset,
            offset_minutes: -45,
        },
        durations_ms: [10_000, 5_000, 0],
    };
    store.set_schedule("dusk", &sunset).unwrap();
    assert_eq!(store.get_schedule("dusk").unwrap(), sunset);
    assert_eq!(store.loaded_count(), 1);
}

#[test]
fn out_of_range_time_is_rejected_before_write() {
    let storage = MemStorage::default();
    let store = open(&storage);
    let bad = ScheduleEntry {
        trigger: Trigger::DayOfWeek {
            days: DayMask::EVERY_DAY,
            hour: 24,
            minute: 0,
        },
        ..entry(0)
    };
    assert!(matches!(
        store.set_schedule("bad", &bad),
        Err(Error::InvalidArgument(_))
    ));
    assert!(storage.entries.lock().unwrap().is_empty());
}

#[test]
fn unavailable_storage_fails_open() {
    let storage = MemStorage {
        unavailable: true,
        ..Default::default()
    };
    let result = ScheduleStore::open(storage, TickCalendar::new(4), noop());
    assert!(matches!(
        result,
        Err(Error::Storage(StorageError::Unavailable))
    ));
}

// ── Calendar exhaustion ───────────────────────────────────────

/// Accepts `limit` live registrations, then refuses.
struct TightCalendar {
    limit: usize,
    live: Arc<Mutex<Vec<u32>>>,
    next: u32,
}

impl CalendarPort for TightCalendar {
    fn create(
        &mut self,
        _name: &str,
        _trigger: &Trigger,
        _callback: TriggerCallback,
        _token: ScheduleToken,
    ) -> Result<CalendarHandle, CalendarError> {
        let mut live = self.live.lock().unwrap();
        if live.len() >= self.limit {
            return Err(CalendarError::Exhausted);
        }
        self.next += 1;
        live.push(self.next);
        Ok(CalendarHandle(self.next))
    }

    fn enable(&mut self, _handle: CalendarHandle) {}

    fn delete(&mut self, handle: CalendarHandle) {
        self.live.lock().unwrap().retain(|h| *h != handle.0);
    }
}

#[test]
fn calendar_exhaustion_is_out_of_resources() {
    let storage = MemStorage::default();
    for name in ["a", "b", "c"] {
        storage.plant(SCHEDULE_NAMESPACE, name, &entry(1).encode());
    }
    let live = Arc::new(Mutex::new(Vec::new()));
    let calendar = TightCalendar {
        limit: 2,
        live: live.clone(),
        next: 0,
    };
    let store = ScheduleStore::open(storage, calendar, noop()).unwrap();
    assert_eq!(
        store.reload(),
        Err(Error::Capacity(CapacityError::OutOfResources))
    );

    // A later reload releases the earlier registrations first.
    assert_eq!(store.loaded_count(), 2);
    let _ = store.reload();
    assert_eq!(live.lock().unwrap().len(), 2);
}

#[test]
fn json_listing_of_stored_names() {
    let storage = MemStorage::default();
    let store = open(&storage);
    let mut buf = [0u8; 2];
    assert_eq!(store.render_names_json(&mut buf), Ok(2));
    assert_eq!(&buf, b"[]");

    store.set_schedule("lawn", &entry(5)).unwrap();
    store.set_schedule("herbs", &entry(6)).unwrap();
    let needed = ScheduleStore::<MemStorage, TickCalendar>::json_capacity_for(2);
    let mut buf = vec![0u8; needed];
    let n = store.render_names_json(&mut buf).unwrap();
    assert_eq!(&buf[..n], br#"["lawn","herbs"]"#);
    let names: Vec<String> = store.list_names().unwrap().map(|n| n.to_string()).collect();
    assert_eq!(names, ["lawn", "herbs"]);
}
