//! Persistent schedule store and calendar registration table.
//!
//! Schedules live in the storage port under [`SCHEDULE_NAMESPACE`], one
//! 17-byte blob per name.  The in-memory [`ScheduleTable`] mirrors what is
//! registered with the calendar engine and is rebuilt wholesale on every
//! reload; it is never edited in place.
//!
//! ## Tokens
//!
//! A calendar registration carries a [`ScheduleToken`] `{slot, generation}`.
//! Each reload bumps the table generation, so a token issued before a
//! reload resolves to `None` instead of whatever now occupies its slot.
//!
//! ## Locking
//!
//! `backend` (storage + calendar) serialises every write path and reload.
//! `table` is held only briefly: for the swap during reload and for
//! [`resolve`](ScheduleLookup::resolve) from the dispatch worker.  Order is
//! always backend → table.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{error, info, warn};

use super::record::{
    MAX_NAME_LEN, RECORD_LEN, ScheduleEntry, ScheduleName, validate_name,
};
use crate::app::ports::{
    CalendarHandle, CalendarPort, LocalTime, ScheduleLookup, StorageError, StoragePort,
    TriggerCallback,
};
use crate::error::{CapacityError, Error, Result};

pub const SCHEDULE_NAMESPACE: &str = "schedules";

/// Maximum number of live schedules.
pub const TABLE_CAPACITY: usize = 10;

/// Stable reference to a loaded schedule, handed to the calendar engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleToken {
    pub slot: u8,
    pub generation: u32,
}

/// A token resolved under the table lock; owned copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchedule {
    pub name: ScheduleName,
    pub entry: ScheduleEntry,
}

/// Outcome of one reload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub loaded: usize,
    pub skipped_corrupt: usize,
    /// Well-formed entries beyond [`TABLE_CAPACITY`], not loaded.
    pub truncated: usize,
}

struct LoadedSchedule {
    name: ScheduleName,
    entry: ScheduleEntry,
    handle: CalendarHandle,
}

#[derive(Default)]
struct ScheduleTable {
    slots: heapless::Vec<LoadedSchedule, TABLE_CAPACITY>,
    generation: u32,
}

struct Backend<S, C> {
    storage: S,
    calendar: C,
}

pub struct ScheduleStore<S: StoragePort, C: CalendarPort> {
    backend: Mutex<Backend<S, C>>,
    table: Mutex<ScheduleTable>,
    on_trigger: TriggerCallback,
    on_reload: Option<ReloadHook>,
}

/// Runs under the backend lock each time the table generation changes,
/// before any token of the new generation can be issued.
pub type ReloadHook = Box<dyn Fn() + Send + Sync>;

impl<S: StoragePort, C: CalendarPort> ScheduleStore<S, C> {
    /// Open the schedule namespace.  The table starts empty; call
    /// [`reload`](Self::reload) to populate it.
    ///
    /// `on_trigger` is handed to the calendar engine for every entry.
    pub fn open(mut storage: S, calendar: C, on_trigger: TriggerCallback) -> Result<Self> {
        storage.open(SCHEDULE_NAMESPACE).map_err(|e| {
            error!("sched: cannot open namespace '{}': {}", SCHEDULE_NAMESPACE, e);
            Error::Storage(e)
        })?;
        Ok(Self {
            backend: Mutex::new(Backend { storage, calendar }),
            table: Mutex::new(ScheduleTable::default()),
            on_trigger,
            on_reload: None,
        })
    }

    /// Install a hook run at the start of every reload (e.g. to flush
    /// queued tokens that are about to go stale).
    pub fn with_reload_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reload = Some(Box::new(hook));
        self
    }

    fn backend(&self) -> MutexGuard<'_, Backend<S, C>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn table(&self) -> MutexGuard<'_, ScheduleTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Mutations ─────────────────────────────────────────────

    /// Persist a new schedule and reload the table.
    ///
    /// Fails with [`Error::AlreadyExists`] if the name is taken (update is
    /// delete + set) and with [`CapacityError::TableFull`] if the store
    /// already holds [`TABLE_CAPACITY`] entries.
    pub fn set_schedule(&self, name: &str, entry: &ScheduleEntry) -> Result<ReloadReport> {
        let name = validate_name(name).map_err(Error::InvalidArgument)?;
        entry
            .validate()
            .map_err(|_| Error::InvalidArgument("trigger time out of range"))?;

        let mut backend = self.backend();
        if backend.storage.exists(SCHEDULE_NAMESPACE, &name) {
            return Err(Error::AlreadyExists);
        }
        let count = backend.storage.find_entries(SCHEDULE_NAMESPACE)?.len();
        if count >= TABLE_CAPACITY {
            warn!("sched: '{}' rejected, {} schedules stored", name, count);
            return Err(CapacityError::TableFull.into());
        }

        backend
            .storage
            .write(SCHEDULE_NAMESPACE, &name, &entry.encode())?;
        info!("sched: '{}' stored", name);

        self.reload_locked(&mut backend)
    }

    /// Direct lookup in persistent storage.
    pub fn get_schedule(&self, name: &str) -> Result<ScheduleEntry> {
        let name = validate_name(name).map_err(Error::InvalidArgument)?;
        let backend = self.backend();
        read_entry(&backend.storage, &name).map_err(|e| match e {
            ReadFailure::Storage(e) => Error::from(e),
            ReadFailure::Corrupt => Error::Storage(StorageError::Corrupted),
        })
    }

    /// Erase the persisted key.
    ///
    /// Does not reload: the entry keeps firing until the next
    /// [`reload`](Self::reload).
    pub fn delete_schedule(&self, name: &str) -> Result<()> {
        let name = validate_name(name).map_err(Error::InvalidArgument)?;
        let mut backend = self.backend();
        if !backend.storage.exists(SCHEDULE_NAMESPACE, &name) {
            return Err(Error::NotFound);
        }
        backend.storage.delete(SCHEDULE_NAMESPACE, &name)?;
        info!("sched: '{}' deleted (effective at next reload)", name);
        Ok(())
    }

    /// Unregister everything, then re-read and re-register persisted entries
    /// in storage-iteration order, up to [`TABLE_CAPACITY`].
    ///
    /// Corrupt entries are skipped.  A calendar registration failure for a
    /// well-formed entry aborts with [`CapacityError::OutOfResources`].
    pub fn reload(&self) -> Result<ReloadReport> {
        let mut backend = self.backend();
        self.reload_locked(&mut backend)
    }

    fn reload_locked(&self, backend: &mut Backend<S, C>) -> Result<ReloadReport> {
        let mut table = self.table();
        while let Some(loaded) = table.slots.pop() {
            backend.calendar.delete(loaded.handle);
        }
        table.generation = table.generation.wrapping_add(1);
        let generation = table.generation;
        if let Some(hook) = &self.on_reload {
            hook();
        }

        let keys = backend.storage.find_entries(SCHEDULE_NAMESPACE)?;
        let mut report = ReloadReport::default();

        for found in keys {
            let name = found.key;
            // Validate first: a corrupt blob is corrupt whether or not
            // there is room left for it.
            let entry = match read_entry(&backend.storage, &name) {
                Ok(e) => e,
                Err(_) => {
                    warn!("sched: skipping '{}': unreadable or corrupt", name);
                    report.skipped_corrupt += 1;
                    continue;
                }
            };
            if table.slots.is_full() {
                report.truncated += 1;
                continue;
            }

            let token = ScheduleToken {
                slot: table.slots.len() as u8,
                generation,
            };
            let handle = backend
                .calendar
                .create(&name, &entry.trigger, self.on_trigger.clone(), token)
                .map_err(|e| {
                    error!("sched: calendar refused '{}': {:?}", name, e);
                    Error::Capacity(CapacityError::OutOfResources)
                })?;
            backend.calendar.enable(handle);

            if table
                .slots
                .push(LoadedSchedule {
                    name,
                    entry,
                    handle,
                })
                .is_err()
            {
                // Unreachable: fullness checked above.
                backend.calendar.delete(handle);
                report.truncated += 1;
                continue;
            }
            report.loaded += 1;
        }

        if report.truncated > 0 {
            warn!(
                "sched: {} stored schedule(s) beyond capacity {} not loaded",
                report.truncated, TABLE_CAPACITY
            );
        }
        info!(
            "sched: reload gen={} loaded={} skipped={} truncated={}",
            generation, report.loaded, report.skipped_corrupt, report.truncated
        );
        Ok(report)
    }

    // ── Queries ───────────────────────────────────────────────

    /// Persisted schedule names in storage order, at most [`TABLE_CAPACITY`].
    pub fn list_names(&self) -> Result<impl Iterator<Item = ScheduleName> + use<S, C>> {
        let keys = self.backend().storage.find_entries(SCHEDULE_NAMESPACE)?;
        Ok(keys.into_iter().take(TABLE_CAPACITY).map(|e| e.key))
    }

    /// Worst-case JSON size for `n` names: `[` `]` plus `"name",` each.
    pub fn json_capacity_for(n: usize) -> usize {
        2 + n * (MAX_NAME_LEN + 3)
    }

    /// Render `["a","b",...]` into `out`.  Returns the number of bytes
    /// written.  Fails if `out` is below the worst case for the current
    /// entry count, even when the actual names would fit.
    pub fn render_names_json(&self, out: &mut [u8]) -> Result<usize> {
        let names: Vec<ScheduleName> = self.list_names()?.collect();
        let required = Self::json_capacity_for(names.len());
        if out.len() < required {
            return Err(CapacityError::BufferTooSmall {
                required,
                provided: out.len(),
            }
            .into());
        }
        let strs: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        let json = serde_json::to_vec(&strs)
            .map_err(|_| Error::InvalidArgument("schedule name not encodable"))?;
        let dst = out.get_mut(..json.len()).ok_or(CapacityError::BufferTooSmall {
            required: json.len(),
            provided: required,
        })?;
        dst.copy_from_slice(&json);
        Ok(json.len())
    }

    /// Number of entries currently registered with the calendar.
    pub fn loaded_count(&self) -> usize {
        self.table().slots.len()
    }

    /// Names currently registered, in slot order.
    pub fn loaded_names(&self) -> Vec<ScheduleName> {
        self.table().slots.iter().map(|s| s.name.clone()).collect()
    }

    pub fn generation(&self) -> u32 {
        self.table().generation
    }

    /// Forward a wall-clock tick to the calendar engine.
    pub fn poll_calendar(&self, now: &LocalTime) {
        self.backend().calendar.poll(now);
    }
}

impl<S: StoragePort, C: CalendarPort> ScheduleLookup for ScheduleStore<S, C> {
    fn resolve(&self, token: ScheduleToken) -> Option<ResolvedSchedule> {
        let table = self.table();
        if token.generation != table.generation {
            return None;
        }
        table
            .slots
            .get(usize::from(token.slot))
            .map(|s| ResolvedSchedule {
                name: s.name.clone(),
                entry: s.entry,
            })
    }
}

enum ReadFailure {
    Storage(StorageError),
    Corrupt,
}

fn read_entry<S: StoragePort>(
    storage: &S,
    name: &str,
) -> core::result::Result<ScheduleEntry, ReadFailure> {
    // One spare byte so an over-long blob is seen as such.
    let mut buf = [0u8; RECORD_LEN + 1];
    let n = storage
        .read(SCHEDULE_NAMESPACE, name, &mut buf)
        .map_err(ReadFailure::Storage)?;
    ScheduleEntry::decode(&buf[..n]).map_err(|e| {
        warn!("sched: '{}': {}", name, e);
        ReadFailure::Corrupt
    })
}
