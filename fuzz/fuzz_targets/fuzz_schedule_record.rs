//! Fuzz target: `ScheduleEntry::decode`
//!
//! Persisted blobs come back from flash with whatever the last writer (or
//! a torn write) left there.  Decoding must never panic, and anything it
//! accepts must be valid and re-encode to exactly the input bytes.
//!
//! cargo fuzz run fuzz_schedule_record

#![no_main]

use libfuzzer_sys::fuzz_target;
use misty::schedule::record::{RECORD_LEN, ScheduleEntry};

fuzz_target!(|data: &[u8]| {
    if let Ok(entry) = ScheduleEntry::decode(data) {
        assert_eq!(data.len(), RECORD_LEN);
        assert!(entry.validate().is_ok(), "decoder accepted an invalid entry");
        assert!(entry.pumps.channels().count() > 0, "decoded an empty pump set");
        assert_eq!(&entry.encode()[..], data, "encoding is not canonical");
    }
});
