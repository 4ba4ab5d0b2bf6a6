//! Sector cache regression tests.

use alloc::boxed::Box;

use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, assert_test, pass, run_test};

use crate::error::DriverError;
use crate::storage::sector_cache::{SectorBuffer, SectorCache};

fn buffer_for(sector: u64, fill: u8) -> Box<SectorBuffer> {
    let mut buffer = Box::new(SectorBuffer::new(sector));
    buffer.data.fill(fill);
    buffer
}

pub fn test_sector_number_split() -> TestResult {
    let buffer = SectorBuffer::new(0x1_2345_6789);
    assert_eq_test!(buffer.sector_low, 0x2345_6789, "low half");
    assert_eq_test!(buffer.sector_high, 0x1, "high half");
    assert_eq_test!(buffer.sector(), 0x1_2345_6789, "recombined");
    assert_test!(buffer.matches(0x1_2345_6789), "matches its own number");
    assert_test!(!buffer.matches(0x2345_6789), "high half participates");
    pass!()
}

pub fn test_cache_find_hit_and_miss() -> TestResult {
    let mut cache = SectorCache::new(4);
    assert_test!(cache.add(buffer_for(7, 0xAA), 0, 1000).is_ok(), "add");
    assert_test!(cache.find(|b| b.matches(7)).is_some(), "hit");
    assert_test!(cache.find(|b| b.matches(8)).is_none(), "miss");
    assert_eq_test!(cache.find(|b| b.matches(7)).map(|b| b.data[0]), Some(0xAA), "payload");
    pass!()
}

pub fn test_cache_ttl_expiry() -> TestResult {
    let mut cache = SectorCache::new(4);
    cache.add(buffer_for(1, 1), 0, 100).ok();
    cache.add(buffer_for(2, 2), 50, 100).ok();

    assert_eq_test!(cache.cleanup(99), 0, "nothing expired yet");
    assert_eq_test!(cache.cleanup(100), 1, "first entry aged out");
    assert_test!(cache.find(|b| b.matches(1)).is_none(), "expired entry gone");
    assert_test!(cache.find(|b| b.matches(2)).is_some(), "younger entry stays");
    pass!()
}

pub fn test_cache_add_evicts_expired_then_oldest() -> TestResult {
    // Nothing expired: the oldest insert gives up its slot.
    let mut cache = SectorCache::new(2);
    cache.add(buffer_for(1, 0), 0, 1000).ok();
    cache.add(buffer_for(2, 0), 5, 1000).ok();
    assert_test!(cache.add(buffer_for(3, 0), 10, 1000).is_ok(), "full cache evicts");
    assert_eq_test!(cache.len(), 2, "capacity respected");
    assert_test!(cache.find(|b| b.matches(1)).is_none(), "oldest entry evicted");
    assert_test!(cache.find(|b| b.matches(2)).is_some(), "younger entry kept");
    assert_test!(cache.find(|b| b.matches(3)).is_some(), "new entry present");

    // An expired slot is reclaimed before any live entry is touched.
    let mut cache = SectorCache::new(2);
    cache.add(buffer_for(1, 0), 0, 100).ok();
    cache.add(buffer_for(2, 0), 0, 10_000).ok();
    assert_test!(cache.add(buffer_for(3, 0), 200, 10_000).is_ok(), "add after expiry");
    assert_test!(cache.find(|b| b.matches(2)).is_some(), "live entry survives");
    assert_eq_test!(cache.len(), 2, "expired slot reused");

    // Only a zero-capacity cache can refuse an insert.
    let mut empty = SectorCache::new(0);
    assert_eq_test!(
        empty.add(buffer_for(9, 0), 0, 100),
        Err(DriverError::Unexpected),
        "zero capacity rejects"
    );
    pass!()
}

pub fn test_cache_dirty_flag_roundtrip() -> TestResult {
    let mut cache = SectorCache::new(2);
    let mut buffer = buffer_for(9, 0x55);
    buffer.dirty = true;
    cache.add(buffer, 0, 1000).ok();

    let hit = cache.find(|b| b.matches(9));
    assert_test!(hit.as_ref().is_some_and(|b| b.dirty), "dirty set pre-write");
    if let Some(hit) = hit {
        hit.dirty = false;
    }
    assert_test!(
        cache.find(|b| b.matches(9)).is_some_and(|b| !b.dirty),
        "dirty cleared post-write"
    );
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_sector_number_split);
    run_test!(passed, total, test_cache_find_hit_and_miss);
    run_test!(passed, total, test_cache_ttl_expiry);
    run_test!(passed, total, test_cache_add_evicts_expired_then_oldest);
    run_test!(passed, total, test_cache_dirty_flag_roundtrip);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "sector_cache",
    run: run_suite,
};
