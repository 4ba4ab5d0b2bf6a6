//! ATA driver logic tests: CHS translation and IDENTIFY decoding. The
//! physical channel paths run against real (or emulated) drives.

use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, assert_test, pass, run_test};

use crate::storage::SECTOR_SIZE;
use crate::storage::ata::{ChsParams, DiskGeometry, geometry_from_identify, sector_to_chs};

const GEOMETRY: DiskGeometry = DiskGeometry {
    cylinders: 1024,
    heads: 16,
    sectors_per_track: 63,
};

pub fn test_chs_translation() -> TestResult {
    assert_eq_test!(
        sector_to_chs(&GEOMETRY, 0),
        ChsParams {
            cylinder: 0,
            head: 0,
            sector: 1
        },
        "first sector is C0/H0/S1"
    );
    assert_eq_test!(
        sector_to_chs(&GEOMETRY, 62),
        ChsParams {
            cylinder: 0,
            head: 0,
            sector: 63
        },
        "last sector of the first track"
    );
    assert_eq_test!(
        sector_to_chs(&GEOMETRY, 63),
        ChsParams {
            cylinder: 0,
            head: 1,
            sector: 1
        },
        "head advances after a track"
    );
    assert_eq_test!(
        sector_to_chs(&GEOMETRY, 16 * 63),
        ChsParams {
            cylinder: 1,
            head: 0,
            sector: 1
        },
        "cylinder advances after all heads"
    );
    pass!()
}

pub fn test_geometry_validity_and_count() -> TestResult {
    assert_test!(GEOMETRY.is_valid(), "sane geometry accepted");
    assert_eq_test!(GEOMETRY.sector_count(), 1024 * 16 * 63, "CHS-derived count");

    let broken = DiskGeometry {
        cylinders: 0,
        heads: 16,
        sectors_per_track: 63,
    };
    assert_test!(!broken.is_valid(), "zero cylinder axis rejected");
    pass!()
}

pub fn test_identify_decoding() -> TestResult {
    let mut identify = [0u8; SECTOR_SIZE];
    // Word 1: cylinders, word 3: heads, word 6: sectors per track.
    identify[2..4].copy_from_slice(&1024u16.to_le_bytes());
    identify[6..8].copy_from_slice(&16u16.to_le_bytes());
    identify[12..14].copy_from_slice(&63u16.to_le_bytes());

    let geometry = geometry_from_identify(&identify);
    assert_eq_test!(geometry, GEOMETRY, "geometry words decoded");

    let empty = geometry_from_identify(&[0u8; SECTOR_SIZE]);
    assert_test!(!empty.is_valid(), "all-zero identify is not a disk");
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_chs_translation);
    run_test!(passed, total, test_geometry_validity_and_count);
    run_test!(passed, total, test_identify_decoding);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "ata",
    run: run_suite,
};
