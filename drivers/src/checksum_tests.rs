//! Internet checksum regression tests.

use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, assert_test, pass, run_test};

use crate::net::checksum::{self, ChecksumAccumulator};

/// The worked example from the one's-complement sum literature.
pub fn test_checksum_known_vector() -> TestResult {
    let data = [0x00, 0x01, 0xF2, 0x03, 0xF4, 0xF5, 0xF6, 0xF7];
    assert_eq_test!(checksum::checksum(&data), 0x220D, "known vector");
    pass!()
}

pub fn test_checksum_odd_length() -> TestResult {
    // A trailing byte counts as the high byte of a final word.
    assert_eq_test!(checksum::checksum(&[0x01]), !0x0100u16, "single byte");
    assert_eq_test!(
        checksum::checksum(&[0x00, 0x01, 0x02]),
        !(0x0001u16 + 0x0200u16),
        "three bytes"
    );
    pass!()
}

pub fn test_checksum_finalize_idempotent() -> TestResult {
    let mut acc = ChecksumAccumulator::new();
    acc.accumulate(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let first = acc.finalize();
    let second = acc.finalize();
    assert_eq_test!(first, second, "finalize does not consume the accumulator");
    pass!()
}

pub fn test_checksum_split_accumulation_matches_one_shot() -> TestResult {
    // A pseudo-header + header summed in two passes must equal the sum of
    // the concatenation. Splits happen on word boundaries only.
    let data = [0x45, 0x00, 0x00, 0x1C, 0xAB, 0xCD, 0x40, 0x00, 0x40, 0x11];
    let mut split = ChecksumAccumulator::new();
    split.accumulate(&data[..4]).accumulate(&data[4..]);
    assert_eq_test!(split.finalize(), checksum::checksum(&data), "split matches one-shot");
    pass!()
}

pub fn test_checksum_verify_round() -> TestResult {
    // Patch the computed checksum into a pseudo-header-free buffer and
    // confirm it re-sums to zero.
    let mut header = [
        0x45, 0x00, 0x00, 0x28, 0x00, 0x01, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0xC0, 0xA8, 0x01,
        0x0A, 0xC0, 0xA8, 0x01, 0x01,
    ];
    let sum = checksum::checksum(&header);
    header[10..12].copy_from_slice(&sum.to_be_bytes());
    assert_test!(checksum::verify(&header), "patched header validates");
    assert_eq_test!(checksum::checksum(&header), 0, "re-sum is zero");
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_checksum_known_vector);
    run_test!(passed, total, test_checksum_odd_length);
    run_test!(passed, total, test_checksum_finalize_idempotent);
    run_test!(passed, total, test_checksum_split_accumulation_matches_one_shot);
    run_test!(passed, total, test_checksum_verify_round);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "checksum",
    run: run_suite,
};
