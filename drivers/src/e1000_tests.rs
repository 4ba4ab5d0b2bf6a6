//! E1000 driver logic tests: descriptor layout, MAC selection, ring
//! arithmetic. Hardware bring-up itself is exercised under QEMU, not here.

use core::mem::size_of;

use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, assert_test, pass, run_test};

use crate::net::e1000::{
    E1000_RX_DESC_COUNT, E1000_TX_DESC_COUNT, RxDescriptor, TxDescriptor, mac_from_eeprom_words,
    mac_from_receive_address, tx_ring_full,
};
use crate::net::types::MacAddr;

pub fn test_descriptor_layout() -> TestResult {
    // Legacy descriptors are 16 bytes; one page holds a full ring.
    assert_eq_test!(size_of::<RxDescriptor>(), 16, "rx descriptor size");
    assert_eq_test!(size_of::<TxDescriptor>(), 16, "tx descriptor size");
    assert_test!(
        E1000_RX_DESC_COUNT * size_of::<RxDescriptor>() <= 4096,
        "rx ring fits one page"
    );
    assert_test!(
        E1000_TX_DESC_COUNT * size_of::<TxDescriptor>() <= 4096,
        "tx ring fits one page"
    );
    assert_test!(E1000_RX_DESC_COUNT.is_power_of_two(), "rx ring power of two");
    assert_test!(E1000_TX_DESC_COUNT.is_power_of_two(), "tx ring power of two");
    pass!()
}

pub fn test_receive_address_decoding() -> TestResult {
    const AV: u32 = 1 << 31;

    // 52:54:00:11:22:33 packed little-endian into RAL/RAH.
    let low = u32::from_le_bytes([0x52, 0x54, 0x00, 0x11]);
    assert_eq_test!(
        mac_from_receive_address(low, 0x3322 | AV),
        Some(MacAddr([0x52, 0x54, 0x00, 0x11, 0x22, 0x33])),
        "valid unicast adopted"
    );

    assert_eq_test!(
        mac_from_receive_address(low, 0x3322),
        None,
        "address-valid bit required"
    );
    assert_eq_test!(mac_from_receive_address(0, AV), None, "zero mac rejected");
    assert_eq_test!(
        mac_from_receive_address(0xFFFF_FFFF, 0xFFFF | AV),
        None,
        "broadcast rejected"
    );
    assert_eq_test!(
        mac_from_receive_address(u32::from_le_bytes([0x01, 0x00, 0x5E, 0x00]), 0x0102 | AV),
        None,
        "multicast I/G bit rejected"
    );
    pass!()
}

pub fn test_eeprom_word_decoding() -> TestResult {
    // Words are little-endian byte pairs.
    assert_eq_test!(
        mac_from_eeprom_words(0x5452, 0x1100, 0x3322),
        Some(MacAddr([0x52, 0x54, 0x00, 0x11, 0x22, 0x33])),
        "word order"
    );
    assert_eq_test!(mac_from_eeprom_words(0, 0, 0), None, "empty eeprom");
    assert_test!(mac_from_eeprom_words(1, 0, 0).is_some(), "any non-zero word counts");
    pass!()
}

pub fn test_tx_ring_full_predicate() -> TestResult {
    let n = E1000_TX_DESC_COUNT as u32;
    assert_test!(!tx_ring_full(0, 0, n), "empty ring");
    assert_test!(tx_ring_full(n - 1, 0, n), "tail one behind head is full");
    assert_test!(tx_ring_full(6, 7, n), "adjacent full mid-ring");
    assert_test!(!tx_ring_full(7, 7, n), "equal head/tail not full");
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_descriptor_layout);
    run_test!(passed, total, test_receive_address_decoding);
    run_test!(passed, total, test_eeprom_word_decoding);
    run_test!(passed, total, test_tx_ring_full_predicate);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "e1000",
    run: run_suite,
};
