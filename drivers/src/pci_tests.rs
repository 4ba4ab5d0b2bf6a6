//! PCI bus manager logic tests: match rules and the ABI edge. Config-space
//! access and enumeration need a bus and run under QEMU.

use exos_abi::driver::{DiskAccess, DriverFunction};
use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, assert_test, pass, run_test};

use crate::pci_defs::{
    PCI_CLASS_NETWORK, PCI_MATCH_ANY_CLASS, PCI_MATCH_ANY_ID, PCI_SUBCLASS_ETHERNET,
    PciDeviceInfo, PciMatchRule,
};

fn e1000_info() -> PciDeviceInfo {
    let mut info = PciDeviceInfo::zeroed();
    info.vendor_id = 0x8086;
    info.device_id = 0x100E;
    info.base_class = PCI_CLASS_NETWORK;
    info.sub_class = PCI_SUBCLASS_ETHERNET;
    info
}

pub fn test_match_rule_exact_ids() -> TestResult {
    let rule = PciMatchRule::id(0x8086, 0x100E);
    assert_test!(rule.matches(&e1000_info()), "matching ids");

    let mut other = e1000_info();
    other.device_id = 0x100F;
    assert_test!(!rule.matches(&other), "different device id");
    pass!()
}

pub fn test_match_rule_wildcards() -> TestResult {
    assert_test!(PciMatchRule::any().matches(&e1000_info()), "full wildcard");

    let by_class = PciMatchRule {
        vendor_id: PCI_MATCH_ANY_ID,
        device_id: PCI_MATCH_ANY_ID,
        base_class: PCI_CLASS_NETWORK,
        sub_class: PCI_SUBCLASS_ETHERNET,
        prog_if: PCI_MATCH_ANY_CLASS,
    };
    assert_test!(by_class.matches(&e1000_info()), "class-keyed rule");

    let mut storage = e1000_info();
    storage.base_class = 0x01;
    assert_test!(!by_class.matches(&storage), "non-wildcard class must equal");
    pass!()
}

pub fn test_driver_function_ids_round_trip() -> TestResult {
    for function in [
        DriverFunction::Load,
        DriverFunction::Probe,
        DriverFunction::GetVersion,
        DriverFunction::NetSend,
        DriverFunction::NetPoll,
        DriverFunction::DiskRead,
        DriverFunction::DiskSetAccess,
    ] {
        assert_eq_test!(
            DriverFunction::from_u32(function as u32),
            Some(function),
            "id survives the boundary"
        );
    }
    assert_eq_test!(DriverFunction::from_u32(0xDEAD_BEEF), None, "unknown id rejected");
    pass!()
}

pub fn test_disk_access_policy_bits() -> TestResult {
    assert_test!(!DiskAccess::FULL.is_read_only(), "default allows writes");
    assert_test!(DiskAccess::READ.is_read_only(), "read-only without WRITE");
    assert_test!(DiskAccess::default().contains(DiskAccess::READ), "default readable");
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_match_rule_exact_ids);
    run_test!(passed, total, test_match_rule_wildcards);
    run_test!(passed, total, test_driver_function_ids_round_trip);
    run_test!(passed, total, test_disk_access_policy_bits);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "pci",
    run: run_suite,
};
