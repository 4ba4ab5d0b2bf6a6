//! In-kernel test suite registry and runner.
//!
//! The kernel invokes [`run_all_suites`] when booted with tests enabled.
//! Suites live next to the code they exercise (the `*_tests` modules of
//! `exos-drivers`); this crate only aggregates and reports.

#![no_std]

use exos_lib::klog_info;
use exos_lib::testing::{TestRunSummary, TestSuiteDesc, TestSuiteResult};

/// Every registered suite, in execution order. Protocol suites run last so
/// a utility regression surfaces before the noise it would cause upstack.
static ALL_SUITES: [&TestSuiteDesc; 11] = [
    &exos_drivers::util_tests::SUITE,
    &exos_drivers::checksum_tests::SUITE,
    &exos_drivers::config_tests::SUITE,
    &exos_drivers::sector_cache_tests::SUITE,
    &exos_drivers::pci_tests::SUITE,
    &exos_drivers::e1000_tests::SUITE,
    &exos_drivers::ata_tests::SUITE,
    &exos_drivers::arp_tests::SUITE,
    &exos_drivers::ipv4_tests::SUITE,
    &exos_drivers::tcp_tests::SUITE,
    &exos_drivers::tcp_conn_tests::SUITE,
];

pub fn all_suites() -> &'static [&'static TestSuiteDesc] {
    &ALL_SUITES
}

/// Run every suite with the deterministic service fakes installed.
pub fn run_all_suites() -> TestRunSummary {
    exos_drivers::test_fixtures::install_test_services();

    let mut summary = TestRunSummary::default();
    for suite in all_suites() {
        klog_info!("suite '{}'", suite.name);
        let (passed, total) = (suite.run)();
        let result = TestSuiteResult::from_counts(suite.name, passed, total);
        klog_info!("suite '{}': {}/{} passed", suite.name, passed, total);
        summary.add_suite_result(result);
    }

    if summary.all_passed() {
        klog_info!(
            "all suites passed ({} tests in {} suites)",
            summary.total_tests,
            summary.suite_count
        );
    } else {
        klog_info!(
            "{} of {} tests FAILED",
            summary.failed,
            summary.total_tests
        );
    }
    summary
}
