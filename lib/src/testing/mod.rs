//! In-kernel test harness.
//!
//! Test functions have the shape `pub fn test_xyz() -> TestResult` and live
//! in `*_tests.rs` modules next to the code they exercise. Suites bundle
//! them behind a [`TestSuiteDesc`] and register with the `exos-tests`
//! aggregator, which runs everything when the kernel boots with tests
//! enabled.

mod assertions;
mod harness;

pub use harness::{HARNESS_MAX_SUITES, SuiteRunnerFn, TestRunSummary, TestSuiteDesc, TestSuiteResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    Fail,
    Panic,
    Skipped,
}

impl TestResult {
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass | Self::Skipped)
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail | Self::Panic)
    }
}

/// Run one test function, logging its name and outcome.
pub fn run_single_test(name: &str, test_fn: impl FnOnce() -> TestResult) -> TestResult {
    let result = test_fn();
    match result {
        TestResult::Pass => crate::klog_debug!("  [ok]   {}", name),
        TestResult::Skipped => crate::klog_debug!("  [skip] {}", name),
        TestResult::Fail | TestResult::Panic => crate::klog_info!("  [FAIL] {}", name),
    }
    result
}

#[macro_export]
macro_rules! pass {
    () => {
        $crate::testing::TestResult::Pass
    };
}

#[macro_export]
macro_rules! fail {
    () => {
        $crate::testing::TestResult::Fail
    };
    ($msg:expr) => {{
        $crate::klog_info!("TEST FAIL: {}", $msg);
        $crate::testing::TestResult::Fail
    }};
    ($fmt:expr, $($arg:tt)*) => {{
        $crate::klog_info!(concat!("TEST FAIL: ", $fmt), $($arg)*);
        $crate::testing::TestResult::Fail
    }};
}

/// Run a test and fold the outcome into `(passed, total)` counters.
#[macro_export]
macro_rules! run_test {
    ($passed:expr, $total:expr, $test_fn:expr) => {{
        $total += 1;
        let result = $crate::testing::run_single_test(stringify!($test_fn), || $test_fn());
        if result.is_pass() {
            $passed += 1;
        }
        result
    }};

    ($test_fn:expr) => {{ $crate::testing::run_single_test(stringify!($test_fn), || $test_fn()) }};
}
