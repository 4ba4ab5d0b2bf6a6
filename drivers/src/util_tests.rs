//! Regression tests for the support utilities: notification bus, adaptive
//! delay, hysteresis, byte ring.

use core::sync::atomic::{AtomicU32, Ordering};

use exos_abi::net::NOTIF_EVENT_ARP_RESOLVED;
use exos_lib::notification::{EventKind, NotificationContext};
use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{AdaptiveDelay, ByteRing, Hysteresis, assert_eq_test, assert_test, pass, run_test};

use crate::net::event::NetEvent;
use crate::net::types::{Ipv4Addr, MacAddr};

// =============================================================================
// Notification bus
// =============================================================================

static DELIVERED: AtomicU32 = AtomicU32::new(0);

fn count_event(_event: &NetEvent, user_data: usize) {
    DELIVERED.fetch_add(user_data as u32, Ordering::Relaxed);
}

fn other_listener(_event: &NetEvent, _user_data: usize) {}

fn sample_event() -> NetEvent {
    NetEvent::ArpResolved {
        ip: Ipv4Addr::new(10, 0, 0, 1),
        mac: MacAddr([2, 0, 0, 0, 0, 1]),
    }
}

pub fn test_notification_register_idempotent() -> TestResult {
    let mut bus: NotificationContext<NetEvent> = NotificationContext::new();
    assert_test!(bus.register(NOTIF_EVENT_ARP_RESOLVED, count_event, 1), "first register");
    assert_test!(
        !bus.register(NOTIF_EVENT_ARP_RESOLVED, count_event, 1),
        "duplicate register is a no-op"
    );
    assert_eq_test!(bus.len(), 1, "one entry");

    // Same callback, different user data: a distinct triple.
    assert_test!(bus.register(NOTIF_EVENT_ARP_RESOLVED, count_event, 2), "distinct triple");
    assert_eq_test!(bus.len(), 2, "two entries");
    pass!()
}

pub fn test_notification_unregister_exact_triple() -> TestResult {
    let mut bus: NotificationContext<NetEvent> = NotificationContext::new();
    bus.register(NOTIF_EVENT_ARP_RESOLVED, count_event, 7);
    assert_test!(
        !bus.unregister(NOTIF_EVENT_ARP_RESOLVED, count_event, 8),
        "wrong user data does not unregister"
    );
    assert_test!(
        !bus.unregister(NOTIF_EVENT_ARP_RESOLVED, other_listener, 7),
        "wrong callback does not unregister"
    );
    assert_test!(
        bus.unregister(NOTIF_EVENT_ARP_RESOLVED, count_event, 7),
        "exact triple unregisters"
    );
    assert_test!(bus.is_empty(), "table empty again");
    pass!()
}

pub fn test_notification_send_matches_kind() -> TestResult {
    let mut bus: NotificationContext<NetEvent> = NotificationContext::new();
    DELIVERED.store(0, Ordering::Relaxed);
    bus.register(NOTIF_EVENT_ARP_RESOLVED, count_event, 5);
    bus.register(exos_abi::net::NOTIF_EVENT_TCP_FAILED, count_event, 100);

    let event = sample_event();
    assert_eq_test!(event.kind(), NOTIF_EVENT_ARP_RESOLVED, "event kind");
    assert_eq_test!(bus.send(&event), 1, "one listener matched");
    assert_eq_test!(DELIVERED.load(Ordering::Relaxed), 5, "listener saw its user data");
    pass!()
}

// =============================================================================
// Adaptive delay
// =============================================================================

pub fn test_adaptive_delay_backoff_sequence() -> TestResult {
    let mut delay = AdaptiveDelay::new();
    assert_eq_test!(delay.get_next_delay(), 10, "first delay is min");
    assert_eq_test!(delay.get_next_delay(), 20, "second doubles");
    assert_eq_test!(delay.get_next_delay(), 40, "third doubles");
    for _ in 0..10 {
        delay.get_next_delay();
    }
    assert_eq_test!(delay.get_next_delay(), 1000, "delay saturates at max");
    pass!()
}

pub fn test_adaptive_delay_attempt_budget() -> TestResult {
    let mut delay = AdaptiveDelay::with_params(10, 100, 2, 3);
    assert_test!(delay.should_continue(), "fresh state may try");
    delay.get_next_delay();
    delay.get_next_delay();
    assert_test!(delay.should_continue(), "two attempts left budget");
    delay.get_next_delay();
    assert_test!(!delay.should_continue(), "budget exhausted");

    delay.on_success();
    assert_test!(delay.should_continue(), "success resets the budget");
    assert_eq_test!(delay.attempts(), 0, "attempt counter reset");
    assert_eq_test!(delay.get_next_delay(), 10, "delay restarts at min");

    // Failure is an observer only; the delay keeps growing through
    // get_next_delay regardless.
    delay.on_failure();
    assert_eq_test!(delay.attempts(), 1, "failure does not count an attempt");
    pass!()
}

// =============================================================================
// Hysteresis
// =============================================================================

pub fn test_hysteresis_transitions() -> TestResult {
    let mut hysteresis = Hysteresis::new(10, 20, 0);
    assert_test!(!hysteresis.is_high(), "starts low below high threshold");

    assert_test!(!hysteresis.update(15), "mid-band value does not flip");
    assert_test!(hysteresis.update(20), "reaching high threshold flips");
    assert_test!(hysteresis.is_transition_pending(), "edge pending");
    hysteresis.clear_transition();

    // Same value again: at most one transition until the opposite band.
    assert_test!(!hysteresis.update(20), "repeat update does not re-flip");
    assert_test!(!hysteresis.is_transition_pending(), "no new edge");

    assert_test!(!hysteresis.update(10), "low threshold is exclusive");
    assert_test!(hysteresis.update(9), "dropping below low flips back");
    assert_test!(hysteresis.is_transition_pending(), "edge pending again");
    pass!()
}

pub fn test_hysteresis_reset_drops_pending_edge() -> TestResult {
    let mut hysteresis = Hysteresis::new(10, 20, 0);
    hysteresis.update(25);
    assert_test!(hysteresis.is_transition_pending(), "edge pending before reset");
    hysteresis.reset(5);
    assert_test!(!hysteresis.is_transition_pending(), "reset clears edge");
    assert_test!(!hysteresis.is_high(), "reset re-seeds state from value");
    pass!()
}

// =============================================================================
// Byte ring
// =============================================================================

pub fn test_byte_ring_wrap_around() -> TestResult {
    let mut ring = ByteRing::with_capacity(8);
    assert_eq_test!(ring.write(b"abcdef"), 6, "initial write");
    let mut out = [0u8; 4];
    assert_eq_test!(ring.read(&mut out), 4, "partial read");
    assert_eq_test!(&out, b"abcd", "read contents");

    // Wraps across the backing array boundary.
    assert_eq_test!(ring.write(b"ghijkl"), 6, "wrap write");
    assert_eq_test!(ring.len(), 8, "ring full");
    assert_eq_test!(ring.write(b"x"), 0, "full ring takes nothing");

    let mut rest = [0u8; 8];
    assert_eq_test!(ring.read(&mut rest), 8, "drain");
    assert_eq_test!(&rest, b"efghijkl", "order preserved across wrap");
    pass!()
}

pub fn test_byte_ring_skip() -> TestResult {
    let mut ring = ByteRing::with_capacity(16);
    ring.write(b"0123456789");
    assert_eq_test!(ring.skip(4), 4, "skip drops from the front");
    let mut out = [0u8; 6];
    assert_eq_test!(ring.read(&mut out), 6, "remainder read");
    assert_eq_test!(&out, b"456789", "skip consumed the prefix");
    assert_eq_test!(ring.skip(10), 0, "skip on empty ring");
    pass!()
}

// =============================================================================
// Suite
// =============================================================================

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_notification_register_idempotent);
    run_test!(passed, total, test_notification_unregister_exact_triple);
    run_test!(passed, total, test_notification_send_matches_kind);
    run_test!(passed, total, test_adaptive_delay_backoff_sequence);
    run_test!(passed, total, test_adaptive_delay_attempt_budget);
    run_test!(passed, total, test_hysteresis_transitions);
    run_test!(passed, total, test_hysteresis_reset_drops_pending_edge);
    run_test!(passed, total, test_byte_ring_wrap_around);
    run_test!(passed, total, test_byte_ring_skip);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "util",
    run: run_suite,
};
