//! Network configuration parsing tests.

use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, pass, run_test};

use crate::net::config::{
    self, TCP_BUFFER_MAX, TCP_BUFFER_MIN, TCP_EPHEMERAL_PORT_DEFAULT, TCP_RECV_BUFFER_DEFAULT,
    TCP_SEND_BUFFER_DEFAULT,
};

pub fn test_defaults() -> TestResult {
    config::net_config_reset();
    assert_eq_test!(config::tcp_send_buffer_size(), TCP_SEND_BUFFER_DEFAULT, "send default");
    assert_eq_test!(config::tcp_recv_buffer_size(), TCP_RECV_BUFFER_DEFAULT, "recv default");
    assert_eq_test!(
        config::tcp_ephemeral_port_start(),
        TCP_EPHEMERAL_PORT_DEFAULT,
        "port base default"
    );
    pass!()
}

pub fn test_parse_and_clamp() -> TestResult {
    config::net_config_reset();
    config::net_config_parse("quiet net.tcp.sndbuf=16384 net.tcp.rcvbuf=999999 net.tcp.portbase=50000");
    assert_eq_test!(config::tcp_send_buffer_size(), 16384, "send applied");
    assert_eq_test!(config::tcp_recv_buffer_size(), TCP_BUFFER_MAX, "recv clamped to max");
    assert_eq_test!(config::tcp_ephemeral_port_start(), 50000, "port base applied");

    config::net_config_parse("net.tcp.sndbuf=16");
    assert_eq_test!(config::tcp_send_buffer_size(), TCP_BUFFER_MIN, "send clamped to min");
    pass!()
}

pub fn test_invalid_values_keep_previous() -> TestResult {
    config::net_config_reset();
    config::net_config_parse("net.tcp.sndbuf=banana net.tcp.portbase=80 net.tcp.rcvbuf=");
    assert_eq_test!(
        config::tcp_send_buffer_size(),
        TCP_SEND_BUFFER_DEFAULT,
        "garbage send value ignored"
    );
    assert_eq_test!(
        config::tcp_recv_buffer_size(),
        TCP_RECV_BUFFER_DEFAULT,
        "empty recv value ignored"
    );
    assert_eq_test!(
        config::tcp_ephemeral_port_start(),
        TCP_EPHEMERAL_PORT_DEFAULT,
        "privileged port base rejected"
    );
    pass!()
}

pub fn test_unknown_keys_ignored() -> TestResult {
    config::net_config_reset();
    config::net_config_parse("video.mode=1080p net.tcp.mss=9000 noapic");
    assert_eq_test!(config::tcp_send_buffer_size(), TCP_SEND_BUFFER_DEFAULT, "unrelated keys");
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_defaults);
    run_test!(passed, total, test_parse_and_clamp);
    run_test!(passed, total, test_invalid_values_keep_previous);
    run_test!(passed, total, test_unknown_keys_ignored);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "config",
    run: run_suite,
};
