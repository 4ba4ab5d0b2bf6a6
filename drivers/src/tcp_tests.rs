//! TCP wire-format regression tests: header parsing and construction,
//! option parsing, pseudo-header checksum, sequence arithmetic.

use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, assert_test, fail, pass, run_test};

use crate::net::tcp::{
    self, TCP_FLAG_ACK, TCP_FLAG_FIN, TCP_FLAG_PSH, TCP_FLAG_SYN, TCP_HEADER_LEN, TcpHeader,
    parse_options, segment_sequence_length, seq_geq, seq_leq, seq_lt,
};
use crate::net::types::Ipv4Addr;

fn wire_header(data_offset: u8, flags: u8) -> [u8; 20] {
    let mut buf = [0u8; 20];
    buf[0..2].copy_from_slice(&8080u16.to_be_bytes());
    buf[2..4].copy_from_slice(&80u16.to_be_bytes());
    buf[4..8].copy_from_slice(&1000u32.to_be_bytes());
    buf[8..12].copy_from_slice(&2000u32.to_be_bytes());
    buf[12] = (data_offset << 4) & 0xF0;
    buf[13] = flags;
    buf[14..16].copy_from_slice(&32768u16.to_be_bytes());
    buf
}

pub fn test_parse_minimal_header() -> TestResult {
    let header = match tcp::parse_header(&wire_header(5, TCP_FLAG_SYN | TCP_FLAG_ACK)) {
        Some(header) => header,
        None => return fail!("valid header did not parse"),
    };
    assert_eq_test!(header.src_port, 8080, "src port");
    assert_eq_test!(header.dst_port, 80, "dst port");
    assert_eq_test!(header.seq_num, 1000, "seq");
    assert_eq_test!(header.ack_num, 2000, "ack");
    assert_eq_test!(header.window_size, 32768, "window");
    assert_test!(header.is_syn_ack(), "flag helpers");
    assert_eq_test!(header.header_len(), 20, "header length");
    assert_eq_test!(header.options_len(), 0, "no options");
    pass!()
}

pub fn test_parse_rejects_bad_input() -> TestResult {
    assert_test!(tcp::parse_header(&[0u8; 19]).is_none(), "short slice");
    assert_test!(
        tcp::parse_header(&wire_header(4, 0)).is_none(),
        "data offset below 5"
    );
    // Offset claims options that the slice does not carry.
    assert_test!(tcp::parse_header(&wire_header(6, 0)).is_none(), "truncated options");
    pass!()
}

pub fn test_header_write_and_reparse() -> TestResult {
    let header = TcpHeader {
        src_port: 49200,
        dst_port: 443,
        seq_num: 0xDEAD_BEEF,
        ack_num: 0x0102_0304,
        data_offset: 5,
        flags: TCP_FLAG_PSH | TCP_FLAG_ACK,
        window_size: 1460,
        checksum: 0,
        urgent_ptr: 0,
    };
    let mut wire = [0u8; TCP_HEADER_LEN];
    assert_eq_test!(tcp::write_header(&header, &mut wire), Some(20), "write");

    let parsed = match tcp::parse_header(&wire) {
        Some(parsed) => parsed,
        None => return fail!("rewritten header did not parse"),
    };
    assert_eq_test!(parsed.seq_num, 0xDEAD_BEEF, "seq survives");
    assert_eq_test!(parsed.flags, TCP_FLAG_PSH | TCP_FLAG_ACK, "flags survive");
    assert_eq_test!(parsed.checksum, 0, "checksum left for the caller");
    pass!()
}

pub fn test_option_parsing() -> TestResult {
    // NOP, NOP, MSS(1460), WScale(7), Timestamp, END.
    let options = [
        1, 1, 2, 4, 0x05, 0xB4, 3, 3, 7, 8, 10, 0, 0, 0, 1, 0, 0, 0, 2, 0,
    ];
    let parsed = parse_options(&options);
    assert_eq_test!(parsed.mss, Some(1460), "mss recorded");
    assert_eq_test!(parsed.window_scale, Some(7), "window scale recorded");
    assert_eq_test!(parsed.timestamp, Some((1, 2)), "timestamp recorded");
    pass!()
}

pub fn test_option_parsing_stops_at_end_and_garbage() -> TestResult {
    // END before the MSS option hides it.
    let ended = [0, 2, 4, 0x05, 0xB4];
    assert_eq_test!(parse_options(&ended).mss, None, "END terminates");

    // A zero-length option cannot advance the cursor.
    let garbage = [42, 0, 2, 4, 0x05, 0xB4];
    assert_eq_test!(parse_options(&garbage).mss, None, "bad length stops parsing");
    pass!()
}

pub fn test_mss_option_writer() -> TestResult {
    let mut buf = [0u8; 4];
    assert_eq_test!(tcp::write_mss_option(&mut buf, 1460), Some(4), "written");
    assert_eq_test!(buf, [2, 4, 0x05, 0xB4], "wire bytes");
    assert_eq_test!(parse_options(&buf).mss, Some(1460), "round trip");
    pass!()
}

pub fn test_pseudo_header_checksum() -> TestResult {
    let src = Ipv4Addr::new(192, 168, 1, 10);
    let dst = Ipv4Addr::new(192, 168, 1, 5);

    let mut segment = [0u8; TCP_HEADER_LEN + 4];
    let header = TcpHeader {
        src_port: 49200,
        dst_port: 80,
        seq_num: 1001,
        ack_num: 9001,
        data_offset: 5,
        flags: TCP_FLAG_PSH | TCP_FLAG_ACK,
        window_size: 8192,
        checksum: 0,
        urgent_ptr: 0,
    };
    let _ = tcp::write_header(&header, &mut segment);
    segment[TCP_HEADER_LEN..].copy_from_slice(b"data");

    let sum = tcp::tcp_checksum(src, dst, &segment);
    segment[16..18].copy_from_slice(&sum.to_be_bytes());
    assert_test!(tcp::verify_checksum(src, dst, &segment), "checksum validates");

    // The pseudo-header binds the addresses: a different source breaks it.
    assert_test!(
        !tcp::verify_checksum(Ipv4Addr::new(192, 168, 1, 11), dst, &segment),
        "wrong source fails"
    );
    pass!()
}

pub fn test_sequence_arithmetic() -> TestResult {
    assert_test!(seq_lt(1000, 1001), "plain less-than");
    assert_test!(seq_leq(1000, 1000), "equality");
    assert_test!(seq_geq(1001, 1000), "greater-or-equal");
    // Wrap-around: numbers just past the top compare as later.
    assert_test!(seq_lt(0xFFFF_FFF0, 0x10), "wrapped comparison");
    assert_test!(!seq_lt(0x10, 0xFFFF_FFF0), "wrapped comparison, reversed");
    pass!()
}

pub fn test_segment_sequence_length() -> TestResult {
    assert_eq_test!(segment_sequence_length(TCP_FLAG_ACK, 0), 0, "bare ack");
    assert_eq_test!(segment_sequence_length(TCP_FLAG_SYN, 0), 1, "SYN counts one");
    assert_eq_test!(segment_sequence_length(TCP_FLAG_FIN | TCP_FLAG_ACK, 0), 1, "FIN counts one");
    assert_eq_test!(
        segment_sequence_length(TCP_FLAG_PSH | TCP_FLAG_ACK, 100),
        100,
        "payload length"
    );
    assert_eq_test!(
        segment_sequence_length(TCP_FLAG_SYN | TCP_FLAG_FIN, 10),
        12,
        "flags add to payload"
    );
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_parse_minimal_header);
    run_test!(passed, total, test_parse_rejects_bad_input);
    run_test!(passed, total, test_header_write_and_reparse);
    run_test!(passed, total, test_option_parsing);
    run_test!(passed, total, test_option_parsing_stops_at_end_and_garbage);
    run_test!(passed, total, test_mss_option_writer);
    run_test!(passed, total, test_pseudo_header_checksum);
    run_test!(passed, total, test_sequence_arithmetic);
    run_test!(passed, total, test_segment_sequence_length);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "tcp_wire",
    run: run_suite,
};
