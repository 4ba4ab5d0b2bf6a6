//! TCP wire format: header parsing/construction, options, checksum,
//! sequence arithmetic.
//!
//! The connection state machine lives in [`tcp_conn`](crate::net::tcp_conn);
//! this module is pure protocol plumbing with no connection state, which
//! keeps it trivially testable.

use crate::net::checksum::ChecksumAccumulator;
use crate::net::types::{IpProtocol, Ipv4Addr};

/// Minimum TCP header length (no options).
pub const TCP_HEADER_LEN: usize = 20;
/// Maximum TCP header length (40 option bytes).
pub const TCP_HEADER_MAX_LEN: usize = 60;

/// Maximum segment size advertised and used for segmentation
/// (Ethernet MTU 1500 − IP 20 − TCP 20).
pub const TCP_MSS: usize = 1460;

pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_SYN: u8 = 0x02;
pub const TCP_FLAG_RST: u8 = 0x04;
pub const TCP_FLAG_PSH: u8 = 0x08;
pub const TCP_FLAG_ACK: u8 = 0x10;
pub const TCP_FLAG_URG: u8 = 0x20;

pub const TCP_OPT_END: u8 = 0;
pub const TCP_OPT_NOP: u8 = 1;
pub const TCP_OPT_MSS: u8 = 2;
pub const TCP_OPT_WINDOW_SCALE: u8 = 3;
pub const TCP_OPT_TIMESTAMP: u8 = 8;

// =============================================================================
// Sequence arithmetic (wrapping 32-bit space)
// =============================================================================

/// `a <= b` in sequence space.
#[inline]
pub const fn seq_leq(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) as i32 >= 0
}

/// `a < b` in sequence space.
#[inline]
pub const fn seq_lt(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) > 0
}

/// `a >= b` in sequence space.
#[inline]
pub const fn seq_geq(a: u32, b: u32) -> bool {
    seq_leq(b, a)
}

/// Sequence-number footprint of a segment: payload bytes, plus one each
/// for SYN and FIN.
#[inline]
pub const fn segment_sequence_length(flags: u8, payload_len: usize) -> u32 {
    let mut length = payload_len as u32;
    if flags & TCP_FLAG_SYN != 0 {
        length += 1;
    }
    if flags & TCP_FLAG_FIN != 0 {
        length += 1;
    }
    length
}

// =============================================================================
// Header
// =============================================================================

/// Parsed TCP header; multi-byte fields in host order.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_num: u32,
    pub ack_num: u32,
    /// Data offset in 32-bit words (5–15).
    pub data_offset: u8,
    pub flags: u8,
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
}

impl TcpHeader {
    #[inline]
    pub const fn header_len(&self) -> usize {
        (self.data_offset as usize) * 4
    }

    #[inline]
    pub const fn options_len(&self) -> usize {
        self.header_len().saturating_sub(TCP_HEADER_LEN)
    }

    #[inline]
    pub const fn is_syn(&self) -> bool {
        self.flags & TCP_FLAG_SYN != 0
    }

    #[inline]
    pub const fn is_ack(&self) -> bool {
        self.flags & TCP_FLAG_ACK != 0
    }

    #[inline]
    pub const fn is_fin(&self) -> bool {
        self.flags & TCP_FLAG_FIN != 0
    }

    #[inline]
    pub const fn is_rst(&self) -> bool {
        self.flags & TCP_FLAG_RST != 0
    }

    #[inline]
    pub const fn is_syn_ack(&self) -> bool {
        self.is_syn() && self.is_ack()
    }
}

/// Parse a TCP header. `None` for a short slice or bad data offset.
pub fn parse_header(data: &[u8]) -> Option<TcpHeader> {
    if data.len() < TCP_HEADER_LEN {
        return None;
    }

    let data_offset = (data[12] >> 4) & 0x0F;
    if data_offset < 5 {
        return None;
    }
    let header_len = data_offset as usize * 4;
    if data.len() < header_len {
        return None;
    }

    Some(TcpHeader {
        src_port: u16::from_be_bytes([data[0], data[1]]),
        dst_port: u16::from_be_bytes([data[2], data[3]]),
        seq_num: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        ack_num: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        data_offset,
        flags: data[13] & 0x3F,
        window_size: u16::from_be_bytes([data[14], data[15]]),
        checksum: u16::from_be_bytes([data[16], data[17]]),
        urgent_ptr: u16::from_be_bytes([data[18], data[19]]),
    })
}

/// Write a header into `out[..header_len]` with the checksum field zeroed
/// (the caller computes and patches it). Option bytes beyond the base
/// header are zero-filled for the caller to overwrite.
pub fn write_header(hdr: &TcpHeader, out: &mut [u8]) -> Option<usize> {
    let header_len = hdr.header_len();
    if out.len() < header_len || header_len < TCP_HEADER_LEN || header_len > TCP_HEADER_MAX_LEN {
        return None;
    }

    out[0..2].copy_from_slice(&hdr.src_port.to_be_bytes());
    out[2..4].copy_from_slice(&hdr.dst_port.to_be_bytes());
    out[4..8].copy_from_slice(&hdr.seq_num.to_be_bytes());
    out[8..12].copy_from_slice(&hdr.ack_num.to_be_bytes());
    out[12] = (hdr.data_offset << 4) & 0xF0;
    out[13] = hdr.flags & 0x3F;
    out[14..16].copy_from_slice(&hdr.window_size.to_be_bytes());
    out[16..18].fill(0);
    out[18..20].copy_from_slice(&hdr.urgent_ptr.to_be_bytes());
    if header_len > TCP_HEADER_LEN {
        out[TCP_HEADER_LEN..header_len].fill(0);
    }
    Some(header_len)
}

// =============================================================================
// Options
// =============================================================================

/// Option values parsed from a SYN. Recorded, not enforced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TcpOptions {
    pub mss: Option<u16>,
    pub window_scale: Option<u8>,
    pub timestamp: Option<(u32, u32)>,
}

/// Walk the options region: NOP skips one byte, END terminates, everything
/// else carries a length byte.
pub fn parse_options(options: &[u8]) -> TcpOptions {
    let mut parsed = TcpOptions::default();
    let mut i = 0;
    while i < options.len() {
        match options[i] {
            TCP_OPT_END => break,
            TCP_OPT_NOP => {
                i += 1;
                continue;
            }
            kind => {
                if i + 1 >= options.len() {
                    break;
                }
                let length = options[i + 1] as usize;
                if length < 2 || i + length > options.len() {
                    break;
                }
                let body = &options[i + 2..i + length];
                match kind {
                    TCP_OPT_MSS if body.len() == 2 => {
                        parsed.mss = Some(u16::from_be_bytes([body[0], body[1]]));
                    }
                    TCP_OPT_WINDOW_SCALE if body.len() == 1 => {
                        parsed.window_scale = Some(body[0]);
                    }
                    TCP_OPT_TIMESTAMP if body.len() == 8 => {
                        parsed.timestamp = Some((
                            u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
                            u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
                        ));
                    }
                    _ => {}
                }
                i += length;
            }
        }
    }
    parsed
}

/// Write the 4-byte MSS option emitted on SYN segments.
pub fn write_mss_option(out: &mut [u8], mss: u16) -> Option<usize> {
    if out.len() < 4 {
        return None;
    }
    out[0] = TCP_OPT_MSS;
    out[1] = 4;
    out[2..4].copy_from_slice(&mss.to_be_bytes());
    Some(4)
}

// =============================================================================
// Checksum
// =============================================================================

/// Checksum of a full segment (`header_and_payload` with its checksum field
/// zeroed) against the IPv4 pseudo-header.
pub fn tcp_checksum(source: Ipv4Addr, destination: Ipv4Addr, header_and_payload: &[u8]) -> u16 {
    let mut acc = ChecksumAccumulator::new();
    acc.accumulate(&source.0)
        .accumulate(&destination.0)
        .accumulate_u16(IpProtocol::Tcp.as_u8() as u16)
        .accumulate_u16(header_and_payload.len() as u16)
        .accumulate(header_and_payload);
    acc.finalize()
}

/// `true` if a received segment checksums to zero under its pseudo-header.
pub fn verify_checksum(source: Ipv4Addr, destination: Ipv4Addr, segment: &[u8]) -> bool {
    tcp_checksum(source, destination, segment) == 0
}
