//! Network tuning knobs.
//!
//! Values come from the kernel command line (`net.tcp.sndbuf=`,
//! `net.tcp.rcvbuf=`, `net.tcp.portbase=`) and are clamped to the
//! implementation limits; anything absent or malformed falls back to the
//! default.

use exos_lib::{IrqMutex, klog_warn};

pub const TCP_BUFFER_MIN: usize = 1024;
pub const TCP_BUFFER_MAX: usize = 65536;
pub const TCP_SEND_BUFFER_DEFAULT: usize = 8192;
pub const TCP_RECV_BUFFER_DEFAULT: usize = 8192;

/// Lowest ephemeral port the allocator may hand out.
pub const TCP_EPHEMERAL_PORT_MIN: u16 = 1024;
pub const TCP_EPHEMERAL_PORT_DEFAULT: u16 = 49152;

#[derive(Clone, Copy)]
struct NetConfig {
    tcp_send_buffer: usize,
    tcp_recv_buffer: usize,
    tcp_ephemeral_start: u16,
}

const DEFAULTS: NetConfig = NetConfig {
    tcp_send_buffer: TCP_SEND_BUFFER_DEFAULT,
    tcp_recv_buffer: TCP_RECV_BUFFER_DEFAULT,
    tcp_ephemeral_start: TCP_EPHEMERAL_PORT_DEFAULT,
};

static CONFIG: IrqMutex<NetConfig> = IrqMutex::new(DEFAULTS);

pub fn tcp_send_buffer_size() -> usize {
    CONFIG.lock().tcp_send_buffer
}

pub fn tcp_recv_buffer_size() -> usize {
    CONFIG.lock().tcp_recv_buffer
}

pub fn tcp_ephemeral_port_start() -> u16 {
    CONFIG.lock().tcp_ephemeral_start
}

/// Restore the defaults (tests).
pub fn net_config_reset() {
    *CONFIG.lock() = DEFAULTS;
}

fn parse_buffer_value(key: &str, value: &str, fallback: usize) -> usize {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => {
            if parsed > TCP_BUFFER_MAX {
                klog_warn!("netcfg: {}={} exceeds {}, clamping", key, parsed, TCP_BUFFER_MAX);
                TCP_BUFFER_MAX
            } else if parsed < TCP_BUFFER_MIN {
                klog_warn!("netcfg: {}={} below {}, clamping", key, parsed, TCP_BUFFER_MIN);
                TCP_BUFFER_MIN
            } else {
                parsed
            }
        }
        _ => {
            klog_warn!("netcfg: {} has invalid value '{}', using default", key, value);
            fallback
        }
    }
}

/// Apply `key=value` tokens from the kernel command line.
pub fn net_config_parse(cmdline: &str) {
    let mut config = CONFIG.lock();
    for token in cmdline.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "net.tcp.sndbuf" => {
                config.tcp_send_buffer = parse_buffer_value(key, value, config.tcp_send_buffer);
            }
            "net.tcp.rcvbuf" => {
                config.tcp_recv_buffer = parse_buffer_value(key, value, config.tcp_recv_buffer);
            }
            "net.tcp.portbase" => match value.parse::<u16>() {
                Ok(port) if port >= TCP_EPHEMERAL_PORT_MIN => {
                    config.tcp_ephemeral_start = port;
                }
                _ => {
                    klog_warn!("netcfg: {} has invalid value '{}', using default", key, value);
                }
            },
            _ => {}
        }
    }
}
