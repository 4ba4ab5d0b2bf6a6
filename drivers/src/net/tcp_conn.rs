//! TCP connections: state machine, reliability, congestion control.
//!
//! Connections are owned by a process-wide table and reference their device
//! by handle. All state-machine work happens under the connection lock with
//! time passed in explicitly (`now_ms`), which keeps the whole machine
//! deterministic under test; notifications collected during a transition
//! are dispatched after the lock is released.
//!
//! Reliability model: one tracked retransmission record at a time. The
//! record starts with the first sequence-bearing segment sent while none is
//! pending, retransmits on timer expiry with exponential RTO growth, and
//! clears when an ACK covers its end. A cumulative ACK that covers later
//! untracked segments clears the record the same way. New data is held back
//! while a loss is being repaired (the tracked segment has been resent and
//! is still unacknowledged).

use alloc::sync::Arc;
use alloc::vec::Vec;

use exos_lib::kernel_services::platform;
use exos_lib::notification::{NotificationContext, NotifyCallback};
use exos_lib::{ByteRing, Hysteresis, IrqMutex, klog_debug, klog_info, klog_trace, klog_warn};

use crate::device::{ContextTag, Device, DeviceId, PCI_DEVICES};
use crate::net::config;
use crate::net::event::NetEvent;
use crate::net::ipv4::{self, Ipv4SendStatus};
use crate::net::tcp::{
    self, TCP_FLAG_ACK, TCP_FLAG_FIN, TCP_FLAG_PSH, TCP_FLAG_SYN, TCP_HEADER_LEN, TCP_MSS,
    TcpHeader, TcpOptions, seq_geq, seq_leq, seq_lt, segment_sequence_length,
};
use crate::net::types::{IpProtocol, Ipv4Addr, Port};

/// Initial retransmission timeout.
pub const TCP_INITIAL_RTO_MS: u32 = 1000;
/// Smoothed-RTO clamp range.
pub const TCP_RTO_MIN_MS: u32 = 500;
pub const TCP_RTO_MAX_MS: u32 = 60_000;
/// Timeout retransmissions before the connection is torn down.
pub const TCP_MAX_RETRANSMITS: u32 = 5;
/// TIME_WAIT duration (2 x MSL, MSL = 30 s).
pub const TCP_TIME_WAIT_MS: u64 = 60_000;
/// Duplicate ACKs that trigger fast retransmit.
pub const TCP_DUP_ACK_THRESHOLD: u32 = 3;

/// Initial sequence numbers: active and passive open.
pub const TCP_ISN_ACTIVE: u32 = 1000;
pub const TCP_ISN_PASSIVE: u32 = 2000;

const MSS32: u32 = TCP_MSS as u32;

// =============================================================================
// State machine
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

// =============================================================================
// Retransmission record
// =============================================================================

/// Tracking for the oldest in-flight sequence-bearing segment.
///
/// The retry counter counts timer-driven retransmissions only; fast
/// retransmit resets the timer without touching it.
struct RetransmitState {
    pending: bool,
    flags: u8,
    payload: [u8; TCP_MSS],
    payload_len: usize,
    seq_start: u32,
    seq_end: u32,
    sent_at_ms: u64,
    timer_ms: u64,
    retries: u32,
    was_retried: bool,
    /// Smoothed RTO base.
    base_rto_ms: u32,
    /// RTO for the next (re)transmission; doubles on timeout.
    current_rto_ms: u32,
}

impl RetransmitState {
    fn new() -> Self {
        Self {
            pending: false,
            flags: 0,
            payload: [0; TCP_MSS],
            payload_len: 0,
            seq_start: 0,
            seq_end: 0,
            sent_at_ms: 0,
            timer_ms: 0,
            retries: 0,
            was_retried: false,
            base_rto_ms: TCP_INITIAL_RTO_MS,
            current_rto_ms: TCP_INITIAL_RTO_MS,
        }
    }

    fn clear(&mut self) {
        self.pending = false;
        self.payload_len = 0;
        self.seq_start = 0;
        self.seq_end = 0;
        self.sent_at_ms = 0;
        self.timer_ms = 0;
        self.retries = 0;
        self.was_retried = false;
    }
}

// =============================================================================
// Connection block
// =============================================================================

struct TcpCb {
    local_ip: Ipv4Addr,
    local_port: Port,
    remote_ip: Ipv4Addr,
    remote_port: Port,

    state: TcpState,

    snd_next: u32,
    snd_unacked: u32,
    rcv_next: u32,

    rx: ByteRing,
    send_capacity: usize,

    cwnd: u32,
    ssthresh: u32,
    in_fast_recovery: bool,
    fast_recovery_seq: u32,
    dup_ack_count: u32,
    last_ack: u32,

    retransmit: RetransmitState,
    window_hysteresis: Hysteresis,
    remote_options: TcpOptions,
    remote_window: u16,
    time_wait_deadline_ms: u64,
}

impl TcpCb {
    fn new(
        local_ip: Ipv4Addr,
        local_port: Port,
        remote_ip: Ipv4Addr,
        remote_port: Port,
    ) -> Self {
        let recv_capacity = config::tcp_recv_buffer_size();
        let send_capacity = config::tcp_send_buffer_size();
        Self {
            local_ip,
            local_port,
            remote_ip,
            remote_port,
            state: TcpState::Closed,
            snd_next: 0,
            snd_unacked: 0,
            rcv_next: 0,
            rx: ByteRing::with_capacity(recv_capacity),
            send_capacity,
            cwnd: MSS32,
            ssthresh: MSS32 * 8,
            in_fast_recovery: false,
            fast_recovery_seq: 0,
            dup_ack_count: 0,
            last_ack: 0,
            retransmit: RetransmitState::new(),
            window_hysteresis: Hysteresis::new(
                (recv_capacity / 3) as u32,
                (recv_capacity * 2 / 3) as u32,
                recv_capacity as u32,
            ),
            remote_options: TcpOptions::default(),
            remote_window: 0,
            time_wait_deadline_ms: 0,
        }
    }

    /// Receive window derived from buffer headroom at send time; never
    /// cached.
    fn receive_window(&self) -> u16 {
        self.rx.free().min(0xFFFF) as u16
    }

    /// `unacked <= ack <= next`, accepting the degenerate (0, 0) pair.
    fn ack_acceptable(&self, ack: u32) -> bool {
        (self.snd_unacked == 0 && self.snd_next == 0)
            || (seq_leq(self.snd_unacked, ack) && seq_leq(ack, self.snd_next))
    }

    /// Bytes the congestion state allows on the wire right now.
    fn allowed_send_bytes(&self) -> u32 {
        // Loss repair in progress: the tracked segment was resent and is
        // still unacknowledged. Hold new data until it is.
        if self.retransmit.pending
            && self.retransmit.was_retried
            && seq_lt(self.snd_unacked, self.snd_next)
        {
            return 0;
        }
        let in_flight = self.snd_next.wrapping_sub(self.snd_unacked);
        self.cwnd.saturating_sub(in_flight)
    }

    fn enter_closed(&mut self) {
        self.state = TcpState::Closed;
        self.retransmit.clear();
        self.dup_ack_count = 0;
        self.in_fast_recovery = false;
        self.time_wait_deadline_ms = 0;
    }

    // -------------------------------------------------------------------------
    // Congestion control (New Reno)
    // -------------------------------------------------------------------------

    fn on_congestion_new_ack(&mut self) {
        if self.cwnd < self.ssthresh {
            self.cwnd += MSS32;
        } else {
            self.cwnd += (MSS32 * MSS32 / self.cwnd).max(1);
        }
        self.cwnd = self.cwnd.min(self.send_capacity as u32);
    }

    fn on_congestion_timeout_loss(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(MSS32 * 2);
        self.cwnd = MSS32;
        self.in_fast_recovery = false;
    }

    fn on_congestion_fast_loss(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(MSS32 * 2);
        self.cwnd = self.ssthresh + TCP_DUP_ACK_THRESHOLD * MSS32;
        self.in_fast_recovery = true;
        self.fast_recovery_seq = self.snd_next;
    }

    // -------------------------------------------------------------------------
    // Segment transmission
    // -------------------------------------------------------------------------

    /// Build, checksum and hand one segment to IPv4. Tracks the segment for
    /// retransmission when it carries sequence space and nothing is tracked
    /// yet; advances `snd_next` by the sequence length.
    fn send_segment(
        &mut self,
        device: &Arc<Device>,
        flags: u8,
        payload: &[u8],
        now_ms: u64,
        track: bool,
    ) -> bool {
        let with_mss = flags & TCP_FLAG_SYN != 0;
        let header_len = TCP_HEADER_LEN + if with_mss { 4 } else { 0 };
        let mut segment = alloc::vec![0u8; header_len + payload.len()];

        let header = TcpHeader {
            src_port: self.local_port.as_u16(),
            dst_port: self.remote_port.as_u16(),
            seq_num: self.snd_next,
            ack_num: self.rcv_next,
            data_offset: (header_len / 4) as u8,
            flags,
            window_size: self.receive_window(),
            checksum: 0,
            urgent_ptr: 0,
        };
        if tcp::write_header(&header, &mut segment).is_none() {
            return false;
        }
        if with_mss && tcp::write_mss_option(&mut segment[TCP_HEADER_LEN..], TCP_MSS as u16).is_none()
        {
            return false;
        }
        segment[header_len..].copy_from_slice(payload);

        let sum = tcp::tcp_checksum(self.local_ip, self.remote_ip, &segment);
        segment[16..18].copy_from_slice(&sum.to_be_bytes());

        let status = ipv4::ipv4_context(device).send(device, self.remote_ip, IpProtocol::Tcp, &segment);
        if status == Ipv4SendStatus::Failed {
            klog_warn!(
                "tcp: segment to {}:{} failed at ipv4",
                self.remote_ip,
                self.remote_port
            );
            return false;
        }

        let seq_len = segment_sequence_length(flags, payload.len());
        if track && seq_len > 0 && !self.retransmit.pending {
            self.start_tracking(flags, payload, self.snd_next, now_ms);
        }
        if seq_len > 0 {
            self.snd_next = self.snd_next.wrapping_add(seq_len);
        }
        true
    }

    /// A bare ACK: no sequence space, never tracked.
    fn send_ack(&mut self, device: &Arc<Device>, now_ms: u64) {
        let _ = self.send_segment(device, TCP_FLAG_ACK, &[], now_ms, false);
    }

    fn start_tracking(&mut self, flags: u8, payload: &[u8], seq_start: u32, now_ms: u64) {
        let tracked = payload.len().min(TCP_MSS);
        let r = &mut self.retransmit;
        r.flags = flags;
        r.payload[..tracked].copy_from_slice(&payload[..tracked]);
        r.payload_len = tracked;
        r.seq_start = seq_start;
        r.seq_end = seq_start.wrapping_add(segment_sequence_length(flags, payload.len()));
        r.sent_at_ms = now_ms;
        r.timer_ms = now_ms + r.current_rto_ms as u64;
        r.retries = 0;
        r.pending = true;
        r.was_retried = false;
    }

    /// Re-send the tracked segment with its original sequence number.
    /// `fast` resets the timer without growing RTO or the retry counter.
    fn retransmit_tracked(&mut self, device: &Arc<Device>, now_ms: u64, fast: bool) -> bool {
        if !self.retransmit.pending {
            return false;
        }

        let saved_next = self.snd_next;
        let saved_unacked = self.snd_unacked;
        let flags = self.retransmit.flags;
        let payload_len = self.retransmit.payload_len;
        let payload = self.retransmit.payload;

        self.snd_next = self.retransmit.seq_start;
        let sent = self.send_segment(device, flags, &payload[..payload_len], now_ms, false);
        self.snd_next = saved_next;
        self.snd_unacked = saved_unacked;

        if !sent {
            return false;
        }

        let r = &mut self.retransmit;
        r.was_retried = true;
        r.sent_at_ms = now_ms;
        if !fast {
            r.retries += 1;
            if r.current_rto_ms < TCP_RTO_MAX_MS {
                r.current_rto_ms = (r.current_rto_ms << 1).min(TCP_RTO_MAX_MS);
            }
        }
        r.timer_ms = now_ms + r.current_rto_ms as u64;
        true
    }

    // -------------------------------------------------------------------------
    // ACK bookkeeping
    // -------------------------------------------------------------------------

    fn handle_acknowledgement(
        &mut self,
        device: &Arc<Device>,
        ack: u32,
        payload_len: usize,
        now_ms: u64,
    ) {
        let duplicate = ack == self.last_ack && payload_len == 0;

        if seq_lt(self.snd_unacked, ack) && seq_leq(ack, self.snd_next) {
            self.snd_unacked = ack;
        }

        if duplicate {
            self.dup_ack_count += 1;
            if self.dup_ack_count >= TCP_DUP_ACK_THRESHOLD
                && self.retransmit.pending
                && ack == self.retransmit.seq_start
            {
                self.on_congestion_fast_loss();
                if self.retransmit_tracked(device, now_ms, true) {
                    klog_debug!("tcp: fast retransmit at seq {}", ack);
                }
            }
            return;
        }

        self.dup_ack_count = 0;
        self.last_ack = ack;

        if self.in_fast_recovery && seq_geq(ack, self.fast_recovery_seq) {
            self.in_fast_recovery = false;
            self.cwnd = self.ssthresh;
        }

        if self.retransmit.pending && seq_geq(ack, self.retransmit.seq_end) {
            // Karn: only unretried segments feed the RTT estimate.
            if !self.retransmit.was_retried && now_ms >= self.retransmit.sent_at_ms {
                let sample = (now_ms - self.retransmit.sent_at_ms) as u32;
                let smoothed = ((self.retransmit.base_rto_ms * 7) + sample) / 8;
                self.retransmit.base_rto_ms = smoothed.clamp(TCP_RTO_MIN_MS, TCP_RTO_MAX_MS);
            }
            self.retransmit.current_rto_ms = self.retransmit.base_rto_ms;
            self.retransmit.clear();
            self.on_congestion_new_ack();
        }
    }

    // -------------------------------------------------------------------------
    // Data reception (ESTABLISHED)
    // -------------------------------------------------------------------------

    fn on_data(
        &mut self,
        device: &Arc<Device>,
        seq: u32,
        payload: &[u8],
        now_ms: u64,
        events: &mut Vec<NetEvent>,
    ) {
        if payload.is_empty() {
            return;
        }

        let mut seq = seq;
        let mut payload = payload;

        // Trim a prefix the peer re-sent below our cumulative ACK point.
        if seq_lt(seq, self.rcv_next) {
            let overlap = self.rcv_next.wrapping_sub(seq) as usize;
            if overlap >= payload.len() {
                self.send_ack(device, now_ms);
                return;
            }
            payload = &payload[overlap..];
            seq = self.rcv_next;
        }

        // Out of order beyond the cumulative point: no reassembly buffer,
        // duplicate-ACK to ask for the gap.
        if seq_lt(self.rcv_next, seq) {
            self.send_ack(device, now_ms);
            return;
        }

        let free = self.rx.free();
        let deliver = payload.len().min(free);
        if deliver > 0 {
            self.rx.write(&payload[..deliver]);
            self.rcv_next = self.rcv_next.wrapping_add(deliver as u32);
            let free_after = self.rx.free() as u32;
            self.window_hysteresis.update(free_after);
            events.push(NetEvent::TcpData {
                length: deliver as u32,
            });
        } else {
            klog_trace!(
                "tcp: receive buffer full, advertising zero window to {}:{}",
                self.remote_ip,
                self.remote_port
            );
        }

        // Always acknowledge; a full buffer advertises a zero window.
        self.send_ack(device, now_ms);
    }

    // -------------------------------------------------------------------------
    // Segment handling per state
    // -------------------------------------------------------------------------

    fn on_segment(
        &mut self,
        device: &Arc<Device>,
        header: &TcpHeader,
        payload: &[u8],
        now_ms: u64,
        events: &mut Vec<NetEvent>,
    ) {
        if header.window_size != 0 || header.is_ack() {
            self.remote_window = header.window_size;
        }

        if header.is_rst() {
            self.on_reset(events);
            return;
        }

        match self.state {
            TcpState::Closed => {}

            TcpState::Listen => {
                if header.is_syn() {
                    self.rcv_next = header.seq_num.wrapping_add(1);
                    self.snd_next = TCP_ISN_PASSIVE;
                    self.snd_unacked = TCP_ISN_PASSIVE;
                    self.state = TcpState::SynReceived;
                    let _ = self.send_segment(
                        device,
                        TCP_FLAG_SYN | TCP_FLAG_ACK,
                        &[],
                        now_ms,
                        true,
                    );
                }
            }

            TcpState::SynSent => {
                if header.is_syn_ack() {
                    // ack must cover our SYN: unacked < ack <= next.
                    if seq_lt(self.snd_unacked, header.ack_num)
                        && seq_leq(header.ack_num, self.snd_next)
                    {
                        self.rcv_next = header.seq_num.wrapping_add(1);
                        self.handle_acknowledgement(device, header.ack_num, 0, now_ms);
                        self.state = TcpState::Established;
                        self.send_ack(device, now_ms);
                        events.push(NetEvent::TcpConnected);
                    }
                } else if header.is_syn() {
                    // Simultaneous open.
                    self.rcv_next = header.seq_num.wrapping_add(1);
                    self.state = TcpState::SynReceived;
                    self.send_ack(device, now_ms);
                }
            }

            TcpState::SynReceived => {
                if header.is_ack() && self.ack_acceptable(header.ack_num) {
                    self.handle_acknowledgement(device, header.ack_num, payload.len(), now_ms);
                    self.state = TcpState::Established;
                    events.push(NetEvent::TcpConnected);
                }
            }

            TcpState::Established => {
                if header.is_ack() {
                    self.handle_acknowledgement(device, header.ack_num, payload.len(), now_ms);
                }
                if !payload.is_empty() {
                    self.on_data(device, header.seq_num, payload, now_ms, events);
                }
                if header.is_fin() {
                    self.rcv_next = self.rcv_next.wrapping_add(1);
                    self.send_ack(device, now_ms);
                    self.state = TcpState::CloseWait;
                }
            }

            TcpState::FinWait1 => {
                let mut acked_fin = false;
                if header.is_ack() {
                    if self.ack_acceptable(header.ack_num) && header.ack_num == self.snd_next {
                        acked_fin = true;
                    }
                    self.handle_acknowledgement(device, header.ack_num, payload.len(), now_ms);
                }
                if header.is_fin() {
                    self.rcv_next = self.rcv_next.wrapping_add(1);
                    self.send_ack(device, now_ms);
                    self.state = if acked_fin {
                        self.time_wait_deadline_ms = now_ms + TCP_TIME_WAIT_MS;
                        TcpState::TimeWait
                    } else {
                        TcpState::Closing
                    };
                } else if acked_fin {
                    self.state = TcpState::FinWait2;
                }
            }

            TcpState::FinWait2 => {
                if header.is_fin() {
                    self.rcv_next = self.rcv_next.wrapping_add(1);
                    self.send_ack(device, now_ms);
                    self.time_wait_deadline_ms = now_ms + TCP_TIME_WAIT_MS;
                    self.state = TcpState::TimeWait;
                }
            }

            TcpState::CloseWait => {
                if header.is_ack() {
                    self.handle_acknowledgement(device, header.ack_num, payload.len(), now_ms);
                }
            }

            TcpState::Closing => {
                if header.is_ack() && self.ack_acceptable(header.ack_num) {
                    self.handle_acknowledgement(device, header.ack_num, payload.len(), now_ms);
                    self.time_wait_deadline_ms = now_ms + TCP_TIME_WAIT_MS;
                    self.state = TcpState::TimeWait;
                }
            }

            TcpState::LastAck => {
                if header.is_ack() && self.ack_acceptable(header.ack_num) {
                    self.enter_closed();
                }
            }

            TcpState::TimeWait => {
                // A retransmitted FIN deserves a fresh ACK.
                if header.is_fin() {
                    self.send_ack(device, now_ms);
                }
            }
        }
    }

    fn on_reset(&mut self, _events: &mut Vec<NetEvent>) {
        match self.state {
            TcpState::SynReceived => {
                // Back to waiting for the next client.
                self.retransmit.clear();
                self.dup_ack_count = 0;
                self.state = TcpState::Listen;
            }
            TcpState::Closed | TcpState::Listen => {}
            _ => {
                klog_debug!(
                    "tcp: reset from {}:{} in {:?}",
                    self.remote_ip,
                    self.remote_port,
                    self.state
                );
                self.enter_closed();
            }
        }
    }
}

// =============================================================================
// Connection object and table
// =============================================================================

/// A TCP connection: shared handle over the locked control block.
pub struct TcpConnection {
    device_id: DeviceId,
    inner: IrqMutex<TcpCb>,
    notifications: IrqMutex<NotificationContext<NetEvent>>,
}

/// The process-wide connection list.
static TCP_CONNECTIONS: IrqMutex<Vec<Arc<TcpConnection>>> = IrqMutex::new(Vec::new());

/// Ephemeral-port allocator state.
struct TcpGlobal {
    next_ephemeral: u16,
}

static TCP_GLOBAL: IrqMutex<TcpGlobal> = IrqMutex::new(TcpGlobal { next_ephemeral: 0 });

/// Marker context recording that a device's IPv4 layer dispatches TCP here.
struct TcpDeviceBinding;

/// Ensure the device hands TCP datagrams to this module.
pub fn tcp_initialize(device: &Arc<Device>) {
    let _binding = device.get_or_create_context(ContextTag::Tcp, || {
        ipv4::ipv4_context(device).register_protocol(IpProtocol::Tcp, tcp_protocol_handler);
        Arc::new(TcpDeviceBinding)
    });
}

impl TcpConnection {
    /// Create a connection object bound to `device`, with an ephemeral
    /// local port, ready for [`connect`](Self::connect).
    pub fn open(device: &Arc<Device>, remote_ip: Ipv4Addr, remote_port: Port) -> Arc<Self> {
        tcp_initialize(device);
        let local_ip = ipv4::ipv4_context(device).local_address();
        let local_port = allocate_ephemeral_port(local_ip);
        let connection = Arc::new(Self {
            device_id: device.id(),
            inner: IrqMutex::new(TcpCb::new(local_ip, local_port, remote_ip, remote_port)),
            notifications: IrqMutex::new(NotificationContext::new()),
        });
        TCP_CONNECTIONS.lock().push(connection.clone());
        connection
    }

    /// Create a listening connection on `local_port`.
    pub fn listen(device: &Arc<Device>, local_port: Port) -> Arc<Self> {
        tcp_initialize(device);
        let local_ip = ipv4::ipv4_context(device).local_address();
        let connection = Arc::new(Self {
            device_id: device.id(),
            inner: IrqMutex::new(TcpCb::new(
                local_ip,
                local_port,
                Ipv4Addr::UNSPECIFIED,
                Port::new(0),
            )),
            notifications: IrqMutex::new(NotificationContext::new()),
        });
        connection.inner.lock().state = TcpState::Listen;
        TCP_CONNECTIONS.lock().push(connection.clone());
        connection
    }

    #[inline]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn state(&self) -> TcpState {
        self.inner.lock().state
    }

    pub fn local_port(&self) -> Port {
        self.inner.lock().local_port
    }

    pub fn remote(&self) -> (Ipv4Addr, Port) {
        let cb = self.inner.lock();
        (cb.remote_ip, cb.remote_port)
    }

    /// Bytes waiting in the receive buffer.
    pub fn available(&self) -> usize {
        self.inner.lock().rx.len()
    }

    // -------------------------------------------------------------------------
    // Bookkeeping snapshots (diagnostics and regression tests)
    // -------------------------------------------------------------------------

    pub fn send_unacked(&self) -> u32 {
        self.inner.lock().snd_unacked
    }

    pub fn send_next(&self) -> u32 {
        self.inner.lock().snd_next
    }

    pub fn recv_next(&self) -> u32 {
        self.inner.lock().rcv_next
    }

    pub fn retransmit_pending(&self) -> bool {
        self.inner.lock().retransmit.pending
    }

    pub fn retransmit_retries(&self) -> u32 {
        self.inner.lock().retransmit.retries
    }

    pub fn current_rto_ms(&self) -> u32 {
        self.inner.lock().retransmit.current_rto_ms
    }

    pub fn congestion_window(&self) -> u32 {
        self.inner.lock().cwnd
    }

    pub fn slow_start_threshold(&self) -> u32 {
        self.inner.lock().ssthresh
    }

    pub fn in_fast_recovery(&self) -> bool {
        self.inner.lock().in_fast_recovery
    }

    pub fn fast_recovery_sequence(&self) -> u32 {
        self.inner.lock().fast_recovery_seq
    }

    /// Advertised window as the next outgoing segment would carry it.
    pub fn advertised_window(&self) -> u16 {
        self.inner.lock().receive_window()
    }

    /// MSS/window-scale/timestamp values the peer offered on its SYN.
    pub fn peer_options(&self) -> TcpOptions {
        self.inner.lock().remote_options
    }

    pub fn register_notification(
        &self,
        kind: u32,
        callback: NotifyCallback<NetEvent>,
        user_data: usize,
    ) -> bool {
        self.notifications.lock().register(kind, callback, user_data)
    }

    pub fn unregister_notification(
        &self,
        kind: u32,
        callback: NotifyCallback<NetEvent>,
        user_data: usize,
    ) -> bool {
        self.notifications.lock().unregister(kind, callback, user_data)
    }

    fn dispatch(&self, events: Vec<NetEvent>) {
        if events.is_empty() {
            return;
        }
        let notifications = self.notifications.lock();
        for event in &events {
            notifications.send(event);
        }
    }

    /// Active open: send SYN, enter SYN_SENT.
    pub fn connect(&self, device: &Arc<Device>) -> bool {
        self.connect_at(device, platform::get_time_ms())
    }

    pub fn connect_at(&self, device: &Arc<Device>, now_ms: u64) -> bool {
        let mut cb = self.inner.lock();
        if cb.state != TcpState::Closed {
            return false;
        }
        cb.snd_next = TCP_ISN_ACTIVE;
        cb.snd_unacked = TCP_ISN_ACTIVE;
        cb.state = TcpState::SynSent;
        let sent = cb.send_segment(device, TCP_FLAG_SYN, &[], now_ms, true);
        if !sent {
            cb.enter_closed();
        }
        sent
    }

    /// Active open that waits for the handshake to finish: polls the NIC
    /// and sleeps between checks until ESTABLISHED, abort, or timeout.
    /// Kernel-task context only.
    pub fn connect_blocking(&self, device: &Arc<Device>, timeout_ms: u64) -> bool {
        if !self.connect(device) {
            return false;
        }
        let deadline = platform::get_time_ms() + timeout_ms;
        loop {
            match self.state() {
                TcpState::Established => return true,
                TcpState::Closed => return false,
                _ => {}
            }
            if platform::get_time_ms() >= deadline {
                klog_debug!("tcp: connect to {}:{} timed out", self.remote().0, self.remote().1);
                return false;
            }
            if let Some(net) = device.network() {
                net.poll();
            }
            platform::timer_sleep_ms(10);
        }
    }

    /// Queue application data: segments into MSS chunks, each sent only as
    /// the congestion state allows. Returns the bytes accepted.
    pub fn send(&self, device: &Arc<Device>, data: &[u8]) -> usize {
        self.send_at(device, data, platform::get_time_ms())
    }

    pub fn send_at(&self, device: &Arc<Device>, data: &[u8], now_ms: u64) -> usize {
        let mut cb = self.inner.lock();
        if cb.state != TcpState::Established {
            return 0;
        }

        let max_chunk = TCP_MSS.min(cb.send_capacity.max(1));
        let mut sent_total = 0;

        while sent_total < data.len() {
            let allowed = cb.allowed_send_bytes() as usize;
            if allowed == 0 {
                break;
            }
            let chunk = (data.len() - sent_total).min(max_chunk).min(allowed);
            if chunk == 0 {
                break;
            }
            let slice = &data[sent_total..sent_total + chunk];
            if !cb.send_segment(device, TCP_FLAG_PSH | TCP_FLAG_ACK, slice, now_ms, true) {
                break;
            }
            sent_total += chunk;
        }
        sent_total
    }

    /// Read received bytes. Shrinking the buffer may re-open the advertised
    /// window; a pending hysteresis edge (or a reopened zero window) emits
    /// a standalone window-update ACK.
    pub fn receive(&self, device: &Arc<Device>, out: &mut [u8]) -> usize {
        self.receive_at(device, out, platform::get_time_ms())
    }

    pub fn receive_at(&self, device: &Arc<Device>, out: &mut [u8], now_ms: u64) -> usize {
        let mut cb = self.inner.lock();
        let was_zero = cb.receive_window() == 0;
        let read = cb.rx.read(out);
        if read == 0 {
            return 0;
        }

        let free_after = cb.rx.free() as u32;
        cb.window_hysteresis.update(free_after);
        let update_due = cb.window_hysteresis.is_transition_pending() || was_zero;
        if update_due {
            cb.window_hysteresis.clear_transition();
            if cb.state == TcpState::Established {
                cb.send_ack(device, now_ms);
            }
        }
        read
    }

    /// Application close, from whatever state the connection is in.
    pub fn close(&self, device: &Arc<Device>) {
        self.close_at(device, platform::get_time_ms())
    }

    pub fn close_at(&self, device: &Arc<Device>, now_ms: u64) {
        let mut cb = self.inner.lock();
        match cb.state {
            TcpState::Listen => cb.enter_closed(),
            TcpState::SynSent => {
                // Abort: no zombie retransmissions.
                cb.enter_closed();
            }
            TcpState::SynReceived | TcpState::Established => {
                let _ = cb.send_segment(device, TCP_FLAG_FIN | TCP_FLAG_ACK, &[], now_ms, true);
                cb.state = TcpState::FinWait1;
            }
            TcpState::CloseWait => {
                let _ = cb.send_segment(device, TCP_FLAG_FIN | TCP_FLAG_ACK, &[], now_ms, true);
                cb.state = TcpState::LastAck;
            }
            _ => {}
        }
    }

    /// Timer maintenance: TIME_WAIT expiry and retransmission.
    pub fn tick(&self, device: &Arc<Device>, now_ms: u64) {
        let mut events: Vec<NetEvent> = Vec::new();
        {
            let mut cb = self.inner.lock();

            if cb.state == TcpState::TimeWait && now_ms >= cb.time_wait_deadline_ms {
                cb.enter_closed();
            }

            if cb.retransmit.pending && now_ms >= cb.retransmit.timer_ms {
                cb.on_congestion_timeout_loss();
                let resent = cb.retransmit_tracked(device, now_ms, false);
                if resent {
                    klog_debug!(
                        "tcp: retransmit #{} seq {} to {}:{}",
                        cb.retransmit.retries,
                        cb.retransmit.seq_start,
                        cb.remote_ip,
                        cb.remote_port
                    );
                }
                if cb.retransmit.retries >= TCP_MAX_RETRANSMITS {
                    klog_warn!(
                        "tcp: giving up on {}:{} after {} retransmissions",
                        cb.remote_ip,
                        cb.remote_port,
                        cb.retransmit.retries
                    );
                    cb.retransmit.clear();
                    events.push(NetEvent::TcpFailed);
                    cb.enter_closed();
                }
            }
        }
        self.dispatch(events);
    }

    /// Ingress entry: called with a validated header and payload.
    fn handle_segment(
        &self,
        device: &Arc<Device>,
        source: Ipv4Addr,
        header: &TcpHeader,
        options: &[u8],
        payload: &[u8],
        now_ms: u64,
    ) {
        let mut events: Vec<NetEvent> = Vec::new();
        {
            let mut cb = self.inner.lock();
            if header.is_syn() {
                cb.remote_options = tcp::parse_options(options);
            }
            // A listener adopts the peer of the first SYN it answers.
            if cb.state == TcpState::Listen && header.is_syn() {
                cb.remote_ip = source;
                cb.remote_port = Port::new(header.src_port);
            }
            cb.on_segment(device, header, payload, now_ms, &mut events);
        }
        self.dispatch(events);
    }
}

// =============================================================================
// Ingress dispatch
// =============================================================================

/// IPv4 protocol handler for protocol 6.
fn tcp_protocol_handler(device: &Arc<Device>, payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr) {
    let Some(header) = tcp::parse_header(payload) else {
        klog_trace!("tcp: truncated segment dropped");
        return;
    };
    if !tcp::verify_checksum(src, dst, payload) {
        klog_trace!("tcp: checksum mismatch from {} dropped", src);
        return;
    }

    let header_len = header.header_len();
    let options = &payload[TCP_HEADER_LEN..header_len];
    let data = &payload[header_len..];

    let local_port = Port::new(header.dst_port);
    let remote_port = Port::new(header.src_port);

    let Some(connection) = find_connection(device.id(), dst, local_port, src, remote_port) else {
        klog_trace!(
            "tcp: no connection for {}:{} -> {}:{}",
            src,
            remote_port,
            dst,
            local_port
        );
        return;
    };

    connection.handle_segment(device, src, &header, options, data, platform::get_time_ms());
}

/// Exact-quintuple match first, then a listener on the local port.
fn find_connection(
    device_id: DeviceId,
    local_ip: Ipv4Addr,
    local_port: Port,
    remote_ip: Ipv4Addr,
    remote_port: Port,
) -> Option<Arc<TcpConnection>> {
    let connections = TCP_CONNECTIONS.lock().clone();

    let exact = connections.iter().find(|conn| {
        let cb = conn.inner.lock();
        cb.state != TcpState::Listen
            && cb.state != TcpState::Closed
            && conn.device_id == device_id
            && cb.local_port == local_port
            && cb.local_ip == local_ip
            && cb.remote_ip == remote_ip
            && cb.remote_port == remote_port
    });
    if let Some(found) = exact {
        return Some(found.clone());
    }

    connections
        .iter()
        .find(|conn| {
            let cb = conn.inner.lock();
            cb.state == TcpState::Listen
                && conn.device_id == device_id
                && cb.local_port == local_port
        })
        .cloned()
}

// =============================================================================
// Global maintenance and diagnostics
// =============================================================================

/// Drive every connection's timers. Called from the kernel tick.
pub fn tcp_tick_all(now_ms: u64) {
    let connections = TCP_CONNECTIONS.lock().clone();
    for connection in connections {
        let Some(device) = PCI_DEVICES.by_id(connection.device_id) else {
            continue;
        };
        connection.tick(&device, now_ms);
    }
}

/// Drop connections the application released and the machine closed.
pub fn tcp_reap_closed() {
    let mut connections = TCP_CONNECTIONS.lock();
    connections.retain(|conn| {
        // Two references: the table and the caller's iteration copy is not
        // held here, so strong_count == 1 means the app let go.
        !(conn.state() == TcpState::Closed && Arc::strong_count(conn) == 1)
    });
}

/// Log the quintuple and bookkeeping of every live connection.
pub fn tcp_dump_connections() {
    let connections = TCP_CONNECTIONS.lock();
    klog_info!("tcp: {} connections", connections.len());
    for conn in connections.iter() {
        let cb = conn.inner.lock();
        klog_info!(
            "  {}:{} -> {}:{} {:?} snd_una={} snd_nxt={} rcv_nxt={} cwnd={} ssthresh={} peer_wnd={} rx_used={}",
            cb.local_ip,
            cb.local_port,
            cb.remote_ip,
            cb.remote_port,
            cb.state,
            cb.snd_unacked,
            cb.snd_next,
            cb.rcv_next,
            cb.cwnd,
            cb.ssthresh,
            cb.remote_window,
            cb.rx.len()
        );
    }
}

/// Test-only: forget every connection and reset the port allocator.
pub fn tcp_reset_all() {
    TCP_CONNECTIONS.lock().clear();
    TCP_GLOBAL.lock().next_ephemeral = 0;
}

// =============================================================================
// Ephemeral ports
// =============================================================================

/// Allocate a local port not used by any connection on `local_ip`.
///
/// First use seeds the allocator from the system time and the address;
/// afterwards a linear search with wrap runs from the last handed-out port.
/// If the whole range is occupied the configured start is returned.
pub fn allocate_ephemeral_port(local_ip: Ipv4Addr) -> Port {
    let start = config::tcp_ephemeral_port_start();
    let range = (u16::MAX - start) as u32 + 1;

    let mut global = TCP_GLOBAL.lock();
    if global.next_ephemeral == 0 {
        let seed = platform::get_time_ms() as u32 ^ local_ip.to_u32_be();
        global.next_ephemeral = start + (seed % range) as u16;
    }

    for _ in 0..range {
        let candidate = global.next_ephemeral;
        global.next_ephemeral = if candidate == u16::MAX {
            start
        } else {
            candidate + 1
        };
        if !port_in_use(local_ip, Port::new(candidate)) {
            return Port::new(candidate);
        }
    }
    Port::new(start)
}

fn port_in_use(local_ip: Ipv4Addr, port: Port) -> bool {
    TCP_CONNECTIONS.lock().iter().any(|conn| {
        let cb = conn.inner.lock();
        cb.local_port == port && cb.local_ip == local_ip && cb.state != TcpState::Closed
    })
}
