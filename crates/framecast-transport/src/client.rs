//! # Client State Machine
//!
//! Pure logic — no I/O. Consumes decoded datagrams and playout ticks, and
//! produces outbound datagrams for the embedding runtime to send.
//!
//! ## Responsibilities
//!
//! 1. **Subscription**: emit the first-contact datagram that opens the
//!    server-side session
//! 2. **Gap Detection**: track the expected sequence, queue missing ranges
//! 3. **Request Drip**: emit one retransmission request per drip tick until
//!    the queue drains — never a burst
//! 4. **Playout**: feed arriving bytes to the [`PlayoutBuffer`], consume at
//!    the fixed frame rate on each tick
//!
//! The runtime owns the socket and all timers: the playout tick (armed after
//! `initial_delay`, repeating every `playout_interval`) and the request drip
//! (armed whenever [`StreamClient::has_pending_requests`] turns true,
//! re-armed after each [`StreamClient::poll_retransmit`] that returns a
//! datagram).

use std::time::Duration;

use anyhow::ensure;
use bytes::Bytes;

use crate::arq::RequestQueue;
use crate::playout::{Consumption, PlayoutBuffer};
use crate::stats::ClientStats;
use crate::wire::Message;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Client configuration parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Datagrams per frame; `frame_index = sequence / packets_per_frame`.
    /// Negotiated out-of-band with the server, not part of the wire format.
    pub packets_per_frame: u32,
    /// Frames consumed per playout tick.
    pub frame_rate: u32,
    /// Buffering delay before the first playout tick.
    pub initial_delay: Duration,
    /// Playout tick period.
    pub playout_interval: Duration,
    /// Delay between consecutive retransmission requests.
    pub request_interval: Duration,
    /// Request datagrams are padded out to this size.
    pub request_pad: usize,
    /// Playout store window, in frames ahead of the playout front.
    pub store_capacity: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            packets_per_frame: 100,
            frame_rate: 20,
            initial_delay: Duration::from_secs(3),
            playout_interval: Duration::from_secs(1),
            request_interval: Duration::from_millis(1),
            request_pad: 100,
            store_capacity: 32768,
        }
    }
}

impl ClientConfig {
    /// Check cross-field consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.packets_per_frame > 0, "packets_per_frame must be nonzero");
        ensure!(self.frame_rate > 0, "frame_rate must be nonzero");
        ensure!(self.store_capacity > 0, "store_capacity must be nonzero");
        ensure!(
            self.store_capacity >= self.frame_rate as u64,
            "store window must hold at least one tick worth of frames"
        );
        Ok(())
    }
}

// ─── Client State ───────────────────────────────────────────────────────────

/// Session lifecycle state.
///
/// ```text
///   Idle ──start──▶ Subscribed ──first data──▶ Streaming ──stop/end──▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Subscribed,
    Streaming,
    Stopped,
}

// ─── Stream Client ──────────────────────────────────────────────────────────

/// Client state machine: gap detection, request drip, playout.
pub struct StreamClient {
    config: ClientConfig,
    state: ClientState,
    /// Next sequence number expected in order.
    expected: u32,
    /// Whether the first data packet has pinned `expected`.
    initialized: bool,
    requests: RequestQueue,
    playout: PlayoutBuffer,
    stats: ClientStats,
}

impl StreamClient {
    pub fn new(config: ClientConfig) -> Self {
        let playout = PlayoutBuffer::new(
            config.packets_per_frame,
            config.frame_rate,
            config.store_capacity,
        );
        StreamClient {
            config,
            state: ClientState::Idle,
            expected: 0,
            initialized: false,
            requests: RequestQueue::new(),
            playout,
            stats: ClientStats::default(),
        }
    }

    /// Begin the session: returns the Subscribe datagram for the runtime to
    /// send. The runtime then arms the playout tick after `initial_delay`.
    pub fn start(&mut self) -> Bytes {
        self.state = ClientState::Subscribed;
        tracing::info!("subscribing to stream");
        Message::Subscribe.encode().freeze()
    }

    /// Process one received datagram. Malformed or wrong-direction input is
    /// dropped and counted — the gap machinery recovers the loss naturally.
    pub fn on_datagram(&mut self, raw: Bytes) {
        if self.state == ClientState::Stopped {
            return;
        }
        match Message::decode(raw) {
            Some(Message::Data { sequence, payload }) => self.on_data(sequence, payload.len()),
            Some(_) => {
                self.stats.invalid_dropped += 1;
                tracing::debug!("dropping wrong-direction datagram");
            }
            None => {
                self.stats.invalid_dropped += 1;
                tracing::debug!("dropping malformed datagram");
            }
        }
    }

    fn on_data(&mut self, sequence: u32, payload_len: usize) {
        if self.state == ClientState::Subscribed {
            self.state = ClientState::Streaming;
            tracing::info!(sequence, "first data packet, streaming");
        }
        self.stats.packets_received += 1;
        self.stats.bytes_received += payload_len as u64;

        if !self.initialized {
            // Pin the sequence space to wherever the stream currently is, so
            // a client joining mid-stream doesn't request everything since
            // sequence zero.
            self.initialized = true;
            self.expected = sequence.saturating_add(1);
            let first_frame = (sequence / self.config.packets_per_frame) as u64;
            self.playout.align(first_frame);
            self.playout
                .on_packet_arrival(sequence, payload_len as u64, true);
            return;
        }

        if sequence == self.expected {
            self.expected = self.expected.saturating_add(1);
            self.playout
                .on_packet_arrival(sequence, payload_len as u64, true);
        } else if sequence > self.expected {
            // One or more predecessors are missing; the arriving packet
            // itself is fine.
            let missing = sequence - self.expected;
            self.stats.gaps_detected += 1;
            self.stats.sequences_requested += missing as u64;
            self.requests.enqueue_range(self.expected, sequence);
            tracing::debug!(
                from = self.expected,
                to = sequence,
                missing,
                "sequence gap, queueing retransmission requests"
            );
            self.expected = sequence.saturating_add(1);
            self.playout
                .on_packet_arrival(sequence, payload_len as u64, true);
        } else {
            // Late or retransmitted arrival filling an earlier gap.
            self.playout
                .on_packet_arrival(sequence, payload_len as u64, false);
        }
    }

    /// Whether the request drip should be (re-)armed.
    pub fn has_pending_requests(&self) -> bool {
        self.state != ClientState::Stopped && !self.requests.is_empty()
    }

    /// One drip tick: dequeue the oldest missing sequence and build its
    /// request datagram. `None` once the queue is drained (or after stop) —
    /// the runtime stops rescheduling the drip.
    pub fn poll_retransmit(&mut self) -> Option<Bytes> {
        if self.state == ClientState::Stopped {
            return None;
        }
        let sequence = self.requests.dequeue()?;
        self.stats.requests_sent += 1;
        tracing::debug!(sequence, "requesting retransmission");
        let mut buf = Message::RetransmitRequest { sequence }.encode();
        if buf.len() < self.config.request_pad {
            buf.resize(self.config.request_pad, 0);
        }
        Some(buf.freeze())
    }

    /// One playout period elapsed. On [`Consumption::Final`] the session is
    /// over and the runtime must not re-arm the tick.
    pub fn on_playout_tick(&mut self) -> Consumption {
        let result = self.playout.tick();
        match result {
            Consumption::Drained { played, buffered } => {
                tracing::info!(played, buffered, "playout tick");
            }
            Consumption::Final { .. } => {
                self.state = ClientState::Stopped;
            }
            Consumption::Underrun { .. } => {}
        }
        result
    }

    /// Mark the stream ended: the next underrun tick drains the tail.
    pub fn finish(&mut self) {
        self.playout.finish();
    }

    /// Tear down. The runtime cancels all timers it armed for this client.
    pub fn stop(&mut self) {
        self.state = ClientState::Stopped;
        tracing::info!("client stopped");
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Next sequence number expected in order.
    pub fn expected_sequence(&self) -> u32 {
        self.expected
    }

    /// Missing sequence numbers queued for request, oldest first.
    pub fn pending_requests(&self) -> impl Iterator<Item = u32> + '_ {
        self.requests.pending()
    }

    pub fn playout(&self) -> &PlayoutBuffer {
        &self.playout
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of all client counters, playout included.
    pub fn stats(&self) -> ClientStats {
        let mut stats = self.stats.clone();
        stats.frames_sealed = self.playout.frames_sealed();
        stats.frames_played = self.playout.frames_played();
        stats.playout_ticks = self.playout.ticks();
        stats.stalls = self.playout.stalls();
        stats.rebuffers = self.playout.rebuffers();
        stats.late_discarded = self.playout.late_discarded();
        stats.window_overflows = self.playout.window_overflows();
        stats
    }
}
