//! # Server State Machine
//!
//! Pure logic — no I/O. Owns the session registry, the single global
//! sequence counter, the resend backlog, and the acknowledgement watermark.
//! The embedding runtime owns the socket and the per-session pacing timer:
//! it schedules the first [`StreamServer::pace`] at time zero when a session
//! opens, re-arms it after `interval` while pacing returns
//! [`PaceOutcome::Continue`], and stops when the session finishes.
//!
//! ## Responsibilities
//!
//! 1. **Sessions**: one per distinct peer address, created on Subscribe,
//!    retired when the frame quota is reached
//! 2. **Sequence allocation**: [`StreamServer::pace`] stamps every datagram
//!    through the single allocator — backlog head first, fresh counter
//!    otherwise
//! 3. **Ack watermark**: gaps in acknowledgement traffic feed the resend
//!    backlog, so loss observed server-side is repaired pre-emptively

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::ensure;
use bytes::Bytes;

use crate::arq::ResendBacklog;
use crate::stats::ServerStats;
use crate::wire::Message;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Server configuration parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP port the runtime binds for this server.
    pub port: u16,
    /// Pacing interval between frames of one session.
    pub interval: Duration,
    /// Payload size of every data packet except a frame's last.
    pub max_packet_size: usize,
    /// Datagrams per frame; the sequence space advances this much per frame.
    pub packets_per_frame: u32,
    /// Payload size of a frame's final packet.
    pub tail_packet_size: usize,
    /// Frames to stream before a session finishes.
    pub total_frames: u32,
    /// Resend backlog ring capacity.
    pub backlog_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 5000,
            interval: Duration::from_millis(10),
            max_packet_size: 1400,
            packets_per_frame: 100,
            tail_packet_size: 1000,
            total_frames: 60 * 25,
            backlog_capacity: 32768,
        }
    }
}

impl ServerConfig {
    /// Check cross-field consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.packets_per_frame > 0, "packets_per_frame must be nonzero");
        ensure!(self.max_packet_size > 0, "max_packet_size must be nonzero");
        ensure!(
            self.tail_packet_size > 0 && self.tail_packet_size <= self.max_packet_size,
            "tail_packet_size must be in 1..=max_packet_size"
        );
        ensure!(self.total_frames > 0, "total_frames must be nonzero");
        Ok(())
    }

    /// Payload bytes per frame.
    pub fn frame_size(&self) -> u64 {
        (self.packets_per_frame as u64 - 1) * self.max_packet_size as u64
            + self.tail_packet_size as u64
    }
}

// ─── Client Session ─────────────────────────────────────────────────────────

/// Per-client pacing state, keyed by peer address in the registry.
#[derive(Debug, Clone)]
pub struct ClientSession {
    peer: SocketAddr,
    frames_sent: u32,
}

impl ClientSession {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }
}

// ─── Events & Outcomes ──────────────────────────────────────────────────────

/// Events the server generates for the embedding runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// A session was created; schedule its first pace at time zero.
    SessionOpened { peer: SocketAddr },
    /// A session was retired; cancel its pacing timer.
    SessionFinished { peer: SocketAddr },
}

/// Outcome of one pacing tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    /// Frame emitted; re-arm the pacing timer after `interval`.
    Continue,
    /// Frame quota reached; the session was retired. Do not re-arm.
    Finished,
    /// No session for this peer (already retired or never subscribed).
    UnknownPeer,
}

// ─── Stream Server ──────────────────────────────────────────────────────────

/// Server state machine: session registry, pacing, ack watermark.
pub struct StreamServer {
    config: ServerConfig,
    sessions: HashMap<SocketAddr, ClientSession>,
    /// Next fresh sequence number. Only [`Self::next_sequence_number`]
    /// advances this.
    next_sequence: u32,
    backlog: ResendBacklog,
    /// Next sequence number expected in acknowledgement traffic.
    ack_watermark: u32,
    output: VecDeque<(SocketAddr, Bytes)>,
    events: Vec<ServerEvent>,
    stats: ServerStats,
}

impl StreamServer {
    pub fn new(config: ServerConfig) -> Self {
        let backlog = ResendBacklog::new(config.backlog_capacity);
        StreamServer {
            config,
            sessions: HashMap::new(),
            next_sequence: 0,
            backlog,
            ack_watermark: 0,
            output: VecDeque::new(),
            events: Vec::new(),
            stats: ServerStats::default(),
        }
    }

    /// Process one received datagram from `peer`.
    pub fn on_datagram(&mut self, raw: Bytes, peer: SocketAddr) {
        match Message::decode(raw) {
            Some(Message::Subscribe) => {
                if self.sessions.contains_key(&peer) {
                    tracing::debug!(%peer, "duplicate subscribe ignored");
                    return;
                }
                self.sessions.insert(
                    peer,
                    ClientSession {
                        peer,
                        frames_sent: 0,
                    },
                );
                self.stats.sessions_opened += 1;
                self.events.push(ServerEvent::SessionOpened { peer });
                tracing::info!(%peer, "client subscribed, session opened");
            }
            Some(Message::RetransmitRequest { sequence }) => {
                self.stats.acks_received += 1;
                let late = sequence < self.ack_watermark;
                self.record_acknowledgement(sequence);
                // The explicitly requested sequence rides the backlog too —
                // the watermark machinery only covers the range below it.
                if !late {
                    self.backlog
                        .enqueue_range(sequence, sequence.saturating_add(1));
                    self.stats.backlog_dropped = self.backlog.dropped();
                }
            }
            Some(Message::Data { .. }) | None => {
                self.stats.invalid_dropped += 1;
                tracing::debug!(%peer, "dropping malformed or wrong-direction datagram");
            }
        }
    }

    /// Compare an acknowledged/requested sequence against the watermark.
    ///
    /// A sequence above the watermark means the intermediate request traffic
    /// was lost; the skipped range is queued for resend and the watermark
    /// jumps past the whole gap — even when the backlog drops part of it.
    pub fn record_acknowledgement(&mut self, sequence: u32) {
        if sequence < self.ack_watermark {
            self.stats.late_acks += 1;
            tracing::debug!(sequence, "late acknowledgement for retransmitted packet");
        } else if sequence == self.ack_watermark {
            self.ack_watermark = self.ack_watermark.saturating_add(1);
        } else {
            self.stats.gaps_observed += 1;
            tracing::debug!(
                from = self.ack_watermark,
                to = sequence,
                "acknowledgement gap, scheduling resends"
            );
            self.backlog.enqueue_range(self.ack_watermark, sequence);
            self.stats.backlog_dropped = self.backlog.dropped();
            self.ack_watermark = sequence.saturating_add(1);
        }
    }

    /// One pacing tick for `peer`: emit datagrams until the fresh sequence
    /// counter reaches the end of the session's next frame. Backlog entries
    /// drained along the way ride in the same tick without advancing the
    /// fresh counter.
    pub fn pace(&mut self, peer: SocketAddr) -> PaceOutcome {
        let frames_sent = match self.sessions.get(&peer) {
            Some(session) => session.frames_sent,
            None => {
                tracing::warn!(%peer, "pace for unknown session");
                return PaceOutcome::UnknownPeer;
            }
        };

        // One frame's worth of fresh sequence numbers. The fresh counter is
        // global, so the quota is relative to wherever it stands, not to
        // this session's frame count.
        let frame_end = self.next_sequence as u64 + self.config.packets_per_frame as u64;
        while (self.next_sequence as u64) < frame_end {
            let (sequence, is_retransmit) = self.next_sequence_number();
            self.emit_data(peer, sequence, is_retransmit);
        }

        let now_sent = frames_sent + 1;
        if let Some(session) = self.sessions.get_mut(&peer) {
            session.frames_sent = now_sent;
        }
        self.stats.frames_sent += 1;
        tracing::debug!(
            %peer,
            frame = frames_sent,
            bytes = self.config.frame_size(),
            "sent frame"
        );

        if now_sent >= self.config.total_frames {
            self.remove_session(peer);
            PaceOutcome::Finished
        } else {
            PaceOutcome::Continue
        }
    }

    /// Retire a session explicitly. Returns whether it existed. The runtime
    /// cancels the session's pacing timer on the `SessionFinished` event.
    pub fn remove_session(&mut self, peer: SocketAddr) -> bool {
        if self.sessions.remove(&peer).is_none() {
            return false;
        }
        self.stats.sessions_retired += 1;
        self.events.push(ServerEvent::SessionFinished { peer });
        tracing::info!(%peer, "session finished");
        true
    }

    /// Tear down: retire every session.
    pub fn stop(&mut self) {
        let peers: Vec<SocketAddr> = self.sessions.keys().copied().collect();
        for peer in peers {
            self.remove_session(peer);
        }
        tracing::info!("server stopped");
    }

    /// Drain outbound datagrams for the runtime to send.
    pub fn drain_output(&mut self) -> impl Iterator<Item = (SocketAddr, Bytes)> + '_ {
        self.output.drain(..)
    }

    /// Drain runtime events (session opened/finished).
    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.events.drain(..)
    }

    // ─── Internal ───────────────────────────────────────────────────────

    /// The sole allocator of wire sequence numbers: backlog head first
    /// (retransmission has priority over fresh data), otherwise the global
    /// monotonic counter. Called exactly once per emitted data packet.
    fn next_sequence_number(&mut self) -> (u32, bool) {
        match self.backlog.dequeue() {
            Some(sequence) => (sequence, true),
            None => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                (sequence, false)
            }
        }
    }

    fn emit_data(&mut self, peer: SocketAddr, sequence: u32, is_retransmit: bool) {
        let len = self.payload_len(sequence);
        let payload = Bytes::from(vec![(sequence & 0xFF) as u8; len]);
        let datagram = Message::Data { sequence, payload }.encode().freeze();
        self.output.push_back((peer, datagram));
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += len as u64;
        if is_retransmit {
            self.stats.retransmissions += 1;
            tracing::debug!(sequence, "retransmitting");
        }
    }

    /// Payload size for a sequence number — a frame's last slot carries the
    /// short tail, so resends keep the original packet's size.
    fn payload_len(&self, sequence: u32) -> usize {
        if sequence % self.config.packets_per_frame == self.config.packets_per_frame - 1 {
            self.config.tail_packet_size
        } else {
            self.config.max_packet_size
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn session(&self, peer: &SocketAddr) -> Option<&ClientSession> {
        self.sessions.get(peer)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Next fresh sequence number that will be allocated.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn ack_watermark(&self) -> u32 {
        self.ack_watermark
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        format!("10.0.0.1:{port}").parse().unwrap()
    }

    fn test_server() -> StreamServer {
        StreamServer::new(ServerConfig::default())
    }

    fn subscribe(server: &mut StreamServer, peer: SocketAddr) {
        server.on_datagram(Message::Subscribe.encode().freeze(), peer);
    }

    /// Decode the sequence numbers of all drained output datagrams.
    fn drained_sequences(server: &mut StreamServer) -> Vec<u32> {
        server
            .drain_output()
            .map(|(_, raw)| match Message::decode(raw) {
                Some(Message::Data { sequence, .. }) => sequence,
                other => panic!("expected data packet, got {other:?}"),
            })
            .collect()
    }

    // ─── Config ─────────────────────────────────────────────────────────

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_oversized_tail() {
        let config = ServerConfig {
            tail_packet_size: 2000,
            max_packet_size: 1400,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn frame_size_accounts_for_tail() {
        let config = ServerConfig::default();
        assert_eq!(config.frame_size(), 99 * 1400 + 1000);
    }

    // ─── Sessions ───────────────────────────────────────────────────────

    #[test]
    fn subscribe_opens_session_and_emits_event() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));

        assert_eq!(server.session_count(), 1);
        assert_eq!(server.stats().sessions_opened, 1);
        let events: Vec<_> = server.drain_events().collect();
        assert_eq!(events, vec![ServerEvent::SessionOpened { peer: peer(1) }]);
    }

    #[test]
    fn duplicate_subscribe_ignored() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        server.drain_events().for_each(drop);

        subscribe(&mut server, peer(1));
        assert_eq!(server.session_count(), 1);
        assert_eq!(server.stats().sessions_opened, 1);
        assert_eq!(server.drain_events().count(), 0);
    }

    #[test]
    fn one_session_per_peer_address() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        subscribe(&mut server, peer(2));
        assert_eq!(server.session_count(), 2);
    }

    #[test]
    fn remove_session_is_explicit_and_idempotent() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        server.drain_events().for_each(drop);

        assert!(server.remove_session(peer(1)));
        assert!(!server.remove_session(peer(1)), "second removal is a no-op");
        assert_eq!(server.stats().sessions_retired, 1);
        let events: Vec<_> = server.drain_events().collect();
        assert_eq!(events, vec![ServerEvent::SessionFinished { peer: peer(1) }]);
    }

    #[test]
    fn stop_retires_all_sessions() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        subscribe(&mut server, peer(2));
        server.stop();
        assert_eq!(server.session_count(), 0);
        assert_eq!(server.stats().sessions_retired, 2);
    }

    // ─── Pacing ─────────────────────────────────────────────────────────

    #[test]
    fn pace_emits_one_frame_of_packets() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));

        assert_eq!(server.pace(peer(1)), PaceOutcome::Continue);
        let seqs = drained_sequences(&mut server);
        assert_eq!(seqs, (0..100).collect::<Vec<_>>());
        assert_eq!(server.next_sequence(), 100);
        assert_eq!(server.session(&peer(1)).unwrap().frames_sent(), 1);
    }

    #[test]
    fn frame_tail_packet_is_short() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        server.pace(peer(1));

        let lens: Vec<usize> = server
            .drain_output()
            .map(|(_, raw)| match Message::decode(raw) {
                Some(Message::Data { payload, .. }) => payload.len(),
                _ => unreachable!(),
            })
            .collect();
        assert!(lens[..99].iter().all(|&l| l == 1400));
        assert_eq!(lens[99], 1000, "frame's last packet carries the tail");
    }

    #[test]
    fn pace_for_unknown_peer() {
        let mut server = test_server();
        assert_eq!(server.pace(peer(9)), PaceOutcome::UnknownPeer);
        assert_eq!(server.pending_output(), 0);
    }

    #[test]
    fn session_retires_at_frame_quota() {
        let mut server = StreamServer::new(ServerConfig {
            total_frames: 3,
            ..Default::default()
        });
        subscribe(&mut server, peer(1));
        server.drain_events().for_each(drop);

        assert_eq!(server.pace(peer(1)), PaceOutcome::Continue);
        assert_eq!(server.pace(peer(1)), PaceOutcome::Continue);
        assert_eq!(server.pace(peer(1)), PaceOutcome::Finished);

        assert_eq!(server.session_count(), 0, "finished session is retired");
        let events: Vec<_> = server.drain_events().collect();
        assert_eq!(events, vec![ServerEvent::SessionFinished { peer: peer(1) }]);
        assert_eq!(server.pace(peer(1)), PaceOutcome::UnknownPeer);
    }

    // ─── Sequence Allocation ────────────────────────────────────────────

    #[test]
    fn backlog_has_priority_over_fresh_sequences() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        server.pace(peer(1));
        server.drain_output().for_each(drop);

        // An ack gap queues 0..3 for resend.
        server.record_acknowledgement(3);
        assert_eq!(server.backlog_len(), 3);

        let fresh_before = server.next_sequence();
        server.pace(peer(1));
        let seqs = drained_sequences(&mut server);

        // Resends ride first, then the frame's fresh run.
        assert_eq!(&seqs[..3], &[0, 1, 2]);
        assert_eq!(&seqs[3..], &(100..200).collect::<Vec<_>>()[..]);
        assert_eq!(server.backlog_len(), 0);
        assert_eq!(
            server.next_sequence(),
            fresh_before + 100,
            "resends must not advance the fresh counter"
        );
        assert_eq!(server.stats().retransmissions, 3);
    }

    #[test]
    fn retransmitted_tail_packet_keeps_its_size() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        server.pace(peer(1));
        server.drain_output().for_each(drop);

        // Request resend of sequence 99 — the frame 0 tail.
        server.record_acknowledgement(100);
        server.pace(peer(1));
        let tail = server
            .drain_output()
            .map(|(_, raw)| Message::decode(raw).unwrap())
            .find_map(|msg| match msg {
                Message::Data { sequence: 99, payload } => Some(payload.len()),
                _ => None,
            })
            .expect("sequence 99 resent");
        assert_eq!(tail, 1000);
    }

    // ─── Ack Watermark ──────────────────────────────────────────────────

    #[test]
    fn in_order_acks_advance_watermark() {
        let mut server = test_server();
        for seq in 0..5 {
            server.record_acknowledgement(seq);
        }
        assert_eq!(server.ack_watermark(), 5);
        assert_eq!(server.backlog_len(), 0);
    }

    #[test]
    fn late_ack_logged_only() {
        let mut server = test_server();
        server.record_acknowledgement(0);
        server.record_acknowledgement(0);
        assert_eq!(server.stats().late_acks, 1);
        assert_eq!(server.ack_watermark(), 1);
    }

    #[test]
    fn ack_gap_fills_backlog_and_jumps_watermark() {
        let mut server = test_server();
        server.record_acknowledgement(10);
        assert_eq!(server.ack_watermark(), 11);
        assert_eq!(server.backlog_len(), 10);
        assert_eq!(server.stats().gaps_observed, 1);
    }

    /// Scenario: backlog capacity 5, ack gap of 10.
    #[test]
    fn backlog_overflow_still_advances_watermark() {
        let mut server = StreamServer::new(ServerConfig {
            backlog_capacity: 5,
            ..Default::default()
        });
        server.record_acknowledgement(10);

        assert_eq!(server.backlog_len(), 5, "only 5 entries fit");
        assert_eq!(server.stats().backlog_dropped, 5);
        assert_eq!(
            server.ack_watermark(),
            11,
            "watermark advances past the full gap regardless"
        );
    }

    // ─── Input Handling ─────────────────────────────────────────────────

    #[test]
    fn request_datagram_feeds_watermark_and_backlog() {
        let mut server = test_server();
        let raw = Message::RetransmitRequest { sequence: 0 }.encode().freeze();
        server.on_datagram(raw, peer(1));
        assert_eq!(server.stats().acks_received, 1);
        assert_eq!(server.ack_watermark(), 1);
        assert_eq!(server.backlog_len(), 1, "requested sequence owes a resend");
    }

    #[test]
    fn late_request_is_log_only() {
        let mut server = test_server();
        for seq in 0..5 {
            let raw = Message::RetransmitRequest { sequence: seq }.encode().freeze();
            server.on_datagram(raw, peer(1));
        }
        let backlog_before = server.backlog_len();

        // A duplicate of an already-handled request must not resend again.
        let raw = Message::RetransmitRequest { sequence: 2 }.encode().freeze();
        server.on_datagram(raw, peer(1));
        assert_eq!(server.stats().late_acks, 1);
        assert_eq!(server.backlog_len(), backlog_before);
    }

    #[test]
    fn malformed_datagram_dropped() {
        let mut server = test_server();
        server.on_datagram(Bytes::from_static(&[0xEE]), peer(1));
        server.on_datagram(Bytes::new(), peer(1));
        assert_eq!(server.stats().invalid_dropped, 2);
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn wrong_direction_data_dropped() {
        let mut server = test_server();
        let raw = Message::Data {
            sequence: 1,
            payload: Bytes::from_static(b"x"),
        }
        .encode()
        .freeze();
        server.on_datagram(raw, peer(1));
        assert_eq!(server.stats().invalid_dropped, 1);
    }

    // ─── Stats ──────────────────────────────────────────────────────────

    #[test]
    fn pace_updates_byte_accounting() {
        let mut server = test_server();
        subscribe(&mut server, peer(1));
        server.pace(peer(1));

        let stats = server.stats();
        assert_eq!(stats.packets_sent, 100);
        assert_eq!(stats.bytes_sent, server.config().frame_size());
        assert_eq!(stats.frames_sent, 1);
    }
}
