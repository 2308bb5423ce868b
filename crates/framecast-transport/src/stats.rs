//! # Endpoint Statistics
//!
//! Per-endpoint counters for log lines and JSON export. Failures in this
//! protocol degrade quality instead of raising errors, so these counters are
//! the primary observability surface.

use serde::Serialize;

// ─── Server Stats ───────────────────────────────────────────────────────────

/// Aggregate server-side statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerStats {
    /// Data packets sent (fresh + retransmitted).
    pub packets_sent: u64,
    /// Payload bytes sent.
    pub bytes_sent: u64,
    /// Frames paced out across all sessions.
    pub frames_sent: u64,
    /// Packets sent from the resend backlog.
    pub retransmissions: u64,
    /// Retransmission requests (acknowledgement signals) received.
    pub acks_received: u64,
    /// Acknowledgements below the watermark (already retransmitted).
    pub late_acks: u64,
    /// Gaps observed in acknowledgement traffic.
    pub gaps_observed: u64,
    /// Backlog entries dropped to ring overflow.
    pub backlog_dropped: u64,
    /// Sessions created on first contact.
    pub sessions_opened: u64,
    /// Sessions retired at their frame quota (or on shutdown).
    pub sessions_retired: u64,
    /// Datagrams dropped as malformed or wrong-direction.
    pub invalid_dropped: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retransmission overhead ratio.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.packets_sent as f64
        }
    }
}

// ─── Client Stats ───────────────────────────────────────────────────────────

/// Aggregate client-side statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    /// Data packets received (including late retransmissions).
    pub packets_received: u64,
    /// Payload bytes received.
    pub bytes_received: u64,
    /// Datagrams dropped as malformed or wrong-direction.
    pub invalid_dropped: u64,
    /// Sequence gaps detected on the receive path.
    pub gaps_detected: u64,
    /// Missing sequence numbers queued for retransmission requests.
    pub sequences_requested: u64,
    /// Retransmission request datagrams actually sent.
    pub requests_sent: u64,
    /// Frames sealed into the playout buffer.
    pub frames_sealed: u64,
    /// Frames consumed with a nonzero byte total.
    pub frames_played: u64,
    /// Playout ticks elapsed.
    pub playout_ticks: u64,
    /// Ticks where the buffer level was stuck below the frame rate.
    pub stalls: u64,
    /// Ticks where the buffer was below the frame rate but still filling.
    pub rebuffers: u64,
    /// Late arrivals for frames already consumed.
    pub late_discarded: u64,
    /// Frames discarded because they fell outside the store window.
    pub window_overflows: u64,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated wire loss: missing sequences over everything observed.
    pub fn loss_rate(&self) -> f64 {
        let observed = self.packets_received + self.sequences_requested;
        if observed == 0 {
            0.0
        } else {
            self.sequences_requested as f64 / observed as f64
        }
    }

    /// Fraction of playout ticks spent stalled.
    pub fn stall_ratio(&self) -> f64 {
        if self.playout_ticks == 0 {
            0.0
        } else {
            self.stalls as f64 / self.playout_ticks as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_retransmit_ratio() {
        let mut stats = ServerStats::new();
        stats.packets_sent = 200;
        stats.retransmissions = 10;
        assert!((stats.retransmit_ratio() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn server_ratio_zero_div() {
        assert_eq!(ServerStats::new().retransmit_ratio(), 0.0);
    }

    #[test]
    fn client_loss_rate() {
        let mut stats = ClientStats::new();
        stats.packets_received = 90;
        stats.sequences_requested = 10;
        assert!((stats.loss_rate() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn client_stall_ratio() {
        let mut stats = ClientStats::new();
        stats.playout_ticks = 50;
        stats.stalls = 5;
        assert!((stats.stall_ratio() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn client_ratios_zero_div() {
        let stats = ClientStats::new();
        assert_eq!(stats.loss_rate(), 0.0);
        assert_eq!(stats.stall_ratio(), 0.0);
    }

    #[test]
    fn stats_serialize_to_json() {
        let mut stats = ServerStats::new();
        stats.frames_sent = 1500;
        stats.sessions_opened = 2;
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"frames_sent\":1500"));
        assert!(json.contains("\"sessions_opened\":2"));
    }
}
