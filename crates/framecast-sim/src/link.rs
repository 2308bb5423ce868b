//! # Lossy Link Model
//!
//! Seeded Bernoulli loss with a fixed one-way latency. Data and request
//! traffic have independent loss rates so scenarios can stress either
//! recovery path; the subscribe handshake always gets through (a session
//! that never opens is not an interesting simulation).

use std::time::Duration;

use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;

/// Link impairment parameters.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// One-way delivery latency.
    pub latency: Duration,
    /// Loss probability for server→client data packets.
    pub data_loss: f64,
    /// Loss probability for client→server retransmission requests.
    pub request_loss: f64,
    /// RNG seed — same seed, same drop pattern.
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            latency: Duration::from_millis(2),
            data_loss: 0.0,
            request_loss: 0.0,
            seed: 7,
        }
    }
}

/// A point-to-point link with independent seeded loss per direction.
pub struct LossyLink {
    config: LinkConfig,
    rng: StdRng,
    dropped_data: u64,
    dropped_requests: u64,
}

impl LossyLink {
    pub fn new(config: LinkConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        LossyLink {
            config,
            rng,
            dropped_data: 0,
            dropped_requests: 0,
        }
    }

    /// Roll for a data packet. `false` means the packet is lost.
    pub fn deliver_data(&mut self) -> bool {
        if self.rng.random::<f64>() < self.config.data_loss {
            self.dropped_data += 1;
            false
        } else {
            true
        }
    }

    /// Roll for a retransmission request.
    pub fn deliver_request(&mut self) -> bool {
        if self.rng.random::<f64>() < self.config.request_loss {
            self.dropped_requests += 1;
            false
        } else {
            true
        }
    }

    pub fn latency(&self) -> Duration {
        self.config.latency
    }

    pub fn dropped_data(&self) -> u64 {
        self.dropped_data
    }

    pub fn dropped_requests(&self) -> u64 {
        self.dropped_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_loss_always_delivers() {
        let mut link = LossyLink::new(LinkConfig::default());
        for _ in 0..1000 {
            assert!(link.deliver_data());
            assert!(link.deliver_request());
        }
        assert_eq!(link.dropped_data(), 0);
    }

    #[test]
    fn total_loss_always_drops() {
        let mut link = LossyLink::new(LinkConfig {
            data_loss: 1.0,
            ..Default::default()
        });
        for _ in 0..100 {
            assert!(!link.deliver_data());
        }
        assert_eq!(link.dropped_data(), 100);
    }

    #[test]
    fn same_seed_same_drop_pattern() {
        let config = LinkConfig {
            data_loss: 0.5,
            seed: 99,
            ..Default::default()
        };
        let mut a = LossyLink::new(config.clone());
        let mut b = LossyLink::new(config);

        let pattern_a: Vec<bool> = (0..200).map(|_| a.deliver_data()).collect();
        let pattern_b: Vec<bool> = (0..200).map(|_| b.deliver_data()).collect();
        assert_eq!(pattern_a, pattern_b);
    }

    #[test]
    fn directions_are_counted_separately() {
        let mut link = LossyLink::new(LinkConfig {
            data_loss: 1.0,
            request_loss: 0.0,
            ..Default::default()
        });
        link.deliver_data();
        link.deliver_request();
        assert_eq!(link.dropped_data(), 1);
        assert_eq!(link.dropped_requests(), 0);
    }
}
