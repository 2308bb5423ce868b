//! # Simulation Harness
//!
//! Wires one `StreamServer` and one `StreamClient` across a [`LossyLink`] on
//! the discrete-event [`Scheduler`] — the whole stream runs in memory on a
//! simulated clock, so scenarios with seconds of buffering finish in
//! microseconds and are bit-for-bit reproducible from a seed.
//!
//! The harness plays the role the transport crate assigns to "the runtime":
//! it sends drained output, arms the pacing timer on `SessionOpened`, re-arms
//! it on `PaceOutcome::Continue`, drives the playout tick and the request
//! drip, and signals end-of-stream once the server side is done and the link
//! has drained.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use framecast_transport::client::{ClientConfig, StreamClient};
use framecast_transport::playout::Consumption;
use framecast_transport::server::{PaceOutcome, ServerConfig, ServerEvent, StreamServer};
use framecast_transport::stats::{ClientStats, ServerStats};

use crate::link::{LinkConfig, LossyLink};
use crate::scheduler::Scheduler;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Full scenario configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub link: LinkConfig,
    /// Hard stop for the simulated clock.
    pub max_time: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            link: LinkConfig::default(),
            max_time: Duration::from_secs(300),
        }
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

/// Everything a scenario assertion needs, serializable for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    /// Simulated time when the run ended.
    pub elapsed: Duration,
    pub client: ClientStats,
    pub server: ServerStats,
    pub data_dropped: u64,
    pub requests_dropped: u64,
}

// ─── Events ─────────────────────────────────────────────────────────────────

enum Event {
    ClientStart,
    DeliverToServer(Bytes),
    DeliverToClient(Bytes),
    Pace(SocketAddr),
    PlayoutTick,
    RequestDrip,
}

// ─── Simulation ─────────────────────────────────────────────────────────────

/// One server, one client, one lossy link.
pub struct Simulation {
    config: SimConfig,
    server: StreamServer,
    client: StreamClient,
    link: LossyLink,
    sched: Scheduler<Event>,
    client_addr: SocketAddr,
    drip_armed: bool,
    in_flight_to_client: usize,
    server_done: bool,
    stream_finished: bool,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let server = StreamServer::new(config.server.clone());
        let client = StreamClient::new(config.client.clone());
        let link = LossyLink::new(config.link.clone());
        Simulation {
            config,
            server,
            client,
            link,
            sched: Scheduler::new(),
            client_addr: "10.0.0.2:40000".parse().expect("static addr"),
            drip_armed: false,
            in_flight_to_client: 0,
            server_done: false,
            stream_finished: false,
        }
    }

    /// Run the scenario to completion (or to `max_time`).
    pub fn run(mut self) -> SimReport {
        self.sched.schedule(Duration::ZERO, Event::ClientStart);

        while let Some((_, event)) = self.sched.pop() {
            if self.sched.now() > self.config.max_time {
                tracing::warn!(elapsed = ?self.sched.now(), "simulation hit max_time");
                break;
            }
            self.dispatch(event);
        }

        tracing::info!(
            elapsed = ?self.sched.now(),
            frames_played = self.client.stats().frames_played,
            data_dropped = self.link.dropped_data(),
            "simulation complete"
        );

        SimReport {
            elapsed: self.sched.now(),
            client: self.client.stats(),
            server: self.server.stats().clone(),
            data_dropped: self.link.dropped_data(),
            requests_dropped: self.link.dropped_requests(),
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::ClientStart => {
                let subscribe = self.client.start();
                // The handshake rides the reliable control path.
                let latency = self.link.latency();
                self.sched
                    .schedule(latency, Event::DeliverToServer(subscribe));
                self.sched
                    .schedule(self.config.client.initial_delay, Event::PlayoutTick);
            }
            Event::DeliverToServer(raw) => {
                self.server.on_datagram(raw, self.client_addr);
                self.pump_server();
            }
            Event::Pace(peer) => {
                if self.server.pace(peer) == PaceOutcome::Continue {
                    self.sched
                        .schedule(self.config.server.interval, Event::Pace(peer));
                }
                self.pump_server();
            }
            Event::DeliverToClient(raw) => {
                self.in_flight_to_client -= 1;
                self.client.on_datagram(raw);
                if !self.drip_armed && self.client.has_pending_requests() {
                    self.drip_armed = true;
                    self.sched
                        .schedule(self.config.client.request_interval, Event::RequestDrip);
                }
                self.maybe_finish_stream();
            }
            Event::RequestDrip => match self.client.poll_retransmit() {
                Some(request) => {
                    if self.link.deliver_request() {
                        let latency = self.link.latency();
                        self.sched.schedule(latency, Event::DeliverToServer(request));
                    }
                    self.sched
                        .schedule(self.config.client.request_interval, Event::RequestDrip);
                }
                None => {
                    self.drip_armed = false;
                }
            },
            Event::PlayoutTick => {
                if !matches!(self.client.on_playout_tick(), Consumption::Final { .. }) {
                    self.sched
                        .schedule(self.config.client.playout_interval, Event::PlayoutTick);
                }
            }
        }
    }

    /// Forward server events and output onto the timeline.
    fn pump_server(&mut self) {
        let events: Vec<ServerEvent> = self.server.drain_events().collect();
        for event in events {
            match event {
                ServerEvent::SessionOpened { peer } => {
                    // First frame goes out at time zero.
                    self.sched.schedule(Duration::ZERO, Event::Pace(peer));
                }
                ServerEvent::SessionFinished { .. } => {
                    self.server_done = true;
                }
            }
        }

        let latency = self.link.latency();
        let out: Vec<(SocketAddr, Bytes)> = self.server.drain_output().collect();
        for (_, raw) in out {
            if self.link.deliver_data() {
                self.in_flight_to_client += 1;
                self.sched.schedule(latency, Event::DeliverToClient(raw));
            }
        }
        self.maybe_finish_stream();
    }

    /// Once the server retired the session and the link drained, no more
    /// data can arrive — tell the client so the playout tail drains. Pending
    /// requests are moot at this point: nothing paces the backlog anymore.
    fn maybe_finish_stream(&mut self) {
        if self.stream_finished || !self.server_done || self.in_flight_to_client > 0 {
            return;
        }
        self.stream_finished = true;
        self.client.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten small frames over a clean link.
    fn small_config() -> SimConfig {
        SimConfig {
            server: ServerConfig {
                packets_per_frame: 10,
                max_packet_size: 100,
                tail_packet_size: 50,
                total_frames: 10,
                interval: Duration::from_millis(10),
                ..Default::default()
            },
            client: ClientConfig {
                packets_per_frame: 10,
                frame_rate: 5,
                initial_delay: Duration::from_secs(1),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn clean_run_terminates_with_all_frames() {
        let report = Simulation::new(small_config()).run();
        assert_eq!(report.client.frames_sealed, 10);
        assert_eq!(report.client.frames_played, 10);
        assert_eq!(report.data_dropped, 0);
        assert_eq!(report.server.sessions_retired, 1);
        assert!(report.elapsed < Duration::from_secs(10));
    }

    #[test]
    fn total_loss_still_terminates() {
        let mut config = small_config();
        config.link.data_loss = 1.0;
        let report = Simulation::new(config).run();
        assert_eq!(report.client.packets_received, 0);
        assert_eq!(report.client.frames_played, 0);
        assert_eq!(report.data_dropped, report.server.packets_sent);
    }
}
