//! UDP server endpoint: drives a `StreamServer` over a real socket.
//!
//! Single task, no locking — the transport core assumes one cooperative
//! timeline, so the receive path and every session's pacing timer are
//! multiplexed through one `select!` loop. Pacing deadlines live in a
//! min-heap; a deadline for a session that has since finished simply pops,
//! paces into `UnknownPeer`, and is not re-armed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use framecast_transport::server::{PaceOutcome, ServerConfig, ServerEvent, StreamServer};

/// Park the pacing arm this long when no session is active.
const IDLE_PARK: Duration = Duration::from_secs(3600);

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let socket = UdpSocket::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding UDP port {}", config.port))?;
    tracing::info!(
        port = config.port,
        frame_size = config.frame_size(),
        total_frames = config.total_frames,
        "server listening"
    );

    let mut server = StreamServer::new(config.clone());
    let mut pacing: BinaryHeap<Reverse<(Instant, SocketAddr)>> = BinaryHeap::new();
    let mut buf = vec![0u8; 65536];

    loop {
        let pace_at = match pacing.peek() {
            Some(Reverse((at, _))) => *at,
            None => Instant::now() + IDLE_PARK,
        };

        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = received.context("udp receive")?;
                server.on_datagram(Bytes::copy_from_slice(&buf[..len]), peer);
            }
            _ = tokio::time::sleep_until(pace_at) => {
                if let Some(Reverse((_, peer))) = pacing.pop() {
                    if server.pace(peer) == PaceOutcome::Continue {
                        pacing.push(Reverse((Instant::now() + config.interval, peer)));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal");
                break;
            }
        }

        let events: Vec<ServerEvent> = server.drain_events().collect();
        for event in events {
            if let ServerEvent::SessionOpened { peer } = event {
                // First frame at time zero.
                pacing.push(Reverse((Instant::now(), peer)));
            }
        }

        let out: Vec<(SocketAddr, Bytes)> = server.drain_output().collect();
        for (peer, datagram) in out {
            if let Err(err) = socket.send_to(&datagram, peer).await {
                tracing::warn!(%err, %peer, "send failed");
            }
        }
    }

    server.stop();
    println!("{}", serde_json::to_string_pretty(server.stats())?);
    Ok(())
}
