//! UDP client endpoint: drives a `StreamClient` over a real socket.
//!
//! Mirrors the timer contract the transport core expects: a playout tick
//! armed after the initial buffering delay and repeating each interval, plus
//! a request drip armed whenever the client has pending retransmission
//! requests. The stream's end is inferred from receive silence — the server
//! simply stops sending once the frame quota is reached.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use framecast_transport::client::{ClientConfig, ClientState, StreamClient};
use framecast_transport::playout::Consumption;

/// Receive silence after which a streaming session is considered over.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Park the drip arm while no requests are pending.
const IDLE_PARK: Duration = Duration::from_secs(3600);

pub async fn run(remote: SocketAddr, config: ClientConfig) -> anyhow::Result<()> {
    config.validate()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await.context("binding local socket")?;
    socket
        .connect(remote)
        .await
        .with_context(|| format!("connecting to {remote}"))?;
    tracing::info!(%remote, frame_rate = config.frame_rate, "subscribing");

    let mut client = StreamClient::new(config.clone());
    let subscribe = client.start();
    socket.send(&subscribe).await.context("sending subscribe")?;

    let mut playout = tokio::time::interval_at(
        Instant::now() + config.initial_delay,
        config.playout_interval,
    );
    let mut drip_at: Option<Instant> = None;
    let mut last_data = Instant::now();
    let mut buf = vec![0u8; 65536];

    loop {
        let drip_deadline = drip_at.unwrap_or_else(|| Instant::now() + IDLE_PARK);

        tokio::select! {
            received = socket.recv(&mut buf) => {
                let len = received.context("udp receive")?;
                client.on_datagram(Bytes::copy_from_slice(&buf[..len]));
                last_data = Instant::now();
                if drip_at.is_none() && client.has_pending_requests() {
                    drip_at = Some(Instant::now() + config.request_interval);
                }
            }
            _ = playout.tick() => {
                if client.state() == ClientState::Streaming
                    && last_data.elapsed() > IDLE_TIMEOUT
                {
                    tracing::info!("receive silence, treating stream as ended");
                    client.finish();
                }
                if matches!(client.on_playout_tick(), Consumption::Final { .. }) {
                    break;
                }
            }
            _ = tokio::time::sleep_until(drip_deadline) => {
                match client.poll_retransmit() {
                    Some(request) => {
                        if let Err(err) = socket.send(&request).await {
                            tracing::warn!(%err, "request send failed");
                        }
                        drip_at = Some(Instant::now() + config.request_interval);
                    }
                    None => drip_at = None,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal");
                client.stop();
                break;
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&client.stats())?);
    Ok(())
}
