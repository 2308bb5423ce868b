//! TOML configuration file support.
//!
//! The file mirrors the transport config structs with every field optional;
//! CLI flags take precedence over the file, the file over built-in defaults.
//!
//! ```toml
//! [server]
//! port = 5000
//! interval_ms = 10
//! total_frames = 1500
//!
//! [client]
//! frame_rate = 20
//! initial_delay_ms = 3000
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use framecast_transport::client::ClientConfig;
use framecast_transport::server::ServerConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub interval_ms: Option<u64>,
    pub max_packet_size: Option<usize>,
    pub packets_per_frame: Option<u32>,
    pub tail_packet_size: Option<usize>,
    pub total_frames: Option<u32>,
    pub backlog_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub packets_per_frame: Option<u32>,
    pub frame_rate: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub playout_interval_ms: Option<u64>,
    pub request_interval_ms: Option<u64>,
    pub request_pad: Option<usize>,
    pub store_capacity: Option<u64>,
}

/// Read and parse the config file, or fall back to an empty overlay.
pub fn load(path: Option<&Path>) -> anyhow::Result<FileConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(FileConfig::default()),
    }
}

impl ServerSection {
    /// Merge CLI overrides, file values, and defaults into a [`ServerConfig`].
    pub fn resolve(
        &self,
        port: Option<u16>,
        interval_ms: Option<u64>,
        total_frames: Option<u32>,
    ) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            port: port.or(self.port).unwrap_or(defaults.port),
            interval: interval_ms
                .or(self.interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            max_packet_size: self.max_packet_size.unwrap_or(defaults.max_packet_size),
            packets_per_frame: self
                .packets_per_frame
                .unwrap_or(defaults.packets_per_frame),
            tail_packet_size: self.tail_packet_size.unwrap_or(defaults.tail_packet_size),
            total_frames: total_frames
                .or(self.total_frames)
                .unwrap_or(defaults.total_frames),
            backlog_capacity: self.backlog_capacity.unwrap_or(defaults.backlog_capacity),
        }
    }
}

impl ClientSection {
    /// Merge CLI overrides, file values, and defaults into a [`ClientConfig`].
    pub fn resolve(&self, frame_rate: Option<u32>, initial_delay_ms: Option<u64>) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            packets_per_frame: self
                .packets_per_frame
                .unwrap_or(defaults.packets_per_frame),
            frame_rate: frame_rate.or(self.frame_rate).unwrap_or(defaults.frame_rate),
            initial_delay: initial_delay_ms
                .or(self.initial_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            playout_interval: self
                .playout_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.playout_interval),
            request_interval: self
                .request_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_interval),
            request_pad: self.request_pad.unwrap_or(defaults.request_pad),
            store_capacity: self.store_capacity.unwrap_or(defaults.store_capacity),
        }
    }
}
