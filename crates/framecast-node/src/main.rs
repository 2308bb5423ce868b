//! Framecast node daemon
//!
//! One binary, two roles:
//!
//! - `serve` — bind a UDP port and pace video frames to subscribed clients
//! - `watch` — subscribe to a server, recover loss, play the stream out
//!
//! Configuration layers, highest precedence first: CLI flags, then an
//! optional TOML file (`--config`), then built-in defaults. Logging is
//! controlled via `RUST_LOG`.

mod client;
mod config;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Framecast video transport node.
#[derive(Parser, Debug)]
#[command(name = "framecast-node", about = "Framecast video transport node")]
struct Cli {
    /// Optional TOML configuration file; CLI flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Pace video frames to subscribed clients.
    Serve {
        /// UDP port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Pacing interval between frames, in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Frames to stream per session.
        #[arg(long)]
        total_frames: Option<u32>,
    },
    /// Subscribe to a server and play the stream out.
    Watch {
        /// Server address, e.g. 192.0.2.1:5000.
        #[arg(long)]
        server: SocketAddr,

        /// Frames consumed per playout tick.
        #[arg(long)]
        frame_rate: Option<u32>,

        /// Buffering delay before playout starts, in milliseconds.
        #[arg(long)]
        initial_delay_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = config::load(cli.config.as_deref())?;

    match cli.role {
        Role::Serve {
            port,
            interval_ms,
            total_frames,
        } => {
            let server_config = file.server.resolve(port, interval_ms, total_frames);
            server::run(server_config).await
        }
        Role::Watch {
            server,
            frame_rate,
            initial_delay_ms,
        } => {
            let client_config = file.client.resolve(frame_rate, initial_delay_ms);
            client::run(server, client_config).await
        }
    }
}
