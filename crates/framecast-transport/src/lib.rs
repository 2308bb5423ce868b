//! # framecast-transport
//!
//! Framecast semi-reliable video transport protocol.
//!
//! A server paces fixed-size video frames to subscribed clients as runs of
//! sequence-numbered datagrams; clients detect sequence gaps, drip-feed
//! retransmission requests back, and reassemble frames into a playout buffer
//! drained at a fixed frame rate.
//!
//! Everything in this crate is pure logic — no sockets, no timers. State
//! machines consume decoded datagrams and tick callbacks and produce outbound
//! datagrams plus pacing outcomes; the embedding runtime (simulation scheduler
//! or async executor) owns I/O, timer arming, and cancellation.
//!
//! ## Crate structure
//!
//! - [`wire`] — Tagged message kinds, sequence header serialization
//! - [`arq`] — Client request FIFO and bounded server resend backlog
//! - [`playout`] — Per-frame byte accumulation and fixed-rate consumption
//! - [`client`] — Client state machine: gap detection, request drip, playout
//! - [`server`] — Server state machine: sessions, pacing, ack watermark
//! - [`stats`] — Per-endpoint statistics

pub mod arq;
pub mod client;
pub mod playout;
pub mod server;
pub mod stats;
pub mod wire;
