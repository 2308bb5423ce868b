//! Deterministic simulation toolkit for the Framecast transport.
//!
//! Provides the discrete-event scheduler the transport state machines expect
//! from their embedding runtime (timed callbacks with FIFO tie-break and
//! idempotent cancellation), a seeded lossy-link model, and a harness wiring
//! a server and client end-to-end entirely in memory.

pub mod harness;
pub mod link;
pub mod scheduler;
