//! # Framecast Wire Format
//!
//! Every datagram opens with a 1-byte message kind, so intent is never
//! inferred from payload length.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Kind (8)     |          Sequence Number (32, big endian)     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     ...       |          Payload (Data only)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! ## Datagram shapes
//!
//! - **Subscribe** (client→server, first contact): kind byte zero-padded to a
//!   fixed 10-byte datagram. Carries no sequence header.
//! - **Data** (server→client): kind + sequence header + opaque frame payload.
//! - **RetransmitRequest** (client→server): kind + sequence header; senders
//!   pad the datagram out to their configured request size, and decoders
//!   ignore the padding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Fixed size of the Subscribe datagram.
pub const SUBSCRIBE_LEN: usize = 10;

/// Encoded size of the sequence header.
pub const SEQ_HEADER_LEN: usize = 4;

/// Kind byte plus sequence header — the prefix of every sequenced datagram.
pub const DATA_HEADER_LEN: usize = 1 + SEQ_HEADER_LEN;

// ─── Message Kind ────────────────────────────────────────────────────────────

/// Wire discriminator carried as the first byte of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Subscribe = 0x01,
    Data = 0x02,
    RetransmitRequest = 0x03,
}

impl MessageKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(MessageKind::Subscribe),
            0x02 => Some(MessageKind::Data),
            0x03 => Some(MessageKind::RetransmitRequest),
            _ => None,
        }
    }
}

// ─── Sequence Header ─────────────────────────────────────────────────────────

/// Fixed-width header carrying the 32-bit sequence number.
///
/// Sequence numbers are assigned by the server in a single global, strictly
/// increasing space; a resent packet reuses its original number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub sequence: u32,
}

impl SequenceHeader {
    /// Encode the header into a buffer.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sequence);
    }

    /// Decode a header from a buffer. Returns `None` if the buffer is short.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < SEQ_HEADER_LEN {
            return None;
        }
        Some(SequenceHeader {
            sequence: buf.get_u32(),
        })
    }
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// A decoded Framecast datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// First-contact datagram establishing a server-side session.
    Subscribe,
    /// One run of a frame's bytes, stamped with its wire sequence number.
    Data { sequence: u32, payload: Bytes },
    /// Request to resend the datagram carrying `sequence`.
    RetransmitRequest { sequence: u32 },
}

impl Message {
    /// Serialize into a fresh buffer.
    ///
    /// `RetransmitRequest` callers pad the result to their configured request
    /// datagram size; the padding carries no meaning.
    pub fn encode(&self) -> BytesMut {
        match self {
            Message::Subscribe => {
                let mut buf = BytesMut::with_capacity(SUBSCRIBE_LEN);
                buf.put_u8(MessageKind::Subscribe as u8);
                buf.resize(SUBSCRIBE_LEN, 0);
                buf
            }
            Message::Data { sequence, payload } => {
                let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + payload.len());
                buf.put_u8(MessageKind::Data as u8);
                SequenceHeader {
                    sequence: *sequence,
                }
                .encode(&mut buf);
                buf.extend_from_slice(payload);
                buf
            }
            Message::RetransmitRequest { sequence } => {
                let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN);
                buf.put_u8(MessageKind::RetransmitRequest as u8);
                SequenceHeader {
                    sequence: *sequence,
                }
                .encode(&mut buf);
                buf
            }
        }
    }

    /// Decode a datagram. Returns `None` on unknown kind or short input —
    /// the caller treats both as a lost packet.
    pub fn decode(mut buf: impl Buf) -> Option<Self> {
        if !buf.has_remaining() {
            return None;
        }
        match MessageKind::from_byte(buf.get_u8())? {
            MessageKind::Subscribe => Some(Message::Subscribe),
            MessageKind::Data => {
                let header = SequenceHeader::decode(&mut buf)?;
                let payload = buf.copy_to_bytes(buf.remaining());
                Some(Message::Data {
                    sequence: header.sequence,
                    payload,
                })
            }
            MessageKind::RetransmitRequest => {
                let header = SequenceHeader::decode(&mut buf)?;
                // Trailing bytes are request padding — ignored.
                Some(Message::RetransmitRequest {
                    sequence: header.sequence,
                })
            }
        }
    }
}
