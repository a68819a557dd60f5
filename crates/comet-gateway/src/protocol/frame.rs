//! Frame layout and codec
//!
//! ```text
//! 0        4      6      8        12       16
//! +--------+------+------+--------+--------+----------------+
//! |pack_len|hdr_ln| ver  |   op   |  seq   | body ...       |
//! +--------+------+------+--------+--------+----------------+
//! ```
//!
//! All header fields are big-endian. `pack_len` counts the header and body,
//! `hdr_ln` is always [`HEADER_LEN`].

use super::OpCode;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the fixed frame header
pub const HEADER_LEN: usize = 16;
/// Default maximum body size
pub const DEFAULT_MAX_BODY: usize = 4096;
/// Protocol version stamped on server-originated frames
pub const PROTOCOL_VERSION: u16 = 1;

const HEARTBEAT_BODY_LEN: usize = 4;

/// A single protocol frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub ver: u16,
    pub op: u32,
    pub seq: u32,
    pub body: Bytes,
}

impl Frame {
    /// Create a frame with the current protocol version
    pub fn new(op: impl Into<u32>, body: impl Into<Bytes>) -> Self {
        Self {
            ver: PROTOCOL_VERSION,
            op: op.into(),
            seq: 0,
            body: body.into(),
        }
    }

    /// Set the sequence number
    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    /// Rewrite this frame into a reply with an empty body, keeping `ver` and `seq`
    pub fn reply(&mut self, op: OpCode) {
        self.op = op.as_u32();
        self.body = Bytes::new();
    }

    /// Size of this frame on the wire
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }
}

/// Frame decoding errors, all fatal to the connection
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid pack length {0}")]
    PackLen(u32),

    #[error("invalid header length {0}")]
    HeaderLen(u16),

    #[error("body of {len} bytes exceeds limit of {max}")]
    BodyTooLarge { len: usize, max: usize },

    #[error("message holds {0} bytes past the frame")]
    TrailingBytes(usize),

    #[error("message truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
}

/// Encoder and decoder for [`Frame`]s
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_body: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY)
    }
}

impl FrameCodec {
    #[must_use]
    pub fn new(max_body: usize) -> Self {
        Self { max_body }
    }

    #[must_use]
    pub fn max_body(&self) -> usize {
        self.max_body
    }

    /// Decode one frame from the front of `src`
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. The header is
    /// validated as soon as it is available so an oversized frame is rejected
    /// before its body arrives.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let pack_len = header.get_u32();
        let header_len = header.get_u16();

        if header_len as usize != HEADER_LEN {
            return Err(FrameError::HeaderLen(header_len));
        }
        let pack = pack_len as usize;
        if pack < HEADER_LEN {
            return Err(FrameError::PackLen(pack_len));
        }
        let body_len = pack - HEADER_LEN;
        if body_len > self.max_body {
            return Err(FrameError::BodyTooLarge {
                len: body_len,
                max: self.max_body,
            });
        }

        if src.len() < pack {
            src.reserve(pack - src.len());
            return Ok(None);
        }

        let mut packet = src.split_to(pack);
        // skip pack_len and header_len
        packet.advance(6);
        let ver = packet.get_u16();
        let op = packet.get_u32();
        let seq = packet.get_u32();

        Ok(Some(Frame {
            ver,
            op,
            seq,
            body: packet.freeze(),
        }))
    }

    /// Decode a message that must hold exactly one frame (one WebSocket message)
    pub fn decode_message(&self, msg: &[u8]) -> Result<Frame, FrameError> {
        let mut buf = BytesMut::from(msg);
        match self.decode(&mut buf)? {
            Some(frame) if buf.is_empty() => Ok(frame),
            Some(_) => Err(FrameError::TrailingBytes(buf.len())),
            None => Err(FrameError::Truncated {
                need: Self::declared_len(msg).max(HEADER_LEN),
                have: msg.len(),
            }),
        }
    }

    /// Append `frame` to `dst`
    ///
    /// [`OpCode::Raw`] frames carry pre-encoded frames and are written verbatim.
    pub fn encode(&self, frame: &Frame, dst: &mut BytesMut) {
        if frame.op == OpCode::Raw.as_u32() {
            dst.extend_from_slice(&frame.body);
            return;
        }
        dst.reserve(frame.encoded_len());
        Self::put_header(dst, frame, frame.body.len());
        dst.extend_from_slice(&frame.body);
    }

    /// Append a heartbeat reply carrying the room occupant count
    pub fn encode_heartbeat_reply(&self, frame: &Frame, online: i32, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN + HEARTBEAT_BODY_LEN);
        Self::put_header(dst, frame, HEARTBEAT_BODY_LEN);
        dst.put_i32(online);
    }

    fn put_header(dst: &mut BytesMut, frame: &Frame, body_len: usize) {
        dst.put_u32((HEADER_LEN + body_len) as u32);
        dst.put_u16(HEADER_LEN as u16);
        dst.put_u16(frame.ver);
        dst.put_u32(frame.op);
        dst.put_u32(frame.seq);
    }

    /// Split a raw batch into the encoded frames it carries
    ///
    /// Only the declared pack lengths are used; the body limit applies to
    /// inbound frames, not to server pushes. A truncated or malformed tail is
    /// returned as one final chunk, as the TCP writer would send it.
    #[must_use]
    pub fn split_raw(batch: &Bytes) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        let mut rest = batch.clone();
        while !rest.is_empty() {
            let pack = Self::declared_len(&rest);
            if pack < HEADER_LEN || pack > rest.len() {
                chunks.push(rest);
                break;
            }
            chunks.push(rest.split_to(pack));
        }
        chunks
    }

    fn declared_len(msg: &[u8]) -> usize {
        if msg.len() < 4 {
            return 0;
        }
        (&msg[..4]).get_u32() as usize
    }
}
