//! Wire protocol
//!
//! Binary frames with a fixed 16-byte big-endian header, shared by the TCP and
//! WebSocket transports.

mod frame;
mod opcodes;

pub use frame::{Frame, FrameCodec, FrameError, DEFAULT_MAX_BODY, HEADER_LEN, PROTOCOL_VERSION};
pub use opcodes::{OpCode, MAX_BUSINESS_OP, MIN_BUSINESS_OP};
