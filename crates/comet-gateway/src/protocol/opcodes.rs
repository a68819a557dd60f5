//! Frame operation codes
//!
//! Reserved control ops occupy the low range; anything in
//! [`MIN_BUSINESS_OP`]..=[`MAX_BUSINESS_OP`] is application traffic that the
//! gateway forwards to the authority untouched.

/// Lowest op code forwarded to the authority as a business report
pub const MIN_BUSINESS_OP: u32 = 1000;
/// Highest op code forwarded to the authority as a business report
pub const MAX_BUSINESS_OP: u32 = 10_000;

/// Reserved operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpCode {
    Handshake = 0,
    HandshakeReply = 1,
    /// Client keepalive
    Heartbeat = 2,
    /// Keepalive answer, body carries the room occupant count
    HeartbeatReply = 3,
    SendMsg = 4,
    SendMsgReply = 5,
    DisconnectReply = 6,
    /// First frame of a session, body is the auth token
    Auth = 7,
    AuthReply = 8,
    /// Body is a run of already encoded frames, written verbatim
    Raw = 9,
    /// Body is the target room id
    ChangeRoom = 12,
    ChangeRoomReply = 13,
    /// Body is a comma-separated list of ops to watch
    Register = 14,
    RegisterReply = 15,
    /// Body is a comma-separated list of ops to stop watching
    Unregister = 16,
    UnregisterReply = 17,
}

impl OpCode {
    /// Create an `OpCode` from a raw wire value
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Handshake),
            1 => Some(Self::HandshakeReply),
            2 => Some(Self::Heartbeat),
            3 => Some(Self::HeartbeatReply),
            4 => Some(Self::SendMsg),
            5 => Some(Self::SendMsgReply),
            6 => Some(Self::DisconnectReply),
            7 => Some(Self::Auth),
            8 => Some(Self::AuthReply),
            9 => Some(Self::Raw),
            12 => Some(Self::ChangeRoom),
            13 => Some(Self::ChangeRoomReply),
            14 => Some(Self::Register),
            15 => Some(Self::RegisterReply),
            16 => Some(Self::Unregister),
            17 => Some(Self::UnregisterReply),
            _ => None,
        }
    }

    /// Get the raw wire value
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check whether a raw op falls in the business range
    #[must_use]
    pub const fn is_business(op: u32) -> bool {
        op >= MIN_BUSINESS_OP && op <= MAX_BUSINESS_OP
    }

    /// Get the name of this op code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Handshake => "Handshake",
            Self::HandshakeReply => "HandshakeReply",
            Self::Heartbeat => "Heartbeat",
            Self::HeartbeatReply => "HeartbeatReply",
            Self::SendMsg => "SendMsg",
            Self::SendMsgReply => "SendMsgReply",
            Self::DisconnectReply => "DisconnectReply",
            Self::Auth => "Auth",
            Self::AuthReply => "AuthReply",
            Self::Raw => "Raw",
            Self::ChangeRoom => "ChangeRoom",
            Self::ChangeRoomReply => "ChangeRoomReply",
            Self::Register => "Register",
            Self::RegisterReply => "RegisterReply",
            Self::Unregister => "Unregister",
            Self::UnregisterReply => "UnregisterReply",
        }
    }
}

impl From<OpCode> for u32 {
    fn from(op: OpCode) -> Self {
        op.as_u32()
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u32())
    }
}
