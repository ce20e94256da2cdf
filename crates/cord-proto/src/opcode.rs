//! Gateway opcode table.

use std::fmt;

use crate::error::ProtoError;

/// Opcodes understood by the gateway. Values are fixed by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Application event (inbound).
    Dispatch = 0,
    /// Liveness ping, sent by either side.
    Heartbeat = 1,
    /// Start a new session (outbound).
    Identify = 2,
    /// Resume a previous session (outbound).
    Resume = 6,
    /// Server asks the client to reconnect (inbound).
    Reconnect = 7,
    /// Session could not be established or resumed (inbound).
    InvalidSession = 9,
    /// First frame on a fresh socket, carries the heartbeat interval (inbound).
    Hello = 10,
    /// Server acknowledged a heartbeat (inbound).
    HeartbeatAck = 11,
}

impl Opcode {
    /// Numeric value on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Whether the server may send this opcode to a client.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        !matches!(self, Self::Identify | Self::Resume)
    }
}

impl TryFrom<u64> for Opcode {
    type Error = ProtoError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            6 => Ok(Self::Resume),
            7 => Ok(Self::Reconnect),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            other => Err(ProtoError::InvalidOpcode(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dispatch => "DISPATCH",
            Self::Heartbeat => "HEARTBEAT",
            Self::Identify => "IDENTIFY",
            Self::Resume => "RESUME",
            Self::Reconnect => "RECONNECT",
            Self::InvalidSession => "INVALID_SESSION",
            Self::Hello => "HELLO",
            Self::HeartbeatAck => "HEARTBEAT_ACK",
        };
        f.write_str(name)
    }
}
