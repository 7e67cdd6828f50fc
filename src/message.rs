use crate::protocol_constants::{
    EXTENDED_HEADER_LEN, MIN_MESSAGE_LEN, START_SYSEX, SYSEX_HEADER_LEN,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a message and, with it, the framing rule it travels under.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgId {
    /// A fixed length message: the id byte followed by two data bytes.
    Standard(u8),
    /// A terminated message introduced by [`START_SYSEX`] and a sub id.
    Sysex(u8),
    /// A sysex message carrying a 16 bit id after the extended marker.
    ExtSysex(u16),
}

impl MsgId {
    #[must_use]
    pub const fn is_sysex(self) -> bool {
        matches!(self, Self::Sysex(_) | Self::ExtSysex(_))
    }

    /// Number of bytes the id occupies on the wire.
    #[must_use]
    pub const fn wire_len(self) -> usize {
        match self {
            Self::Standard(_) => 1,
            Self::Sysex(_) => SYSEX_HEADER_LEN,
            Self::ExtSysex(_) => EXTENDED_HEADER_LEN,
        }
    }

    /// Number of bytes the whole message occupies on the wire for a payload
    /// of `payload_len` bytes.
    #[must_use]
    pub const fn frame_len(self, payload_len: usize) -> usize {
        if self.is_sysex() {
            self.wire_len() + payload_len + 1
        } else {
            self.wire_len() + payload_len
        }
    }

    /// A standard id equal to the sysex marker would be read back as sysex.
    #[must_use]
    pub const fn is_frameable(self) -> bool {
        !matches!(self, Self::Standard(START_SYSEX))
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(id) => write!(f, "{id:#04x}"),
            Self::Sysex(id) => write!(f, "sysex {id:#04x}"),
            Self::ExtSysex(id) => write!(f, "ext sysex {id:#06x}"),
        }
    }
}

/// A single framed firmata message.
///
/// The transport does not interpret the payload, it only carries it between
/// the wire and whoever consumes it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MsgId,
    pub payload: Vec<u8>,
}

impl Message {
    #[must_use]
    pub fn new(id: MsgId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn standard(id: u8, data: [u8; MIN_MESSAGE_LEN - 1]) -> Self {
        Self::new(MsgId::Standard(id), data.to_vec())
    }

    #[must_use]
    pub fn sysex(id: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(MsgId::Sysex(id), payload)
    }

    #[must_use]
    pub fn ext_sysex(id: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(MsgId::ExtSysex(id), payload)
    }

    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.id.frame_len(self.payload.len())
    }

    pub fn into_parts(self) -> (MsgId, Vec<u8>) {
        (self.id, self.payload)
    }
}
