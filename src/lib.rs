//#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Serial transport and message framing for the
//! [Firmata Protocol](https://github.com/firmata/protocol).
//!
//! Bytes read from a board are cut into [`Message`]s made of a [`MsgId`] and a
//! raw payload, and outgoing messages are framed before they are written. The
//! payload is never interpreted here. Two transports are provided:
//! [`asynchronous::transport::Transport`] runs on tokio and hands messages to a
//! callback or to pending reads, [`standard::transport::Transport`] works over
//! any blocking [`std::io::Read`] + [`std::io::Write`].
pub mod asynchronous;
pub mod config;
pub mod message;
pub mod pins;
mod protocol_constants;
pub mod serial;
pub mod standard;

pub use config::TransportConfig;
pub use message::{Message, MsgId};
pub use pins::{Mode, Pin, PinMode, Pins, PinsBuilder};
pub use serial::{FlowControl, Parity, SerialOption, StopBits};

use std::fmt;

/// Firmata result type
pub type Result<T> = std::result::Result<T, FirmataError>;

/// Handler invoked once per decoded message.
pub type Callback = Box<dyn FnMut(Message) + Send + 'static>;

/// Firmata error that wraps all underlying errors for consistency
#[derive(Debug, thiserror::Error)]
pub enum FirmataError {
    #[error("underlying io interrupt {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to open `{device}`: {source}")]
    Connect {
        device: String,
        source: tokio_serial::Error,
    },
    #[error("serial option {0:?} rejected: {1}")]
    OptionRejected(SerialOption, String),
    #[error("link closed: {0}")]
    Disconnected(CloseReason),
    #[error("timeout exceeded `{0}` ms")]
    Timeout(String),
    #[error("parse error `{0}`: {1:?}")]
    ParseError(&'static str, Vec<u8>),
    #[error("`{0}`")]
    NotFoundError(&'static str),
    #[error("`{0}`")]
    WrongType(&'static str),
    #[error("Out of range error `{0}`")]
    OutOfRange(&'static str),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Why a link stopped delivering messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The device reported end of stream.
    EndOfStream,
    /// Reading from the device failed.
    Failed {
        kind: std::io::ErrorKind,
        message: String,
    },
    /// The owner closed the link.
    Requested,
}

impl CloseReason {
    pub(crate) fn failed(err: &FirmataError) -> Self {
        let kind = match err {
            FirmataError::IoError(e) => e.kind(),
            _ => std::io::ErrorKind::InvalidData,
        };
        Self::Failed {
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("end of stream"),
            Self::Failed { kind, message } => write!(f, "read failed ({kind:?}): {message}"),
            Self::Requested => f.write_str("closed by request"),
        }
    }
}

/// Health of a connection as seen by its reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Open,
    Closed(CloseReason),
}

impl LinkState {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}
