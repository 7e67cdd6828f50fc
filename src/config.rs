use crate::protocol_constants::DEFAULT_BAUD_RATE;
use crate::serial::{FlowControl, Parity, SerialOption, StopBits};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Line settings and framing choices applied when a transport is opened.
///
/// Every field has a default so a configuration file only needs to name what
/// differs from a stock firmata board (57600 baud, 8N1, no flow control).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    pub baud_rate: u32,
    pub flow_control: FlowControl,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub char_size: u8,
    /// Treat a sysex message with sub id `0x00` as extended sysex.
    pub extended_sysex: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            char_size: 8,
            extended_sysex: false,
        }
    }
}

impl TransportConfig {
    /// Parses a configuration from JSON.
    /// # Errors
    /// Returns [`crate::FirmataError::Config`] on malformed input or unknown
    /// option values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The line options in the order they are applied to a port.
    #[must_use]
    pub const fn options(&self) -> [SerialOption; 5] {
        [
            SerialOption::BaudRate(self.baud_rate),
            SerialOption::FlowControl(self.flow_control),
            SerialOption::Parity(self.parity),
            SerialOption::StopBits(self.stop_bits),
            SerialOption::CharSize(self.char_size),
        ]
    }
}
