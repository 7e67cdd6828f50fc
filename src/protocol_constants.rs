// These byte constants are defined as part of the firmata protocol
// See https://github.com/firmata/protocol for more info.

// --- Framing bytes ---
pub const START_SYSEX: u8 = 0xF0;
pub const END_SYSEX: u8 = 0xF7;
// A sysex message whose sub id is EXTENDED_ID carries a 16 bit id in the
// two bytes that follow, least significant byte first.
pub const EXTENDED_ID: u8 = 0x00;

// The smallest complete message is a standard one: id + two data bytes.
pub const MIN_MESSAGE_LEN: usize = 3;
pub const SYSEX_HEADER_LEN: usize = 2;
pub const EXTENDED_HEADER_LEN: usize = 4;

// --- Pin registry replies ---
// Separates pins in a capability response and marks a pin without an
// analog channel in an analog mapping response.
pub const PIN_SEPARATOR: u8 = 0x7F;
pub const NOT_ANALOG: u8 = 0x7F;

pub const DEFAULT_BAUD_RATE: u32 = 57_600;
