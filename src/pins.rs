//! Pin registry populated by the board handshake.
//!
//! [`PinsBuilder`] is the only way to create or change pins. The handshake
//! fills a builder from the capability and analog mapping replies, then
//! [`PinsBuilder::build`] turns it into a read-only [`Pins`].
use crate::protocol_constants::{NOT_ANALOG, PIN_SEPARATOR};
use crate::{FirmataError, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PinMode {
    Input = 0,
    Output = 1,
    Analog = 2,
    Pwm = 3,
    Servo = 4,
    Shift = 5,
    I2c = 6,
    Onewire = 7,
    Stepper = 8,
    Encoder = 9,
    Serial = 10,
    Pullup = 11,
}

impl PinMode {
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// # Errors
    /// Returns [`FirmataError::ParseError`] for a byte that names no mode.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Input),
            1 => Ok(Self::Output),
            2 => Ok(Self::Analog),
            3 => Ok(Self::Pwm),
            4 => Ok(Self::Servo),
            5 => Ok(Self::Shift),
            6 => Ok(Self::I2c),
            7 => Ok(Self::Onewire),
            8 => Ok(Self::Stepper),
            9 => Ok(Self::Encoder),
            10 => Ok(Self::Serial),
            11 => Ok(Self::Pullup),
            _ => Err(FirmataError::ParseError(
                "failed to convert u8 to pinmode",
                vec![value],
            )),
        }
    }
}

/// A structure representing an available pin mode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub mode: PinMode,
    pub resolution: u8,
}

impl Mode {
    #[must_use]
    pub const fn new(mode: PinMode, resolution: u8) -> Self {
        Self { mode, resolution }
    }
}

/// A structure representing the capabilities and last known state of a pin.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pos: usize,
    modes: Vec<Mode>,
    analog: Option<u8>,
    mode: Option<PinMode>,
    value: u16,
}

impl Pin {
    /// Position of the pin on the board.
    #[must_use]
    pub const fn pos(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    #[must_use]
    pub fn supports(&self, mode: PinMode) -> bool {
        self.modes.iter().any(|m| m.mode == mode)
    }

    /// Resolution in bits of `mode`, if the pin supports it.
    #[must_use]
    pub fn resolution(&self, mode: PinMode) -> Option<u8> {
        self.modes
            .iter()
            .find(|m| m.mode == mode)
            .map(|m| m.resolution)
    }

    /// Analog channel of the pin, if it has one.
    #[must_use]
    pub const fn analog_index(&self) -> Option<u8> {
        self.analog
    }

    #[must_use]
    pub const fn mode(&self) -> Option<PinMode> {
        self.mode
    }

    #[must_use]
    pub const fn value(&self) -> u16 {
        self.value
    }

    /// Parses the `(mode, resolution)` pairs describing one pin.
    fn deserialize(pos: usize, byte_stream: &[u8]) -> Result<Self> {
        if byte_stream.len() % 2 != 0 {
            return Err(FirmataError::ParseError(
                "odd amount of bytes found when parsing pin",
                byte_stream.to_vec(),
            ));
        }
        let modes = byte_stream
            .chunks_exact(2)
            .map(|pair| -> Result<Mode> { Ok(Mode::new(PinMode::from_u8(pair[0])?, pair[1])) })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pos,
            modes,
            analog: None,
            mode: None,
            value: 0,
        })
    }
}

/// All pins of a board, ordered by position.
///
/// Serialized as a plain list of pins. Deserializing checks that every pin
/// sits at the position it claims.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(try_from = "Vec<Pin>", into = "Vec<Pin>")]
pub struct Pins {
    pins: Vec<Pin>,
}

impl TryFrom<Vec<Pin>> for Pins {
    type Error = FirmataError;

    fn try_from(pins: Vec<Pin>) -> Result<Self> {
        if pins.iter().enumerate().any(|(i, pin)| pin.pos != i) {
            return Err(FirmataError::OutOfRange(
                "pin position does not match its place in the list",
            ));
        }
        Ok(Self { pins })
    }
}

impl From<Pins> for Vec<Pin> {
    fn from(pins: Pins) -> Self {
        pins.pins
    }
}

impl Pins {
    #[must_use]
    pub fn count(&self) -> usize {
        self.pins.len()
    }

    /// Number of pins supporting `mode`.
    #[must_use]
    pub fn count_mode(&self, mode: PinMode) -> usize {
        self.pins.iter().filter(|pin| pin.supports(mode)).count()
    }

    /// # Errors
    /// Returns [`FirmataError::OutOfRange`] if there is no pin at `pos`.
    pub fn get(&self, pos: usize) -> Result<&Pin> {
        self.pins
            .get(pos)
            .ok_or(FirmataError::OutOfRange("no pin at this position"))
    }

    /// Returns the `n`th pin, counting from zero, that supports `mode`.
    /// # Errors
    /// Returns [`FirmataError::OutOfRange`] if fewer pins support `mode`.
    pub fn get_mode(&self, mode: PinMode, n: usize) -> Result<&Pin> {
        self.pins
            .iter()
            .filter(|pin| pin.supports(mode))
            .nth(n)
            .ok_or(FirmataError::OutOfRange("not enough pins support this mode"))
    }

    /// Returns the analog capable pin mapped to analog channel `n`.
    /// # Errors
    /// Returns [`FirmataError::NotFoundError`] if no pin uses that channel.
    pub fn get_analog(&self, n: u8) -> Result<&Pin> {
        self.pins
            .iter()
            .filter(|pin| pin.supports(PinMode::Analog))
            .find(|pin| pin.analog == Some(n))
            .ok_or(FirmataError::NotFoundError("no pin is mapped to this analog channel"))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pin> {
        self.pins.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl<'a> IntoIterator for &'a Pins {
    type Item = &'a Pin;
    type IntoIter = std::slice::Iter<'a, Pin>;

    fn into_iter(self) -> Self::IntoIter {
        self.pins.iter()
    }
}

/// Collects pins during the handshake.
#[derive(Debug, Clone, Default)]
pub struct PinsBuilder {
    pins: Vec<Pin>,
}

impl PinsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the pin list from the payload of a capability response: for each
    /// pin a run of `(mode, resolution)` pairs closed by `0x7F`.
    /// # Errors
    /// Returns [`FirmataError::ParseError`] if a pin has a dangling byte or an
    /// unknown mode.
    pub fn from_capability_response(payload: &[u8]) -> Result<Self> {
        let mut builder = Self::new();
        let mut sections: Vec<&[u8]> = payload.split(|b| *b == PIN_SEPARATOR).collect();
        // everything after the last separator is an unterminated pin
        if let Some(tail) = sections.pop() {
            if !tail.is_empty() {
                return Err(FirmataError::ParseError(
                    "capability response ends inside a pin",
                    payload.to_vec(),
                ));
            }
        }
        for section in sections {
            let pos = builder.pins.len();
            builder.pins.push(Pin::deserialize(pos, section)?);
        }
        Ok(builder)
    }

    /// Appends a pin with the given modes and returns its position.
    pub fn push(&mut self, modes: impl Into<Vec<Mode>>) -> usize {
        let pos = self.pins.len();
        self.pins.push(Pin {
            pos,
            modes: modes.into(),
            analog: None,
            mode: None,
            value: 0,
        });
        pos
    }

    /// Applies the payload of an analog mapping response: one byte per pin,
    /// `0x7F` for pins without an analog channel.
    /// # Errors
    /// Returns [`FirmataError::OutOfRange`] if the mapping names more pins than
    /// the builder holds.
    pub fn map_analog(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.pins.len() {
            return Err(FirmataError::OutOfRange(
                "more analog pins then pins inside of the registry",
            ));
        }
        for (pin, channel) in self.pins.iter_mut().zip(payload) {
            pin.analog = (*channel != NOT_ANALOG).then(|| *channel);
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`FirmataError::OutOfRange`] if there is no pin at `pos`.
    pub fn set_analog(&mut self, pos: usize, channel: Option<u8>) -> Result<()> {
        self.pin_mut(pos)?.analog = channel;
        Ok(())
    }

    /// # Errors
    /// Returns [`FirmataError::OutOfRange`] if there is no pin at `pos`.
    pub fn set_mode(&mut self, pos: usize, mode: PinMode) -> Result<()> {
        self.pin_mut(pos)?.mode = Some(mode);
        Ok(())
    }

    /// # Errors
    /// Returns [`FirmataError::OutOfRange`] if there is no pin at `pos`.
    pub fn set_value(&mut self, pos: usize, value: u16) -> Result<()> {
        self.pin_mut(pos)?.value = value;
        Ok(())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.pins.len()
    }

    #[must_use]
    pub fn build(self) -> Pins {
        Pins { pins: self.pins }
    }

    fn pin_mut(&mut self, pos: usize) -> Result<&mut Pin> {
        self.pins
            .get_mut(pos)
            .ok_or(FirmataError::OutOfRange("no pin at this position"))
    }
}
