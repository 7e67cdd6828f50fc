use crate::asynchronous::network::FirmataCodec;
use crate::message::{Message, MsgId};
use crate::serial::{apply_option, FlowControl, Parity, SerialOption, StopBits};
use crate::{Callback, CloseReason, FirmataError, Result};
use bytes::BytesMut;
use std::io::{self, ErrorKind};
use tokio_serial::SerialPort;
use tokio_util::codec::{Decoder, Encoder};

const READ_CHUNK_SIZE: usize = 256;

/// A firmata connection over a blocking stream.
///
/// Nothing happens in the background: bytes are only read while
/// [`Transport::read`] or [`Transport::poll`] runs.
pub struct Transport<T: io::Read + io::Write> {
    connection: T,
    codec: FirmataCodec,
    buffer: BytesMut,
    callback: Option<Callback>,
}

impl Transport<Box<dyn SerialPort>> {
    /// Opens `device` at `baud`. Reads time out after the serialport default,
    /// [`Transport::poll`] skips those timeouts.
    /// # Errors
    /// Returns [`FirmataError::Connect`] if the device cannot be opened.
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(device, baud)
            .open()
            .map_err(|source| FirmataError::Connect {
                device: device.to_owned(),
                source,
            })?;
        tracing::debug!(device, baud, "serial device opened");
        Ok(Self::new(port))
    }

    /// # Errors
    /// Returns [`FirmataError::OptionRejected`] if the driver refuses the option.
    pub fn set(&mut self, option: SerialOption) -> Result<()> {
        apply_option(self.connection.as_mut(), option)
    }

    /// # Errors
    /// See [`Transport::set`].
    pub fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.set(SerialOption::BaudRate(baud))
    }

    /// # Errors
    /// See [`Transport::set`].
    pub fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        self.set(SerialOption::FlowControl(flow))
    }

    /// # Errors
    /// See [`Transport::set`].
    pub fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.set(SerialOption::Parity(parity))
    }

    /// # Errors
    /// See [`Transport::set`].
    pub fn set_stop_bits(&mut self, bits: StopBits) -> Result<()> {
        self.set(SerialOption::StopBits(bits))
    }

    /// # Errors
    /// See [`Transport::set`].
    pub fn set_char_size(&mut self, bits: u8) -> Result<()> {
        self.set(SerialOption::CharSize(bits))
    }
}

impl<T: io::Read + io::Write> Transport<T> {
    pub fn new(connection: T) -> Self {
        Self::with_codec(connection, FirmataCodec::new())
    }

    pub fn with_codec(connection: T, codec: FirmataCodec) -> Self {
        Self {
            connection,
            codec,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            callback: None,
        }
    }

    /// Frames `payload` under `id` and writes it in one piece.
    /// # Errors
    /// Returns [`FirmataError::IoError`] if the write fails and
    /// [`FirmataError::WrongType`] if `id` cannot be framed.
    pub fn write(&mut self, id: MsgId, payload: &[u8]) -> Result<()> {
        let message = Message::new(id, payload);
        let mut frame = BytesMut::with_capacity(message.frame_len());
        self.codec.encode(message, &mut frame)?;
        self.connection.write_all(&frame)?;
        self.connection.flush()?;
        Ok(())
    }

    /// Blocks until a whole message has been read.
    /// # Errors
    /// Returns [`FirmataError::Disconnected`] at end of stream and
    /// [`FirmataError::IoError`] if reading fails, timeouts included.
    pub fn read(&mut self) -> Result<Message> {
        let mut chunk = [0_u8; READ_CHUNK_SIZE];
        loop {
            if let Some(message) = self.codec.decode(&mut self.buffer)? {
                return Ok(message);
            }
            let n = match self.connection.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Err(FirmataError::Disconnected(CloseReason::EndOfStream));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Message) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Reads `count` messages, handing each to the callback. Read timeouts
    /// count as an attempt without a message.
    /// # Errors
    /// Returns the first error other than a timeout.
    pub fn poll(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            match self.read() {
                Ok(message) => match self.callback.as_mut() {
                    Some(callback) => callback(message),
                    None => tracing::trace!(id = %message.id, "no handler installed, message dropped"),
                },
                Err(FirmataError::IoError(e)) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Bytes received but not yet framed into a message.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn get_ref(&self) -> &T {
        &self.connection
    }

    pub fn into_inner(self) -> T {
        self.connection
    }
}
