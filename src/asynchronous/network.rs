use crate::message::{Message, MsgId};
use crate::protocol_constants::{
    END_SYSEX, EXTENDED_HEADER_LEN, EXTENDED_ID, MIN_MESSAGE_LEN, START_SYSEX, SYSEX_HEADER_LEN,
};
use crate::{FirmataError, Result};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames and deframes firmata messages.
///
/// Any leading byte other than [`START_SYSEX`] is taken as a standard id
/// followed by two data bytes, no table of known ids is consulted. A sysex
/// message stays in the buffer until its terminator arrives.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct FirmataCodec {
    extended_sysex: bool,
    // Bytes of the pending sysex message already searched for END_SYSEX.
    scanned: usize,
}

impl FirmataCodec {
    /// A codec that frames plain sysex only, `F0 00 ..` is sysex id `0x00`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            extended_sysex: false,
            scanned: 0,
        }
    }

    /// A codec that also reads sysex id `0x00` as the extended sysex marker.
    #[must_use]
    pub const fn with_extended_sysex() -> Self {
        Self {
            extended_sysex: true,
            scanned: 0,
        }
    }

    #[must_use]
    pub const fn extended_sysex(&self) -> bool {
        self.extended_sysex
    }

    fn decode_sysex(&mut self, src: &mut BytesMut) -> Option<Message> {
        let sub_id = src[1];
        let (id, header_len) = if self.extended_sysex && sub_id == EXTENDED_ID {
            if src.len() < EXTENDED_HEADER_LEN {
                return None;
            }
            let ext_id = LittleEndian::read_u16(&src[SYSEX_HEADER_LEN..EXTENDED_HEADER_LEN]);
            (MsgId::ExtSysex(ext_id), EXTENDED_HEADER_LEN)
        } else {
            (MsgId::Sysex(sub_id), SYSEX_HEADER_LEN)
        };

        let from = header_len.max(self.scanned);
        let end = match src[from..].iter().position(|b| *b == END_SYSEX) {
            Some(offset) => from + offset,
            None => {
                self.scanned = src.len();
                return None;
            }
        };
        self.scanned = 0;

        src.advance(header_len);
        let payload = src.split_to(end - header_len).to_vec();
        src.advance(1);
        Some(Message::new(id, payload))
    }
}

impl Encoder<Message> for FirmataCodec {
    type Error = FirmataError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        if !item.id.is_frameable() {
            return Err(FirmataError::WrongType(
                "standard message id collides with the sysex marker",
            ));
        }
        dst.reserve(item.frame_len());
        match item.id {
            MsgId::Standard(id) => dst.put_u8(id),
            MsgId::Sysex(id) => dst.put_slice(&[START_SYSEX, id]),
            MsgId::ExtSysex(id) => {
                let mut ext_id = [0_u8; 2];
                LittleEndian::write_u16(&mut ext_id, id);
                dst.put_slice(&[START_SYSEX, EXTENDED_ID]);
                dst.put_slice(&ext_id);
            }
        }
        dst.put_slice(&item.payload);
        if item.id.is_sysex() {
            dst.put_u8(END_SYSEX);
        }
        Ok(())
    }
}

impl Decoder for FirmataCodec {
    type Item = Message;
    type Error = FirmataError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < MIN_MESSAGE_LEN {
            src.reserve(MIN_MESSAGE_LEN - src.len());
            return Ok(None);
        }

        let message = if src[0] == START_SYSEX {
            self.decode_sysex(src)
        } else {
            let id = src[0];
            let data = [src[1], src[2]];
            src.advance(MIN_MESSAGE_LEN);
            Some(Message::standard(id, data))
        };

        if let Some(message) = &message {
            tracing::trace!(id = %message.id, len = message.payload.len(), "decoded message");
        }
        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if !src.is_empty() {
            tracing::warn!(
                pending = src.len(),
                "stream ended inside a message, discarding incomplete bytes"
            );
            src.clear();
            self.scanned = 0;
        }
        Ok(None)
    }
}
