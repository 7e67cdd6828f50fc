use crate::serial::{apply_option, SerialOption};
use crate::{FirmataError, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// A byte stream the async transport can drive.
///
/// Besides moving bytes a port must accept or refuse serial line options.
pub trait Port: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// # Errors
    /// Returns [`FirmataError::OptionRejected`] if the option cannot be applied.
    fn set_option(&mut self, option: SerialOption) -> Result<()>;
}

impl Port for tokio_serial::SerialStream {
    fn set_option(&mut self, option: SerialOption) -> Result<()> {
        apply_option(self, option)
    }
}

/// In-memory links have no line settings, every option is refused.
impl Port for tokio::io::DuplexStream {
    fn set_option(&mut self, option: SerialOption) -> Result<()> {
        Err(FirmataError::OptionRejected(
            option,
            "in-memory link has no line settings".to_owned(),
        ))
    }
}
