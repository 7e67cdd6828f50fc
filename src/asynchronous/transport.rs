use super::network::FirmataCodec;
use super::port::Port;
use crate::config::TransportConfig;
use crate::message::{Message, MsgId};
use crate::protocol_constants::DEFAULT_BAUD_RATE;
use crate::serial::{FlowControl, Parity, SerialOption, StopBits};
use crate::{Callback, CloseReason, FirmataError, LinkState, Result};
use bytes::BytesMut;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{Encoder, Framed};

enum Command {
    Write(Message, oneshot::Sender<Result<()>>),
    Configure(SerialOption, oneshot::Sender<Result<()>>),
    Read(oneshot::Sender<Message>),
    SetCallback(Option<Callback>),
    Close,
}

/// Decides who receives a decoded message: the oldest pending read, then the
/// installed callback.
#[derive(Default)]
struct Dispatch {
    waiters: VecDeque<oneshot::Sender<Message>>,
    callback: Option<Callback>,
}

impl Dispatch {
    fn wait(&mut self, waiter: oneshot::Sender<Message>) {
        // reads dropped before any message arrived, e.g. on timeout
        self.waiters.retain(|w| !w.is_closed());
        self.waiters.push_back(waiter);
    }

    fn deliver(&mut self, mut message: Message) {
        while let Some(waiter) = self.waiters.pop_front() {
            // a waiter whose read was dropped hands the message back
            match waiter.send(message) {
                Ok(()) => return,
                Err(returned) => message = returned,
            }
        }
        match self.callback.as_mut() {
            Some(callback) => callback(message),
            None => tracing::trace!(id = %message.id, "no handler installed, message dropped"),
        }
    }
}

/// Owns the port. Runs until the link closes or the transport is dropped.
struct Driver<P: Port> {
    conn: Framed<P, FirmataCodec>,
    commands: mpsc::UnboundedReceiver<Command>,
    link_tx: watch::Sender<LinkState>,
    dispatch: Dispatch,
}

impl<P: Port> Driver<P> {
    async fn run(mut self) {
        let reason = loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => break CloseReason::Requested,
                    Some(command) => self.handle_command(command).await,
                },
                frame = self.conn.next() => match frame {
                    Some(Ok(message)) => self.dispatch.deliver(message),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "read from device failed, closing link");
                        break CloseReason::failed(&e);
                    }
                    None => break CloseReason::EndOfStream,
                },
            }
        };
        tracing::debug!(%reason, "link closed");
        // waiters are dropped with `self` after the state is published, so a
        // failed read always finds the reason
        self.link_tx.send_replace(LinkState::Closed(reason));
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Write(message, reply) => {
                tracing::trace!(id = %message.id, len = message.payload.len(), "writing message");
                let _ = reply.send(self.write_frame(message).await);
            }
            Command::Configure(option, reply) => {
                let _ = reply.send(self.conn.get_mut().set_option(option));
            }
            Command::Read(waiter) => self.dispatch.wait(waiter),
            Command::SetCallback(callback) => self.dispatch.callback = callback,
            Command::Close => {}
        }
    }

    /// Writes one frame straight to the port. Nothing is kept for a later
    /// attempt if the write fails part way.
    async fn write_frame(&mut self, message: Message) -> Result<()> {
        let mut frame = BytesMut::with_capacity(message.frame_len());
        self.conn.codec_mut().encode(message, &mut frame)?;
        let port = self.conn.get_mut();
        port.write_all(&frame).await?;
        port.flush().await?;
        Ok(())
    }
}

/// An open firmata connection.
///
/// Reading starts as soon as the transport is created and continues in a
/// background task until the device fails, reports end of stream, or the
/// transport is closed or dropped. Each decoded message goes to the oldest
/// pending [`Transport::read`], or to the installed callback when no read is
/// waiting.
pub struct Transport {
    commands: mpsc::UnboundedSender<Command>,
    link_rx: watch::Receiver<LinkState>,
    driver: JoinHandle<()>,
}

impl Transport {
    /// Opens `device` at the firmata default of 57600 baud.
    /// Must be called from within a tokio runtime.
    /// # Errors
    /// Returns [`FirmataError::Connect`] if the device cannot be opened.
    pub fn open(device: &str) -> Result<Self> {
        let port = open_port(device, DEFAULT_BAUD_RATE)?;
        Ok(Self::new(port, FirmataCodec::new()))
    }

    /// Opens `device` and applies every line option in `config`.
    /// # Errors
    /// Returns [`FirmataError::Connect`] if the device cannot be opened and
    /// [`FirmataError::OptionRejected`] if the driver refuses an option.
    pub fn open_with_config(device: &str, config: &TransportConfig) -> Result<Self> {
        let mut port = open_port(device, config.baud_rate)?;
        for option in config.options() {
            port.set_option(option)?;
        }
        let codec = if config.extended_sysex {
            FirmataCodec::with_extended_sysex()
        } else {
            FirmataCodec::new()
        };
        Ok(Self::new(port, codec))
    }

    /// Starts a transport over an already open port.
    /// Must be called from within a tokio runtime.
    pub fn new<P: Port>(port: P, codec: FirmataCodec) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = watch::channel(LinkState::Open);
        let driver = Driver {
            conn: Framed::new(port, codec),
            commands: command_rx,
            link_tx,
            dispatch: Dispatch::default(),
        };
        let driver = tokio::spawn(driver.run());
        Self {
            commands,
            link_rx,
            driver,
        }
    }

    /// Frames `payload` under `id` and writes it to the device, returning once
    /// the write has been flushed.
    /// # Errors
    /// Returns [`FirmataError::IoError`] if the write fails,
    /// [`FirmataError::WrongType`] if `id` cannot be framed and
    /// [`FirmataError::Disconnected`] if the link is closed.
    pub async fn write(&self, id: MsgId, payload: &[u8]) -> Result<()> {
        let (reply, result) = oneshot::channel();
        self.submit(Command::Write(Message::new(id, payload), reply))?;
        result.await.map_err(|_| self.disconnected())?
    }

    /// Waits for the next decoded message.
    ///
    /// The read is registered when this is called, not when the future is
    /// first polled, so a message arriving in between is not missed. Pending
    /// reads are served in call order and take precedence over the callback.
    /// # Errors
    /// Returns [`FirmataError::Disconnected`] if the link is closed before a
    /// message arrives.
    pub fn read(&self) -> impl Future<Output = Result<Message>> + Send + 'static {
        let (waiter, next) = oneshot::channel();
        let submitted = self.submit(Command::Read(waiter));
        let link_rx = self.link_rx.clone();
        async move {
            submitted?;
            next.await.map_err(|_| disconnected(&link_rx))
        }
    }

    /// Like [`Transport::read`], failing with [`FirmataError::Timeout`] if no
    /// message arrives within `timeout`.
    /// # Errors
    /// Returns [`FirmataError::Timeout`] or [`FirmataError::Disconnected`].
    pub async fn read_timeout(&self, timeout: Duration) -> Result<Message> {
        tokio::time::timeout(timeout, self.read())
            .await
            .map_err(|_| FirmataError::Timeout(timeout.as_millis().to_string()))?
    }

    /// Installs the handler for messages no pending read is waiting for,
    /// replacing any previous one.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(Message) + Send + 'static,
    {
        self.replace_callback(Some(Box::new(callback)));
    }

    pub fn clear_callback(&self) {
        self.replace_callback(None);
    }

    /// # Errors
    /// Returns [`FirmataError::OptionRejected`] if the device refuses the
    /// option, the link stays usable.
    pub async fn set(&self, option: SerialOption) -> Result<()> {
        let (reply, result) = oneshot::channel();
        self.submit(Command::Configure(option, reply))?;
        result.await.map_err(|_| self.disconnected())?
    }

    /// # Errors
    /// See [`Transport::set`].
    pub async fn set_baud_rate(&self, baud: u32) -> Result<()> {
        self.set(SerialOption::BaudRate(baud)).await
    }

    /// # Errors
    /// See [`Transport::set`].
    pub async fn set_flow_control(&self, flow: FlowControl) -> Result<()> {
        self.set(SerialOption::FlowControl(flow)).await
    }

    /// # Errors
    /// See [`Transport::set`].
    pub async fn set_parity(&self, parity: Parity) -> Result<()> {
        self.set(SerialOption::Parity(parity)).await
    }

    /// # Errors
    /// See [`Transport::set`].
    pub async fn set_stop_bits(&self, bits: StopBits) -> Result<()> {
        self.set(SerialOption::StopBits(bits)).await
    }

    /// # Errors
    /// See [`Transport::set`].
    pub async fn set_char_size(&self, bits: u8) -> Result<()> {
        self.set(SerialOption::CharSize(bits)).await
    }

    /// Subscribes to link state changes.
    #[must_use]
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link_rx.clone()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.link_rx.borrow().is_open()
    }

    /// Stops reading and releases the port. Pending reads fail with
    /// [`CloseReason::Requested`].
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    fn replace_callback(&self, callback: Option<Callback>) {
        if self.submit(Command::SetCallback(callback)).is_err() {
            tracing::debug!("callback not installed, link already closed");
        }
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| self.disconnected())
    }

    fn disconnected(&self) -> FirmataError {
        disconnected(&self.link_rx)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn disconnected(link_rx: &watch::Receiver<LinkState>) -> FirmataError {
    match &*link_rx.borrow() {
        LinkState::Closed(reason) => FirmataError::Disconnected(reason.clone()),
        // the driver went away without publishing, only an abort does that
        LinkState::Open => FirmataError::Disconnected(CloseReason::Requested),
    }
}


fn open_port(device: &str, baud: u32) -> Result<SerialStream> {
    let port = tokio_serial::new(device, baud)
        .open_native_async()
        .map_err(|source| FirmataError::Connect {
            device: device.to_owned(),
            source,
        })?;
    tracing::debug!(device, baud, "serial device opened");
    Ok(port)
}
