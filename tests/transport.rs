use firmata_io::asynchronous::network::FirmataCodec;
use firmata_io::asynchronous::port::Port;
use firmata_io::asynchronous::transport::Transport;
use firmata_io::{
    CloseReason, FirmataError, LinkState, Message, MsgId, Parity, SerialOption, StopBits,
};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf,
};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn link(codec: FirmataCodec) -> (Transport, DuplexStream) {
    let (ours, board) = duplex(1024);
    (Transport::new(ours, codec), board)
}

fn collecting_callback(transport: &Transport) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    transport.set_callback(move |message| {
        let _ = tx.send(message);
    });
    rx
}

/// A port that can fail its first write or every read that has data.
struct FaultyPort {
    inner: DuplexStream,
    fail_next_write: bool,
    fail_reads: bool,
}

impl FaultyPort {
    fn link(fail_next_write: bool, fail_reads: bool) -> (Transport, DuplexStream) {
        let (inner, board) = duplex(1024);
        let port = Self {
            inner,
            fail_next_write,
            fail_reads,
        };
        (Transport::new(port, FirmataCodec::new()), board)
    }
}

impl AsyncRead for FaultyPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let fail_reads = self.fail_reads;
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if fail_reads && buf.filled().len() > before => Poll::Ready(Err(
                io::Error::new(io::ErrorKind::ConnectionReset, "line dropped"),
            )),
            other => other,
        }
    }
}

impl AsyncWrite for FaultyPort {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "write refused")));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Port for FaultyPort {
    fn set_option(&mut self, option: SerialOption) -> firmata_io::Result<()> {
        Err(FirmataError::OptionRejected(option, "not a serial line".into()))
    }
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("callback was not invoked in time")
        .expect("callback dropped")
}

#[tokio::test]
async fn write_frames_messages_on_the_wire() {
    let (transport, mut board) = link(FirmataCodec::new());
    transport
        .write(MsgId::Standard(0x90), &[0x40, 0x00])
        .await
        .unwrap();
    transport.write(MsgId::Sysex(0x6B), &[0x01]).await.unwrap();
    transport.write(MsgId::ExtSysex(0x0201), &[]).await.unwrap();

    let mut wire = [0_u8; 12];
    board.read_exact(&mut wire).await.unwrap();
    assert_eq!(
        wire,
        [0x90, 0x40, 0x00, 0xF0, 0x6B, 0x01, 0xF7, 0xF0, 0x00, 0x01, 0x02, 0xF7]
    );
}

#[tokio::test]
async fn unframeable_id_is_reported_to_the_writer() {
    let (transport, _board) = link(FirmataCodec::new());
    let err = transport
        .write(MsgId::Standard(0xF0), &[0x00, 0x00])
        .await
        .unwrap_err();
    assert!(matches!(err, FirmataError::WrongType(_)));
    assert!(transport.is_open());
}

#[tokio::test]
async fn read_returns_the_next_message() {
    let (transport, mut board) = link(FirmataCodec::new());
    let pending = transport.read();
    board.write_all(&[0xF0, 0x00, 0x01, 0x02, 0xF7]).await.unwrap();
    let message = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert_eq!(message, Message::sysex(0x00, vec![0x01, 0x02]));
}

#[tokio::test]
async fn callback_sees_messages_in_arrival_order() {
    let (transport, mut board) = link(FirmataCodec::with_extended_sysex());
    let mut seen = collecting_callback(&transport);

    // one message split across writes, then two in a single write
    board.write_all(&[0xF0, 0x79, 0x02]).await.unwrap();
    board.write_all(&[0x05, 0xF7]).await.unwrap();
    board
        .write_all(&[0x90, 0x40, 0x00, 0xF0, 0x00, 0x34, 0x12, 0x7E, 0xF7])
        .await
        .unwrap();

    assert_eq!(next(&mut seen).await, Message::sysex(0x79, vec![0x02, 0x05]));
    assert_eq!(next(&mut seen).await, Message::standard(0x90, [0x40, 0x00]));
    assert_eq!(next(&mut seen).await, Message::ext_sysex(0x1234, vec![0x7E]));
}

#[tokio::test]
async fn pending_read_takes_the_message_before_the_callback() {
    let (transport, mut board) = link(FirmataCodec::new());
    let mut seen = collecting_callback(&transport);

    let pending = transport.read();
    board
        .write_all(&[0x90, 0x01, 0x00, 0x91, 0x02, 0x00])
        .await
        .unwrap();

    let first = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert_eq!(first, Message::standard(0x90, [0x01, 0x00]));
    assert_eq!(next(&mut seen).await, Message::standard(0x91, [0x02, 0x00]));
}

#[tokio::test]
async fn abandoned_read_does_not_swallow_a_message() {
    let (transport, mut board) = link(FirmataCodec::new());
    let mut seen = collecting_callback(&transport);

    let err = transport
        .read_timeout(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, FirmataError::Timeout(_)));

    board.write_all(&[0xE0, 0x7F, 0x07]).await.unwrap();
    assert_eq!(next(&mut seen).await, Message::standard(0xE0, [0x7F, 0x07]));
}

#[tokio::test]
async fn replacing_the_callback_redirects_dispatch() {
    let (transport, mut board) = link(FirmataCodec::new());
    let mut first = collecting_callback(&transport);
    board.write_all(&[0x90, 0x00, 0x00]).await.unwrap();
    assert_eq!(next(&mut first).await, Message::standard(0x90, [0x00, 0x00]));

    let mut second = collecting_callback(&transport);
    board.write_all(&[0x91, 0x00, 0x00]).await.unwrap();
    assert_eq!(next(&mut second).await, Message::standard(0x91, [0x00, 0x00]));
    // the first handler was dropped together with its sender
    assert!(first.recv().await.is_none());
}

#[tokio::test]
async fn end_of_stream_closes_the_link() {
    let (transport, board) = link(FirmataCodec::new());
    let mut state = transport.link_state();
    let pending = transport.read();
    drop(board);

    let err = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        FirmataError::Disconnected(CloseReason::EndOfStream)
    ));
    state.wait_for(|s| !s.is_open()).await.unwrap();
    assert_eq!(
        *state.borrow(),
        LinkState::Closed(CloseReason::EndOfStream)
    );
    assert!(!transport.is_open());
    assert!(matches!(
        transport.write(MsgId::Standard(0x90), &[0, 0]).await,
        Err(FirmataError::Disconnected(CloseReason::EndOfStream))
    ));
}

#[tokio::test]
async fn close_fails_pending_reads() {
    let (transport, _board) = link(FirmataCodec::new());
    let pending = transport.read();
    transport.close();
    let err = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        FirmataError::Disconnected(CloseReason::Requested)
    ));
}

#[tokio::test]
async fn rejected_option_leaves_the_link_usable() {
    let (transport, mut board) = link(FirmataCodec::new());
    let err = transport.set_stop_bits(StopBits::Two).await.unwrap_err();
    assert!(matches!(
        err,
        FirmataError::OptionRejected(SerialOption::StopBits(StopBits::Two), _)
    ));
    assert!(transport.set_parity(Parity::Even).await.is_err());
    assert!(transport.is_open());

    let pending = transport.read();
    board.write_all(&[0xF9, 0x02, 0x05]).await.unwrap();
    let message = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert_eq!(message, Message::standard(0xF9, [0x02, 0x05]));
}

#[tokio::test]
async fn failed_write_is_not_sent_again() {
    let (transport, mut board) = FaultyPort::link(true, false);
    let err = transport.write(MsgId::Sysex(0x6B), &[0x01]).await.unwrap_err();
    assert!(matches!(
        err,
        FirmataError::IoError(ref e) if e.kind() == io::ErrorKind::BrokenPipe
    ));
    assert!(transport.is_open());

    transport
        .write(MsgId::Standard(0x90), &[0x40, 0x00])
        .await
        .unwrap();
    drop(transport);

    let mut wire = Vec::new();
    tokio::time::timeout(WAIT, board.read_to_end(&mut wire))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wire, [0x90, 0x40, 0x00]);
}

#[tokio::test]
async fn read_error_fails_the_link() {
    let (transport, mut board) = FaultyPort::link(false, true);
    let mut state = transport.link_state();
    let pending = transport.read();
    board.write_all(&[0x90, 0x40, 0x00]).await.unwrap();

    let err = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        FirmataError::Disconnected(CloseReason::Failed {
            kind: io::ErrorKind::ConnectionReset,
            ..
        })
    ));
    tokio::time::timeout(WAIT, state.wait_for(|s| !s.is_open()))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        *state.borrow(),
        LinkState::Closed(CloseReason::Failed { .. })
    ));
    assert!(matches!(
        transport.write(MsgId::Standard(0x90), &[0, 0]).await,
        Err(FirmataError::Disconnected(CloseReason::Failed { .. }))
    ));
}
