//! Prints every message a board sends after asking it for its firmware.
//!
//! cargo run --example monitor -- /dev/ttyACM0 [config.json]
use firmata_io::asynchronous::transport::Transport;
use firmata_io::{MsgId, Result, TransportConfig};

const REPORT_FIRMWARE: u8 = 0x79;

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let device = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_owned());
    let config = match args.next() {
        Some(path) => TransportConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => TransportConfig::default(),
    };

    let transport = Transport::open_with_config(&device, &config)?;
    transport.write(MsgId::Sysex(REPORT_FIRMWARE), &[]).await?;
    let firmware = transport.read().await?;
    println!("firmware reply {:02x?}", firmware.payload);

    transport.set_callback(|message| println!("{} {:02x?}", message.id, message.payload));
    let mut state = transport.link_state();
    state.wait_for(|s| !s.is_open()).await.ok();
    println!("{:?}", *state.borrow());
    Ok(())
}
