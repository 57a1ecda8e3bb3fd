//! Log collector: acknowledges and prints every record it receives.
//!
//! ```text
//! LOGWIRE_PORT=9999 cargo run --example collector
//! ```

use logwire::{Message, OpCode, Receiver, ReceiverConfig};
use tracing::{Level, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = ReceiverConfig::from_env();
    info!(host = %config.host, port = config.port, "starting collector");

    let receiver = Receiver::with_processor(config, |message: &Message| {
        if message.op_code() == OpCode::Json {
            println!("{}", String::from_utf8_lossy(message.data()));
        }
    });
    receiver.start()?;
    Ok(())
}
