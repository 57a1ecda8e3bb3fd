//! Log producer: ships a batch of records to a collector, then drains.
//!
//! ```text
//! cargo run --example producer -- 100
//! ```

use std::time::Duration;

use logwire::{HandlerConfig, LogHandler, LogRecord};
use tracing::{Level, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let count: usize = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(10);

    let handler = LogHandler::new(HandlerConfig::from_env())?;
    info!(destination = %handler.destination(), count, "sending records");

    for n in 0..count {
        handler.emit(
            LogRecord::new("INFO", format!("record {n}"))
                .with("service", "producer")
                .with("n", n),
        )?;
    }

    let report = handler.registry().shutdown(Duration::from_secs(10));
    if report.delivered_all {
        info!("all records delivered");
    } else {
        warn!(dropped = report.dropped, "some records were not delivered");
    }

    let metrics = logwire::metrics_snapshot();
    info!(
        delivered = metrics.records_delivered,
        retries = metrics.send_retries,
        "done"
    );
    Ok(())
}
