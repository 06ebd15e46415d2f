//! Logging setup shared by the server and the ledger tool.
//!
//! Output is either JSON lines, for log collectors, or the pretty
//! multi-line format for humans. `RUST_LOG` overrides the directives passed
//! in by the binaries.

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log output format, selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Human readable output
    Pretty,
}

/// Install the global subscriber.
pub fn setup_logging(directives: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    match format {
        LogFormat::Json => {
            let main_layer = tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_target(false)
                .with_current_span(true)
                .with_span_list(true)
                .with_line_number(true)
                .with_file(true)
                .with_timer(UtcTime::rfc_3339());

            tracing_subscriber::registry()
                .with(filter)
                .with(main_layer)
                .init()
        }
        LogFormat::Pretty => {
            let main_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_timer(UtcTime::rfc_3339());

            tracing_subscriber::registry()
                .with(filter)
                .with(main_layer)
                .init()
        }
    }
}
