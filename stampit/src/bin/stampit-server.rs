//! Stampit HTTP server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use stampit::api;
use stampit::config::Settings;
use stampit::context::ApiContext;
use stampit::logging::setup_logging;
use stampit::logging::LogFormat;
use tokio::signal;

/// Command line arguments for the server.
#[derive(Debug, Parser)]
#[clap(name = "stampit-server")]
struct ServerArgs {
    /// Optional path to the configuration file. Without it the compiled in
    /// defaults and environment variables are used.
    #[clap(short = 'c', long, required = false)]
    config: Option<PathBuf>,

    #[clap(short = 'o', long = "output-format", default_value = "pretty")]
    output_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();
    setup_logging("info,stampit=debug,ots=debug", args.output_format);

    let settings = Settings::new(args.config)?;
    let addr = SocketAddr::new(settings.server.host, settings.server.port);
    tracing::info!(
        calendars = settings.stamp.calendars.len(),
        min_calendar_responses = settings.stamp.min_calendar_responses,
        allowed_origins = ?settings.cors.allowed_origins,
        "loaded configuration"
    );

    let context = ApiContext::from_settings(settings)?;
    let service = api::routes::service(context);

    let (bound, server) = warp::serve(service).try_bind_with_graceful_shutdown(addr, async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "could not listen for the shutdown signal");
        }
        tracing::info!("received shutdown signal");
    })?;

    tracing::info!(address = %bound, "stampit server listening");
    server.await;
    tracing::info!("stampit server stopped");
    Ok(())
}
