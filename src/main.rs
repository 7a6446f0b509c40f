use std::path::PathBuf;

use ::tracing::{error, info};
use anyhow::Context;
use clap::Parser;
use language_host::{config::LanghostConfig, service::Service, tracing::setup_tracing};

#[derive(Parser)]
#[command(name = "language-host")]
#[command(version, about = "Language host serving the LanguageRuntime gRPC service", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Path to config file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Overrides listen_addr from the config")]
    listen_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LanghostConfig::from_path(path)?,
        None => LanghostConfig::from_env()?,
    };
    if let Some(listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr;
        config.validate().context("invalid --listen-addr")?;
    }

    let tracing_provider = setup_tracing(&config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %config.env,
        "starting language host"
    );

    let result = Service::new(config).start().await;
    if let Err(err) = &result {
        error!("language host exited with error: {:?}", err);
    }

    // export traces before shutdown
    if let Some(tracer_provider) = tracing_provider {
        if let Err(err) = tracer_provider.force_flush() {
            error!("Error flushing traces: {:?}", err);
        }
        if let Err(err) = tracer_provider.shutdown() {
            error!("Error shutting down tracer provider: {:?}", err);
        }
    }

    result
}
