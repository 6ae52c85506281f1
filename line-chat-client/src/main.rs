use anyhow::Result;
use clap::Parser;
use tracing::warn;

use line_chat_client::{cli::Cli, console};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the chat transcript.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = console::run(cli.config()).await {
        warn!("client exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
