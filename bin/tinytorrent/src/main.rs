//! TinyTorrent tracker and peer binary.

mod cli;
mod config;
mod logging;

use clap::Parser;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = cli::Cli::parse();
    logging::init_logging(&cli.logs)?;
    cli.run().await
}
