//! Coordinator entry point: parse the listen address and serve forever.

use anyhow::Context;
use clap::Parser;

use pairpad_collab::{CollabServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "pairpad-server", about = "Coordination server for pairpad sessions")]
struct Args {
    /// Server's network address
    #[arg(long, default_value = ":8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("starting server on {}", args.addr);

    let server = CollabServer::new(ServerConfig { addr: args.addr });
    server
        .run()
        .await
        .context("error starting server, exiting")?;
    Ok(())
}
