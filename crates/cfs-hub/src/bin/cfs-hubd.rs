use std::net::SocketAddr;
use std::sync::Arc;

use cfs_hub::{HubState, DEFAULT_HUB_TOKEN};
use clap::Parser;

/// cfs hub: publisher registry and WebSocket proxy splicer.
#[derive(Parser, Debug)]
#[command(name = "cfs-hubd", version)]
struct Args {
    /// Port to listen on.
    #[arg(short = 'p', long, default_value_t = 8080)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Shared secret publishers must present via `{action:"auth"}`.
    #[arg(long, env = "CFS_HUB_TOKEN", default_value = DEFAULT_HUB_TOKEN)]
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let state = Arc::new(HubState::new(args.token));

    cfs_hub::run(addr, state).await
}
