//! `cs`: publish a local directory to a cfs hub, or mount a published one.

mod hub_client;
mod mount;
mod publish;
mod volume_path;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const DEFAULT_HUB_URL: &str = "http://localhost:8080";
const DEFAULT_HUB_TOKEN: &str = "dummysecret";

#[derive(Parser, Debug)]
#[command(name = "cs", version, about = "cfs command-line client")]
struct Cli {
    /// Base URL of the hub to register with or look volumes up on.
    #[arg(long, env = "CFS_HUB_URL", default_value = DEFAULT_HUB_URL, global = true)]
    hub_url: String,

    /// Shared secret presented to the hub as `CFSToken <token>`.
    #[arg(long, env = "CFS_HUB_TOKEN", default_value = DEFAULT_HUB_TOKEN, global = true)]
    hub_token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a local directory as `<user>/<volume>`, retrying forever if
    /// the hub connection drops.
    Publish {
        local_path: PathBuf,
        volume_path: String,
        /// Allow writes through the published volume.
        #[arg(short = 'w', long)]
        writable: bool,
    },
    /// Mount a published `<user>/<volume>` at a local path.
    Mount { volume_path: String, mountpoint: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Publish { local_path, volume_path, writable } => {
            publish::run(&cli.hub_url, &cli.hub_token, local_path, volume_path, writable).await
        }
        Command::Mount { volume_path, mountpoint } => {
            mount::run(&cli.hub_url, &cli.hub_token, volume_path, mountpoint).await
        }
    }
}
