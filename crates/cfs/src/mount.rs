//! `cs mount`: attaches to a published volume over the hub's proxy splice
//! and mounts it with `cfs-fuse`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cfs_volume_core::{Capabilities, Volume};
use cfs_ws_volume::RemoteVolume;

use crate::hub_client;
use crate::volume_path;

pub async fn run(hub_url: &str, hub_token: &str, volume_path: String, mountpoint: PathBuf) -> Result<()> {
    let (owner, name) = volume_path::split(&volume_path)?;
    let proxy_ws_url = hub_client::proxy_url(hub_url, &owner, &name, hub_token).await?;

    let remote = RemoteVolume::connect(&proxy_ws_url)
        .await
        .context("connecting to published volume")?;
    // The mounter's own proxy leg never authenticates (only the publisher's
    // control channel does); the splice simply wires it to the publisher.
    let writable = remote.capabilities().contains(Capabilities::WRITE);
    let volume: Arc<dyn Volume> = Arc::new(remote);

    tracing::info!(%owner, %name, mountpoint = %mountpoint.display(), writable, "mounting");
    tokio::task::spawn_blocking(move || cfs_fuse::mount(volume, mountpoint, writable))
        .await
        .context("mount task panicked")?
        .context("mount failed")
}
