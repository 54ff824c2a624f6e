//! `cs publish`: serves a local directory to the hub, reconnecting and
//! re-registering forever when the control channel drops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cfs_volume_core::{ReadOnlyVolume, Volume};
use cfs_volume_local::LocalVolume;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::hub_client;
use crate::volume_path;

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn run(hub_url: &str, hub_token: &str, local_path: PathBuf, volume_path: String, writable: bool) -> Result<()> {
    let (owner, name) = volume_path::split(&volume_path)?;
    let base: Arc<dyn Volume> = Arc::new(LocalVolume::new(local_path));
    let volume: Arc<dyn Volume> = if writable { base } else { Arc::new(ReadOnlyVolume::new(base)) };

    loop {
        tracing::info!(%owner, %name, writable, "publishing");
        if let Err(err) = publish_once(hub_url, hub_token, &owner, &name, volume.clone()).await {
            tracing::warn!(error = %err, "publish session ended, retrying in 5s");
        }
        tokio::time::sleep(RETRY_DELAY).await;
    }
}

#[derive(Serialize)]
struct AuthFrame<'a> {
    action: &'a str,
    user: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
struct VolumeFrame<'a> {
    action: &'a str,
    name: &'a str,
    url: &'a str,
}

#[derive(Deserialize)]
struct ControlFrame {
    action: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    ws_url: String,
}

/// One registration-and-serve cycle: register, authenticate, announce the
/// volume, then answer `connect` notifications until the channel closes.
async fn publish_once(hub_url: &str, hub_token: &str, owner: &str, name: &str, volume: Arc<dyn Volume>) -> Result<()> {
    let control_url = hub_client::register_url(hub_url, owner, name, hub_token).await?;
    let (ws, _) = tokio_tungstenite::connect_async(&control_url)
        .await
        .context("connecting control channel")?;
    let (mut sink, mut stream) = ws.split();

    let auth = AuthFrame { action: "auth", user: owner, token: hub_token };
    sink.send(Message::Text(serde_json::to_string(&auth)?)).await?;
    let Some(Ok(Message::Text(reply))) = stream.next().await else {
        bail!("control channel closed during auth");
    };
    let reply: ControlFrame = serde_json::from_str(&reply)?;
    if reply.status != "ok" {
        bail!("auth rejected: {}", reply.status);
    }

    let announce = VolumeFrame { action: "volume", name, url: "ws://localhost:8080/" };
    sink.send(Message::Text(serde_json::to_string(&announce)?)).await?;
    tracing::info!(%owner, %name, "registered with hub");

    while let Some(msg) = stream.next().await {
        let Message::Text(text) = msg? else { continue };
        let Ok(frame) = serde_json::from_str::<ControlFrame>(&text) else {
            continue;
        };
        if frame.action == "connect" {
            let volume = volume.clone();
            let ws_url = frame.ws_url.clone();
            tokio::spawn(async move { serve_one_connection(ws_url, volume).await });
        }
    }
    Ok(())
}

async fn serve_one_connection(ws_url: String, volume: Arc<dyn Volume>) {
    match tokio_tungstenite::connect_async(&ws_url).await {
        Ok((ws, _)) => cfs_ws_volume::serve_volume(ws, volume, None).await,
        Err(err) => tracing::warn!(%ws_url, error = %err, "failed to attach proxy leg"),
    }
}
