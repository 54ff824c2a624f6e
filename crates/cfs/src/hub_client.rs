//! HTTP half of the hub protocol: registering a publish and looking up a
//! volume to mount. The WebSocket control-channel and proxy legs are driven
//! directly by [`crate::publish`]/[`crate::mount`].

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize, Default)]
struct UrlResponse {
    #[serde(default)]
    ws_url: String,
    #[serde(default)]
    proxy_ws_url: String,
    #[serde(default)]
    error: String,
}

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn auth_header(token: &str) -> String {
    format!("CFSToken {token}")
}

/// `POST /volumes/:owner/:name`, returning the control-channel URL a
/// publisher should connect to.
pub async fn register_url(hub_url: &str, owner: &str, name: &str, token: &str) -> Result<String> {
    let resp: UrlResponse = client()?
        .post(format!("{hub_url}/volumes/{owner}/{name}"))
        .header(reqwest::header::AUTHORIZATION, auth_header(token))
        .send()
        .await
        .context("registering with hub")?
        .json()
        .await
        .context("decoding hub registration response")?;
    if !resp.error.is_empty() || resp.ws_url.is_empty() {
        bail!("hub registration failed: {}", resp.error);
    }
    Ok(resp.ws_url)
}

/// `GET /volumes/:owner/:name`, returning the proxy URL a mounter should
/// dial to attach to the publisher.
pub async fn proxy_url(hub_url: &str, owner: &str, name: &str, token: &str) -> Result<String> {
    let resp: UrlResponse = client()?
        .get(format!("{hub_url}/volumes/{owner}/{name}"))
        .header(reqwest::header::AUTHORIZATION, auth_header(token))
        .send()
        .await
        .context("looking up volume")?
        .json()
        .await
        .context("decoding hub lookup response")?;
    if !resp.error.is_empty() || resp.proxy_ws_url.is_empty() {
        bail!("volume lookup failed: {}", resp.error);
    }
    Ok(resp.proxy_ws_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_not_found_response_omits_the_url_fields() {
        let resp: UrlResponse = serde_json::from_str(r#"{"error":"notfound alice/photos"}"#).unwrap();
        assert!(resp.ws_url.is_empty());
        assert!(resp.proxy_ws_url.is_empty());
        assert_eq!(resp.error, "notfound alice/photos");
    }

    #[test]
    fn a_lookup_response_carries_both_urls() {
        let resp: UrlResponse =
            serde_json::from_str(r#"{"ws_url":"ws://h/a","proxy_ws_url":"ws://h/b"}"#).unwrap();
        assert_eq!(resp.ws_url, "ws://h/a");
        assert_eq!(resp.proxy_ws_url, "ws://h/b");
        assert!(resp.error.is_empty());
    }
}
