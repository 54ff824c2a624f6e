use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use hyper_tungstenite::tungstenite::Message;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

use crate::proxy::ProxyRegistry;
use crate::registry::{ControlMessage, PublishedVolume, Registry};
use crate::splice;

type Body = BoxBody<Bytes, Infallible>;

/// State shared by every connection the hub accepts.
pub struct HubState {
    pub registry: Registry,
    pub proxy: ProxyRegistry,
    pub token: String,
}

impl HubState {
    pub fn new(token: String) -> Self {
        Self {
            registry: Registry::new(),
            proxy: ProxyRegistry::new(),
            token,
        }
    }
}

/// Binds `addr` and serves the hub's HTTP+WebSocket surface until the
/// process is signalled to stop. Each accepted connection runs on its own
/// task, matching the per-connection concurrency model used throughout.
pub async fn run(addr: SocketAddr, state: Arc<HubState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "cfs-hubd listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = hyper::service::service_fn(move |req| {
                let state = state.clone();
                async move { route(req, state, peer).await }
            });
            if let Err(err) = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(io, service)
                .await
            {
                tracing::debug!(%peer, error = %err, "connection ended with error");
            }
        });
    }
}

async fn route(
    mut req: Request<Incoming>,
    state: Arc<HubState>,
    peer: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match (req.method().clone(), segments.as_slice()) {
        (hyper::Method::GET, ["status"]) => Ok(json_response(
            StatusCode::OK,
            &json!({"_status": 200, "message": "It works!"}),
        )),
        (hyper::Method::POST, ["volumes", owner, name]) => {
            Ok(handle_register_url(&req, owner, name))
        }
        (hyper::Method::GET, ["volumes", owner, name]) => {
            Ok(handle_lookup(&req, &state, owner, name))
        }
        (hyper::Method::GET, ["volumes", owner, name, "ws"]) if hyper_tungstenite::is_upgrade_request(&req) => {
            handle_control_upgrade(&mut req, state, owner.to_string(), name.to_string())
        }
        (hyper::Method::GET, ["volumes", owner, name, "proxy", cid])
            if hyper_tungstenite::is_upgrade_request(&req) =>
        {
            handle_proxy_upgrade(
                &mut req,
                state,
                owner.to_string(),
                name.to_string(),
                cid.to_string(),
                peer,
            )
        }
        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            &json!({"error": "not found"}),
        )),
    };

    Ok(result.unwrap_or_else(|err: anyhow::Error| {
        tracing::warn!(error = %err, "request failed");
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({"error": err.to_string()}),
        )
    }))
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Body> {
    let bytes = Bytes::from(serde_json::to_vec(value).unwrap());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(bytes).boxed())
        .unwrap()
}

fn request_host(req: &Request<Incoming>) -> String {
    req.headers()
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080")
        .to_string()
}

fn handle_register_url(req: &Request<Incoming>, owner: &str, name: &str) -> Response<Body> {
    let ws_url = format!("ws://{}/volumes/{owner}/{name}/ws", request_host(req));
    json_response(StatusCode::OK, &json!({"ws_url": ws_url}))
}

fn handle_lookup(req: &Request<Incoming>, state: &HubState, owner: &str, name: &str) -> Response<Body> {
    if !state.registry.is_published(owner, name) {
        return json_response(
            StatusCode::NOT_FOUND,
            &json!({"error": format!("notfound {owner}/{name}")}),
        );
    }
    let host = request_host(req);
    let ws_url = state.registry.connect_url(owner, name).unwrap_or_default();
    let proxy_ws_url = format!("ws://{host}/volumes/{owner}/{name}/proxy/new");
    json_response(StatusCode::OK, &json!({"ws_url": ws_url, "proxy_ws_url": proxy_ws_url}))
}

fn handle_control_upgrade(
    req: &mut Request<Incoming>,
    state: Arc<HubState>,
    owner: String,
    name: String,
) -> anyhow::Result<Response<Body>> {
    let (response, websocket) = hyper_tungstenite::upgrade(req, None)?;
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => control_channel(ws, owner, name, state).await,
            Err(err) => tracing::warn!(error = %err, "control channel upgrade failed"),
        }
    });
    Ok(response.map(|b| b.boxed()))
}

fn handle_proxy_upgrade(
    req: &mut Request<Incoming>,
    state: Arc<HubState>,
    owner: String,
    name: String,
    cid: String,
    peer: SocketAddr,
) -> anyhow::Result<Response<Body>> {
    let host = request_host(req);
    let (response, websocket) = hyper_tungstenite::upgrade(req, None)?;
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => proxy_leg(ws, state, owner, name, cid, host).await,
            Err(err) => tracing::warn!(%peer, error = %err, "proxy upgrade failed"),
        }
    });
    Ok(response.map(|b| b.boxed()))
}

#[derive(Deserialize)]
struct ControlFrame {
    action: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
struct ControlResponse {
    action: &'static str,
    status: &'static str,
}

/// Drives one publisher's control channel: auth gate, then `volume`
/// registrations, forwarding queued `connect` notifications as they arrive
/// from mounters. Runs until the socket closes, then unpublishes.
async fn control_channel(
    ws: tokio_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>,
    owner: String,
    name: String,
    state: Arc<HubState>,
) {
    let (mut sink, mut stream) = ws.split();
    let (control_tx, mut control_rx) = tokio::sync::mpsc::unbounded_channel::<ControlMessage>();
    let mut authed = false;
    let mut published = false;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let Some(Ok(msg)) = incoming else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(frame) = serde_json::from_str::<ControlFrame>(&text) else { continue };
                match frame.action.as_str() {
                    "auth" => {
                        authed = frame.token.as_deref() == Some(state.token.as_str());
                        let status = if authed { "ok" } else { "invalid_token" };
                        let body = serde_json::to_string(&ControlResponse { action: "response", status }).unwrap();
                        if sink.send(Message::Text(body)).await.is_err() {
                            break;
                        }
                    }
                    "volume" if authed => {
                        state.registry.publish(&owner, &name, PublishedVolume {
                            control_tx: control_tx.clone(),
                            connect_url: frame.url.unwrap_or_default(),
                        });
                        published = true;
                        let _ = frame.name; // registration key comes from the URL, not the frame
                    }
                    _ if !authed => {
                        let body = serde_json::to_string(&ControlResponse { action: "response", status: "auth required" }).unwrap();
                        if sink.send(Message::Text(body)).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            Some(ctl) = control_rx.recv() => {
                let body = serde_json::to_string(&ctl).unwrap();
                if sink.send(Message::Text(body)).await.is_err() {
                    break;
                }
            }
        }
    }

    if published {
        state.registry.unpublish(&owner, &name);
    }
}

/// Handles one leg of a proxy connection. `cid == "new"` means a mounter
/// just attached and is waiting for the publisher to join; any other value
/// is the publisher attaching to a pending mounter socket, at which point
/// both sides are spliced together.
async fn proxy_leg(
    ws: tokio_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>,
    state: Arc<HubState>,
    owner: String,
    name: String,
    cid: String,
    host: String,
) {
    if cid == "new" {
        let cid = splice::random_cid();
        let proxy_ws_url = format!("ws://{host}/volumes/{owner}/{name}/proxy/{cid}");
        state.proxy.insert(cid.clone(), ws);
        if state.registry.notify_connect(&owner, &name, proxy_ws_url).is_err() {
            tracing::warn!(%owner, %name, "mounter attached but no publisher is registered");
            state.proxy.take(&cid);
        }
    } else if let Some(mounter) = state.proxy.take(&cid) {
        splice::splice(mounter, ws, &cid).await;
    } else {
        tracing::warn!(%cid, "publisher attached to an unknown or already-spliced proxy id");
    }
}
