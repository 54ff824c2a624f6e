//! Session plumbing shared by the client and server halves: a writer pump
//! and a reader pump, a `rid -> waiter` correlation table, and the
//! `READY -> DRAINING -> CLOSED` tail of the protocol's session state
//! machine.
//!
//! The `INIT -> HANDSHAKE -> READY` head is handled by the two callers
//! directly, not inside [`Session::spawn`], because the two sides do
//! different things during the handshake: the client must *read* one
//! opening frame before it may issue any RPC (`RemoteVolume::connect`
//! does this on the raw stream before calling `spawn`, mirroring
//! `wsvolume/ws_volume.go`'s `BindConnection` doing
//! `v.conn.ReadJSON(data) // wait to establish.`); the server must *send*
//! one (`serve_volume` does this immediately after `spawn`, mirroring
//! `wsvolume/server.go`'s `HandleSession` doing
//! `conn.WriteJSON(&map[string]interface{}{})` before entering its request
//! loop). By the time `Session::spawn` runs on either side, the handshake
//! for that side is already satisfied, so it moves straight to `Ready`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{decode_binary_header, Request, Response};

pub const RPC_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Handshake,
    Ready,
    Draining,
    Closed,
}

/// What a pending call is waiting for: the JSON reply, or (for `read`) the
/// binary frame the success path replies with instead of JSON.
enum Reply {
    Json(Response),
    Binary(Vec<u8>),
}

struct PendingEntry {
    reply: oneshot::Sender<Reply>,
}

/// The two ways a `read` call can resolve: data, or a JSON error reply
/// (carrying its own `kind`/`message`, for the caller to turn into a
/// [`cfs_volume_core::PathError`]).
pub enum ReadOutcome {
    Bytes(Vec<u8>),
    Err(Response),
}

/// One multiplexed WebSocket connection speaking the volume protocol.
/// Cloning shares the same underlying connection and pending table; it
/// exists so both the public client handle and its background tasks can
/// hold a reference.
#[derive(Clone)]
pub struct Session {
    outbound: tokio::sync::mpsc::UnboundedSender<Message>,
    pending: Arc<Mutex<HashMap<u64, PendingEntry>>>,
    next_rid: Arc<AtomicU64>,
    state: Arc<Mutex<SessionState>>,
}

/// Something arriving on an established session with no registered waiter,
/// handed to the server half for dispatch (the client half never receives
/// these: it only ever gets responses, which the reader pump resolves
/// against `pending` itself).
pub enum Incoming {
    Request { rid: u64, request: Request },
    /// The binary payload frame accompanying a `write` request.
    WritePayload { rid: u64, payload: Vec<u8> },
}

impl Session {
    /// Spawns the writer pump and reader pump over an already-handshaken
    /// stream, and returns the session handle plus a receiver for fresh
    /// incoming requests (used by the server half).
    pub fn spawn<S>(ws: S) -> (Self, tokio::sync::mpsc::UnboundedReceiver<Incoming>)
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin
            + Send
            + 'static,
    {
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
        let (incoming_tx, incoming_rx) = tokio::sync::mpsc::unbounded_channel();
        let pending: Arc<Mutex<HashMap<u64, PendingEntry>>> = Arc::new(Mutex::new(HashMap::new()));
        let state = Arc::new(Mutex::new(SessionState::Ready));

        // Writer pump: the only task allowed to write to `sink`.
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader pump: demultiplexes text (JSON) and binary (read-reply)
        // frames by `rid`, resolving entries in `pending` or forwarding
        // fresh requests (server side) to `incoming_tx`.
        {
            let pending = pending.clone();
            let state = state.clone();
            tokio::spawn(async move {
                while let Some(next) = stream.next().await {
                    let Ok(msg) = next else { break };
                    match msg {
                        Message::Text(text) => {
                            if let Ok(resp) = serde_json::from_str::<Response>(&text) {
                                if let Some(entry) = pending.lock().remove(&resp.rid) {
                                    let _ = entry.reply.send(Reply::Json(resp));
                                    continue;
                                }
                            }
                            if let Ok(req) = serde_json::from_str::<RequestEnvelope>(&text) {
                                let _ = incoming_tx.send(Incoming::Request { rid: req.rid, request: req.request });
                            }
                        }
                        Message::Binary(bytes) => {
                            if let Some((_, rid)) = decode_binary_header(&bytes) {
                                let payload = bytes[crate::protocol::BINARY_HEADER_LEN..].to_vec();
                                if let Some(entry) = pending.lock().remove(&rid) {
                                    let _ = entry.reply.send(Reply::Binary(payload));
                                } else {
                                    let _ = incoming_tx.send(Incoming::WritePayload { rid, payload });
                                }
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                *state.lock() = SessionState::Closed;
            });
        }

        (Self { outbound: out_tx, pending, next_rid: Arc::new(AtomicU64::new(1)), state }, incoming_rx)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn next_rid(&self) -> u64 {
        self.next_rid.fetch_add(1, Ordering::Relaxed)
    }

    pub fn send_text(&self, text: String) -> Result<(), crate::Error> {
        self.outbound.send(Message::Text(text)).map_err(|_| crate::Error::Closed)
    }

    pub fn send_binary(&self, bytes: Vec<u8>) -> Result<(), crate::Error> {
        self.outbound.send(Message::Binary(bytes)).map_err(|_| crate::Error::Closed)
    }

    async fn await_reply(&self, rid: u64, reply_rx: oneshot::Receiver<Reply>) -> Result<Reply, crate::Error> {
        tokio::time::timeout(RPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| {
                self.pending.lock().remove(&rid);
                crate::Error::Timeout
            })?
            .map_err(|_| crate::Error::Closed)
    }

    /// Sends `request` as a text frame and waits up to [`RPC_TIMEOUT`] for
    /// the matching JSON [`Response`].
    pub async fn call(&self, rid: u64, request: &Request) -> Result<Response, crate::Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(rid, PendingEntry { reply: reply_tx });
        let envelope = RequestEnvelope { rid, request: request.clone() };
        self.send_text(serde_json::to_string(&envelope)?)?;
        match self.await_reply(rid, reply_rx).await? {
            Reply::Json(resp) => Ok(resp),
            Reply::Binary(_) => Err(crate::Error::Protocol("expected a JSON reply, got a binary frame".into())),
        }
    }

    /// For `read`: sends the text request, then awaits either the binary
    /// reply frame (success, returns the bytes) or a JSON error reply.
    pub async fn call_read(&self, rid: u64, request: &Request) -> Result<ReadOutcome, crate::Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(rid, PendingEntry { reply: reply_tx });
        let envelope = RequestEnvelope { rid, request: request.clone() };
        self.send_text(serde_json::to_string(&envelope)?)?;
        match self.await_reply(rid, reply_rx).await? {
            Reply::Binary(bytes) => Ok(ReadOutcome::Bytes(bytes)),
            Reply::Json(resp) => Ok(ReadOutcome::Err(resp)),
        }
    }

    /// For `write`: the JSON envelope is sent first, followed immediately
    /// by a binary frame carrying `payload` under the same `rid`, and the
    /// JSON acknowledgement is awaited.
    pub async fn call_write(&self, rid: u64, request: &Request, payload: Vec<u8>) -> Result<Response, crate::Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(rid, PendingEntry { reply: reply_tx });

        let envelope = RequestEnvelope { rid, request: request.clone() };
        self.send_text(serde_json::to_string(&envelope)?)?;
        let header = crate::protocol::encode_binary_header(crate::protocol::BinaryFrameType::WritePayload, rid);
        let mut frame = header.to_vec();
        frame.extend_from_slice(&payload);
        self.send_binary(frame)?;

        match self.await_reply(rid, reply_rx).await? {
            Reply::Json(resp) => Ok(resp),
            Reply::Binary(_) => Err(crate::Error::Protocol("expected a JSON reply, got a binary frame".into())),
        }
    }

    pub fn reply_text(&self, response: &Response) -> Result<(), crate::Error> {
        self.send_text(serde_json::to_string(response)?)
    }

    pub fn reply_binary(&self, rid: u64, bytes: &[u8]) -> Result<(), crate::Error> {
        let header = crate::protocol::encode_binary_header(crate::protocol::BinaryFrameType::ReadReply, rid);
        let mut frame = header.to_vec();
        frame.extend_from_slice(bytes);
        self.send_binary(frame)
    }

    pub fn mark_draining(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Ready {
            *state = SessionState::Draining;
        }
    }

    /// Idempotent: closing an already-closed session is a no-op.
    pub fn terminate(&self) {
        let mut state = self.state.lock();
        if *state != SessionState::Closed {
            *state = SessionState::Closed;
            let _ = self.outbound.send(Message::Close(None));
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RequestEnvelope {
    rid: u64,
    #[serde(flatten)]
    request: Request,
}
