//! Server half: [`serve_volume`] drives one WebSocket connection,
//! dispatching decoded requests against a shared [`cfs_volume_core::Volume`]
//! and replying with the matching [`crate::protocol::Response`].
//!
//! Each request is handled in its own spawned task, so one slow `read`
//! never stalls `stat`/`files` calls sharing the same connection. There is
//! no shared handle table: every `read`/`write` opens the volume path for
//! just that call, matching `wsvolume/server.go`'s `readBlock`/`writeBlock`
//! (`v.Open(path)`, do the I/O, `defer f.Close()`), so there is nothing to
//! hold a lock across an `.await` on volume I/O in the first place.

use std::collections::HashMap;
use std::sync::Arc;

use cfs_volume_core::{PathError, Volume};
use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{Request, Response};
use crate::session::{Incoming, Session};

/// Drives `ws` until the peer disconnects, serving `volume` over the
/// volume protocol. Sends the opening handshake frame immediately (the
/// `HANDSHAKE -> READY` transition from the client's point of view),
/// mirroring `wsvolume/server.go`'s `HandleSession` writing an empty JSON
/// object before entering its request loop. `auth_token`, if set, is
/// unused by this protocol (the wire operations carry no auth frame of
/// their own); callers that need auth gate it at a layer above, the way
/// `cfs-hub`'s control channel does.
pub async fn serve_volume<S>(ws: S, volume: Arc<dyn Volume>, _auth_token: Option<String>)
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    let (session, mut incoming) = Session::spawn(ws);
    if session.send_text("{}".to_string()).is_err() {
        return;
    }

    // `Write` requests arrive as a text frame followed by a binary payload
    // frame sharing the same `rid`; stash the request until its payload
    // shows up, then dispatch both together.
    let mut pending_writes: HashMap<u64, Request> = HashMap::new();

    while let Some(event) = incoming.recv().await {
        match event {
            Incoming::Request { rid, request } => {
                if matches!(request, Request::Write { .. }) {
                    pending_writes.insert(rid, request);
                    continue;
                }
                let volume = volume.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    dispatch(&volume, &session, rid, request).await;
                });
            }
            Incoming::WritePayload { rid, payload } => {
                let Some(request) = pending_writes.remove(&rid) else { continue };
                let volume = volume.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    handle_write(&volume, &session, rid, request, payload).await;
                });
            }
        }
    }
    tracing::debug!("volume session reader pump exited, connection closing");
}

async fn dispatch(volume: &Arc<dyn Volume>, session: &Session, rid: u64, request: Request) {
    match request {
        Request::Stat { path } => {
            let resp = match volume.stat(&path).await {
                Ok(info) => Response { stat: Some((&info).into()), ..Response::ok(rid) },
                Err(e) => err_response(rid, e),
            };
            let _ = session.reply_text(&resp);
        }
        Request::ReadDir { path } => {
            let resp = match volume.read_dir(&path).await {
                Ok(entries) => {
                    Response { files: Some(entries.iter().map(Into::into).collect()), ..Response::ok(rid) }
                }
                Err(e) => err_response(rid, e),
            };
            let _ = session.reply_text(&resp);
        }
        Request::Mkdir { path } => {
            let resp = match volume.mkdir(&path).await {
                Ok(()) => Response::ok(rid),
                Err(e) => err_response(rid, e),
            };
            let _ = session.reply_text(&resp);
        }
        Request::Remove { path } => {
            let resp = match volume.remove(&path).await {
                Ok(()) => Response::ok(rid),
                Err(e) => err_response(rid, e),
            };
            let _ = session.reply_text(&resp);
        }
        Request::Read { path, p, l } => {
            let result = read_block(volume, &path, p, l).await;
            match result {
                Ok(bytes) => {
                    let _ = session.reply_binary(rid, &bytes);
                }
                Err(e) => {
                    let _ = session.reply_text(&err_response(rid, e));
                }
            }
        }
        Request::Write { .. } => unreachable!("Write requests are buffered until their payload arrives, see handle_write"),
    }
}

async fn handle_write(volume: &Arc<dyn Volume>, session: &Session, rid: u64, request: Request, payload: Vec<u8>) {
    let Request::Write { path, p } = request else { return };
    let resp = match write_block(volume, &path, p, &payload).await {
        Ok(n) => Response { l: Some(n as u64), ..Response::ok(rid) },
        Err(e) => err_response(rid, e),
    };
    let _ = session.reply_text(&resp);
}

async fn read_block(volume: &Arc<dyn Volume>, path: &str, offset: i64, len: u32) -> Result<Vec<u8>, PathError> {
    let mut reader = volume.open_reader(path).await?;
    let mut buf = vec![0u8; len as usize];
    let n = reader
        .read_at(offset.max(0) as u64, &mut buf)
        .await
        .map_err(|e| PathError::from_io(path, e))?;
    buf.truncate(n);
    Ok(buf)
}

async fn write_block(volume: &Arc<dyn Volume>, path: &str, offset: i64, data: &[u8]) -> Result<usize, PathError> {
    let mut writer = volume.open_writer(path, true).await?;
    writer.write_at(offset.max(0) as u64, data).await.map_err(|e| PathError::from_io(path, e))
}

fn err_response(rid: u64, err: PathError) -> Response {
    Response::err(rid, err.kind, err.to_string())
}
