use std::collections::HashMap;

use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio_tungstenite::WebSocketStream;

/// A mounter's upgraded `proxy/new` socket, held by connection id until the
/// publisher dials `proxy/<id>` to complete the splice.
#[derive(Default)]
pub struct ProxyRegistry {
    pending: Mutex<HashMap<String, WebSocketStream<TokioIo<Upgraded>>>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cid: String, ws: WebSocketStream<TokioIo<Upgraded>>) {
        self.pending.lock().insert(cid, ws);
    }

    /// Removes and returns the mounter socket waiting under `cid`, if any.
    pub fn take(&self, cid: &str) -> Option<WebSocketStream<TokioIo<Upgraded>>> {
        self.pending.lock().remove(cid)
    }
}
