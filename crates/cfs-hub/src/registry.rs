use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

/// A frame the hub queues for a publisher's control channel. Serializes
/// exactly like the publisher control-channel protocol's outbound frames.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ControlMessage {
    Response {
        action: &'static str,
        status: &'static str,
    },
    Connect {
        action: &'static str,
        ws_url: String,
        target: &'static str,
    },
}

impl ControlMessage {
    pub fn response(status: &'static str) -> Self {
        ControlMessage::Response {
            action: "response",
            status,
        }
    }

    pub fn connect(ws_url: String) -> Self {
        ControlMessage::Connect {
            action: "connect",
            ws_url,
            target: "file",
        }
    }
}

/// A publisher currently registered with the hub: a live control channel
/// the hub can push `connect` notifications onto, plus the connect URL the
/// publisher advertised (historical direct-connect path; may be empty).
pub struct PublishedVolume {
    pub control_tx: mpsc::UnboundedSender<ControlMessage>,
    pub connect_url: String,
}

/// `owner/name -> PublishedVolume`, mutex-guarded: lookups and inserts are
/// uncontended single-map operations, never held across network I/O.
#[derive(Default)]
pub struct Registry {
    published: Mutex<HashMap<String, PublishedVolume>>,
}

fn key(owner: &str, name: &str) -> String {
    format!("{owner}/{name}")
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, owner: &str, name: &str, volume: PublishedVolume) {
        self.published.lock().insert(key(owner, name), volume);
    }

    pub fn unpublish(&self, owner: &str, name: &str) {
        self.published.lock().remove(&key(owner, name));
    }

    pub fn connect_url(&self, owner: &str, name: &str) -> Option<String> {
        self.published
            .lock()
            .get(&key(owner, name))
            .map(|v| v.connect_url.clone())
    }

    pub fn is_published(&self, owner: &str, name: &str) -> bool {
        self.published.lock().contains_key(&key(owner, name))
    }

    /// Pushes a `connect` notification to the named publisher's control
    /// channel. Returns `Err(())` if no publisher is currently registered
    /// under that name or its control channel has gone away.
    pub fn notify_connect(&self, owner: &str, name: &str, proxy_ws_url: String) -> Result<(), ()> {
        let guard = self.published.lock();
        match guard.get(&key(owner, name)) {
            Some(v) => v
                .control_tx
                .send(ControlMessage::connect(proxy_ws_url))
                .map_err(|_| ()),
            None => Err(()),
        }
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_connect_fails_when_nothing_is_published() {
        let registry = Registry::new();
        assert!(registry.notify_connect("u", "v", "ws://x".into()).is_err());
    }

    #[test]
    fn publish_then_notify_delivers_a_connect_frame() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.publish(
            "u",
            "v",
            PublishedVolume {
                control_tx: tx,
                connect_url: String::new(),
            },
        );
        assert!(registry.is_published("u", "v"));

        registry
            .notify_connect("u", "v", "ws://host/proxy/abc".into())
            .unwrap();
        match rx.try_recv().unwrap() {
            ControlMessage::Connect { ws_url, .. } => assert_eq!(ws_url, "ws://host/proxy/abc"),
            other => panic!("unexpected message: {other:?}"),
        }

        registry.unpublish("u", "v");
        assert!(!registry.is_published("u", "v"));
    }
}
