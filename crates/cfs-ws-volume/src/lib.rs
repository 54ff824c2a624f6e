//! The WebSocket Volume Protocol: a multiplexed RPC tunnel that exposes a
//! [`cfs_volume_core::Volume`] across a WebSocket connection.
//!
//! [`client::RemoteVolume`] is the client half (itself a `Volume`), and
//! [`server::serve_volume`] is the server half that answers RPCs against a
//! local `Volume`. Both share [`session::Session`] for framing,
//! correlation, and the connection state machine.

mod client;
mod error;
mod readahead;
pub mod protocol;
mod server;
mod session;
mod stat_cache;

pub use client::RemoteVolume;
pub use error::Error;
pub use server::serve_volume;
pub use session::{SessionState, RPC_TIMEOUT};
pub use stat_cache::STAT_CACHE_TTL;
