#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("session closed")]
    Closed,
    #[error("rpc timed out")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl From<Error> for cfs_volume_core::PathError {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Closed => cfs_volume_core::PathErrorKind::Closed,
            Error::Timeout => cfs_volume_core::PathErrorKind::Timeout,
            _ => cfs_volume_core::PathErrorKind::Other,
        };
        cfs_volume_core::PathError::with_source("", kind, err)
    }
}
