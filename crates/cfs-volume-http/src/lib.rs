//! Read-only [`cfs_volume_core::Volume`] fronting a plain HTTP file
//! server: `stat` issues a `HEAD`, and `open_reader` issues a `GET` that is
//! either deferred until the first read (`lazy_open`) or started eagerly.
//! A sequential `ReadAt` continues the open response body; any
//! non-sequential `ReadAt` reopens with a fresh `Range: bytes=N-` request.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use cfs_volume_core::{
    normalize_path, Capabilities, FileInfo, FileMode, FileReader, PathError, PathResult, Volume,
};
use futures_util::{Stream, StreamExt};
use reqwest::Client;

pub struct HttpVolume {
    base_url: String,
    client: Client,
    lazy_open: bool,
}

impl HttpVolume {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: Client::new(), lazy_open: false }
    }

    pub fn lazy(mut self, lazy_open: bool) -> Self {
        self.lazy_open = lazy_open;
        self
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn to_io_err(err: reqwest::Error) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, err)
    }
}

#[async_trait]
impl Volume for HttpVolume {
    async fn stat(&self, path: &str) -> PathResult<FileInfo> {
        let rel = normalize_path(path)?;
        let url = self.url_for(&rel);
        let resp = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| PathError::with_source(&rel, cfs_volume_core::PathErrorKind::Other, e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PathError::not_found(rel));
        }
        if !resp.status().is_success() {
            return Err(PathError::new(rel, cfs_volume_core::PathErrorKind::Other));
        }
        let size = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let updated = resp
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| httpdate_to_offset(v))
            .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
        Ok(FileInfo {
            path: rel,
            size,
            created_time: updated,
            updated_time: updated,
            mode: FileMode::default(),
            metadata: Default::default(),
        })
    }

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>> {
        Err(PathError::unsupported(path))
    }

    async fn open_reader(&self, path: &str) -> PathResult<Box<dyn FileReader>> {
        let rel = normalize_path(path)?;
        let mut reader = HttpReader {
            client: self.client.clone(),
            url: self.url_for(&rel),
            pos: 0,
            stream: None,
            leftover: Bytes::new(),
        };
        if !self.lazy_open {
            reader
                .ensure_stream(0)
                .await
                .map_err(|e| PathError::with_source(&rel, cfs_volume_core::PathErrorKind::Other, e))?;
        }
        Ok(Box::new(reader))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct HttpReader {
    client: Client,
    url: String,
    pos: u64,
    stream: Option<ByteStream>,
    leftover: Bytes,
}

impl HttpReader {
    async fn ensure_stream(&mut self, offset: u64) -> std::io::Result<()> {
        if self.stream.is_some() && offset == self.pos {
            return Ok(());
        }
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={offset}-"))
            .send()
            .await
            .map_err(HttpVolume::to_io_err)?;
        self.stream = Some(Box::pin(resp.bytes_stream()));
        self.leftover = Bytes::new();
        self.pos = offset;
        Ok(())
    }
}

#[async_trait]
impl FileReader for HttpReader {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.ensure_stream(offset).await?;
        let mut filled = 0;
        while filled < buf.len() {
            if self.leftover.is_empty() {
                match self.stream.as_mut().expect("stream ensured above").next().await {
                    Some(Ok(chunk)) => self.leftover = chunk,
                    Some(Err(e)) => return Err(HttpVolume::to_io_err(e)),
                    None => break,
                }
            }
            let n = (buf.len() - filled).min(self.leftover.len());
            buf[filled..filled + n].copy_from_slice(&self.leftover[..n]);
            self.leftover = self.leftover.slice(n..);
            filled += n;
            self.pos += n as u64;
        }
        Ok(filled)
    }

    async fn size(&self) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "size requires a stat(), not available mid-stream",
        ))
    }
}

fn httpdate_to_offset(value: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(value, &time::format_description::well_known::Rfc2822).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joining_avoids_double_slash() {
        let vol = HttpVolume::new("http://example.invalid/files/");
        assert_eq!(vol.url_for("a/b.txt"), "http://example.invalid/files/a/b.txt");
    }
}
