use std::sync::Arc;

use cfs_volume_core::Volume;
use cfs_volume_mem::MemVolume;
use tokio::net::TcpListener;

async fn spawn_server(volume: Arc<dyn Volume>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        cfs_ws_volume::serve_volume(ws, volume, None).await;
    });
    format!("ws://{addr}")
}

#[tokio::test]
async fn stat_and_read_round_trip_over_websocket() {
    let mem = MemVolume::new();
    {
        let mut w = mem.open_writer("dir/f.txt", true).await.unwrap();
        cfs_volume_core::FileWriter::write_at(&mut *w, 0, b"remote bytes").await.unwrap();
    }
    let url = spawn_server(Arc::new(mem)).await;

    let remote = cfs_ws_volume::RemoteVolume::connect(&url).await.unwrap();
    let info = remote.stat("dir/f.txt").await.unwrap();
    assert_eq!(info.size, 12);

    let mut reader = remote.open_reader("dir/f.txt").await.unwrap();
    let mut buf = [0u8; 6];
    let n = cfs_volume_core::FileReader::read_at(&mut *reader, 7, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"bytes");
}

#[tokio::test]
async fn write_through_remote_volume_is_visible_on_server_side() {
    let mem = Arc::new(MemVolume::new());
    let url = spawn_server(mem.clone()).await;

    let remote = cfs_ws_volume::RemoteVolume::connect(&url).await.unwrap();
    {
        let mut w = remote.open_writer("d/new.txt", true).await.unwrap();
        cfs_volume_core::FileWriter::write_at(&mut *w, 0, b"hi").await.unwrap();
    }
    let info = mem.stat("d/new.txt").await.unwrap();
    assert_eq!(info.size, 2);
}

#[tokio::test]
async fn stat_of_missing_path_is_not_found() {
    let mem = Arc::new(MemVolume::new());
    let url = spawn_server(mem).await;
    let remote = cfs_ws_volume::RemoteVolume::connect(&url).await.unwrap();
    let err = remote.stat("nope.txt").await.unwrap_err();
    assert_eq!(err.kind, cfs_volume_core::PathErrorKind::NotFound);
}

#[tokio::test]
async fn read_dir_populates_the_stat_cache_for_children() {
    let mem = Arc::new(MemVolume::new());
    {
        let mut w = mem.open_writer("a.txt", true).await.unwrap();
        cfs_volume_core::FileWriter::write_at(&mut *w, 0, b"abc").await.unwrap();
    }
    let url = spawn_server(mem.clone()).await;
    let remote = cfs_ws_volume::RemoteVolume::connect(&url).await.unwrap();

    let entries = remote.read_dir("").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size, 3);

    // Mutate the file directly on the server side, bypassing any RPC that
    // would invalidate the client's cache. If `read_dir` had not
    // populated the stat cache, this `stat` would issue a fresh RPC and
    // observe the new size; since it did, the cached entry still wins.
    {
        let mut w = mem.open_writer("a.txt", true).await.unwrap();
        cfs_volume_core::FileWriter::write_at(&mut *w, 0, b"a much longer replacement").await.unwrap();
    }
    let info = remote.stat("a.txt").await.unwrap();
    assert_eq!(info.size, 3);
}
