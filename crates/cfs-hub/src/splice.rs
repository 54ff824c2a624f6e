use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Random base-36 rendering of a 64-bit value, used as a proxy connection id.
pub fn random_cid() -> String {
    let n: u64 = rand::random();
    to_base36(n)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

/// Splices `mounter` and `publisher` byte-for-byte, preserving text/binary
/// frame type, until either side errors or closes. Neither socket's
/// contents are parsed; the hub is transparent once both sides attach.
pub async fn splice<S>(mounter: WebSocketStream<S>, publisher: WebSocketStream<S>, cid: &str)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut mounter_sink, mut mounter_stream) = mounter.split();
    let (mut publisher_sink, mut publisher_stream) = publisher.split();

    // The mounter side gets a single empty JSON object frame first, matching
    // the handshake the WebSocket volume protocol's reader pump expects.
    if mounter_sink.send(Message::Text("{}".to_string())).await.is_err() {
        return;
    }

    let cid_a = cid.to_string();
    let publisher_to_mounter = tokio::spawn(async move {
        while let Some(Ok(msg)) = publisher_stream.next().await {
            let is_close = matches!(msg, Message::Close(_));
            if mounter_sink.send(msg).await.is_err() || is_close {
                break;
            }
        }
        tracing::debug!(cid = %cid_a, "publisher->mounter splice leg ended");
    });

    let cid_b = cid.to_string();
    let mounter_to_publisher = tokio::spawn(async move {
        while let Some(Ok(msg)) = mounter_stream.next().await {
            let is_close = matches!(msg, Message::Close(_));
            if publisher_sink.send(msg).await.is_err() || is_close {
                break;
            }
        }
        tracing::debug!(cid = %cid_b, "mounter->publisher splice leg ended");
    });

    let _ = tokio::join!(publisher_to_mounter, mounter_to_publisher);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn connect_pair() -> (WebSocketStream<TcpStream>, WebSocketStream<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(stream).await.unwrap()
        });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let server = accept.await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn text_and_binary_frames_are_preserved_across_the_splice() {
        let (mounter_client, mounter_server) = connect_pair().await;
        let (publisher_client, publisher_server) = connect_pair().await;

        tokio::spawn(splice(mounter_server, publisher_server, "t1"));

        let mut mounter_client = mounter_client;
        // the handshake frame lands first
        let handshake = mounter_client.next().await.unwrap().unwrap();
        assert_eq!(handshake.into_text().unwrap(), "{}");

        let mut publisher_client = publisher_client;
        publisher_client
            .send(Message::Text("hello".to_string()))
            .await
            .unwrap();
        let forwarded = mounter_client.next().await.unwrap().unwrap();
        assert_eq!(forwarded.into_text().unwrap(), "hello");

        mounter_client
            .send(Message::Binary(vec![1, 2, 3]))
            .await
            .unwrap();
        let forwarded = publisher_client.next().await.unwrap().unwrap();
        assert_eq!(forwarded.into_data(), vec![1, 2, 3]);
    }
}
