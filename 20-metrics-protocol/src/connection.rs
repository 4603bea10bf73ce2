//! Per-connection request loop.
//!
//! The loop suspends only while waiting for bytes. Parsing, the store update
//! and response encoding run to completion between reads. Any malformed
//! request is answered with the error response and the connection stays open.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{
    command,
    framing::{Frame, RequestBuffer},
    protocol::{ERROR_RESPONSE, encode_reply},
    store::MetricStore,
};

const READ_CHUNK: usize = 4 * 1024;

/// Serves requests until the peer closes its side.
///
/// Returns an error only for transport failures; protocol errors never end
/// the connection.
pub async fn serve<S>(
    stream: S,
    store: Arc<MetricStore>,
    max_request_bytes: usize,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut requests = RequestBuffer::new(max_request_bytes);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            if requests.buffered_len() > 0 {
                debug!(
                    bytes = requests.buffered_len(),
                    "peer closed with an unterminated request"
                );
            }
            return Ok(());
        }

        let response = match requests.push(&chunk[..read]) {
            Frame::Pending => continue,
            Frame::Request(line) => respond(&line, &store),
            Frame::Rejected(reason) => {
                debug!(%reason, "rejected request");
                ERROR_RESPONSE.to_string()
            }
        };

        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }
}

fn respond(line: &str, store: &MetricStore) -> String {
    match command::execute(line, store) {
        Ok(reply) => encode_reply(&reply),
        Err(err) => {
            debug!(request = line, error = %err, "malformed command");
            ERROR_RESPONSE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{DuplexStream, duplex};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;
    use crate::framing::DEFAULT_MAX_REQUEST_BYTES;

    fn spawn_handler(
        store: Arc<MetricStore>,
    ) -> (DuplexStream, JoinHandle<std::io::Result<()>>) {
        let (client, server) = duplex(64 * 1024);
        let handle = tokio::spawn(serve(server, store, DEFAULT_MAX_REQUEST_BYTES));
        (client, handle)
    }

    async fn read_response(stream: &mut DuplexStream) -> String {
        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        while !response.ends_with(b"\n\n") {
            let read = timeout(Duration::from_secs(1), stream.read(&mut byte))
                .await
                .expect("response timed out")
                .expect("read from handler");
            assert_ne!(read, 0, "handler closed the stream");
            response.push(byte[0]);
        }
        String::from_utf8(response).expect("utf-8 response")
    }

    async fn roundtrip(stream: &mut DuplexStream, request: &[u8]) -> String {
        stream.write_all(request).await.expect("write request");
        read_response(stream).await
    }

    #[tokio::test]
    async fn put_then_get() {
        let (mut client, _handle) = spawn_handler(Arc::new(MetricStore::new()));

        assert_eq!(roundtrip(&mut client, b"put cpu 0.5 1000\n").await, "ok\n\n");
        assert_eq!(
            roundtrip(&mut client, b"get cpu\n").await,
            "ok\ncpu 0.5 1000\n\n"
        );
    }

    #[tokio::test]
    async fn request_split_across_writes() {
        let (mut client, _handle) = spawn_handler(Arc::new(MetricStore::new()));

        client.write_all(b"put cpu").await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(b" 2 10").await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(roundtrip(&mut client, b"\n").await, "ok\n\n");
        assert_eq!(
            roundtrip(&mut client, b"get cpu\n").await,
            "ok\ncpu 2.0 10\n\n"
        );
    }

    #[tokio::test]
    async fn malformed_requests_keep_connection_open() {
        let (mut client, _handle) = spawn_handler(Arc::new(MetricStore::new()));

        let requests: [&[u8]; 6] = [
            b"put a 1\n",
            b"get\n",
            b"\n",
            b"delete a\n",
            b"put a one 1\n",
            b"get \xff\n",
        ];
        for request in requests {
            assert_eq!(
                roundtrip(&mut client, request).await,
                "error\nwrong command\n\n"
            );
        }

        assert_eq!(roundtrip(&mut client, b"get unknown_metric\n").await, "ok\n\n");
    }

    #[tokio::test]
    async fn pipelined_puts_are_not_applied() {
        let store = Arc::new(MetricStore::new());
        let (mut client, _handle) = spawn_handler(Arc::clone(&store));

        assert_eq!(
            roundtrip(&mut client, b"put a 1 1\nput b 2 2\n").await,
            "error\nwrong command\n\n"
        );
        assert_eq!(store.metric_count(), 0);
        assert_eq!(roundtrip(&mut client, b"get *\n").await, "ok\n\n");
    }

    #[tokio::test]
    async fn leading_blank_line_is_accepted() {
        let (mut client, _handle) = spawn_handler(Arc::new(MetricStore::new()));

        assert_eq!(roundtrip(&mut client, b"\nput a 1 1\n").await, "ok\n\n");
    }

    #[tokio::test]
    async fn connections_share_one_store() {
        let store = Arc::new(MetricStore::new());
        let (mut writer, _first) = spawn_handler(Arc::clone(&store));
        let (mut reader, _second) = spawn_handler(Arc::clone(&store));

        assert_eq!(roundtrip(&mut writer, b"put b 2 300\n").await, "ok\n\n");
        assert_eq!(roundtrip(&mut writer, b"put b 1 100\n").await, "ok\n\n");
        assert_eq!(roundtrip(&mut writer, b"put a 5 200\n").await, "ok\n\n");

        assert_eq!(
            roundtrip(&mut reader, b"get *\n").await,
            "ok\na 5.0 200\nb 1.0 100\nb 2.0 300\n\n"
        );
    }

    #[tokio::test]
    async fn handler_returns_when_peer_closes() {
        let (client, handle) = spawn_handler(Arc::new(MetricStore::new()));
        drop(client);

        let result = timeout(Duration::from_secs(1), handle)
            .await
            .expect("handler should stop")
            .expect("handler task");
        assert!(result.is_ok());
    }
}
