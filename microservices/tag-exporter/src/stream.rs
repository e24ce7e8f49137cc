//! WebSocket transport for tag frames

use async_trait::async_trait;
use edgetag_core::{EdgeTagError, Result};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::client::TagStream;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTagStream {
    socket: Socket,
}

impl WebSocketTagStream {
    /// Dial `url`, giving up after `connect_timeout`. With `tls_insecure`,
    /// self-signed device certificates and mismatched host names are accepted.
    pub async fn connect(
        url: &str,
        tls: bool,
        tls_insecure: bool,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let connector = if tls {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(tls_insecure)
                .danger_accept_invalid_hostnames(tls_insecure)
                .build()
                .map_err(|e| EdgeTagError::Connection(format!("TLS setup failed: {}", e)))?;
            Some(Connector::NativeTls(connector))
        } else {
            None
        };

        let dial = tokio_tungstenite::connect_async_tls_with_config(url, None, false, connector);
        let (socket, _response) = tokio::time::timeout(connect_timeout, dial)
            .await
            .map_err(|_| {
                EdgeTagError::Connection(format!("handshake timed out after {:?}", connect_timeout))
            })?
            .map_err(|e| EdgeTagError::Connection(e.to_string()))?;

        Ok(Self { socket })
    }
}

#[async_trait]
impl TagStream for WebSocketTagStream {
    async fn next_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(frame))) => {
                    return Err(EdgeTagError::Stream(format!("closed by device: {:?}", frame)));
                }
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(EdgeTagError::Stream(e.to_string())),
                None => return Err(EdgeTagError::Stream("stream ended".to_string())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!(error = %e, "WebSocket close did not complete cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_silent_device_times_out() {
        // Accepted by the kernel backlog but never answered
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/api/v1/http/1?token=t", listener.local_addr().unwrap());

        let started = std::time::Instant::now();
        let result = WebSocketTagStream::connect(&url, false, true, Duration::from_millis(200)).await;

        assert!(matches!(result, Err(EdgeTagError::Connection(ref msg)) if msg.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }
}
