//! Raw TCP transport
//!
//! Every successful read becomes one message, so frame boundaries are
//! whatever the peer's writes and the kernel make of them. Good enough for
//! line-oriented feeds and for local testing.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::config::{BinaryType, SocketConfig};
use super::message::Message;
use super::socket::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use super::transport::{ConnectFuture, Connection, ConnectionPeer, Connector, Outbound};

/// Connects to `tcp://host:port` (the scheme is optional)
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
    read_buffer_size: usize,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            nodelay: true,
            read_buffer_size: 64 * 1024, // 64KB
        }
    }
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }
}

impl Connector for TcpConnector {
    fn connect(&self, url: &str, config: &SocketConfig) -> ConnectFuture {
        let addr = url.strip_prefix("tcp://").unwrap_or(url).to_string();
        let binary_type = config.binary_type;
        let nodelay = self.nodelay;
        let read_buffer_size = self.read_buffer_size;

        Box::pin(async move {
            let stream = TcpStream::connect(&addr).await?;
            if nodelay {
                stream.set_nodelay(true)?;
            }
            tracing::debug!(addr = %addr, "TCP connected");

            let (connection, peer) = Connection::pair();
            tokio::spawn(pump(stream, peer, binary_type, read_buffer_size));
            Ok(connection)
        })
    }
}

async fn pump(stream: TcpStream, peer: ConnectionPeer, binary_type: BinaryType, read_buffer_size: usize) {
    let (mut reader, mut writer) = stream.into_split();
    let (sender, mut outbound) = peer.into_split();
    let mut buf = BytesMut::with_capacity(read_buffer_size);

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    sender.close(CLOSE_NORMAL, "eof", true);
                    break;
                }
                Ok(_) => {
                    let chunk = buf.split().freeze();
                    let message = match binary_type {
                        BinaryType::Binary => Message::Binary(chunk),
                        BinaryType::Text => Message::Text(String::from_utf8_lossy(&chunk).into_owned()),
                    };
                    if !sender.deliver(message) {
                        break;
                    }
                    buf.reserve(read_buffer_size);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "TCP read failed");
                    sender.error(e.to_string());
                    sender.close(CLOSE_ABNORMAL, e.to_string(), false);
                    break;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Send(message)) => {
                    if let Err(e) = writer.write_all(message.as_bytes()).await {
                        tracing::debug!(error = %e, "TCP write failed");
                        sender.error(e.to_string());
                        sender.close(CLOSE_ABNORMAL, e.to_string(), false);
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = writer.shutdown().await;
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::Error;
    use crate::socket::transport::TransportEvent;

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4];
            stream.read_exact(&mut request).await.unwrap();
            stream.write_all(b"pong").await.unwrap();
            request
        });

        let config = SocketConfig::new().binary_type(BinaryType::Text);
        let connection = TcpConnector::new()
            .connect(&format!("tcp://{}", addr), &config)
            .await
            .unwrap();
        connection.send(Message::from("ping")).unwrap();
        let (_outbound, mut inbound) = connection.into_parts();

        assert_eq!(
            inbound.recv().await,
            Some(TransportEvent::Message(Message::from("pong")))
        );
        assert_eq!(&server.await.unwrap(), b"ping");
        assert_eq!(
            inbound.recv().await,
            Some(TransportEvent::Closed {
                code: CLOSE_NORMAL,
                reason: "eof".into(),
                was_clean: true
            })
        );
    }

    #[tokio::test]
    async fn test_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpConnector::new()
            .connect(&addr.to_string(), &SocketConfig::default())
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
