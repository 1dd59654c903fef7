//! IPC transport implementations

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec;
use crate::error::IpcError;
use crate::protocol::Message;

/// How long `close` waits for queued frames to reach the peer
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Bidirectional, message-oriented connection between the manager and one worker
#[async_trait]
pub trait Channel: Send {
    /// Queue a message for the other end. Fails once the connection is known
    /// to be broken.
    fn send(&mut self, message: Message) -> Result<(), IpcError>;

    /// Take the next buffered message without waiting
    fn try_recv(&mut self) -> Result<Option<Message>, IpcError>;

    /// Wait up to `timeout` for the next message
    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message>, IpcError>;

    /// Close the channel
    async fn close(&mut self) -> Result<(), IpcError>;

    /// Human readable peer description used in logs
    fn label(&self) -> &str;
}

/// Channel over any async byte stream.
///
/// A reader task decodes incoming frames into an unbounded queue and a writer
/// task drains an unbounded queue of outgoing frames, so `send` and `try_recv`
/// never block the caller. Either task marks the channel broken when its half
/// of the stream fails or reaches EOF.
pub struct StreamChannel {
    label: String,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    inbound: mpsc::UnboundedReceiver<Message>,
    broken: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl StreamChannel {
    /// Create a channel from a reader/writer pair
    pub fn new<R, W>(reader: R, writer: W, label: impl Into<String>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let label = label.into();
        let broken = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            label.clone(),
            reader,
            inbound_tx,
            broken.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            label.clone(),
            writer,
            outbound_rx,
            broken.clone(),
        ));

        Self {
            label,
            outbound: Some(outbound_tx),
            inbound,
            broken,
            reader,
            writer: Some(writer),
        }
    }

    /// Manager side of a spawned worker process
    pub fn from_child(
        stdin: tokio::process::ChildStdin,
        stdout: tokio::process::ChildStdout,
        label: impl Into<String>,
    ) -> Self {
        Self::new(stdout, stdin, label)
    }

    /// Worker side of a spawned worker process: the process' own stdin/stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), "stdio")
    }

    /// Channel over an established (already authenticated) TCP connection
    pub fn from_tcp(stream: tokio::net::TcpStream) -> Self {
        let label = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "tcp".to_string());
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, label)
    }

    /// Two connected in-memory channels, for running a worker inside the
    /// manager's process
    pub fn pair(label: impl Into<String>) -> (Self, Self) {
        let label = label.into();
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (our_reader, our_writer) = tokio::io::split(ours);
        let (their_reader, their_writer) = tokio::io::split(theirs);

        (
            Self::new(our_reader, our_writer, label.clone()),
            Self::new(their_reader, their_writer, format!("{}-peer", label)),
        )
    }

    /// True once either direction has failed or reached EOF
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Channel for StreamChannel {
    fn send(&mut self, message: Message) -> Result<(), IpcError> {
        if self.is_broken() {
            return Err(IpcError::ConnectionClosed);
        }

        let outbound = self.outbound.as_ref().ok_or(IpcError::ConnectionClosed)?;
        let frame = codec::encode(&message)?;
        outbound
            .send(frame)
            .map_err(|_| IpcError::ConnectionClosed)
    }

    fn try_recv(&mut self) -> Result<Option<Message>, IpcError> {
        match self.inbound.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(IpcError::ConnectionClosed),
        }
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message>, IpcError> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(IpcError::ConnectionClosed),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        // Dropping the sender lets the writer drain what is queued, then shut down
        self.outbound.take();
        self.reader.abort();
        self.inbound.close();
        self.broken.store(true, Ordering::Release);

        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await.is_err() {
                debug!(channel = %self.label, "Writer did not finish flushing before close");
            }
        }

        Ok(())
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(
    label: String,
    mut reader: R,
    inbound: mpsc::UnboundedSender<Message>,
    broken: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match codec::read_frame(&mut reader).await {
            Ok(Some(bytes)) => match codec::decode(&bytes) {
                Ok(message) => {
                    if inbound.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(channel = %label, "Dropping undecodable frame: {}", e);
                }
            },
            Ok(None) => {
                debug!(channel = %label, "Channel closed by peer");
                break;
            }
            Err(e) => {
                debug!(channel = %label, "Channel read failed: {}", e);
                break;
            }
        }
    }

    broken.store(true, Ordering::Release);
}

async fn write_loop<W>(
    label: String,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    broken: Arc<AtomicBool>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = codec::write_frame(&mut writer, &frame).await {
            // A vanished peer is the common case, not worth more than debug
            match e {
                IpcError::ConnectionClosed => {
                    debug!(channel = %label, "Peer closed the channel during write")
                }
                other => warn!(channel = %label, "Channel write failed: {}", other),
            }
            broken.store(true, Ordering::Release);
            outbound.close();
            return;
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (mut manager, mut worker) = StreamChannel::pair("test");

        manager.send(Message::payload(json!(1))).unwrap();
        manager.send(Message::payload(json!(2))).unwrap();
        manager.send(Message::from(Opcode::Stop)).unwrap();

        let timeout = Duration::from_secs(1);
        assert_eq!(
            worker.recv_timeout(timeout).await.unwrap(),
            Some(Message::payload(json!(1)))
        );
        assert_eq!(
            worker.recv_timeout(timeout).await.unwrap(),
            Some(Message::payload(json!(2)))
        );
        assert_eq!(
            worker.recv_timeout(timeout).await.unwrap(),
            Some(Message::Control(Opcode::Stop))
        );
    }

    #[tokio::test]
    async fn test_try_recv_empty_is_none() {
        let (mut manager, _worker) = StreamChannel::pair("test");
        assert_eq!(manager.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn test_recv_timeout_expires_without_message() {
        let (mut manager, _worker) = StreamChannel::pair("test");
        let received = manager
            .recv_timeout(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_peer_drop_drains_then_fails() {
        let (mut manager, mut worker) = StreamChannel::pair("test");

        worker.send(Message::payload("last words")).unwrap();
        worker.close().await.unwrap();
        drop(worker);

        let first = manager.recv_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, Some(Message::payload("last words")));

        let err = manager
            .recv_timeout(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::ConnectionClosed));
        assert!(manager.is_broken());
        assert!(matches!(
            manager.send(Message::from(Opcode::Ping)),
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut manager, _worker) = StreamChannel::pair("test");
        manager.close().await.unwrap();
        assert!(manager.send(Message::payload(json!(null))).is_err());
    }
}
