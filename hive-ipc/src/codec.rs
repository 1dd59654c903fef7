//! Length-prefixed framing
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes. Frames
//! carry JSON encoded [`MessageEnvelope`]s once a connection is established, and
//! handshake records before that.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::IpcError;
use crate::protocol::{Message, MessageEnvelope, IPC_PROTOCOL_VERSION};

/// Largest frame accepted from a peer
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
{
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `None` when the peer closed the stream on a frame
/// boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, IpcError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Encode a message inside a fresh envelope
pub fn encode(message: &Message) -> Result<Vec<u8>, IpcError> {
    serde_json::to_vec(&MessageEnvelope::new(message))
        .map_err(|e| IpcError::SerializationError(e.to_string()))
}

/// Decode an envelope and unwrap its message, rejecting foreign protocol versions
pub fn decode(bytes: &[u8]) -> Result<Message, IpcError> {
    let envelope: MessageEnvelope<Message> = serde_json::from_slice(bytes)
        .map_err(|e| IpcError::DeserializationError(e.to_string()))?;

    if !envelope.is_compatible() {
        return Err(IpcError::ProtocolVersionMismatch {
            expected: IPC_PROTOCOL_VERSION,
            actual: envelope.protocol_version,
        });
    }

    Ok(envelope.message)
}

/// Write a serializable record as a single frame (handshake traffic)
pub async fn write_record<W, T>(writer: &mut W, record: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes =
        serde_json::to_vec(record).map_err(|e| IpcError::SerializationError(e.to_string()))?;
    write_frame(writer, &bytes).await
}

/// Read a single frame as a deserializable record (handshake traffic)
pub async fn read_record<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let bytes = read_frame(reader).await?.ok_or(IpcError::ConnectionClosed)?;
    serde_json::from_slice(&bytes).map_err(|e| IpcError::InvalidMessage(e.to_string()))
}
