//! Shared key handshake for remote workers
//!
//! Both sides prove knowledge of the pre-shared key with an HMAC-SHA256 over a
//! random nonce chosen by the other side. The manager challenges first, then
//! answers the worker's challenge. Nothing here encrypts traffic.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{read_record, write_record};
use crate::error::IpcError;

type HmacSha256 = Hmac<Sha256>;

/// Nonce size in bytes
pub const NONCE_LEN: usize = 32;

/// Records exchanged before the connection carries envelopes
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Handshake {
    Challenge { nonce: String },
    Response { digest: String },
    Welcome,
    Failure { reason: String },
}

/// Manager side: challenge the worker, then answer its challenge
pub async fn server_handshake<S>(stream: &mut S, key: &[u8]) -> Result<(), IpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    deliver_challenge(stream, key).await?;
    answer_challenge(stream, key).await
}

/// Worker side: answer the manager's challenge, then challenge it back
pub async fn client_handshake<S>(stream: &mut S, key: &[u8]) -> Result<(), IpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    answer_challenge(stream, key).await?;
    deliver_challenge(stream, key).await
}

async fn deliver_challenge<S>(stream: &mut S, key: &[u8]) -> Result<(), IpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    write_record(
        stream,
        &Handshake::Challenge {
            nonce: STANDARD.encode(nonce),
        },
    )
    .await?;

    let digest = match read_record::<_, Handshake>(stream).await? {
        Handshake::Response { digest } => STANDARD
            .decode(digest)
            .map_err(|e| IpcError::AuthenticationFailed(format!("malformed digest: {}", e)))?,
        other => {
            return Err(IpcError::InvalidMessage(format!(
                "expected challenge response, got {:?}",
                other
            )))
        }
    };

    if verify(key, &nonce, &digest)? {
        write_record(stream, &Handshake::Welcome).await
    } else {
        write_record(
            stream,
            &Handshake::Failure {
                reason: "digest mismatch".to_string(),
            },
        )
        .await?;
        Err(IpcError::AuthenticationFailed("digest mismatch".to_string()))
    }
}

async fn answer_challenge<S>(stream: &mut S, key: &[u8]) -> Result<(), IpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let nonce = match read_record::<_, Handshake>(stream).await? {
        Handshake::Challenge { nonce } => STANDARD
            .decode(nonce)
            .map_err(|e| IpcError::AuthenticationFailed(format!("malformed nonce: {}", e)))?,
        other => {
            return Err(IpcError::InvalidMessage(format!(
                "expected challenge, got {:?}",
                other
            )))
        }
    };

    let digest = sign(key, &nonce)?;
    write_record(
        stream,
        &Handshake::Response {
            digest: STANDARD.encode(digest),
        },
    )
    .await?;

    match read_record::<_, Handshake>(stream).await? {
        Handshake::Welcome => Ok(()),
        Handshake::Failure { reason } => Err(IpcError::AuthenticationFailed(reason)),
        other => Err(IpcError::InvalidMessage(format!(
            "expected welcome, got {:?}",
            other
        ))),
    }
}

fn sign(key: &[u8], nonce: &[u8]) -> Result<Vec<u8>, IpcError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| IpcError::AuthenticationFailed(e.to_string()))?;
    mac.update(nonce);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn verify(key: &[u8], nonce: &[u8], digest: &[u8]) -> Result<bool, IpcError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| IpcError::AuthenticationFailed(e.to_string()))?;
    mac.update(nonce);
    Ok(mac.verify_slice(digest).is_ok())
}
