//! Connection credentials handed to remote workers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth;
use crate::error::IpcError;
use crate::transport::StreamChannel;

/// Transport family a remote worker dials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => f.write_str("tcp"),
        }
    }
}

/// Everything a remote worker process needs to join a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub address: String,
    pub port: u16,
    pub transport: TransportKind,
    pub auth_key: String,
}

impl ClientCredentials {
    /// `address:port` as accepted by `TcpStream::connect`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Dial a manager, authenticate with the shared key and return the channel
pub async fn connect(
    credentials: &ClientCredentials,
    handshake_timeout: Duration,
) -> Result<StreamChannel, IpcError> {
    let endpoint = credentials.endpoint();
    debug!("Connecting to manager at {} over {}", endpoint, credentials.transport);

    let mut stream = TcpStream::connect(&endpoint).await?;
    stream.set_nodelay(true)?;

    tokio::time::timeout(
        handshake_timeout,
        auth::client_handshake(&mut stream, credentials.auth_key.as_bytes()),
    )
    .await
    .map_err(|_| IpcError::Timeout)??;

    Ok(StreamChannel::from_tcp(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_format() {
        let creds = ClientCredentials {
            address: "localhost".to_string(),
            port: 6000,
            transport: TransportKind::Tcp,
            auth_key: "secret password".to_string(),
        };
        assert_eq!(creds.endpoint(), "localhost:6000");
    }

    #[test]
    fn test_credentials_json_shape() {
        let creds = ClientCredentials {
            address: "10.0.0.2".to_string(),
            port: 6001,
            transport: TransportKind::Tcp,
            auth_key: "k".to_string(),
        };
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["transport"], "tcp");
        assert_eq!(json["port"], 6001);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let creds = ClientCredentials {
            address: "127.0.0.1".to_string(),
            port,
            transport: TransportKind::Tcp,
            auth_key: "k".to_string(),
        };
        assert!(connect(&creds, Duration::from_secs(1)).await.is_err());
    }
}
