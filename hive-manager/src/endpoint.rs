//! Listening endpoint for remote workers

use hive_config::ListenerConfig;
use hive_ipc::{auth, StreamChannel};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tracing::{debug, info, warn};

use crate::error::{ManagerError, ManagerResult};

/// TCP listener plus the shared key remote workers must prove
pub struct Endpoint {
    listener: Option<TcpListener>,
    address: String,
    local_addr: SocketAddr,
    auth_key: String,
    handshake_timeout: Duration,
    accept_poll: Duration,
}

impl Endpoint {
    /// Bind the preferred port, scanning upwards while ports are taken
    pub async fn bind(config: &ListenerConfig, accept_poll: Duration) -> ManagerResult<Self> {
        // An ephemeral port cannot be taken, so there is nothing to scan
        let attempts = if config.port == 0 { 1 } else { config.port_scan.max(1) };
        let mut last_port = config.port;

        for offset in 0..attempts {
            let Some(port) = config.port.checked_add(offset) else {
                break;
            };
            last_port = port;

            match bind_once(&config.address, port, config.backlog).await {
                Ok(listener) => {
                    let local_addr = listener.local_addr()?;
                    info!("Listening for workers on {}", local_addr);
                    return Ok(Self {
                        listener: Some(listener),
                        address: config.address.clone(),
                        local_addr,
                        auth_key: config.auth_key.clone(),
                        handshake_timeout: config.handshake_timeout,
                        accept_poll,
                    });
                }
                Err(e) => debug!("Port {} unavailable on {}: {}", port, config.address, e),
            }
        }

        Err(ManagerError::BindFailed {
            address: config.address.clone(),
            first: config.port,
            last: last_port,
        })
    }

    /// One bounded poll for a pending connection. Returns an authenticated
    /// channel, or `None` when nothing was pending or the peer failed the
    /// handshake.
    pub async fn accept(&mut self) -> Option<(StreamChannel, SocketAddr)> {
        let listener = self.listener.as_ref()?;

        let (mut stream, peer) =
            match tokio::time::timeout(self.accept_poll, listener.accept()).await {
                Err(_) => return None,
                Ok(Err(e)) => {
                    debug!("Accept failed: {}", e);
                    return None;
                }
                Ok(Ok(pair)) => pair,
            };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "Could not disable Nagle: {}", e);
        }

        let handshake = auth::server_handshake(&mut stream, self.auth_key.as_bytes());
        match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(Ok(())) => Some((StreamChannel::from_tcp(stream), peer)),
            Ok(Err(e)) if e.is_fatal() => {
                warn!(%peer, "Rejected worker connection: {}", e);
                None
            }
            Ok(Err(e)) => {
                // Peer hung up or the socket failed mid-handshake
                debug!(%peer, "Worker connection dropped during handshake: {}", e);
                None
            }
            Err(_) => {
                warn!(%peer, "Worker handshake timed out");
                None
            }
        }
    }

    /// Configured bind address (as given, not resolved)
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn auth_key(&self) -> &str {
        &self.auth_key
    }

    pub fn is_open(&self) -> bool {
        self.listener.is_some()
    }

    /// Stop listening; later accepts return `None`
    pub fn close(&mut self) {
        if self.listener.take().is_some() {
            debug!("Listener on {} closed", self.local_addr);
        }
    }
}

async fn bind_once(address: &str, port: u16, backlog: u32) -> io::Result<TcpListener> {
    let mut last_err = None;

    for addr in lookup_host((address, port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        #[cfg(unix)]
        socket.set_reuseaddr(true)?;

        match socket.bind(addr) {
            Ok(()) => match socket.listen(backlog) {
                Ok(listener) => return Ok(listener),
                Err(e) => last_err = Some(e),
            },
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{} resolved to no addresses", address),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(port: u16, port_scan: u16) -> ListenerConfig {
        ListenerConfig {
            address: "127.0.0.1".to_string(),
            port,
            port_scan,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_scan_skips_taken_port() {
        let first = Endpoint::bind(&loopback(0, 1), Duration::from_millis(10))
            .await
            .unwrap();
        let taken = first.port();

        let second = Endpoint::bind(&loopback(taken, 5), Duration::from_millis(10))
            .await
            .unwrap();
        assert_ne!(second.port(), taken);
        assert!(second.port() > taken && second.port() < taken + 5);
    }

    #[tokio::test]
    async fn test_scan_budget_exhausted() {
        let first = Endpoint::bind(&loopback(0, 1), Duration::from_millis(10))
            .await
            .unwrap();

        let err = Endpoint::bind(&loopback(first.port(), 1), Duration::from_millis(10))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ManagerError::BindFailed { .. }));
    }

    #[tokio::test]
    async fn test_accept_without_pending_connection() {
        let mut endpoint = Endpoint::bind(&loopback(0, 1), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(endpoint.accept().await.is_none());

        endpoint.close();
        assert!(!endpoint.is_open());
        assert!(endpoint.accept().await.is_none());
    }

    #[tokio::test]
    async fn test_hang_up_mid_handshake_then_good_peer() {
        let mut endpoint = Endpoint::bind(&loopback(0, 1), Duration::from_millis(200))
            .await
            .unwrap();

        let quitter = tokio::net::TcpStream::connect(endpoint.local_addr()).await.unwrap();
        drop(quitter);
        assert!(endpoint.accept().await.is_none());

        let credentials = hive_ipc::ClientCredentials {
            address: "127.0.0.1".to_string(),
            port: endpoint.port(),
            transport: hive_ipc::TransportKind::Tcp,
            auth_key: endpoint.auth_key().to_string(),
        };
        let client = tokio::spawn(async move {
            hive_ipc::connect(&credentials, Duration::from_secs(2)).await
        });

        let mut accepted = None;
        for _ in 0..20 {
            accepted = endpoint.accept().await;
            if accepted.is_some() {
                break;
            }
        }
        assert!(accepted.is_some());
        assert!(client.await.unwrap().is_ok());
    }
}
