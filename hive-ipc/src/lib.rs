//! Inter-process communication for Hive
//!
//! This crate provides the wire protocol, the `Channel` abstraction and the
//! connection handshake used between the manager and its worker processes.

pub mod auth;
pub mod codec;
pub mod credentials;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use credentials::{connect, ClientCredentials, TransportKind};
pub use error::IpcError;
pub use protocol::{Message, MessageEnvelope, Opcode, IPC_PROTOCOL_VERSION};
pub use transport::{Channel, StreamChannel};
