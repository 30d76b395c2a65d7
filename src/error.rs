//! Error types for the supervisor and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// The engine process could not be brought up. Fatal to initialization.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to create download directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn engine binary {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The control endpoint could not be reached or rejected us. Fatal to
/// initialization; never retried by the session itself.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to build RPC client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("engine control probe failed: {0}")]
    Probe(#[from] RpcError),
}

/// A single remote operation failed. Local to that call; the session stays
/// usable unless the transport itself is down.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("session is not connected")]
    NotConnected,
    #[error("transport error calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("engine rejected {method} (code {code}): {message}")]
    Engine {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("malformed response for {method}: {source}")]
    Malformed {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A link payload did not decode under either format. Recovered inside the
/// codec by passing the input through unchanged.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid hex")]
    Hex(#[from] hex::FromHexError),
    #[error("payload is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("payload too short to carry an initialization vector")]
    TooShort,
    #[error("block decryption failed")]
    Cipher,
}

/// Ledger file IO or encoding failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A task-level command failed. Never affects any other task's state.
#[derive(Debug, Error)]
pub enum TaskOpError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Supervisor initialization failed before the command loop came up.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
}
