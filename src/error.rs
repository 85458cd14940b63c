//! Error taxonomy shared by the client, server and connection layers.
//!
//! Sequence mismatches are not errors: they travel as `success = false` inside a
//! normal [`Pong`](crate::messages::Pong).

use std::io;

use thiserror::Error;

use crate::credentials::CredentialError;

/// Failure of a single call on an established RPC channel.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("could not encode message: {0}")]
    Encode(#[source] bincode::Error),

    #[error("could not decode message: {0}")]
    Decode(#[source] bincode::Error),

    #[error("connection closed by peer")]
    Closed,

    /// The server answered with a failure instead of a reply.
    #[error("server rejected request: {0}")]
    Status(String),
}

/// Top-level error returned by connection setup, serving and client runs.
#[derive(Error, Debug)]
pub enum Error {
    /// Certificate, key or CA bundle could not be loaded. Raised before any socket is opened.
    #[error("could not load credentials: {0}")]
    CredentialLoad(#[from] CredentialError),

    #[error("could not connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("could not listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed echo RPC call: {0}")]
    Rpc(#[from] RpcError),
}
