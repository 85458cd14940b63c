//! sping - simple, secure ping over an echo RPC.
//!
//! A client sends numbered pings to a shared server at a fixed cadence; the
//! server tracks each sender's sequence and tells it whether the pings arrived
//! in order, and the client measures round-trip latency from the echoed
//! timestamp. The channel can run with mutual TLS, server-only TLS or in
//! cleartext.
//!
//! # Usage
//!
//! Run the server:
//! ```bash
//! sping serve --port 3264 --mode mutual
//! ```
//!
//! Ping it:
//! ```bash
//! sping echo server.example.org --limit 8 --delay 100
//! ```

/// Ping client.
pub mod client;
/// Command-line configuration and validation.
pub mod configuration;
/// Dialing a server and the echo call.
pub mod connection;
/// Certificate, key and CA bundle loading.
pub mod credentials;
/// Error types.
pub mod error;
/// Protocol messages.
pub mod messages;
/// Per-message reporting sinks.
pub mod report;
/// Length-delimited framing for the RPC channel.
pub mod rpc;
/// Transport security modes and credential configuration.
pub mod security;
/// Sender sequence tracking.
pub mod sequence;
/// Ping server.
pub mod server;
/// Round-trip statistics.
pub mod stats;
/// Timestamp envelopes.
pub mod time;

pub use client::PingClient;
pub use connection::{connect, Connection, EchoService};
pub use error::{Error, RpcError};
pub use messages::{Ping, Pong};
pub use security::{Credentials, SecurityMode, TlsFiles};
pub use server::PingServer;
