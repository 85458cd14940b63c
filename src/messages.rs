//! Echo protocol messages and the envelopes that carry them over the RPC channel.

use serde::{Deserialize, Serialize};

use crate::time::TimeEnvelope;

/// Time-to-live stamped on every ping.
pub const DEFAULT_TTL: i32 = 50;

/// Echo request sent by a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Sender identity, independent of network address.
    pub sender: String,
    /// Per-client counter, starts at 1 and grows by one per request.
    pub client_sequence: i64,
    pub sent_at: Option<TimeEnvelope>,
    pub ttl: i32,
}

/// Echo reply produced by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// True iff `client_sequence == server_sequence` when the server processed the ping.
    pub success: bool,
    pub client_sequence: i64,
    /// The server's count for this sender after the ping was recorded.
    pub server_sequence: i64,
    /// Copied unchanged from the ping.
    pub sent_at: Option<TimeEnvelope>,
}

/// Client to server envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Echo(Ping),
}

/// Server to client envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Echo(Pong),
    /// The request could not be served; carries the reason.
    Failure(String),
}
