//! Observable output of clients and servers.
//!
//! A [`Reporter`] is handed to [`PingClient`](crate::client::PingClient) and
//! [`PingServer`](crate::server::PingServer) at construction; swapping in
//! [`SilentReporter`] turns the per-message lines off.

use std::time::Duration;

use crate::messages::Pong;

/// Sink for per-message events.
pub trait Reporter: Send + Sync {
    /// Server side: a ping from `sender` was recorded.
    fn echo_received(&self, sender: &str, client_sequence: i64, server_sequence: i64);

    /// Client side: a reply from `target` arrived after `latency`.
    fn round_trip(&self, target: &str, pong: &Pong, latency: Duration);
}

/// Writes events through the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn echo_received(&self, sender: &str, client_sequence: i64, server_sequence: i64) {
        log::info!(
            "received ping {}/{} from {}",
            client_sequence,
            server_sequence,
            sender
        );
    }

    fn round_trip(&self, target: &str, pong: &Pong, latency: Duration) {
        if pong.success {
            log::info!(
                "ping {}/{} to {} took {:?}",
                pong.client_sequence,
                pong.server_sequence,
                target,
                latency
            );
        } else {
            log::info!(
                "ping {}/{} to {} took {:?} (out of order)",
                pong.client_sequence,
                pong.server_sequence,
                target,
                latency
            );
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn echo_received(&self, _: &str, _: i64, _: i64) {}

    fn round_trip(&self, _: &str, _: &Pong, _: Duration) {}
}
