use std::{sync::Arc, time::Duration};

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::{
    connection::EchoService,
    error::Error,
    messages::{Ping, DEFAULT_TTL},
    report::{LogReporter, Reporter},
    stats::{RttCollector, StatsSnapshot},
    time,
};

/// Default delay between pings.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Default number of pings per run.
pub const DEFAULT_LIMIT: u32 = 8;

/// Sends echo requests at a fixed cadence and reports their latency.
///
/// The outgoing sequence lives in the client, so one instance must be driven by
/// a single loop; `next_ping` and `run` take `&mut self` for that reason.
pub struct PingClient {
    name: String,
    delay: Duration,
    limit: u32,
    sequence: i64,
    reporter: Arc<dyn Reporter>,
}

impl PingClient {
    /// Creates a client reporting through [`LogReporter`].
    pub fn new(name: impl Into<String>, delay: Duration, limit: u32) -> Self {
        PingClient {
            name: name.into(),
            delay,
            limit,
            sequence: 0,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last sequence handed out; 0 before the first ping.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Builds the next ping in this client's sequence.
    pub fn next_ping(&mut self) -> Ping {
        self.sequence += 1;

        Ping {
            sender: self.name.clone(),
            client_sequence: self.sequence,
            sent_at: Some(time::now()),
            ttl: DEFAULT_TTL,
        }
    }

    /// Sends `limit` pings, one per tick, and returns the run's statistics.
    ///
    /// The first ping goes out one `delay` after the call. Pings are strictly
    /// sequential. A failed call ends the run at once with that error; nothing
    /// is retried.
    pub async fn run<C: EchoService + ?Sized>(
        &mut self,
        channel: &mut C,
    ) -> Result<StatsSnapshot, Error> {
        let mut collector = RttCollector::new();
        let mut sent: u32 = 0;

        let mut ticker = if self.delay.is_zero() {
            None
        } else {
            let mut ticker = interval_at(Instant::now() + self.delay, self.delay);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(ticker)
        };

        while sent < self.limit {
            if let Some(ref mut ticker) = ticker {
                ticker.tick().await;
            }

            let ping = self.next_ping();
            sent += 1;

            let pong = match channel.echo(ping).await {
                Ok(pong) => pong,
                Err(e) => {
                    log::debug!(
                        "Echo {} to {} failed, stopping run",
                        self.sequence,
                        channel.target()
                    );
                    return Err(e);
                }
            };

            let latency = time::elapsed_since(pong.sent_at.as_ref());
            self.reporter.round_trip(channel.target(), &pong, latency);
            collector.record(latency, pong.success);
        }

        Ok(collector.snapshot(sent))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::RpcError,
        messages::Pong,
        report::SilentReporter,
        sequence::SequenceTracker,
    };

    /// Answers pings straight from a tracker, optionally failing on one call.
    struct LocalChannel {
        tracker: SequenceTracker,
        fail_on: Option<i64>,
        calls: i64,
    }

    impl LocalChannel {
        fn new() -> Self {
            LocalChannel {
                tracker: SequenceTracker::new(),
                fail_on: None,
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl EchoService for LocalChannel {
        async fn echo(&mut self, ping: Ping) -> Result<Pong, Error> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                return Err(RpcError::Closed.into());
            }
            let check = self.tracker.record(&ping.sender, ping.client_sequence);
            Ok(Pong {
                success: check.success,
                client_sequence: check.client_sequence,
                server_sequence: check.server_sequence,
                sent_at: ping.sent_at,
            })
        }

        fn target(&self) -> &str {
            "local"
        }
    }

    #[derive(Default)]
    struct Recorder {
        trips: Mutex<Vec<(i64, i64, bool)>>,
    }

    impl Reporter for Recorder {
        fn echo_received(&self, _: &str, _: i64, _: i64) {}

        fn round_trip(&self, target: &str, pong: &Pong, _: Duration) {
            assert_eq!(target, "local");
            self.trips.lock().unwrap().push((
                pong.client_sequence,
                pong.server_sequence,
                pong.success,
            ));
        }
    }

    #[test]
    fn test_next_ping_sequence() {
        let mut client = PingClient::new("tester", DEFAULT_DELAY, DEFAULT_LIMIT);
        assert_eq!(client.sequence(), 0);

        for expected in 1..=3 {
            let ping = client.next_ping();
            assert_eq!(ping.client_sequence, expected);
            assert_eq!(ping.sender, "tester");
            assert_eq!(ping.ttl, 50);
            assert!(ping.sent_at.is_some());
        }
        assert_eq!(client.sequence(), 3);
    }

    #[tokio::test]
    async fn test_run_reports_every_ping() {
        let recorder = Arc::new(Recorder::default());
        let mut client =
            PingClient::new("tester", Duration::from_millis(1), 5).with_reporter(recorder.clone());
        let mut channel = LocalChannel::new();

        let stats = client.run(&mut channel).await.unwrap();
        assert_eq!(stats.pings_sent, 5);
        assert_eq!(stats.replies, 5);
        assert_eq!(stats.out_of_order, 0);

        let trips = recorder.trips.lock().unwrap().clone();
        assert_eq!(
            trips,
            (1..=5).map(|seq| (seq, seq, true)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_first_failure() {
        let mut client = PingClient::new("tester", Duration::ZERO, 8)
            .with_reporter(Arc::new(SilentReporter));
        let mut channel = LocalChannel::new();
        channel.fail_on = Some(3);

        let err = client.run(&mut channel).await.unwrap_err();
        assert!(matches!(err, Error::Rpc(RpcError::Closed)));
        assert_eq!(channel.calls, 3);
        assert_eq!(client.sequence(), 3);
    }

    #[tokio::test]
    async fn test_second_run_continues_sequence() {
        let mut client = PingClient::new("tester", Duration::ZERO, 2)
            .with_reporter(Arc::new(SilentReporter));
        let mut channel = LocalChannel::new();

        client.run(&mut channel).await.unwrap();
        let stats = client.run(&mut channel).await.unwrap();
        assert_eq!(client.sequence(), 4);
        assert_eq!(stats.out_of_order, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_between_pings() {
        let mut client = PingClient::new("tester", Duration::from_millis(100), 3)
            .with_reporter(Arc::new(SilentReporter));
        let mut channel = LocalChannel::new();

        let start = Instant::now();
        client.run(&mut channel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_zero_limit_sends_nothing() {
        let mut client = PingClient::new("tester", Duration::from_millis(1), 0);
        let mut channel = LocalChannel::new();

        let stats = client.run(&mut channel).await.unwrap();
        assert_eq!(stats.pings_sent, 0);
        assert_eq!(channel.calls, 0);
    }
}
