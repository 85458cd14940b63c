//! Ping server: answers echo calls and keeps per-sender sequence state.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::StreamExt;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
    time::{interval, timeout, timeout_at, Instant},
};
use tokio_rustls::TlsAcceptor;

use crate::{
    credentials::server_tls,
    error::Error,
    messages::{Ping, Pong, Reply, Request},
    report::{LogReporter, Reporter},
    rpc::{self, FramedIo, Io},
    security::Credentials,
    sequence::SequenceTracker,
};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3264;

/// Longest a peer may take to finish the TLS handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an open connection keeps answering after shutdown is requested.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Aggregate counters for the server.
#[derive(Default)]
pub struct ServerCounters {
    pub echoes: AtomicU64,
    pub out_of_order: AtomicU64,
    pub connections: AtomicU64,
    pub failures: AtomicU64,
}

/// Echo handler plus the state it owns.
pub struct PingServer {
    tracker: SequenceTracker,
    reporter: Arc<dyn Reporter>,
    counters: ServerCounters,
}

impl PingServer {
    pub fn new(tracker: SequenceTracker, reporter: Arc<dyn Reporter>) -> Self {
        PingServer {
            tracker,
            reporter,
            counters: ServerCounters::default(),
        }
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    pub fn counters(&self) -> &ServerCounters {
        &self.counters
    }

    /// Records the ping and builds the reply.
    ///
    /// A sequence mismatch is still a successful call; it only shows up as
    /// `success = false` in the pong.
    pub fn echo(&self, ping: &Ping) -> Pong {
        let check = self.tracker.record(&ping.sender, ping.client_sequence);

        self.counters.echoes.fetch_add(1, Ordering::Relaxed);
        if !check.success {
            self.counters.out_of_order.fetch_add(1, Ordering::Relaxed);
        }
        self.reporter
            .echo_received(&ping.sender, check.client_sequence, check.server_sequence);

        Pong {
            success: check.success,
            client_sequence: check.client_sequence,
            server_sequence: check.server_sequence,
            sent_at: ping.sent_at,
        }
    }

    /// Decodes one request frame and produces the reply to send back.
    fn dispatch(&self, frame: &[u8]) -> Reply {
        match rpc::decode::<Request>(frame) {
            Ok(Request::Echo(ping)) => Reply::Echo(self.echo(&ping)),
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                Reply::Failure(e.to_string())
            }
        }
    }

    /// Loads credentials and binds a listener on `addr`.
    ///
    /// Credentials are loaded first: a missing or invalid file fails here
    /// without opening a socket, and there is no fallback to cleartext.
    pub async fn bind(
        self,
        addr: SocketAddr,
        credentials: &Credentials,
    ) -> Result<BoundServer, Error> {
        let acceptor = server_tls(credentials)?.map(TlsAcceptor::from);

        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Listen {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| Error::Listen {
            addr: addr.to_string(),
            source,
        })?;

        let (shutdown, _) = watch::channel(false);

        log::info!(
            "Ping server listening on {} ({})",
            local_addr,
            credentials.mode
        );

        Ok(BoundServer {
            server: Arc::new(self),
            listener,
            acceptor,
            local_addr,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Binds every interface on `port` and serves until the process stops.
    pub async fn serve(self, port: u16, credentials: &Credentials) -> Result<(), Error> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        self.bind(addr, credentials).await?.run().await
    }
}

impl Default for PingServer {
    fn default() -> Self {
        PingServer::new(SequenceTracker::new(), Arc::new(LogReporter))
    }
}

/// Requests a graceful stop of a running server.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Stops accepting connections. Open connections keep answering requests
    /// already sent for a short grace period, then close.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// A server with its listener bound, ready to [`run`](Self::run).
pub struct BoundServer {
    server: Arc<PingServer>,
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    local_addr: SocketAddr,
    shutdown: Arc<watch::Sender<bool>>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    pub fn server(&self) -> Arc<PingServer> {
        Arc::clone(&self.server)
    }

    /// Accepts and serves connections until shut down, then waits for open
    /// connections to finish.
    pub async fn run(self) -> Result<(), Error> {
        let started = Instant::now();
        let mut stop = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        let mut eviction_timer = self
            .server
            .tracker
            .idle_timeout()
            .filter(|timeout| !timeout.is_zero())
            .map(interval);
        // Skip the first immediate tick
        if let Some(ref mut timer) = eviction_timer {
            timer.tick().await;
        }

        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            self.server.counters.connections.fetch_add(1, Ordering::Relaxed);
                            connections.spawn(handle_connection(
                                Arc::clone(&self.server),
                                stream,
                                peer,
                                self.acceptor.clone(),
                                self.shutdown.subscribe(),
                            ));
                        }
                        Err(e) => log::warn!("Accept failed on {}: {}", self.local_addr, e),
                    }
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        log::warn!("Connection task failed: {}", e);
                    }
                }

                _ = async {
                    match eviction_timer {
                        Some(ref mut timer) => timer.tick().await,
                        None => std::future::pending::<tokio::time::Instant>().await,
                    }
                } => {
                    let evicted = self.server.tracker.evict_idle();
                    if evicted > 0 {
                        log::debug!("Evicted {} idle senders", evicted);
                    }
                }
            }
        }

        drop(self.listener);
        log::info!("Shutting down, waiting for {} connections", connections.len());
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                log::warn!("Connection task failed: {}", e);
            }
        }

        let counters = &self.server.counters;
        log::info!(
            "Served {} echoes ({} out of order, {} failed) over {} connections from {} senders in {:.1}s",
            counters.echoes.load(Ordering::Relaxed),
            counters.out_of_order.load(Ordering::Relaxed),
            counters.failures.load(Ordering::Relaxed),
            counters.connections.load(Ordering::Relaxed),
            self.server.tracker.sender_count(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn handle_connection(
    server: Arc<PingServer>,
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    mut stop: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }

    let io: Box<dyn Io> = match acceptor {
        Some(acceptor) => {
            let handshake = tokio::select! {
                _ = stopped(&mut stop) => {
                    log::debug!("Abandoned TLS handshake with {} on shutdown", peer);
                    return;
                }
                handshake = timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)) => handshake,
            };
            match handshake {
                Ok(Ok(tls)) => Box::new(tls),
                Ok(Err(e)) => {
                    log::warn!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
                Err(_) => {
                    log::warn!("TLS handshake with {} timed out", peer);
                    return;
                }
            }
        }
        None => Box::new(stream),
    };

    log::debug!("Accepted connection from {}", peer);
    let mut framed = rpc::framed(io);

    loop {
        // Pending requests win over the stop signal.
        let frame = tokio::select! {
            biased;
            next = framed.next() => match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    log::warn!("Read from {} failed: {}", peer, e);
                    break;
                }
                None => break,
            },
            _ = stopped(&mut stop) => {
                drain(&server, &mut framed, peer).await;
                break;
            }
        };

        if !answer(&server, &mut framed, &frame, peer).await {
            break;
        }
    }

    log::debug!("Closed connection from {}", peer);
}

/// Answers requests arriving within [`DRAIN_GRACE`] of the stop signal.
async fn drain(server: &PingServer, framed: &mut FramedIo, peer: SocketAddr) {
    let deadline = Instant::now() + DRAIN_GRACE;
    while let Ok(Some(Ok(frame))) = timeout_at(deadline, framed.next()).await {
        if !answer(server, framed, &frame, peer).await {
            return;
        }
    }
}

/// Dispatches one frame and writes the reply; false once the peer is gone.
async fn answer(
    server: &PingServer,
    framed: &mut FramedIo,
    frame: &[u8],
    peer: SocketAddr,
) -> bool {
    let reply = server.dispatch(frame);
    match rpc::send(framed, &reply).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Reply to {} failed: {}", peer, e);
            false
        }
    }
}
