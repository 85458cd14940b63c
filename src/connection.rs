//! Client side of the RPC channel.

use async_trait::async_trait;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::{
    credentials::{client_tls, ClientTls},
    error::{Error, RpcError},
    messages::{Ping, Pong, Reply, Request},
    rpc::{self, FramedIo, Io},
    security::{Credentials, SecurityMode},
};

/// Anything that can answer an echo call.
///
/// [`PingClient::run`](crate::client::PingClient::run) is written against this
/// trait so the ticking loop does not care how the channel was secured.
#[async_trait]
pub trait EchoService: Send {
    /// Sends one ping and waits for its reply.
    async fn echo(&mut self, ping: Ping) -> Result<Pong, Error>;

    /// Address the calls go to, for reporting.
    fn target(&self) -> &str;
}

/// An established channel to a ping server.
///
/// The caller owns it and should [`close`](Self::close) it when done.
pub struct Connection {
    target: String,
    mode: SecurityMode,
    framed: FramedIo,
}

/// Dials `target` (`host:port`) using the given credentials.
///
/// Credential files are loaded before the socket is opened, so a missing file
/// fails with [`Error::CredentialLoad`] without touching the network. Dial and
/// TLS handshake failures come back as [`Error::Connection`].
pub async fn connect(credentials: &Credentials, target: &str) -> Result<Connection, Error> {
    let tls = client_tls(credentials, target)?;

    let connection_error = |source: std::io::Error| Error::Connection {
        addr: target.to_string(),
        source,
    };

    let stream = TcpStream::connect(target).await.map_err(connection_error)?;
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("Could not set TCP_NODELAY on {}: {}", target, e);
    }

    let io: Box<dyn Io> = match tls {
        Some(ClientTls {
            config,
            server_name,
        }) => {
            let tls_stream = TlsConnector::from(config)
                .connect(server_name, stream)
                .await
                .map_err(connection_error)?;
            Box::new(tls_stream)
        }
        None => Box::new(stream),
    };

    log::debug!("Connected to {} ({})", target, credentials.mode);

    Ok(Connection {
        target: target.to_string(),
        mode: credentials.mode,
        framed: rpc::framed(io),
    })
}

impl Connection {
    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Flushes pending data and shuts the channel down.
    pub async fn close(mut self) -> Result<(), Error> {
        SinkExt::<bytes::Bytes>::close(&mut self.framed)
            .await
            .map_err(RpcError::from)?;
        Ok(())
    }
}

#[async_trait]
impl EchoService for Connection {
    async fn echo(&mut self, ping: Ping) -> Result<Pong, Error> {
        rpc::send(&mut self.framed, &Request::Echo(ping)).await?;

        match rpc::receive::<Reply>(&mut self.framed).await? {
            Reply::Echo(pong) => Ok(pong),
            Reply::Failure(reason) => Err(RpcError::Status(reason).into()),
        }
    }

    fn target(&self) -> &str {
        &self.target
    }
}
