//! RPC channel framing.
//!
//! ```text
//! +--------+--------+--------+--------+--------...
//! | Length (4 bytes, big-endian)      | bincode payload
//! +--------+--------+--------+--------+--------...
//! ```
//!
//! The same framing runs over plain TCP and over TLS; callers hand in any
//! async byte stream and get a framed transport back.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::RpcError;

/// Largest accepted frame. Echo messages are a few dozen bytes.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Any bidirectional async stream the channel can run over.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

pub type FramedIo = Framed<Box<dyn Io>, LengthDelimitedCodec>;

/// Wraps a stream in the length-delimited codec.
pub fn framed(io: Box<dyn Io>) -> FramedIo {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_framed(io)
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, RpcError> {
    bincode::serialize(message)
        .map(Bytes::from)
        .map_err(RpcError::Encode)
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, RpcError> {
    bincode::deserialize(frame).map_err(RpcError::Decode)
}

/// Encodes and writes one message, flushing the transport.
pub async fn send<T: Serialize>(framed: &mut FramedIo, message: &T) -> Result<(), RpcError> {
    let frame = encode(message)?;
    framed.send(frame).await?;
    Ok(())
}

/// Reads and decodes the next message. `RpcError::Closed` on clean EOF.
pub async fn receive<T: DeserializeOwned>(framed: &mut FramedIo) -> Result<T, RpcError> {
    match framed.next().await {
        Some(frame) => decode(&frame?),
        None => Err(RpcError::Closed),
    }
}
