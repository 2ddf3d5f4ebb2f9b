//! JSON-over-TCP link to the peer.
//!
//! Messages are bare JSON objects written back to back with no delimiter;
//! the receiving side splits them with a streaming JSON decoder. Delivery is
//! best-effort and there is no acknowledgement or reconnection.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{OutputMessage, RemoteMessage};

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed message from peer: {0}")]
    Json(#[from] serde_json::Error),
    #[error("peer closed the connection")]
    Closed,
}

/// Message channel to the peer.
pub trait Transport {
    /// Send one message. May block until it is written.
    fn send(&mut self, message: &OutputMessage) -> Result<(), TransportError>;

    /// Next received message, `Ok(None)` if nothing complete has arrived. Never blocks.
    fn try_receive(&mut self) -> Result<Option<RemoteMessage>, TransportError>;
}

fn default_read_buffer_size() -> usize {
    2048
}

fn default_nodelay() -> bool {
    true
}

/// Socket options for [`TcpJsonTransport`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportParams {
    /// Bytes requested per socket read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Connect timeout; `None` uses the OS default.
    pub connect_timeout_ms: Option<u64>,
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            connect_timeout_ms: None,
            nodelay: default_nodelay(),
        }
    }
}

/// [`Transport`] over a TCP stream carrying concatenated JSON objects.
#[derive(Debug)]
pub struct TcpJsonTransport {
    stream: TcpStream,
    params: TransportParams,
    buffer: Vec<u8>,
    pending: VecDeque<Result<RemoteMessage, serde_json::Error>>,
}

impl TcpJsonTransport {
    /// Connect to the peer and switch the socket to non-blocking reads.
    pub fn connect(
        addr: impl ToSocketAddrs,
        params: TransportParams,
    ) -> Result<Self, TransportError> {
        let stream = match params.connect_timeout_ms {
            Some(ms) => connect_with_timeout(addr, Duration::from_millis(ms))?,
            None => TcpStream::connect(addr)?,
        };
        Self::from_stream(stream, params)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, params: TransportParams) -> Result<Self, TransportError> {
        stream.set_nodelay(params.nodelay)?;
        stream.set_nonblocking(true)?;
        if let Ok(peer) = stream.peer_addr() {
            info!("connected to {peer}");
        }
        Ok(Self {
            stream,
            params,
            buffer: Vec::new(),
            pending: VecDeque::new(),
        })
    }

    pub fn params(&self) -> &TransportParams {
        &self.params
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Pull everything the socket has right now into the buffer.
    fn fill_buffer(&mut self) -> Result<(), TransportError> {
        let mut chunk = vec![0u8; self.params.read_buffer_size.max(1)];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    debug!("received {n} bytes");
                    self.buffer.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decode every complete value in the buffer, keeping a trailing partial one.
    ///
    /// A value that parses but is not a [`RemoteMessage`] is queued as an
    /// error in its place. Only a syntax error discards the buffer.
    fn decode_buffer(&mut self) {
        let mut values =
            serde_json::Deserializer::from_slice(&self.buffer).into_iter::<serde_json::Value>();
        let mut syntax_error = None;
        for value in values.by_ref() {
            match value {
                Ok(value) => {
                    let decoded = serde_json::from_value::<RemoteMessage>(value);
                    if let Err(e) = &decoded {
                        warn!("skipping unrecognized message from peer: {e}");
                    }
                    self.pending.push_back(decoded);
                }
                Err(e) if e.is_eof() => break,
                Err(e) => {
                    syntax_error = Some(e);
                    break;
                }
            }
        }
        let consumed = values.byte_offset();

        match syntax_error {
            Some(e) => {
                warn!("discarding {} buffered bytes: {e}", self.buffer.len() - consumed);
                self.buffer.clear();
                self.pending.push_back(Err(e));
            }
            None => {
                self.buffer.drain(..consumed);
            }
        }
    }
}

impl Transport for TcpJsonTransport {
    fn send(&mut self, message: &OutputMessage) -> Result<(), TransportError> {
        let data = serde_json::to_vec(message)?;
        // A partial write would corrupt the stream, so writes block.
        self.stream.set_nonblocking(false)?;
        let written = self.stream.write_all(&data).and_then(|_| self.stream.flush());
        self.stream.set_nonblocking(true)?;
        written?;
        debug!("sent {} bytes", data.len());
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<RemoteMessage>, TransportError> {
        if let Some(decoded) = self.pending.pop_front() {
            return Ok(Some(decoded?));
        }
        let filled = self.fill_buffer();
        self.decode_buffer();
        match (self.pending.pop_front(), filled) {
            (Some(decoded), _) => Ok(Some(decoded?)),
            (None, Ok(())) => Ok(None),
            (None, Err(e)) => Err(e),
        }
    }
}

fn connect_with_timeout(addr: impl ToSocketAddrs, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}
