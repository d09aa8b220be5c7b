//! Established byte streams and dialing.
//!
//! A [`Connection`] wraps a plain or TLS-wrapped TCP socket and speaks the
//! length-prefixed framing of [`crate::protocol`]. Two flavours of each
//! operation exist:
//! - `send_frame` / `recv_frame` return structured errors for callers that
//!   need to tell failure modes apart
//! - `send` / `receive` log transport failures and collapse them to
//!   `false` / `None`, for handlers that only care whether the peer is still
//!   there
//!
//! The [`ConnectionTracker`] keeps a clone of every live socket so the server
//! can shut them all down at once.

use crate::config::NetConfig;
use crate::error::{ProtocolError, Result, TransportError};
use crate::protocol;
use crate::tls::{self, ClientTlsStream, ServerTlsStream};
use rustls::ServerConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

enum Stream {
    Plain(TcpStream),
    TlsServer(Box<ServerTlsStream>),
    TlsClient(Box<ClientTlsStream>),
}

impl Stream {
    fn socket(&self) -> &TcpStream {
        match self {
            Stream::Plain(sock) => sock,
            Stream::TlsServer(tls) => &tls.sock,
            Stream::TlsClient(tls) => &tls.sock,
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(sock) => sock.read(buf),
            Stream::TlsServer(tls) => tls.read(buf),
            Stream::TlsClient(tls) => tls.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(sock) => sock.write(buf),
            Stream::TlsServer(tls) => tls.write(buf),
            Stream::TlsClient(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(sock) => sock.flush(),
            Stream::TlsServer(tls) => tls.flush(),
            Stream::TlsClient(tls) => tls.flush(),
        }
    }
}

/// One established, optionally TLS-wrapped, bidirectional stream.
pub struct Connection {
    stream: Stream,
    peer: SocketAddr,
}

impl Connection {
    pub fn plain(sock: TcpStream) -> Result<Self> {
        let peer = sock.peer_addr()?;
        Ok(Self {
            stream: Stream::Plain(sock),
            peer,
        })
    }

    /// Accept side: plain, or TLS when `tls` is set.
    pub fn accept(sock: TcpStream, tls: Option<&Arc<ServerConfig>>) -> Result<Self> {
        let peer = sock.peer_addr()?;
        let stream = match tls {
            Some(config) => Stream::TlsServer(Box::new(tls::accept(config, sock)?)),
            None => Stream::Plain(sock),
        };
        Ok(Self { stream, peer })
    }

    /// Dial `config.host:port` with retries and wrap in TLS if configured.
    pub fn connect(config: &NetConfig, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", config.host, port);
        let sock = connect_with_retry(&addr, config.retry_attempts, config.retry_delay())?;
        let peer = sock.peer_addr()?;

        let stream = if config.tls.enabled {
            let client = tls::client_config(&config.tls)?;
            Stream::TlsClient(Box::new(tls::connect(&client, &config.host, sock)?))
        } else {
            Stream::Plain(sock)
        };
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self.stream, Stream::Plain(_))
    }

    /// A second handle on the underlying socket, used to shut it down from
    /// another thread.
    pub fn try_clone_socket(&self) -> io::Result<TcpStream> {
        self.stream.socket().try_clone()
    }

    pub fn send_frame(&mut self, body: &[u8]) -> Result<()> {
        protocol::write_frame(&mut self.stream, body)
    }

    /// `Ok(None)` when the peer closed cleanly.
    pub fn recv_frame(&mut self) -> Result<Option<Vec<u8>>> {
        protocol::read_frame(&mut self.stream)
    }

    pub fn send_json<T: Serialize>(&mut self, message: &T) -> Result<()> {
        protocol::write_json(&mut self.stream, message)
    }

    /// Receive and parse one JSON frame; a closed stream is an error here.
    pub fn recv_json<T: for<'de> serde::Deserialize<'de>>(&mut self, during: &'static str) -> Result<T> {
        let body = self
            .recv_frame()?
            .ok_or(ProtocolError::ConnectionClosed(during))?;
        protocol::parse_json(&body)
    }

    /// Send one frame. Failures are logged and reported as `false`.
    pub fn send(&mut self, body: &[u8]) -> bool {
        match self.send_frame(body) {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "send failed");
                false
            }
        }
    }

    /// Receive one frame. Failures and a closed stream both yield `None`.
    pub fn receive(&mut self) -> Option<Vec<u8>> {
        match self.recv_frame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "receive failed");
                None
            }
        }
    }

    /// Send TLS close_notify (if any) and shut the socket down.
    pub fn close(mut self) {
        match &mut self.stream {
            Stream::TlsServer(tls) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.complete_io(&mut tls.sock);
            }
            Stream::TlsClient(tls) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.complete_io(&mut tls.sock);
            }
            Stream::Plain(_) => {}
        }
        let _ = self.stream.socket().shutdown(Shutdown::Both);
    }
}

/// Raw access for the legacy format's unframed bulk bytes.
impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Dial `addr`, retrying `attempts` times with a fixed `delay` in between.
pub fn connect_with_retry(addr: &str, attempts: u32, delay: Duration) -> Result<TcpStream> {
    let mut last_error = io::Error::new(io::ErrorKind::InvalidInput, "no connect attempts made");

    for attempt in 1..=attempts {
        match TcpStream::connect(addr) {
            Ok(sock) => {
                debug!(addr, attempt, "connected");
                return Ok(sock);
            }
            Err(e) => {
                warn!(addr, attempt, attempts, error = %e, "connect failed");
                last_error = e;
                if attempt < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }

    Err(TransportError::ConnectFailed {
        addr: addr.to_string(),
        attempts,
        source: last_error,
    }
    .into())
}

/// Registry of live sockets, shut down together on server stop.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, TcpStream>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `sock` until the returned guard is dropped.
    pub fn track(self: &Arc<Self>, sock: &TcpStream) -> io::Result<Tracked> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, sock.try_clone()?);
        Ok(Tracked {
            tracker: Arc::clone(self),
            id,
        })
    }

    pub fn live(&self) -> usize {
        self.lock().len()
    }

    /// Shut down every tracked socket. Handlers blocked on them see EOF or
    /// an error and return.
    pub fn shutdown_all(&self) {
        for sock in self.lock().drain().map(|(_, sock)| sock) {
            let _ = sock.shutdown(Shutdown::Both);
        }
    }
}

/// Removes its socket from the tracker when dropped.
#[derive(Debug)]
pub struct Tracked {
    tracker: Arc<ConnectionTracker>,
    id: u64,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.id);
    }
}
