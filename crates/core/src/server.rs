//! Dual-channel transfer server.
//!
//! # Architecture
//!
//! ```text
//!   control listener ──► accept thread ──► WorkerPool ──► ControlHandler
//!   data listener    ──► accept thread ──► WorkerPool ──► DataHandler
//!                                              │
//!                          TransferRegistry ◄──┴── shared through Arc
//! ```
//!
//! Each listener gets its own accept thread and its own bounded pool of
//! `max_connections` workers. TLS handshakes run on the worker, so a slow
//! client never stalls the accept loop. Listeners are non-blocking and polled
//! so [`Server::shutdown`] can stop them; shutdown closes every live socket
//! immediately without draining in-flight transfers.

use crate::config::NetConfig;
use crate::connection::{Connection, ConnectionTracker};
use crate::control::ControlHandler;
use crate::data::DataHandler;
use crate::error::{Result, TransportError};
use crate::pool::WorkerPool;
use crate::registry::TransferRegistry;
use crate::tls;
use rustls::ServerConfig;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long an idle accept loop sleeps between polls.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Something that owns one accepted connection until it is done.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn serve(&self, conn: Connection);
}

impl ConnectionHandler for ControlHandler {
    fn serve(&self, conn: Connection) {
        ControlHandler::serve(self, conn)
    }
}

impl ConnectionHandler for DataHandler {
    fn serve(&self, conn: Connection) {
        DataHandler::serve(self, conn)
    }
}

/// A running server. Dropping it shuts it down.
pub struct Server {
    control_addr: SocketAddr,
    data_addr: SocketAddr,
    registry: Arc<TransferRegistry>,
    tracker: Arc<ConnectionTracker>,
    running: Arc<AtomicBool>,
    acceptors: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind both ports and start accepting.
    pub fn start(config: &NetConfig) -> Result<Self> {
        config.validate_server()?;
        std::fs::create_dir_all(&config.save_directory)?;

        let tls = if config.tls.enabled {
            Some(tls::server_config(&config.tls)?)
        } else {
            None
        };

        let registry = Arc::new(TransferRegistry::new(&config.save_directory));
        let tracker = Arc::new(ConnectionTracker::new());
        let running = Arc::new(AtomicBool::new(true));

        let control = bind(&config.host, config.control_port)?;
        let data = bind(&config.host, config.data_port)?;
        let control_addr = control.local_addr()?;
        let data_addr = data.local_addr()?;

        let shared = Acceptor {
            tls,
            tracker: Arc::clone(&tracker),
            running: Arc::clone(&running),
            max_connections: config.max_connections,
        };
        let acceptors = vec![
            shared.spawn(
                "control",
                control,
                ControlHandler::new(Arc::clone(&registry)),
            )?,
            shared.spawn("data", data, DataHandler::new(Arc::clone(&registry)))?,
        ];

        info!(
            %control_addr,
            %data_addr,
            tls = config.tls.enabled,
            save_directory = %config.save_directory.display(),
            "server listening"
        );

        Ok(Self {
            control_addr,
            data_addr,
            registry,
            tracker,
            running,
            acceptors,
        })
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    pub fn data_addr(&self) -> SocketAddr {
        self.data_addr
    }

    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    /// Connections accepted and not yet finished, queued ones included.
    pub fn live_connections(&self) -> usize {
        self.tracker.live()
    }

    /// Block until the accept threads exit.
    pub fn wait(mut self) {
        for handle in self.acceptors.drain(..) {
            if handle.join().is_err() {
                error!("accept thread panicked");
            }
        }
    }

    /// Stop accepting and close every live connection.
    pub fn shutdown(self) {
        drop(self);
    }

    fn stop(&mut self) {
        if self.acceptors.is_empty() {
            return;
        }
        info!("server shutting down");
        self.running.store(false, Ordering::SeqCst);
        self.tracker.shutdown_all();
        for handle in self.acceptors.drain(..) {
            if handle.join().is_err() {
                error!("accept thread panicked");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
        addr: addr.clone(),
        source,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| TransportError::Bind { addr, source })?;
    Ok(listener)
}

/// Settings shared by both accept threads.
#[derive(Clone)]
struct Acceptor {
    tls: Option<Arc<ServerConfig>>,
    tracker: Arc<ConnectionTracker>,
    running: Arc<AtomicBool>,
    max_connections: usize,
}

impl Acceptor {
    fn spawn<H: ConnectionHandler>(
        &self,
        channel: &'static str,
        listener: TcpListener,
        handler: H,
    ) -> Result<JoinHandle<()>> {
        let pool = WorkerPool::new(&format!("{channel}-worker"), self.max_connections)?;
        let acceptor = self.clone();
        let handler = Arc::new(handler);

        let handle = thread::Builder::new()
            .name(format!("{channel}-accept"))
            .spawn(move || acceptor.run(channel, listener, pool, handler))?;
        Ok(handle)
    }

    fn run<H: ConnectionHandler>(
        self,
        channel: &'static str,
        listener: TcpListener,
        pool: WorkerPool,
        handler: Arc<H>,
    ) {
        while self.running.load(Ordering::SeqCst) {
            let (sock, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
                Err(e) => {
                    warn!(channel, error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
            };

            // Accepted sockets inherit non-blocking mode on some platforms.
            if let Err(e) = sock.set_nonblocking(false) {
                warn!(channel, %peer, error = %e, "dropping connection");
                continue;
            }
            let guard = match self.tracker.track(&sock) {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(channel, %peer, error = %e, "dropping connection");
                    continue;
                }
            };
            debug!(channel, %peer, "connection accepted");

            let tls = self.tls.clone();
            let handler = Arc::clone(&handler);
            let job = move || {
                let _guard = guard;
                match Connection::accept(sock, tls.as_ref()) {
                    Ok(conn) => handler.serve(conn),
                    Err(e) => warn!(channel, %peer, error = %e, "connection setup failed"),
                }
            };

            if let Err(reason) = pool.try_submit(job) {
                warn!(channel, %peer, %reason, "connection rejected");
            }
        }

        // Anything accepted after the first sweep is closed here, before the
        // pool waits for its workers.
        self.tracker.shutdown_all();
        drop(pool);
        debug!(channel, "accept loop stopped");
    }
}
