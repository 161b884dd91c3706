//! Connection listener and bounded worker pool.
//!
//! The accept loop runs on its own thread; each accepted connection is
//! handed to a fixed pool of worker threads through a bounded channel.
//! A worker stays pinned to its connection until the client disconnects,
//! so long-lived pollers occupy workers for their whole session - the
//! pool size and queue depth bound that, nothing else does.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded};

use crate::broker::Broker;
use crate::net::protocol::{self, Request};

const ACCEPT_POLL: Duration = Duration::from_millis(25);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub workers: usize,
    pub queue_depth: usize,
}

pub struct BrokerServer {
    broker: Broker,
    config: ServerConfig,
}

pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    accept_join: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Idle workers drain and exit once the dispatch
    /// channel closes; workers pinned to live connections are not joined.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.accept_join.join();
    }
}

impl BrokerServer {
    pub fn new(broker: Broker, config: ServerConfig) -> Self {
        Self { broker, config }
    }

    pub fn start(self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(&self.config.bind_addr)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let (conn_tx, conn_rx) = bounded::<TcpStream>(self.config.queue_depth.max(1));
        for index in 0..self.config.workers.max(1) {
            let rx = conn_rx.clone();
            let broker = self.broker.clone();
            thread::Builder::new()
                .name(format!("worker-{index}"))
                .spawn(move || run_worker(rx, broker))?;
        }
        drop(conn_rx);

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_shutdown = Arc::clone(&shutdown);
        let accept_join = thread::Builder::new()
            .name("accept".to_string())
            .spawn(move || run_accept_loop(listener, conn_tx, accept_shutdown))?;

        Ok(ServerHandle {
            shutdown,
            accept_join,
            local_addr,
        })
    }
}

fn run_accept_loop(listener: TcpListener, conn_tx: Sender<TcpStream>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "connection accepted");
                // Blocks when every worker is pinned and the queue is
                // full; backlog stays bounded by the channel capacity.
                if conn_tx.send(stream).is_err() {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                tracing::warn!("accept error: {err}");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    // Dropping the sender lets idle workers drain and exit.
}

fn run_worker(conn_rx: Receiver<TcpStream>, broker: Broker) {
    while let Ok(stream) = conn_rx.recv() {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        match handle_connection(stream, &broker) {
            Ok(()) => tracing::debug!(%peer, "client disconnected"),
            Err(err) => tracing::debug!(%peer, "connection error: {err}"),
        }
    }
}

/// Serve one connection until EOF or socket error. Protocol errors are
/// reported to the client and never end the session.
fn handle_connection(stream: TcpStream, broker: &Broker) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    for line in reader.lines() {
        let line = line?;
        match protocol::parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(request)) => handle_request(request, broker, &mut writer)?,
            Err(err) => writeln!(writer, "{err}")?,
        }
        writer.flush()?;
    }
    Ok(())
}

fn handle_request(
    request: Request,
    broker: &Broker,
    writer: &mut BufWriter<TcpStream>,
) -> std::io::Result<()> {
    match request {
        Request::Publish {
            topic,
            producer_id,
            content,
        } => match broker.publish(&topic, &producer_id, &content) {
            Ok(()) => writeln!(writer, "ACK"),
            Err(err) => {
                tracing::warn!(%topic, "publish failed: {err}");
                writeln!(writer, "ERROR: store unavailable")
            }
        },
        Request::Consume { topic } => match broker.consume(&topic) {
            Ok(messages) if messages.is_empty() => writeln!(writer, "EMPTY"),
            Ok(messages) => {
                for content in &messages {
                    writeln!(writer, "MSG {content}")?;
                }
                writeln!(writer, "END_OF_BATCH")
            }
            Err(err) => {
                tracing::warn!(%topic, "consume failed: {err}");
                writeln!(writer, "ERROR: store unavailable")
            }
        },
    }
}
