//! Receiving server with an explicit start/stop lifecycle.
//!
//! ```text
//!  UI thread                         server thread (current-thread runtime)
//! ┌───────────────────┐ start()     ┌───────────────────────────────────┐
//! │ DepthServer       │───spawn────►│ accept one client at a time       │
//! │   state: Running  │             │ FramedRead<_, DepthCodec>         │
//! │                   │◄──watch─────│ PacketDecoder → latest cloud      │
//! │                   │◄──watch─────│ ReceiverStats                     │
//! │                   │◄──mpsc──────│ ServerEvent (log lines)           │
//! │ stop() ─ cancel ─►│             │                                   │
//! │        ─ join ───►│             │ drop listener, unlink socket file │
//! └───────────────────┘             └───────────────────────────────────┘
//! ```
//!
//! Only the newest decoded frame is kept: a viewer that falls behind skips
//! straight to the latest cloud.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::DepthCodec;
use crate::depth::decoder::{DecodedFrame, PacketDecoder};
use crate::depth::projection::ProjectionConfig;
use crate::error::StreamError;
use crate::network::endpoint::{BoxedReader, Endpoint};
use crate::network::listener::BoundListener;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ── Config and published types ───────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub endpoint: Endpoint,
    /// Used for depth-map payloads, which are projected on receipt.
    pub projection: ProjectionConfig,
}

/// Something worth showing in the viewer's log list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Listening(Endpoint),
    ClientConnected(String),
    ClientDisconnected { peer: String, reason: Option<String> },
    Error(String),
    Stopped,
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerEvent::Listening(ep) => write!(f, "Server listening on {ep}"),
            ServerEvent::ClientConnected(peer) => write!(f, "Client connected ({peer})"),
            ServerEvent::ClientDisconnected { peer, reason: None } => {
                write!(f, "Client disconnected ({peer})")
            }
            ServerEvent::ClientDisconnected {
                peer,
                reason: Some(reason),
            } => write!(f, "Client dropped ({peer}): {reason}"),
            ServerEvent::Error(msg) => write!(f, "Server error: {msg}"),
            ServerEvent::Stopped => write!(f, "Server has stopped."),
        }
    }
}

/// The most recent frame, as published to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedCloud {
    pub frame: DecodedFrame,
    /// Size of the message on the wire.
    pub wire_bytes: usize,
}

/// Running totals since the server was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub frames: u64,
    pub bytes: u64,
    pub clients: u64,
    pub dropped_clients: u64,
    pub last_frame_number: Option<u64>,
}

pub type FrameReceiver = watch::Receiver<Option<Arc<ReceivedCloud>>>;

// ── DepthServer ──────────────────────────────────────────────────

#[derive(Debug)]
enum ServerState {
    Stopped,
    Running(RunningServer),
}

#[derive(Debug)]
struct RunningServer {
    endpoint: Endpoint,
    cancel: CancellationToken,
    thread: JoinHandle<()>,
}

/// A listening server that can be started and stopped repeatedly.
///
/// Decoded frames and stats are published through `watch` channels so the
/// owner can poll them without blocking; see
/// [`frame_receiver`](Self::frame_receiver) and
/// [`stats_receiver`](Self::stats_receiver).
#[derive(Debug)]
pub struct DepthServer {
    config: ServerConfig,
    state: ServerState,
    events: mpsc::UnboundedSender<ServerEvent>,
    frames: Arc<watch::Sender<Option<Arc<ReceivedCloud>>>>,
    stats: Arc<watch::Sender<ReceiverStats>>,
}

impl DepthServer {
    /// Create a stopped server and the receiving end of its event channel.
    pub fn new(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (frames, _) = watch::channel(None);
        let (stats, _) = watch::channel(ReceiverStats::default());
        let server = Self {
            config,
            state: ServerState::Stopped,
            events,
            frames: Arc::new(frames),
            stats: Arc::new(stats),
        };
        (server, events_rx)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Listen on a different endpoint from the next [`start`](Self::start).
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.config.endpoint = endpoint;
    }

    /// Bind and start serving on a background thread.
    ///
    /// Bind errors are returned here. On success the bound endpoint is
    /// returned (with the actual port when `:0` was requested).
    pub fn start(&mut self) -> Result<Endpoint, StreamError> {
        if matches!(self.state, ServerState::Running(_)) {
            return Err(StreamError::AlreadyRunning);
        }

        let bound = BoundListener::bind(&self.config.endpoint)?;
        let endpoint = bound.local_endpoint()?;
        let cancel = CancellationToken::new();

        let worker = Worker {
            decoder: PacketDecoder::new(self.config.projection),
            cancel: cancel.clone(),
            events: self.events.clone(),
            frames: Arc::clone(&self.frames),
            stats: Arc::clone(&self.stats),
        };
        let thread = std::thread::Builder::new()
            .name("depthcast-server".into())
            .spawn(move || worker.run(bound))?;

        info!("depth server started on {endpoint}");
        self.state = ServerState::Running(RunningServer {
            endpoint: endpoint.clone(),
            cancel,
            thread,
        });
        Ok(endpoint)
    }

    /// Stop serving, join the thread and release the socket.
    pub fn stop(&mut self) -> Result<(), StreamError> {
        let ServerState::Running(running) = std::mem::replace(&mut self.state, ServerState::Stopped)
        else {
            return Err(StreamError::NotRunning);
        };

        running.cancel.cancel();
        if running.thread.join().is_err() {
            error!("depth server thread panicked");
        }
        info!("depth server on {} stopped", running.endpoint);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running(_))
    }

    /// Bound endpoint while running.
    pub fn local_endpoint(&self) -> Option<&Endpoint> {
        match &self.state {
            ServerState::Running(running) => Some(&running.endpoint),
            ServerState::Stopped => None,
        }
    }

    /// Latest decoded frame. `None` until the first frame arrives.
    pub fn frame_receiver(&self) -> FrameReceiver {
        self.frames.subscribe()
    }

    pub fn stats_receiver(&self) -> watch::Receiver<ReceiverStats> {
        self.stats.subscribe()
    }
}

impl Drop for DepthServer {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

// ── Server thread ────────────────────────────────────────────────

struct Worker {
    decoder: PacketDecoder,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ServerEvent>,
    frames: Arc<watch::Sender<Option<Arc<ReceivedCloud>>>>,
    stats: Arc<watch::Sender<ReceiverStats>>,
}

impl Worker {
    fn run(self, bound: BoundListener) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!("cannot build server runtime: {e}");
                self.emit(ServerEvent::Error(e.to_string()));
                return;
            }
        };
        runtime.block_on(self.serve(bound));
        self.emit(ServerEvent::Stopped);
    }

    async fn serve(&self, bound: BoundListener) {
        let listener = match bound.into_async() {
            Ok(l) => l,
            Err(e) => {
                error!("cannot attach listener: {e}");
                self.emit(ServerEvent::Error(e.to_string()));
                return;
            }
        };
        if let Ok(endpoint) = listener.local_endpoint() {
            self.emit(ServerEvent::Listening(endpoint));
        }

        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = listener.accept() => r,
            };

            let (reader, peer) = match accepted {
                Ok(client) => client,
                Err(e) => {
                    warn!("accept error: {e}");
                    self.emit(ServerEvent::Error(format!("accept: {e}")));
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => continue,
                    }
                }
            };

            info!("client connected from {peer}");
            self.emit(ServerEvent::ClientConnected(peer.clone()));
            self.stats.send_modify(|s| s.clients += 1);

            let reason = match self.handle_client(reader).await {
                Ok(()) => None,
                Err(e) => {
                    warn!("dropping client {peer}: {e}");
                    self.stats.send_modify(|s| s.dropped_clients += 1);
                    Some(e.to_string())
                }
            };
            info!("client {peer} disconnected");
            self.emit(ServerEvent::ClientDisconnected { peer, reason });
        }
        debug!("server loop exited");
    }

    /// Read packets until the client closes, an error occurs or the server
    /// is stopped.
    async fn handle_client(&self, reader: BoxedReader) -> Result<(), StreamError> {
        let mut framed = FramedRead::new(reader, DepthCodec::default());
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                next = framed.next() => next,
            };
            let Some(packet) = next else {
                return Ok(());
            };
            let packet = packet?;
            let wire_bytes = packet.encoded_len();
            let frame = self.decoder.decode(&packet)?;

            let frame_number = frame.frame_number;
            debug!(
                "frame {frame_number}: {} points, {wire_bytes} bytes",
                frame.cloud.len()
            );
            self.frames
                .send_replace(Some(Arc::new(ReceivedCloud { frame, wire_bytes })));
            self.stats.send_modify(|s| {
                s.frames += 1;
                s.bytes += wire_bytes as u64;
                s.last_frame_number = Some(frame_number);
            });
        }
    }

    fn emit(&self, event: ServerEvent) {
        // The owner may have dropped the receiver; events are best-effort.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_server() -> (DepthServer, mpsc::UnboundedReceiver<ServerEvent>) {
        DepthServer::new(ServerConfig {
            endpoint: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        })
    }

    #[test]
    fn stop_without_start_is_error() {
        let (mut server, _events) = local_server();
        assert!(matches!(server.stop(), Err(StreamError::NotRunning)));
    }

    #[test]
    fn double_start_is_error() {
        let (mut server, _events) = local_server();
        server.start().unwrap();
        assert!(matches!(server.start(), Err(StreamError::AlreadyRunning)));
        server.stop().unwrap();
        assert!(!server.is_running());
    }

    #[test]
    fn bind_failure_leaves_server_stopped() {
        let (mut first, _e1) = local_server();
        let taken = first.start().unwrap();

        let (mut second, _e2) = DepthServer::new(ServerConfig {
            endpoint: taken,
            ..ServerConfig::default()
        });
        assert!(matches!(second.start(), Err(StreamError::Connection(_))));
        assert!(!second.is_running());
        first.stop().unwrap();
    }

    #[test]
    fn emits_listening_and_stopped() {
        let (mut server, mut events) = local_server();
        let endpoint = server.start().unwrap();
        server.stop().unwrap();

        assert_eq!(events.try_recv().unwrap(), ServerEvent::Listening(endpoint));
        assert_eq!(events.try_recv().unwrap(), ServerEvent::Stopped);
    }

    #[test]
    fn event_text_matches_panel_wording() {
        assert_eq!(ServerEvent::Stopped.to_string(), "Server has stopped.");
        assert_eq!(
            ServerEvent::ClientConnected("127.0.0.1:5000".into()).to_string(),
            "Client connected (127.0.0.1:5000)"
        );
    }

    #[cfg(unix)]
    #[test]
    fn unix_socket_file_removed_on_stop() {
        let path = std::env::temp_dir().join(format!("depthcast-s-{}.sock", std::process::id()));
        let (mut server, _events) = DepthServer::new(ServerConfig {
            endpoint: Endpoint::Unix(path.clone()),
            ..ServerConfig::default()
        });
        server.start().unwrap();
        assert!(path.exists());
        server.stop().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_stops_server() {
        let (mut server, _events) = local_server();
        let endpoint = server.start().unwrap();
        drop(server);
        // The port is free again.
        BoundListener::bind(&endpoint).unwrap();
    }
}
