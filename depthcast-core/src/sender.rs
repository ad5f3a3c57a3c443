//! Capture-and-send service.
//!
//! ```text
//! blocking thread                         tokio task
//! ┌──────────────────────────┐            ┌────────────────────────────┐
//! │ DepthSource::next_frame  │            │ connect (retry every N s)  │
//! │ Projector / FrameEncoder │──push──►Q──│ pop → FramedWrite::send    │
//! │ pace to target_fps       │  (evicts   │ on error: reconnect        │
//! └──────────────────────────┘   oldest)  └────────────────────────────┘
//! ```
//!
//! Capture never waits on the network: while the receiver is slow or
//! away, [`FrameQueue`] keeps only the newest `queue_depth` packets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::SinkExt;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::DepthCodec;
use crate::depth::capture::DepthSource;
use crate::depth::encoder::{FrameEncoder, PayloadMode};
use crate::depth::projection::{ProjectionConfig, Projector};
use crate::depth::types::DepthFrame;
use crate::error::StreamError;
use crate::network::endpoint::{BoxedWriter, Endpoint};
use crate::packet::Packet;
use crate::queue::FrameQueue;
use crate::rate::RateMeter;

// ── CaptureServiceConfig ─────────────────────────────────────────

/// Configuration for [`CaptureService`].
#[derive(Debug, Clone)]
pub struct CaptureServiceConfig {
    /// Receiver to stream to.
    pub endpoint: Endpoint,
    /// Capture pacing; 0 runs at whatever rate the source delivers.
    pub target_fps: u32,
    /// Packets buffered between capture and send.
    pub queue_depth: usize,
    /// Delay between connection attempts.
    pub retry_interval: Duration,
    /// Consecutive failed attempts before giving up; 0 retries forever.
    pub max_retries: u32,
    pub payload: PayloadMode,
    pub compress: bool,
    pub compression_level: i32,
    pub projection: ProjectionConfig,
    /// How often to log throughput; zero disables it.
    pub stats_interval: Duration,
}

impl Default for CaptureServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            target_fps: 30,
            queue_depth: 2,
            retry_interval: Duration::from_secs(1),
            max_retries: 0,
            payload: PayloadMode::Points,
            compress: true,
            compression_level: 3,
            projection: ProjectionConfig::default(),
            stats_interval: Duration::from_secs(5),
        }
    }
}

/// Counters since the service started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub captured: u64,
    pub sent: u64,
    pub dropped: u64,
    pub connections: u64,
}

// ── CaptureService ───────────────────────────────────────────────

/// Sender-side capture service.
///
/// # Lifetime
///
/// [`run`](Self::run) drives capture and sending until the source ends,
/// [`stop`](Self::stop) is called, or a fatal error occurs (sensor failure,
/// or an unreachable receiver when `max_retries` is set).
pub struct CaptureService {
    config: CaptureServiceConfig,
    queue: Arc<FrameQueue<Packet>>,
    cancel: CancellationToken,
    running: AtomicBool,
    captured: Arc<AtomicU64>,
    sent: AtomicU64,
    connections: AtomicU64,
}

impl CaptureService {
    pub fn new(config: CaptureServiceConfig) -> Self {
        Self {
            queue: Arc::new(FrameQueue::new(config.queue_depth)),
            config,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            captured: Arc::new(AtomicU64::new(0)),
            sent: AtomicU64::new(0),
            connections: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CaptureServiceConfig {
        &self.config
    }

    /// A cloneable handle that stops the service from another task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Packets evicted from the send queue so far.
    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn stats(&self) -> SenderStats {
        SenderStats {
            captured: self.captured.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.queue.dropped(),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }

    /// Capture from `source` and stream to the configured endpoint.
    pub async fn run<S>(&self, source: S) -> Result<(), StreamError>
    where
        S: DepthSource + Send + 'static,
    {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "capturing from {} → {} ({:?}, queue depth {})",
            source.name(),
            self.config.endpoint,
            self.config.payload,
            self.queue.capacity()
        );

        let capture = {
            let pipeline = FramePipeline::new(&self.config);
            let queue = Arc::clone(&self.queue);
            let cancel = self.cancel.clone();
            let captured = Arc::clone(&self.captured);
            let target_fps = self.config.target_fps;
            tokio::task::spawn_blocking(move || {
                capture_loop(source, pipeline, &queue, &cancel, &captured, target_fps)
            })
        };

        let sent = self.send_loop().await;

        // Whatever ended first, take the other half down with it.
        self.cancel.cancel();
        self.queue.close();
        let captured = capture
            .await
            .map_err(|e| StreamError::Other(format!("capture thread failed: {e}")));
        self.running.store(false, Ordering::SeqCst);

        let stats = self.stats();
        info!(
            "capture stopped: {} captured, {} sent, {} dropped",
            stats.captured, stats.sent, stats.dropped
        );

        // A sensor failure is the root cause if both halves failed.
        captured??;
        sent
    }

    // ── Send side ────────────────────────────────────────────────

    async fn send_loop(&self) -> Result<(), StreamError> {
        let mut meter = RateMeter::new();
        let mut last_stats = Instant::now();

        'connect: while let Some(writer) = self.connect().await? {
            self.connections.fetch_add(1, Ordering::Relaxed);
            let mut framed = FramedWrite::new(writer, DepthCodec::default());

            loop {
                let packet = tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    p = self.queue.pop() => p,
                };
                let Some(packet) = packet else {
                    if let Err(e) = framed.close().await {
                        debug!("close error: {e}");
                    }
                    break 'connect;
                };

                let frame = packet.frame_number();
                let len = packet.encoded_len() as u64;
                // A receiver that stops reading stalls `send` once the socket
                // buffer is full.
                let sent = tokio::select! {
                    _ = self.cancel.cancelled() => break 'connect,
                    r = framed.send(packet) => r,
                };
                if let Err(e) = sent {
                    warn!(
                        "connection to {} lost at frame {frame}: {e}; reconnecting",
                        self.config.endpoint
                    );
                    continue 'connect;
                }
                trace!("sent frame {frame} ({len} bytes)");
                self.sent.fetch_add(1, Ordering::Relaxed);
                meter.record(len);

                if !self.config.stats_interval.is_zero()
                    && last_stats.elapsed() >= self.config.stats_interval
                {
                    info!(
                        "sent {} frames, dropped {}, {:.1} fps, {:.0} KiB/s",
                        self.sent.load(Ordering::Relaxed),
                        self.queue.dropped(),
                        meter.fps(),
                        meter.bytes_per_sec() / 1024.0
                    );
                    last_stats = Instant::now();
                }
            }
        }
        Ok(())
    }

    /// Connect, retrying every `retry_interval`. `Ok(None)` means there is
    /// nothing left to send.
    async fn connect(&self) -> Result<Option<BoxedWriter>, StreamError> {
        let endpoint = &self.config.endpoint;
        let mut attempts = 0u32;
        loop {
            if self.cancel.is_cancelled() || (self.queue.is_closed() && self.queue.is_empty()) {
                return Ok(None);
            }

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                r = endpoint.connect() => r,
            };
            match attempt {
                Ok(writer) => {
                    info!("connected to {endpoint}");
                    return Ok(Some(writer));
                }
                Err(e) => {
                    attempts += 1;
                    if self.config.max_retries > 0 && attempts >= self.config.max_retries {
                        return Err(StreamError::Unreachable {
                            endpoint: endpoint.to_string(),
                            attempts,
                        });
                    }
                    if attempts == 1 {
                        warn!(
                            "cannot reach {endpoint}: {e}; retrying every {:?}",
                            self.config.retry_interval
                        );
                    } else {
                        debug!("connect attempt {attempts} to {endpoint} failed: {e}");
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.config.retry_interval) => {}
            }
        }
    }
}

// ── Capture side ─────────────────────────────────────────────────

/// Frame → packet, per the configured payload mode.
struct FramePipeline {
    mode: PayloadMode,
    projector: Projector,
    encoder: FrameEncoder,
}

impl FramePipeline {
    fn new(config: &CaptureServiceConfig) -> Self {
        Self {
            mode: config.payload,
            projector: Projector::new(config.projection),
            encoder: FrameEncoder::new(config.compress, config.compression_level),
        }
    }

    fn encode(&self, frame: &DepthFrame) -> Result<Packet, StreamError> {
        match self.mode {
            PayloadMode::Points => {
                let cloud = self.projector.project(frame);
                self.encoder.encode_points(frame, &cloud)
            }
            PayloadMode::Depth => self.encoder.encode_depth(frame),
        }
    }
}

fn capture_loop<S: DepthSource>(
    mut source: S,
    pipeline: FramePipeline,
    queue: &FrameQueue<Packet>,
    cancel: &CancellationToken,
    captured: &AtomicU64,
    target_fps: u32,
) -> Result<(), StreamError> {
    let interval = (target_fps > 0).then(|| Duration::from_secs_f64(1.0 / target_fps as f64));

    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }
        let started = Instant::now();

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("{} ended", source.name());
                break Ok(());
            }
            Err(e) => break Err(e),
        };
        captured.fetch_add(1, Ordering::Relaxed);

        match pipeline.encode(&frame) {
            Ok(packet) => {
                if let Some(old) = queue.push(packet) {
                    trace!("send queue full, dropped frame {}", old.frame_number());
                }
            }
            Err(e) => warn!("skipping frame {}: {e}", frame.frame_number),
        }

        if let Some(interval) = interval {
            let elapsed = started.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
    };

    if result.is_err() {
        cancel.cancel();
    }
    queue.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::capture::SyntheticSource;

    struct FailingSource;

    impl DepthSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<DepthFrame>, StreamError> {
            Err(StreamError::Sensor("usb disconnected".into()))
        }
        fn resolution(&self) -> (u32, u32) {
            (640, 480)
        }
        fn name(&self) -> String {
            "failing".into()
        }
    }

    fn unreachable_config() -> CaptureServiceConfig {
        // Port 1 on localhost is reliably closed.
        CaptureServiceConfig {
            endpoint: "127.0.0.1:1".parse().unwrap(),
            retry_interval: Duration::from_millis(10),
            target_fps: 0,
            stats_interval: Duration::ZERO,
            ..CaptureServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let service = CaptureService::new(CaptureServiceConfig {
            max_retries: 3,
            target_fps: 100,
            ..unreachable_config()
        });
        let err = service
            .run(SyntheticSource::new(32, 24))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Unreachable { attempts: 3, .. }));
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn sensor_failure_is_fatal() {
        let service = CaptureService::new(unreachable_config());
        let err = service.run(FailingSource).await.unwrap_err();
        assert!(matches!(err, StreamError::Sensor(_)));
    }

    #[tokio::test]
    async fn queue_evicts_while_disconnected() {
        let service = Arc::new(CaptureService::new(CaptureServiceConfig {
            queue_depth: 2,
            ..unreachable_config()
        }));
        let runner = Arc::clone(&service);
        let task = tokio::spawn(async move {
            runner
                .run(SyntheticSource::new(16, 12).with_max_frames(20))
                .await
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(service.stats().captured, 20);
        assert_eq!(service.dropped_frames(), 18);

        service.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_ends_blocked_send() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the socket without ever reading from it.
        let receiver = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let service = Arc::new(CaptureService::new(CaptureServiceConfig {
            endpoint: format!("127.0.0.1:{}", addr.port()).parse().unwrap(),
            payload: PayloadMode::Depth,
            compress: false,
            ..unreachable_config()
        }));
        let runner = Arc::clone(&service);
        let task = tokio::spawn(async move { runner.run(SyntheticSource::new(640, 480)).await });

        // Long enough to fill the socket buffers and park in `send`.
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(service.stats().connections, 1);

        service.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("run did not return after stop")
            .unwrap()
            .unwrap();
        receiver.abort();
    }

    #[tokio::test]
    async fn stop_ends_retry_loop() {
        let service = Arc::new(CaptureService::new(unreachable_config()));
        let handle = service.stop_handle();
        let runner = Arc::clone(&service);
        let task = tokio::spawn(async move { runner.run(SyntheticSource::new(8, 8)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
