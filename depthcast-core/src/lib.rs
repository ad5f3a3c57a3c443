//! # depthcast-core
//!
//! Shared library for streaming Kinect depth as point clouds.
//!
//! This crate contains:
//! - **Wire protocol**: `MessageHeader`, `Packet`, `PayloadKind`, `PayloadFlags`
//! - **Codec**: `DepthCodec` for framed stream I/O via `tokio_util`
//! - **Depth pipeline**: `DepthSource`, `Projector`, `FrameEncoder`, `PacketDecoder`
//! - **Network**: `Endpoint` (TCP or Unix socket) and listeners
//! - **Sender**: `CaptureService`, capture thread plus reconnecting send loop
//! - **Server**: `DepthServer`, the start/stop receiver used by the viewer
//! - **Error**: `StreamError`, typed `thiserror`-based errors

pub mod codec;
pub mod depth;
pub mod error;
pub mod flags;
pub mod header;
pub mod message;
pub mod network;
pub mod packet;
pub mod queue;
pub mod rate;
pub mod sender;
pub mod server;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::DepthCodec;
pub use depth::{
    DecodedFrame, DepthFrame, DepthSource, DepthUnits, FrameEncoder, Intrinsics, PacketDecoder,
    PayloadMode, PointCloud, ProjectionConfig, Projector, SyntheticSource,
};
pub use error::StreamError;
pub use flags::PayloadFlags;
pub use header::{HEADER_SIZE, MAGIC, MessageHeader};
pub use message::PayloadKind;
pub use network::{DEFAULT_ENDPOINT, Endpoint};
pub use packet::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, Packet};
pub use queue::FrameQueue;
pub use rate::RateMeter;
pub use sender::{CaptureService, CaptureServiceConfig, SenderStats};
pub use server::{
    DepthServer, FrameReceiver, ReceivedCloud, ReceiverStats, ServerConfig, ServerEvent,
};

#[cfg(all(feature = "v4l2", target_os = "linux"))]
pub use depth::V4l2DepthSource;
