//! Depth pipeline: capture, projection and payload encoding.
//!
//! ```text
//! DepthSource ──DepthFrame──► Projector ──PointCloud──► FrameEncoder ──► Packet
//!                                                                          │
//! DecodedFrame ◄──────────────────────── PacketDecoder ◄───────────────────┘
//! ```

pub mod capture;
pub mod decoder;
pub mod encoder;
pub mod pointcloud;
pub mod projection;
pub mod types;
#[cfg(all(feature = "v4l2", target_os = "linux"))]
pub mod v4l2;

pub use capture::{DepthSource, SyntheticSource};
pub use decoder::{DecodedFrame, PacketDecoder};
pub use encoder::{FrameEncoder, PayloadMode};
pub use pointcloud::PointCloud;
pub use projection::{DepthUnits, Intrinsics, ProjectionConfig, Projector};
pub use types::DepthFrame;
#[cfg(all(feature = "v4l2", target_os = "linux"))]
pub use v4l2::V4l2DepthSource;
