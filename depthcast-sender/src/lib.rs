//! # depthcast-sender
//!
//! Reads depth frames from a Kinect (or the synthetic test scene),
//! projects them to point clouds and streams them to a `depthcast-viewer`.
//!
//! The receiver may come and go: the sender keeps retrying and only ever
//! buffers the newest few frames while it is away.

pub mod config;
pub mod source;
