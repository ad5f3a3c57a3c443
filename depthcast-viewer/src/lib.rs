//! # depthcast-viewer
//!
//! Terminal viewer for streamed Kinect point clouds.
//!
//! - **App**: panel state, server start/stop, key handling, drawing
//! - **Scene**: the point-cloud object and the settings that shape it
//! - **Config**: TOML configuration

pub mod app;
pub mod config;
pub mod scene;

pub use app::App;
