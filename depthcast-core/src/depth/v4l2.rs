//! Kinect depth through the Linux `gspca_kinect` V4L2 driver.
//!
//! The driver exposes the depth camera as a capture device offering
//! `Y10B` (packed 10-bit) and `Y16 ` formats. Frames are unpacked into the
//! same 11-bit disparity space the projector expects.

use tracing::info;
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::depth::capture::{DepthSource, unpack_y10b, unpack_y16};
use crate::depth::types::{DepthFrame, now_us};
use crate::error::StreamError;

const BUFFER_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepthFormat {
    Y10b,
    Y16,
}

/// Depth frames from a V4L2 device such as `/dev/video1`.
pub struct V4l2DepthSource {
    path: String,
    width: u32,
    height: u32,
    format: DepthFormat,
    stream: MmapStream<'static>,
    // Keeps the device open for the lifetime of the stream.
    _device: Device,
    frame_number: u64,
}

impl V4l2DepthSource {
    /// Open `path` and negotiate a depth format at `width`×`height`.
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, StreamError> {
        let unavailable = |e: std::io::Error| StreamError::SensorUnavailable(format!("{path}: {e}"));

        let device = Device::with_path(path).map_err(unavailable)?;
        let caps = device.query_caps().map_err(unavailable)?;
        info!("depth device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(StreamError::SensorUnavailable(format!(
                "{path} does not support video capture"
            )));
        }

        let mut chosen = None;
        for (format, fourcc) in [
            (DepthFormat::Y10b, FourCC::new(b"Y10B")),
            (DepthFormat::Y16, FourCC::new(b"Y16 ")),
        ] {
            let mut fmt = device.format().map_err(unavailable)?;
            fmt.width = width;
            fmt.height = height;
            fmt.fourcc = fourcc;
            let applied = device.set_format(&fmt).map_err(unavailable)?;
            if applied.fourcc == fourcc {
                chosen = Some((format, applied.width, applied.height));
                break;
            }
        }

        let Some((format, width, height)) = chosen else {
            return Err(StreamError::SensorUnavailable(format!(
                "{path} offers neither Y10B nor Y16 depth"
            )));
        };
        info!("depth format {:?} at {}x{}", format, width, height);

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(unavailable)?;

        Ok(Self {
            path: path.to_string(),
            width,
            height,
            format,
            stream,
            _device: device,
            frame_number: 0,
        })
    }
}

impl DepthSource for V4l2DepthSource {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, StreamError> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| StreamError::Sensor(format!("{}: {e}", self.path)))?;

        let pixels = self.width as usize * self.height as usize;
        let depth = match self.format {
            DepthFormat::Y10b => unpack_y10b(buf, pixels)?,
            DepthFormat::Y16 => unpack_y16(buf, pixels)?,
        };

        let frame = DepthFrame {
            width: self.width,
            height: self.height,
            depth,
            color: None,
            frame_number: self.frame_number,
            timestamp_us: now_us(),
        };
        self.frame_number += 1;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn name(&self) -> String {
        format!("v4l2 {} ({:?})", self.path, self.format)
    }
}
