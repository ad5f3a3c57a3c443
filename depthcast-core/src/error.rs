//! Domain-specific error types for depthcast.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! Bytes received from a peer never cause a panic; every failure is typed.

use thiserror::Error;

/// The canonical error type for the depthcast protocol and pipeline.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that do not start with the `DPC1` magic sequence.
    #[error("invalid magic bytes: expected DPC1")]
    InvalidMagic,

    /// A field in the message header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The payload failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload does not match what its header announces.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The socket/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer could not be reached within the configured retries.
    #[error("endpoint {endpoint} unreachable after {attempts} attempts")]
    Unreachable { endpoint: String, attempts: u32 },

    /// A channel or queue was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Encoding Errors ──────────────────────────────────────────
    /// zstd compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    // ── Sensor Errors ────────────────────────────────────────────
    /// The depth sensor could not be opened (missing, busy, unplugged).
    #[error("depth sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The sensor was opened but a frame could not be acquired.
    #[error("sensor error: {0}")]
    Sensor(String),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// `start` was called on a server that is already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// `stop` was called on a server that is not running.
    #[error("server is not running")]
    NotRunning,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}
