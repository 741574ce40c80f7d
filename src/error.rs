//! Error types for the tile transport.

use std::io;

use thiserror::Error;

/// Why a single tile attempt was rejected.
///
/// These are protocol-level failures: the connection is still usable and
/// the tile may be sent again. Each one counts against the tile's attempt
/// budget; [`Error::RetriesExhausted`] carries the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No reply arrived before the ACK timeout elapsed
    Timeout,
    /// The receiver replied with `TileNack` (checksum mismatch)
    Nack,
    /// The reply could not be parsed (bad magic, unexpected type, ...)
    Malformed(String),
}

impl Rejection {
    /// Whether unread reply bytes may still be in flight after this
    /// rejection, so the stream must be drained before the next write.
    pub fn leaves_stale_bytes(&self) -> bool {
        matches!(self, Rejection::Timeout | Rejection::Malformed(_))
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Timeout => write!(f, "timed out waiting for ACK"),
            Rejection::Nack => write!(f, "NACK from device"),
            Rejection::Malformed(reason) => write!(f, "malformed reply: {}", reason),
        }
    }
}

/// Errors that can occur while diffing, framing, or pushing tiles.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket-level failure (refused, reset, closed, generic I/O)
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    /// An operation needed the connection but none is open
    #[error("not connected to device")]
    NotConnected,

    /// Frame header was truncated or carried the wrong magic byte
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A tile was rejected on every attempt; the diff cycle was aborted
    #[error(
        "tile failed after {attempts} attempts ({tiles_confirmed} confirmed this cycle): {last}"
    )]
    RetriesExhausted {
        /// Attempts made for the failing tile
        attempts: u32,
        /// Tiles acknowledged earlier in the same cycle
        tiles_confirmed: usize,
        /// Reason the final attempt failed
        last: Rejection,
    },

    /// The diff region cannot be split into tiles
    #[error(
        "degenerate tile geometry: width {width} does not fit a {max_pixel_bytes}-byte payload"
    )]
    DegenerateGeometry {
        /// Region width in pixels
        width: u16,
        /// Pixel bytes available per tile
        max_pixel_bytes: usize,
    },

    /// Frame payload exceeds the length field or the configured ceiling
    #[error("payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// A pixel buffer does not match its declared geometry
    #[error("pixel buffer is {actual} bytes, expected {expected}")]
    BufferSize {
        /// `width * height * 2`
        expected: usize,
        /// Length supplied
        actual: usize,
    },

    /// Writing the state image failed
    #[error("image error: {0}")]
    Image(String),

    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Weather retrieval failed
    #[error("weather request failed: {0}")]
    Weather(String),
}

impl Error {
    /// Whether the failure only skips the current cycle (state is kept).
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Error::DegenerateGeometry { .. })
    }

    /// Whether the session must drop the connection and start over.
    ///
    /// An unresponsive device is treated like a broken socket.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::NotConnected | Error::RetriesExhausted { .. }
        )
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

#[cfg(feature = "weather")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Weather(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PayloadTooLarge {
            size: 70000,
            max: 8192,
        };
        assert!(err.to_string().contains("70000"));
        assert!(err.to_string().contains("8192"));

        let err = Error::RetriesExhausted {
            attempts: 3,
            tiles_confirmed: 2,
            last: Rejection::Nack,
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("NACK"));
    }

    #[test]
    fn test_classification() {
        assert!(Error::NotConnected.requires_reconnect());
        assert!(!Error::MalformedFrame("bad magic".into()).requires_reconnect());

        let degenerate = Error::DegenerateGeometry {
            width: 0,
            max_pixel_bytes: 8180,
        };
        assert!(degenerate.is_degenerate());
        assert!(!degenerate.requires_reconnect());

        let io = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::Connection(io).requires_reconnect());
        assert!(Error::RetriesExhausted {
            attempts: 3,
            tiles_confirmed: 0,
            last: Rejection::Timeout,
        }
        .requires_reconnect());
    }

    #[test]
    fn test_rejection_stale_bytes() {
        assert!(Rejection::Timeout.leaves_stale_bytes());
        assert!(Rejection::Malformed("bad magic 0xAB".into()).leaves_stale_bytes());
        assert!(!Rejection::Nack.leaves_stale_bytes());
    }
}
