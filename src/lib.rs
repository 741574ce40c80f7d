//! # tiledisplay
//!
//! Differential image transport for a small RGB565 display reachable over TCP.
//!
//! The host renders full frames; only the rectangle that changed since the
//! last confirmed frame goes over the wire, cut into horizontal tiles that
//! fit the receiver's buffer. Each tile carries a CRC32 and is sent
//! stop-and-wait: the next tile waits for the previous one's ACK.
//!
//! This crate provides:
//! - Pixel and frame codecs matching the receiver firmware
//! - Bounding-box diffing and tile slicing
//! - A retrying, reconnecting tile transport
//! - A device emulator for end-to-end testing
//! - Optional clock/weather dashboard rendering and Open-Meteo retrieval
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tiledisplay::{pixel, Config, RasterImage, TcpConnector, TileTransport, TransportSettings};
//!
//! let config = Config::default().with_device("192.168.0.122", 4242);
//! let mut transport = TileTransport::new(
//!     TcpConnector::from_config(&config),
//!     TransportSettings::from_config(&config),
//! );
//! transport.connect()?;
//!
//! let mut frame = RasterImage::new(320, 240);
//! frame.fill_rect(50, 60, 10, 4, [255, 0, 0]);
//! transport.push_frame(&pixel::quantize(&frame))?;
//! ```
//!
//! ## Wire Format
//!
//! All integers are little-endian.
//!
//! | Field | Size | Notes |
//! |-------|------|-------|
//! | magic | 1 | `0xAA` |
//! | type | 1 | `0x01` echo, `0x02` tile, `0x03` ACK, `0x04` NACK |
//! | length | 2 | payload bytes |
//! | payload | length | tile: `x, y, w, h: u16`, `crc32: u32`, RGB565 pixels |
//!
//! ## Feature Flags
//!
//! - `render` - Dashboard renderer built on `embedded-graphics`
//! - `weather` - Open-Meteo client (blocking `reqwest`)
//! - `cli` - The `tiledisplay` binary (implies `render` and `weather`)
//! - `full` - All features

pub mod config;
pub mod diff;
mod error;
pub mod frame;
pub mod pixel;
pub mod raster;
pub mod receiver;
pub mod session;
pub mod transport;
pub mod weather;

pub use config::Config;
pub use diff::{compute_bounding_box, slice_into_tiles, BoundingBox, Tile};
pub use error::{Error, Rejection};
pub use raster::{RasterImage, Rgb};
pub use receiver::DeviceEmulator;
pub use session::{Clock, FrameRenderer, SessionLoop, SystemClock, Tick, WeatherSource};
pub use transport::{
    Connector, CycleReport, DeviceLink, LinkState, TcpConnector, TileTransport, TransportSettings,
};
pub use weather::{WeatherIcon, WeatherRecord};

/// Display width in pixels
pub const DISPLAY_WIDTH: u16 = 320;

/// Display height in pixels
pub const DISPLAY_HEIGHT: u16 = 240;

/// Frame payload ceiling in bytes (tile header included)
pub const TILE_PAYLOAD_SIZE: usize = 8192;

/// Seconds to wait for a tile ACK
pub const DEFAULT_ACK_TIMEOUT_SECS: u64 = 15;

/// Attempts per tile before a cycle is abandoned
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// Optional modules
#[cfg(feature = "render")]
pub mod render;
#[cfg(feature = "render")]
pub use render::{DashboardRenderer, ThemeSpec};

#[cfg(feature = "weather")]
pub use weather::OpenMeteo;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DISPLAY_WIDTH, 320);
        assert_eq!(DISPLAY_HEIGHT, 240);
        assert_eq!(TILE_PAYLOAD_SIZE, 8192);
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 3);
    }

    #[test]
    fn test_payload_fits_length_field() {
        assert!(TILE_PAYLOAD_SIZE <= frame::MAX_FRAME_PAYLOAD);
        assert!(TILE_PAYLOAD_SIZE > frame::TILE_HEADER_SIZE);
    }

    #[test]
    fn test_full_row_fits_one_tile() {
        let row_bytes = DISPLAY_WIDTH as usize * pixel::BYTES_PER_PIXEL;
        assert!(row_bytes <= TILE_PAYLOAD_SIZE - frame::TILE_HEADER_SIZE);
    }
}
