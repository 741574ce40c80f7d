//! Host-side model of the passive display receiver.
//!
//! [`DeviceEmulator`] implements the receiving half of the tile protocol:
//! it reassembles frames from an arbitrary byte stream, verifies each tile's
//! CRC against the pixels actually received, paints accepted tiles into its
//! own framebuffer and answers with `TileAck` or `TileNack`.
//!
//! Useful for exercising a sender without hardware:
//!
//! ```
//! use tiledisplay::frame::{pack_frame, tile_crc, tile_payload, FrameType, TileHeader};
//! use tiledisplay::receiver::DeviceEmulator;
//!
//! let mut device = DeviceEmulator::new(4, 4);
//! let pixels = [0x00, 0xF8]; // one red pixel
//! let header = TileHeader { x: 1, y: 2, width: 1, height: 1, crc: tile_crc(&pixels) };
//! let frame = pack_frame(FrameType::ImageTile, &tile_payload(&header, &pixels), 8192).unwrap();
//!
//! let reply = device.feed(&frame);
//! assert_eq!(reply, vec![0xAA, 0x03, 0x00, 0x00]);
//! assert_eq!(device.framebuffer().get(1, 2), Some([255, 0, 0]));
//! ```

use std::io::{self, Read, Write};

use crate::frame::{
    pack_frame, tile_crc, unpack_frame_header, FrameType, TileHeader, FRAME_HEADER_SIZE,
    FRAME_MAGIC, TILE_HEADER_SIZE,
};
use crate::pixel;
use crate::raster::RasterImage;

/// Counters for what the emulator has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub tiles_accepted: usize,
    pub tiles_rejected: usize,
    pub echoes: usize,
    /// Bytes dropped while hunting for the magic byte
    pub bytes_skipped: usize,
}

/// In-memory display receiver.
#[derive(Debug, Clone)]
pub struct DeviceEmulator {
    framebuffer: RasterImage,
    buffer: Vec<u8>,
    max_payload: usize,
    stats: ReceiverStats,
}

impl DeviceEmulator {
    /// Create a receiver with a black `width x height` framebuffer.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            framebuffer: RasterImage::new(width, height),
            buffer: Vec::new(),
            max_payload: crate::TILE_PAYLOAD_SIZE,
            stats: ReceiverStats::default(),
        }
    }

    /// Set the largest frame payload the receiver will buffer.
    #[must_use]
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Pixels as the emulated panel would show them.
    pub fn framebuffer(&self) -> &RasterImage {
        &self.framebuffer
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Consume received bytes and return the bytes to send back.
    ///
    /// Incomplete frames stay buffered until the rest arrives.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.buffer.extend_from_slice(bytes);
        let mut replies = Vec::new();
        let mut tail = 0;

        while self.buffer.len() - tail >= FRAME_HEADER_SIZE {
            let available = &self.buffer[tail..];
            let header = match unpack_frame_header(available) {
                Ok(header) if (header.length as usize) <= self.max_payload => header,
                _ => {
                    // resync one byte at a time
                    tail += 1;
                    self.stats.bytes_skipped += 1;
                    continue;
                }
            };

            let frame_len = FRAME_HEADER_SIZE + header.length as usize;
            if available.len() < frame_len {
                break;
            }
            let payload = &available[FRAME_HEADER_SIZE..frame_len];

            match header.kind() {
                Some(FrameType::ImageTile) => {
                    let accepted = Self::apply_tile(&mut self.framebuffer, payload);
                    let reply = if accepted {
                        self.stats.tiles_accepted += 1;
                        FrameType::TileAck
                    } else {
                        self.stats.tiles_rejected += 1;
                        FrameType::TileNack
                    };
                    replies.extend(empty_frame(reply));
                }
                Some(FrameType::ThroughputTest) => {
                    self.stats.echoes += 1;
                    replies.extend_from_slice(&available[..frame_len]);
                }
                _ => tracing::debug!("Ignoring frame type 0x{:02X}", header.frame_type),
            }
            tail += frame_len;
        }

        self.buffer.drain(..tail);
        replies
    }

    /// Verify and paint one tile payload. Returns whether it was accepted.
    fn apply_tile(framebuffer: &mut RasterImage, payload: &[u8]) -> bool {
        let Ok(header) = TileHeader::unpack(payload) else {
            tracing::warn!("Tile payload shorter than its header");
            return false;
        };
        let pixels = &payload[TILE_HEADER_SIZE..];

        let crc = tile_crc(pixels);
        if crc != header.crc {
            tracing::warn!(
                "CRC mismatch: expected 0x{:08X}, computed 0x{:08X}, {} bytes",
                header.crc,
                crc,
                pixels.len()
            );
            return false;
        }

        let fits = header.x as usize + header.width as usize <= framebuffer.width() as usize
            && header.y as usize + header.height as usize <= framebuffer.height() as usize;
        if !fits {
            tracing::warn!(
                "Tile ({},{} {}x{}) outside framebuffer",
                header.x,
                header.y,
                header.width,
                header.height
            );
            return false;
        }

        match pixel::decode(pixels, header.width, header.height) {
            Ok(tile) => {
                framebuffer.paste(&tile, header.x, header.y);
                true
            }
            Err(e) => {
                tracing::warn!("Rejecting tile: {}", e);
                false
            }
        }
    }

    /// Serve a single connection until the peer closes it.
    pub fn serve<S: Read + Write>(&mut self, stream: &mut S) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            let n = match stream.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let replies = self.feed(&chunk[..n]);
            if !replies.is_empty() {
                stream.write_all(&replies)?;
                stream.flush()?;
            }
        }
    }
}

fn empty_frame(frame_type: FrameType) -> [u8; FRAME_HEADER_SIZE] {
    [FRAME_MAGIC, frame_type.into(), 0, 0]
}

/// Build a throughput-test frame. The receiver echoes it unchanged.
pub fn echo_frame(payload: &[u8], max_payload: usize) -> Result<Vec<u8>, crate::Error> {
    pack_frame(FrameType::ThroughputTest, payload, max_payload)
}
