//! Wire framing for the tile protocol.
//!
//! Frame format (all integers little-endian):
//! - MAGIC (1 byte): 0xAA synchronization byte
//! - TYPE (1 byte): [`FrameType`]
//! - LENGTH (2 bytes): payload length
//! - PAYLOAD (LENGTH bytes): type-specific data
//!
//! Image tile payload:
//! - X, Y, WIDTH, HEIGHT (u16 each)
//! - CRC32 (u32) of the pixel bytes that follow, unpadded
//! - PIXELS (`WIDTH * HEIGHT * 2` bytes of RGB565)

use crate::error::Error;

/// Frame synchronization byte
pub const FRAME_MAGIC: u8 = 0xAA;

/// MAGIC + TYPE + LENGTH
pub const FRAME_HEADER_SIZE: usize = 4;

/// x, y, width, height (u16) + crc32 (u32)
pub const TILE_HEADER_SIZE: usize = 12;

/// Largest payload the 16-bit length field can describe
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Diagnostic echo; the receiver sends the frame straight back
    ThroughputTest = 0x01,
    /// Image tile: [`TileHeader`] followed by RGB565 pixels
    ImageTile = 0x02,
    /// Tile received and checksum verified (empty payload)
    TileAck = 0x03,
    /// Tile checksum mismatch (empty payload)
    TileNack = 0x04,
}

impl FrameType {
    /// Parse a type byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameType::ThroughputTest),
            0x02 => Some(FrameType::ImageTile),
            0x03 => Some(FrameType::TileAck),
            0x04 => Some(FrameType::TileNack),
            _ => None,
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> u8 {
        frame_type as u8
    }
}

/// Decoded outer frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u8,
    /// Raw type byte; may not be a known [`FrameType`]
    pub frame_type: u8,
    pub length: u16,
}

impl FrameHeader {
    /// The type byte as a known [`FrameType`], if it is one.
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }
}

/// Build a complete frame around `payload`.
///
/// `max_payload` is the configured per-frame ceiling; the 16-bit length
/// field caps it further at [`MAX_FRAME_PAYLOAD`].
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the payload exceeds either limit.
pub fn pack_frame(
    frame_type: FrameType,
    payload: &[u8],
    max_payload: usize,
) -> Result<Vec<u8>, Error> {
    let max = max_payload.min(MAX_FRAME_PAYLOAD);
    if payload.len() > max {
        return Err(Error::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.push(FRAME_MAGIC);
    frame.push(frame_type.into());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Parse the fixed 4-byte frame header from the start of `bytes`.
///
/// # Errors
///
/// Returns [`Error::MalformedFrame`] if fewer than [`FRAME_HEADER_SIZE`]
/// bytes are available or the magic byte is wrong.
pub fn unpack_frame_header(bytes: &[u8]) -> Result<FrameHeader, Error> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(Error::MalformedFrame(format!(
            "truncated header: {} of {} bytes",
            bytes.len(),
            FRAME_HEADER_SIZE
        )));
    }
    if bytes[0] != FRAME_MAGIC {
        return Err(Error::MalformedFrame(format!(
            "bad magic byte 0x{:02X}",
            bytes[0]
        )));
    }
    Ok(FrameHeader {
        magic: bytes[0],
        frame_type: bytes[1],
        length: u16::from_le_bytes([bytes[2], bytes[3]]),
    })
}

/// CRC32 (IEEE) of a tile's pixel bytes.
///
/// Computed over exactly the bytes placed on the wire; no padding.
pub fn tile_crc(pixels: &[u8]) -> u32 {
    crc32fast::hash(pixels)
}

/// Header at the start of every image tile payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub crc: u32,
}

impl TileHeader {
    /// Serialize to the 12-byte wire layout.
    pub fn pack(&self) -> [u8; TILE_HEADER_SIZE] {
        let mut out = [0u8; TILE_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.x.to_le_bytes());
        out[2..4].copy_from_slice(&self.y.to_le_bytes());
        out[4..6].copy_from_slice(&self.width.to_le_bytes());
        out[6..8].copy_from_slice(&self.height.to_le_bytes());
        out[8..12].copy_from_slice(&self.crc.to_le_bytes());
        out
    }

    /// Parse a tile header from the start of a tile payload.
    pub fn unpack(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < TILE_HEADER_SIZE {
            return Err(Error::MalformedFrame(format!(
                "truncated tile header: {} of {} bytes",
                bytes.len(),
                TILE_HEADER_SIZE
            )));
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Ok(Self {
            x: u16_at(0),
            y: u16_at(2),
            width: u16_at(4),
            height: u16_at(6),
            crc: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Build the payload of an image tile frame: header followed by pixels.
pub fn tile_payload(header: &TileHeader, pixels: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(TILE_HEADER_SIZE + pixels.len());
    payload.extend_from_slice(&header.pack());
    payload.extend_from_slice(pixels);
    payload
}
