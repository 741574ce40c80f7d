//! RGB565 pixel packing.
//!
//! The display stores 16 bits per pixel: 5 bits red, 6 bits green, 5 bits
//! blue, little-endian on the wire. Packing truncates the low bits of each
//! channel; unpacking expands back to 8 bits with rounding, so
//! `decode(encode(img))` is a fixed point of itself. Every image that is
//! diffed or remembered as "what the device shows" must go through
//! [`quantize`] first, otherwise sub-LSB changes look like real updates.

use crate::error::Error;
use crate::raster::{RasterImage, Rgb};

/// Bytes per packed pixel.
pub const BYTES_PER_PIXEL: usize = 2;

/// Pack one RGB888 pixel into an RGB565 word.
pub const fn pack_rgb565(rgb: Rgb) -> u16 {
    let r = (rgb[0] >> 3) as u16;
    let g = (rgb[1] >> 2) as u16;
    let b = (rgb[2] >> 3) as u16;
    (r << 11) | (g << 5) | b
}

/// Expand one RGB565 word back to RGB888.
pub const fn unpack_rgb565(word: u16) -> Rgb {
    let r5 = ((word >> 11) & 0x1F) as u32;
    let g6 = ((word >> 5) & 0x3F) as u32;
    let b5 = (word & 0x1F) as u32;
    [
        ((r5 * 255 + 15) / 31) as u8,
        ((g6 * 255 + 31) / 63) as u8,
        ((b5 * 255 + 15) / 31) as u8,
    ]
}

/// Number of packed bytes for a `width x height` region.
pub fn packed_len(width: u16, height: u16) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Encode an image as row-major little-endian RGB565.
pub fn encode(image: &RasterImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.pixels().len() * BYTES_PER_PIXEL);
    for &px in image.pixels() {
        out.extend_from_slice(&pack_rgb565(px).to_le_bytes());
    }
    out
}

/// Decode a packed RGB565 buffer into an image.
///
/// # Errors
///
/// Returns [`Error::BufferSize`] unless `buffer.len() == width * height * 2`.
pub fn decode(buffer: &[u8], width: u16, height: u16) -> Result<RasterImage, Error> {
    let expected = packed_len(width, height);
    if buffer.len() != expected {
        return Err(Error::BufferSize {
            expected,
            actual: buffer.len(),
        });
    }
    let pixels = buffer
        .chunks_exact(BYTES_PER_PIXEL)
        .map(|pair| unpack_rgb565(u16::from_le_bytes([pair[0], pair[1]])))
        .collect();
    RasterImage::from_pixels(width, height, pixels)
}

/// Reduce an image to the colors the display can actually show.
///
/// Equivalent to `decode(encode(image))` without the intermediate buffer.
pub fn quantize(image: &RasterImage) -> RasterImage {
    image.map_pixels(|px| unpack_rgb565(pack_rgb565(px)))
}
