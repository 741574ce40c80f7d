//! Changed-region detection and tile slicing.
//!
//! Given the image believed to be on the device and a freshly rendered
//! (quantized) image, [`compute_bounding_box`] finds the smallest rectangle
//! covering every differing pixel. [`slice_into_tiles`] then cuts that
//! rectangle's packed pixels into horizontal strips that each fit one frame.

use crate::error::Error;
use crate::pixel::{self, BYTES_PER_PIXEL};
use crate::raster::RasterImage;

/// Axis-aligned rectangle in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl BoundingBox {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The box covering an entire `width x height` frame.
    pub fn full_frame(width: u16, height: u16) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Number of pixels inside the box.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{} {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// Find the region that changed between `previous` and `current`.
///
/// - `previous == None` (nothing known about the device) yields the full frame.
/// - Images of different sizes also yield the full frame of `current`.
/// - Identical images yield `None`; callers must not touch the network.
///
/// Both images are expected to be quantized already.
pub fn compute_bounding_box(
    previous: Option<&RasterImage>,
    current: &RasterImage,
) -> Option<BoundingBox> {
    let full = BoundingBox::full_frame(current.width(), current.height());
    let previous = match previous {
        Some(prev) if prev.width() == current.width() && prev.height() == current.height() => prev,
        _ => return Some(full),
    };

    let width = current.width() as usize;
    if width == 0 {
        return None;
    }

    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for (y, (old_row, new_row)) in previous
        .pixels()
        .chunks_exact(width)
        .zip(current.pixels().chunks_exact(width))
        .enumerate()
    {
        let Some(first) = old_row.iter().zip(new_row).position(|(a, b)| a != b) else {
            continue;
        };
        // a difference exists, so rposition always finds one
        let last = old_row
            .iter()
            .zip(new_row)
            .rposition(|(a, b)| a != b)
            .unwrap_or(first);

        bounds = Some(match bounds {
            None => (first, y, last, y),
            Some((min_x, min_y, max_x, _)) => (min_x.min(first), min_y, max_x.max(last), y),
        });
    }

    bounds.map(|(min_x, min_y, max_x, max_y)| {
        BoundingBox::new(
            min_x as u16,
            min_y as u16,
            (max_x - min_x + 1) as u16,
            (max_y - min_y + 1) as u16,
        )
    })
}

/// Packed RGB565 bytes of the region `bbox` of `image`.
pub fn encode_region(image: &RasterImage, bbox: &BoundingBox) -> Vec<u8> {
    pixel::encode(&image.crop(bbox.x, bbox.y, bbox.width, bbox.height))
}

/// One horizontal strip of a bounding box, borrowed from the packed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile<'a> {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// `width * height * 2` bytes of RGB565
    pub pixels: &'a [u8],
}

/// How many full rows of a `width`-pixel region fit in `max_pixel_bytes`.
///
/// # Errors
///
/// Returns [`Error::DegenerateGeometry`] when `width` is zero or a single
/// row is already larger than the budget.
pub fn rows_per_tile(width: u16, max_pixel_bytes: usize) -> Result<u16, Error> {
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    if row_bytes == 0 || row_bytes > max_pixel_bytes {
        return Err(Error::DegenerateGeometry {
            width,
            max_pixel_bytes,
        });
    }
    Ok((max_pixel_bytes / row_bytes).min(u16::MAX as usize) as u16)
}

/// Cut the packed pixels of `bbox` into top-to-bottom tiles.
///
/// Tiles cover every row of the box exactly once; all but the last are
/// exactly [`rows_per_tile`] rows tall. The function is pure, so a failed
/// cycle can simply slice again.
///
/// # Errors
///
/// - [`Error::DegenerateGeometry`] for a zero-width (or over-wide) box.
/// - [`Error::BufferSize`] if `packed` does not hold exactly the box's pixels.
pub fn slice_into_tiles<'a>(
    bbox: &BoundingBox,
    packed: &'a [u8],
    max_pixel_bytes: usize,
) -> Result<Vec<Tile<'a>>, Error> {
    let rows = rows_per_tile(bbox.width, max_pixel_bytes)?;
    let expected = pixel::packed_len(bbox.width, bbox.height);
    if packed.len() != expected {
        return Err(Error::BufferSize {
            expected,
            actual: packed.len(),
        });
    }

    let row_bytes = bbox.width as usize * BYTES_PER_PIXEL;
    let mut tiles = Vec::with_capacity((bbox.height as usize).div_ceil(rows as usize));
    let mut row = 0u16;
    while row < bbox.height {
        let tile_height = rows.min(bbox.height - row);
        let start = row as usize * row_bytes;
        let end = start + tile_height as usize * row_bytes;
        tiles.push(Tile {
            x: bbox.x,
            y: bbox.y + row,
            width: bbox.width,
            height: tile_height,
            pixels: &packed[start..end],
        });
        row += tile_height;
    }
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::quantize;
    use crate::raster::Rgb;
    use proptest::prelude::*;

    const RED: Rgb = [255, 0, 0];

    #[test]
    fn test_no_previous_is_full_frame() {
        let current = RasterImage::new(320, 240);
        assert_eq!(
            compute_bounding_box(None, &current),
            Some(BoundingBox::full_frame(320, 240))
        );
    }

    #[test]
    fn test_identical_is_none() {
        let img = quantize(&RasterImage::filled(32, 24, [12, 200, 90]));
        assert_eq!(compute_bounding_box(Some(&img), &img.clone()), None);
    }

    #[test]
    fn test_size_change_is_full_frame() {
        let previous = RasterImage::new(10, 10);
        let current = RasterImage::new(12, 10);
        assert_eq!(
            compute_bounding_box(Some(&previous), &current),
            Some(BoundingBox::full_frame(12, 10))
        );
    }

    #[test]
    fn test_single_pixel() {
        let previous = RasterImage::new(20, 20);
        let mut current = previous.clone();
        current.set(7, 13, RED);
        assert_eq!(
            compute_bounding_box(Some(&previous), &current),
            Some(BoundingBox::new(7, 13, 1, 1))
        );
    }

    #[test]
    fn test_disjoint_changes_are_enclosed() {
        let previous = RasterImage::new(50, 50);
        let mut current = previous.clone();
        current.set(40, 2, RED);
        current.set(3, 30, RED);
        assert_eq!(
            compute_bounding_box(Some(&previous), &current),
            Some(BoundingBox::new(3, 2, 38, 29))
        );
    }

    #[test]
    fn test_red_rectangle_scenario() {
        let previous = quantize(&RasterImage::new(320, 240));
        let mut current = RasterImage::new(320, 240);
        current.fill_rect(50, 60, 10, 4, RED);
        let current = quantize(&current);

        let bbox = compute_bounding_box(Some(&previous), &current).unwrap();
        assert_eq!(bbox, BoundingBox::new(50, 60, 10, 4));

        let packed = encode_region(&current, &bbox);
        let tiles = slice_into_tiles(&bbox, &packed, 8180).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].pixels.len(), 40);
        assert!(tiles[0].pixels.chunks(2).all(|p| p == [0x00, 0xF8]));
    }

    #[test]
    fn test_rows_per_tile() {
        assert_eq!(rows_per_tile(320, 8180).unwrap(), 12);
        assert_eq!(rows_per_tile(10, 8180).unwrap(), 409);
        assert_eq!(rows_per_tile(1, 2).unwrap(), 1);
    }

    #[test]
    fn test_zero_width_is_degenerate() {
        let bbox = BoundingBox::new(5, 5, 0, 10);
        let err = slice_into_tiles(&bbox, &[], 8180).unwrap_err();
        assert!(err.is_degenerate());
    }

    #[test]
    fn test_row_wider_than_budget_is_degenerate() {
        assert!(rows_per_tile(100, 150).unwrap_err().is_degenerate());
    }

    #[test]
    fn test_slice_rejects_wrong_buffer() {
        let bbox = BoundingBox::new(0, 0, 4, 4);
        let err = slice_into_tiles(&bbox, &[0u8; 10], 8180).unwrap_err();
        assert!(matches!(err, Error::BufferSize { expected: 32, actual: 10 }));
    }

    #[test]
    fn test_full_frame_tiling() {
        let bbox = BoundingBox::full_frame(320, 240);
        let packed = vec![0u8; bbox.area() * 2];
        let tiles = slice_into_tiles(&bbox, &packed, 8180).unwrap();
        // 12 rows per tile, 240 / 12
        assert_eq!(tiles.len(), 20);
        assert!(tiles.iter().all(|t| t.height == 12 && t.x == 0));
        assert_eq!(tiles[19].y, 228);
    }

    #[test]
    fn test_last_tile_is_shorter() {
        let bbox = BoundingBox::new(3, 4, 10, 25);
        let packed = vec![0u8; bbox.area() * 2];
        let tiles = slice_into_tiles(&bbox, &packed, 200).unwrap();
        let heights: Vec<u16> = tiles.iter().map(|t| t.height).collect();
        assert_eq!(heights, vec![10, 10, 5]);
        assert_eq!(tiles[2].y, 24);
    }

    proptest! {
        #[test]
        fn prop_tiles_cover_box_exactly(
            x in 0u16..100,
            y in 0u16..100,
            width in 1u16..200,
            height in 0u16..200,
            budget in 400usize..10_000,
        ) {
            let bbox = BoundingBox::new(x, y, width, height);
            let packed: Vec<u8> = (0..bbox.area() * 2).map(|i| (i % 251) as u8).collect();
            let tiles = slice_into_tiles(&bbox, &packed, budget).unwrap();

            let rebuilt: Vec<u8> =
                tiles.iter().flat_map(|t| t.pixels.iter().copied()).collect();
            prop_assert_eq!(&rebuilt, &packed);
            let covered: usize = tiles.iter().map(|t| t.height as usize).sum();
            prop_assert_eq!(covered, height as usize);

            let mut next_y = y;
            for tile in &tiles {
                prop_assert_eq!(tile.y, next_y);
                prop_assert_eq!(tile.x, x);
                prop_assert_eq!(tile.width, width);
                prop_assert!(tile.width as usize * tile.height as usize * 2 <= budget);
                prop_assert_eq!(tile.pixels.len(), tile.width as usize * tile.height as usize * 2);
                next_y += tile.height;
            }
        }

        #[test]
        fn prop_bbox_encloses_every_change(
            changes in prop::collection::vec((0u16..40, 0u16..30), 1..8)
        ) {
            let previous = RasterImage::new(40, 30);
            let mut current = previous.clone();
            for &(cx, cy) in &changes {
                current.set(cx, cy, RED);
            }
            let bbox = compute_bounding_box(Some(&previous), &current).unwrap();
            for &(cx, cy) in &changes {
                prop_assert!(cx >= bbox.x && cx < bbox.x + bbox.width);
                prop_assert!(cy >= bbox.y && cy < bbox.y + bbox.height);
            }
            // tight: every edge touches a change
            prop_assert!(changes.iter().any(|&(cx, _)| cx == bbox.x));
            prop_assert!(changes.iter().any(|&(_, cy)| cy == bbox.y));
            prop_assert!(changes.iter().any(|&(cx, _)| cx == bbox.x + bbox.width - 1));
            prop_assert!(changes.iter().any(|&(_, cy)| cy == bbox.y + bbox.height - 1));
        }
    }
}
