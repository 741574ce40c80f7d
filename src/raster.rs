//! Owned RGB raster images.
//!
//! A [`RasterImage`] is a row-major grid of 8-bit RGB triples. Images are
//! plain values: `crop` returns a new image and `paste` mutates only the
//! receiver, so the "previous" and "reconstructed" frames never alias.

use std::path::Path;

use crate::error::Error;

/// An 8-bit RGB pixel.
pub type Rgb = [u8; 3];

/// Solid black.
pub const BLACK: Rgb = [0, 0, 0];

/// A width x height grid of RGB pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u16,
    height: u16,
    pixels: Vec<Rgb>,
}

impl RasterImage {
    /// Create a black image.
    pub fn new(width: u16, height: u16) -> Self {
        Self::filled(width, height, BLACK)
    }

    /// Create an image filled with a single color.
    pub fn filled(width: u16, height: u16, color: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Wrap existing row-major pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferSize`] if `pixels.len() != width * height`.
    pub fn from_pixels(width: u16, height: u16, pixels: Vec<Rgb>) -> Result<Self, Error> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(Error::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Row-major pixel slice.
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: u16, y: u16) -> Option<Rgb> {
        if x < self.width && y < self.height {
            Some(self.pixels[self.index(x, y)])
        } else {
            None
        }
    }

    /// Set the pixel at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: u16, y: u16, color: Rgb) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.pixels[i] = color;
        }
    }

    /// Fill a rectangle, clipped to the image.
    pub fn fill_rect(&mut self, x: u16, y: u16, width: u16, height: u16, color: Rgb) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y..y_end {
            let start = self.index(x.min(x_end), row);
            let end = self.index(x_end, row);
            self.pixels[start..end].fill(color);
        }
    }

    /// Copy out a rectangle, clipped to the image.
    pub fn crop(&self, x: u16, y: u16, width: u16, height: u16) -> RasterImage {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in y..y + height {
            let start = self.index(x, row);
            pixels.extend_from_slice(&self.pixels[start..start + width as usize]);
        }
        RasterImage {
            width,
            height,
            pixels,
        }
    }

    /// Copy `src` into this image with its top-left corner at `(x, y)`.
    ///
    /// Parts of `src` that fall outside this image are dropped.
    pub fn paste(&mut self, src: &RasterImage, x: u16, y: u16) {
        if x >= self.width || y >= self.height {
            return;
        }
        let copy_w = src.width.min(self.width - x) as usize;
        let copy_h = src.height.min(self.height - y);
        for row in 0..copy_h {
            let dst = self.index(x, y + row);
            let from = src.index(0, row);
            self.pixels[dst..dst + copy_w].copy_from_slice(&src.pixels[from..from + copy_w]);
        }
    }

    /// Apply `f` to every pixel, producing a new image of the same size.
    pub fn map_pixels(&self, f: impl Fn(Rgb) -> Rgb) -> RasterImage {
        RasterImage {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().map(|&px| f(px)).collect(),
        }
    }

    /// Write the image as an 8-bit RGB PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let bytes: Vec<u8> = self.pixels.iter().flatten().copied().collect();
        image::save_buffer_with_format(
            path.as_ref(),
            &bytes,
            self.width as u32,
            self.height as u32,
            image::ColorType::Rgb8,
            image::ImageFormat::Png,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = [255, 0, 0];

    #[test]
    fn test_from_pixels_checks_length() {
        assert!(RasterImage::from_pixels(2, 2, vec![BLACK; 4]).is_ok());
        let err = RasterImage::from_pixels(2, 2, vec![BLACK; 3]).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferSize {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_get_set_bounds() {
        let mut img = RasterImage::new(4, 3);
        img.set(3, 2, RED);
        img.set(4, 0, RED); // ignored
        assert_eq!(img.get(3, 2), Some(RED));
        assert_eq!(img.get(4, 0), None);
        assert_eq!(img.pixels().iter().filter(|p| **p == RED).count(), 1);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut img = RasterImage::new(10, 10);
        img.fill_rect(8, 8, 5, 5, RED);
        assert_eq!(img.pixels().iter().filter(|p| **p == RED).count(), 4);
        assert_eq!(img.get(9, 9), Some(RED));
        assert_eq!(img.get(7, 9), Some(BLACK));
    }

    #[test]
    fn test_crop_then_paste_restores_region() {
        let mut img = RasterImage::new(8, 8);
        img.fill_rect(2, 3, 3, 2, RED);

        let region = img.crop(2, 3, 3, 2);
        assert_eq!(region.width(), 3);
        assert_eq!(region.height(), 2);
        assert!(region.pixels().iter().all(|p| *p == RED));

        let mut blank = RasterImage::new(8, 8);
        blank.paste(&region, 2, 3);
        assert_eq!(blank, img);
    }

    #[test]
    fn test_crop_clips_to_image() {
        let img = RasterImage::new(5, 5);
        let region = img.crop(3, 4, 10, 10);
        assert_eq!((region.width(), region.height()), (2, 1));
    }

    #[test]
    fn test_paste_clips_overhang() {
        let mut img = RasterImage::new(4, 4);
        let patch = RasterImage::filled(3, 3, RED);
        img.paste(&patch, 2, 2);
        assert_eq!(img.pixels().iter().filter(|p| **p == RED).count(), 4);
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.png");
        let mut img = RasterImage::new(6, 4);
        img.set(1, 1, RED);
        img.save_png(&path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (6, 4));
        assert_eq!(loaded.get_pixel(1, 1).0, RED);
        assert_eq!(loaded.get_pixel(0, 0).0, BLACK);
    }
}
