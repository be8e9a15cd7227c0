//! Decoded source image, working buffer and foreground mask

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;
use tracing::{debug, info};

use crate::error::DeformError;
use crate::projector::PixelProjector;

/// Pixel data shared by the grid and the projector.
///
/// `original` is never modified after loading; `pixels` is the destination
/// buffer the cells are projected into every frame.
#[derive(Debug, Clone)]
pub struct ImageSource {
    width: u32,
    height: u32,
    original: Vec<u8>,
    pixels: Vec<u8>,
    mask: Vec<bool>,
}

impl ImageSource {
    /// Decode an image file and compute its foreground mask
    pub fn open<P>(path: &Path, projector: &P, tolerance: u8) -> Result<Self>
    where
        P: PixelProjector + ?Sized,
    {
        let rgb = image::open(path)
            .with_context(|| format!("Failed to decode image {:?}", path))?
            .to_rgb8();
        info!("Loaded {:?} ({}x{})", path, rgb.width(), rgb.height());

        let (width, height) = rgb.dimensions();
        Ok(Self::from_rgb(width, height, rgb.into_raw(), projector, tolerance)?)
    }

    /// Wrap a tightly packed RGB buffer
    pub fn from_rgb<P>(
        width: u32,
        height: u32,
        data: Vec<u8>,
        projector: &P,
        tolerance: u8,
    ) -> Result<Self, DeformError>
    where
        P: PixelProjector + ?Sized,
    {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(DeformError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        let mut mask = vec![true; width as usize * height as usize];
        projector.compute_mask(&mut mask, &data, width, height, tolerance);
        debug!(
            "Foreground mask: {} of {} pixels",
            mask.iter().filter(|&&m| m).count(),
            mask.len()
        );

        Ok(Self {
            width,
            height,
            pixels: data.clone(),
            original: data,
            mask,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    #[inline]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.mask[y as usize * self.width as usize + x as usize]
    }

    /// Mask, original and destination at once, for projection
    pub fn buffers_mut(&mut self) -> (&[bool], &[u8], &mut [u8]) {
        (&self.mask, &self.original, &mut self.pixels)
    }

    /// Reset the destination buffer through the projector
    pub fn clear<P>(&mut self, projector: &P)
    where
        P: PixelProjector + ?Sized,
    {
        projector.clear(&mut self.pixels, &self.original, self.width, self.height);
    }

    /// Current destination buffer as an image
    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let o = (y as usize * self.width as usize + x as usize) * 3;
            image::Rgb([self.pixels[o], self.pixels[o + 1], self.pixels[o + 2]])
        })
    }

    /// Save the destination buffer; the format follows the file extension
    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_image()
            .save(path)
            .with_context(|| format!("Failed to write image {:?}", path))?;
        info!("Saved deformed image to {:?}", path);
        Ok(())
    }
}
