//! Pixel resampling kernels
//!
//! The engine only relies on the [`PixelProjector`] contract: build a
//! foreground mask, reset the destination buffer, and fill a destination
//! quad by mapping every covered pixel back into the source image.
//! [`SoftwareProjector`] is the portable implementation used by default.
//!
//! All buffers are row-major, tightly packed RGB (3 bytes per pixel).

use std::collections::VecDeque;

use crate::config::{ClearMode, ProjectionConfig, Sampling};
use crate::raster::SpanMap;

const CHANNELS: usize = 3;

/// Resampling capability consumed by the deformation grid
pub trait PixelProjector {
    /// Fill `mask` with `true` for foreground pixels of `original`
    fn compute_mask(&self, mask: &mut [bool], original: &[u8], width: u32, height: u32, tolerance: u8);

    /// Reset `destination` before a new frame is projected
    fn clear(&self, destination: &mut [u8], original: &[u8], width: u32, height: u32);

    /// Fill the quad `vertices` of `destination` by sampling `original`
    /// through the row-major destination -> source matrix `inverse`
    #[allow(clippy::too_many_arguments)]
    fn project(
        &self,
        inverse: &[f64; 9],
        mask: &[bool],
        original: &[u8],
        destination: &mut [u8],
        width: u32,
        height: u32,
        vertices: &[(i32, i32); 4],
    );
}

/// CPU implementation of [`PixelProjector`]
#[derive(Debug, Clone, Default)]
pub struct SoftwareProjector {
    sampling: Sampling,
    clear: ClearMode,
}

impl SoftwareProjector {
    pub fn new(config: &ProjectionConfig) -> Self {
        Self {
            sampling: config.sampling,
            clear: config.clear,
        }
    }
}

impl PixelProjector for SoftwareProjector {
    fn compute_mask(&self, mask: &mut [bool], original: &[u8], width: u32, height: u32, tolerance: u8) {
        let (w, h) = (width as usize, height as usize);
        mask.fill(true);
        if w == 0 || h == 0 || mask.len() < w * h || original.len() < w * h * CHANNELS {
            return;
        }

        let tol = tolerance as i16;
        let seed = [original[0] as i16, original[1] as i16, original[2] as i16];
        let is_background = |idx: usize| {
            let px = &original[idx * CHANNELS..idx * CHANNELS + CHANNELS];
            px.iter()
                .zip(seed.iter())
                .all(|(&v, &s)| (v as i16 - s).abs() <= tol)
        };

        let mut visited = vec![false; w * h];
        let mut queue = VecDeque::new();
        visited[0] = true;
        queue.push_back((0usize, 0usize));

        while let Some((x, y)) = queue.pop_front() {
            let idx = y * w + x;
            if !is_background(idx) {
                continue;
            }
            mask[idx] = false;

            let neighbours = [
                (x.checked_sub(1), Some(y)),
                (Some(x + 1).filter(|&nx| nx < w), Some(y)),
                (Some(x), y.checked_sub(1)),
                (Some(x), Some(y + 1).filter(|&ny| ny < h)),
            ];
            for (nx, ny) in neighbours {
                if let (Some(nx), Some(ny)) = (nx, ny) {
                    let n = ny * w + nx;
                    if !visited[n] {
                        visited[n] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }
    }

    fn clear(&self, destination: &mut [u8], original: &[u8], width: u32, height: u32) {
        let len = (width as usize * height as usize * CHANNELS)
            .min(destination.len())
            .min(original.len());

        match self.clear {
            ClearMode::Original => destination[..len].copy_from_slice(&original[..len]),
            ClearMode::Background => {
                if len < CHANNELS {
                    return;
                }
                let bg = [original[0], original[1], original[2]];
                for px in destination[..len].chunks_exact_mut(CHANNELS) {
                    px.copy_from_slice(&bg);
                }
            }
        }
    }

    fn project(
        &self,
        inverse: &[f64; 9],
        mask: &[bool],
        original: &[u8],
        destination: &mut [u8],
        width: u32,
        height: u32,
        vertices: &[(i32, i32); 4],
    ) {
        let (w, h) = (width as i32, height as i32);
        if w == 0 || h == 0 {
            return;
        }
        let spans = SpanMap::from_polygon(vertices);

        for span in spans.row_spans() {
            if span.row < 0 || span.row >= h {
                continue;
            }
            let y = span.row;
            for x in span.min_col.max(0)..=span.max_col.min(w - 1) {
                let Some((sx, sy)) = map_point(inverse, x as f64, y as f64) else {
                    continue;
                };

                let (nx, ny) = (sx.round(), sy.round());
                if nx < 0.0 || ny < 0.0 || nx >= w as f64 || ny >= h as f64 {
                    continue;
                }
                if !mask[ny as usize * w as usize + nx as usize] {
                    continue;
                }

                let pixel = match self.sampling {
                    Sampling::Nearest => {
                        nearest_sample(original, width as usize, height as usize, sx, sy)
                    }
                    Sampling::Bilinear => {
                        bilinear_sample(original, width as usize, height as usize, sx, sy)
                    }
                };

                let offset = (y as usize * width as usize + x as usize) * CHANNELS;
                destination[offset..offset + CHANNELS].copy_from_slice(&pixel);
            }
        }
    }
}

/// Apply a row-major homography to a point
#[inline]
fn map_point(h: &[f64; 9], x: f64, y: f64) -> Option<(f64, f64)> {
    let w = h[6] * x + h[7] * y + h[8];
    if w.abs() < 1e-10 {
        return None;
    }
    let xp = (h[0] * x + h[1] * y + h[2]) / w;
    let yp = (h[3] * x + h[4] * y + h[5]) / w;
    (xp.is_finite() && yp.is_finite()).then_some((xp, yp))
}

/// Bilinear interpolation sampling
#[inline]
fn bilinear_sample(src: &[u8], width: usize, height: usize, x: f64, y: f64) -> [u8; CHANNELS] {
    let stride = width * CHANNELS;

    // Clamp coordinates
    let x = x.max(0.0).min((width - 1) as f64);
    let y = y.max(0.0).min((height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let mut result = [0u8; CHANNELS];

    for (c, out) in result.iter_mut().enumerate() {
        let p00 = src.get(y0 * stride + x0 * CHANNELS + c).copied().unwrap_or(0) as f64;
        let p10 = src.get(y0 * stride + x1 * CHANNELS + c).copied().unwrap_or(0) as f64;
        let p01 = src.get(y1 * stride + x0 * CHANNELS + c).copied().unwrap_or(0) as f64;
        let p11 = src.get(y1 * stride + x1 * CHANNELS + c).copied().unwrap_or(0) as f64;

        let value = p00 * (1.0 - fx) * (1.0 - fy)
            + p10 * fx * (1.0 - fy)
            + p01 * (1.0 - fx) * fy
            + p11 * fx * fy;

        *out = value.round().clamp(0.0, 255.0) as u8;
    }

    result
}

/// Nearest-neighbor sampling
#[inline]
fn nearest_sample(src: &[u8], width: usize, height: usize, x: f64, y: f64) -> [u8; CHANNELS] {
    let x = (x.round().max(0.0) as usize).min(width - 1);
    let y = (y.round().max(0.0) as usize).min(height - 1);

    let offset = (y * width + x) * CHANNELS;
    let mut result = [0u8; CHANNELS];

    for (c, out) in result.iter_mut().enumerate() {
        *out = src.get(offset + c).copied().unwrap_or(0);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 3] = [255, 255, 255];
    const RED: [u8; 3] = [200, 30, 30];

    /// White image with a red filled square [x0, x1) x [y0, y1)
    fn square_image(width: usize, height: usize, x0: usize, x1: usize, y0: usize, y1: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                let inside = (x0..x1).contains(&x) && (y0..y1).contains(&y);
                data.extend_from_slice(if inside { &RED } else { &WHITE });
            }
        }
        data
    }

    fn pixel(data: &[u8], width: usize, x: usize, y: usize) -> [u8; 3] {
        let o = (y * width + x) * 3;
        [data[o], data[o + 1], data[o + 2]]
    }

    const IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    #[test]
    fn test_mask_flood_fill() {
        let original = square_image(16, 16, 4, 12, 4, 12);
        let mut mask = vec![false; 256];
        SoftwareProjector::default().compute_mask(&mut mask, &original, 16, 16, 10);

        assert!(!mask[0]);
        assert!(!mask[3 * 16 + 3]);
        assert!(mask[4 * 16 + 4]);
        assert!(mask[11 * 16 + 11]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 64);
    }

    #[test]
    fn test_mask_keeps_enclosed_holes() {
        let mut original = square_image(16, 16, 2, 14, 2, 14);
        // background-coloured hole inside the square
        let o = (8 * 16 + 8) * 3;
        original[o..o + 3].copy_from_slice(&WHITE);

        let mut mask = vec![false; 256];
        SoftwareProjector::default().compute_mask(&mut mask, &original, 16, 16, 10);
        assert!(mask[8 * 16 + 8]);
    }

    #[test]
    fn test_mask_shorter_than_image_is_left_foreground() {
        let original = square_image(16, 16, 4, 12, 4, 12);
        let mut mask = vec![false; 10];
        SoftwareProjector::default().compute_mask(&mut mask, &original, 16, 16, 10);
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn test_mask_tolerance_band() {
        let mut original = square_image(8, 8, 8, 8, 8, 8);
        // slightly off-white pixel stays background, a darker one does not
        original[(8 + 1) * 3] = 250;
        original[(2 * 8 + 2) * 3] = 200;

        let mut mask = vec![false; 64];
        SoftwareProjector::default().compute_mask(&mut mask, &original, 8, 8, 10);
        assert!(!mask[8 + 1]);
        assert!(mask[2 * 8 + 2]);
    }

    #[test]
    fn test_clear_modes() {
        let original = square_image(4, 4, 1, 3, 1, 3);
        let mut destination = vec![0u8; original.len()];

        let background = SoftwareProjector::default();
        background.clear(&mut destination, &original, 4, 4);
        assert!(destination.chunks_exact(3).all(|px| px == WHITE));

        let restore = SoftwareProjector::new(&ProjectionConfig {
            sampling: Sampling::Nearest,
            clear: ClearMode::Original,
        });
        restore.clear(&mut destination, &original, 4, 4);
        assert_eq!(destination, original);
    }

    #[test]
    fn test_identity_projection_copies_foreground() {
        let original = square_image(16, 16, 4, 12, 4, 12);
        let mut mask = vec![false; 256];
        let projector = SoftwareProjector::default();
        projector.compute_mask(&mut mask, &original, 16, 16, 10);

        let mut destination = vec![0u8; original.len()];
        projector.project(
            &IDENTITY,
            &mask,
            &original,
            &mut destination,
            16,
            16,
            &[(4, 4), (11, 4), (11, 11), (4, 11)],
        );

        assert_eq!(pixel(&destination, 16, 4, 4), RED);
        assert_eq!(pixel(&destination, 16, 11, 11), RED);
        // outside the quad nothing is written
        assert_eq!(pixel(&destination, 16, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_projection_skips_background_samples() {
        let original = square_image(16, 16, 4, 12, 4, 12);
        let mut mask = vec![false; 256];
        let projector = SoftwareProjector::new(&ProjectionConfig {
            sampling: Sampling::Nearest,
            clear: ClearMode::Background,
        });
        projector.compute_mask(&mut mask, &original, 16, 16, 10);

        // destination (x, y) samples source (x - 2, y)
        let shift = [1.0, 0.0, -2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut destination = vec![0u8; original.len()];
        projector.project(
            &shift,
            &mask,
            &original,
            &mut destination,
            16,
            16,
            &[(4, 4), (13, 4), (13, 11), (4, 11)],
        );

        // source column 2..=3 is background: left stays untouched
        assert_eq!(pixel(&destination, 16, 4, 6), [0, 0, 0]);
        assert_eq!(pixel(&destination, 16, 5, 6), [0, 0, 0]);
        assert_eq!(pixel(&destination, 16, 6, 6), RED);
        assert_eq!(pixel(&destination, 16, 13, 6), RED);
    }

    #[test]
    fn test_projection_clips_to_image() {
        let original = square_image(8, 8, 0, 8, 0, 8);
        let mask = vec![true; 64];
        let mut destination = vec![0u8; original.len()];

        SoftwareProjector::default().project(
            &IDENTITY,
            &mask,
            &original,
            &mut destination,
            8,
            8,
            &[(-5, -5), (20, -5), (20, 20), (-5, 20)],
        );
        assert!(destination.chunks_exact(3).all(|px| px == RED));
    }

    #[test]
    fn test_bilinear_midpoint() {
        // two pixels: black and white
        let src = [0u8, 0, 0, 255, 255, 255];
        let px = bilinear_sample(&src, 2, 1, 0.5, 0.0);
        assert_eq!(px, [128, 128, 128]);

        let px = nearest_sample(&src, 2, 1, 0.4, 0.0);
        assert_eq!(px, [0, 0, 0]);
    }
}
