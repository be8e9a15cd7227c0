//! Lattice overlay rendering and outline export
//!
//! The overlay draws every cell twice on top of the deformed image: the
//! rigid fit in blue and the shared boundary in red. Handles are drawn as
//! filled circles.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::cell::{CellOutline, Segment};
use crate::handles::Handle;

pub mod colors {
    use image::Rgb;

    pub const RIGID: Rgb<u8> = Rgb([0, 0, 255]);
    pub const BOUNDARY: Rgb<u8> = Rgb([255, 0, 0]);
    pub const HANDLE: Rgb<u8> = Rgb([0, 0, 255]);
}

/// JSON document written by [`save_outlines`]
#[derive(Debug, Serialize)]
pub struct OutlineExport<'a> {
    pub width: u32,
    pub height: u32,
    pub cells: &'a [CellOutline],
    pub handles: Vec<Handle>,
}

fn draw_segments(image: &mut RgbImage, segments: &[Segment], color: Rgb<u8>) {
    for s in segments {
        draw_line_segment_mut(
            image,
            (s.from.0 as f32, s.from.1 as f32),
            (s.to.0 as f32, s.to.1 as f32),
            color,
        );
    }
}

/// Draw outlines and handles over a copy of `base`
pub fn render<'a, I>(base: &RgbImage, outlines: &[CellOutline], handles: I, radius: f64) -> RgbImage
where
    I: IntoIterator<Item = &'a Handle>,
{
    let mut image = base.clone();

    for outline in outlines {
        draw_segments(&mut image, &outline.rigid, colors::RIGID);
    }
    // boundary on top so shared edges stay visible
    for outline in outlines {
        draw_segments(&mut image, &outline.boundary, colors::BOUNDARY);
    }

    let r = radius.round().max(1.0) as i32;
    for h in handles {
        draw_filled_circle_mut(&mut image, (h.x.round() as i32, h.y.round() as i32), r, colors::HANDLE);
    }

    image
}

pub fn save_overlay(path: &Path, image: &RgbImage) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to write overlay {:?}", path))?;
    info!("Saved overlay to {:?}", path);
    Ok(())
}

pub fn save_outlines(path: &Path, export: &OutlineExport) -> Result<()> {
    let json = serde_json::to_string_pretty(export).context("Failed to serialize outlines")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write outlines {:?}", path))?;
    info!("Saved {} cell outlines to {:?}", export.cells.len(), path);
    Ok(())
}
