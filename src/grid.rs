//! Deformation lattice over the foreground of an image
//!
//! The grid owns every lattice point in a flat arena keyed by rest
//! coordinate, the cells tiling the foreground, and the user's controls.
//! One frame of deformation is `regularize` followed by `project`.

use nalgebra::{Point2, Vector2};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::cell::{CellOutline, RigidCell};
use crate::config::LatticeConfig;
use crate::error::DeformError;
use crate::point::{CornerRef, LatticePoint};
use crate::projector::PixelProjector;
use crate::source::ImageSource;

/// Identifier of a control, chosen by the caller (typically a handle id)
pub type ControlId = u64;

/// A pinned lattice point and where it is being dragged to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control {
    /// Index of the pinned point
    pub point: usize,
    /// Position the pinned point is snapped to on every regularization
    pub target: Point2<f64>,
    /// Pinned point position minus the grab position
    pub offset: Vector2<f64>,
}

/// Tight bounds of the foreground; `bottom` and `right` are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Bounds {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Outcome of one projection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    pub projected: usize,
    /// Cells whose geometry was degenerate this frame
    pub skipped: usize,
}

/// View of a rectangular block of a row-major mask
struct MaskRegion<'a> {
    mask: &'a [bool],
    stride: usize,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl MaskRegion<'_> {
    #[inline]
    fn at(&self, x: usize, y: usize) -> bool {
        self.mask[y * self.stride + x]
    }

    fn row_has_foreground(&self, y: usize) -> bool {
        (self.x0..self.x1).any(|x| self.at(x, y))
    }

    fn column_has_foreground(&self, x: usize) -> bool {
        (self.y0..self.y1).any(|y| self.at(x, y))
    }

    /// Scan from all four sides, each scan stopping at the first foreground hit
    fn bounds(&self) -> Option<Bounds> {
        let top = (self.y0..self.y1).find(|&y| self.row_has_foreground(y))?;
        let bottom = (self.y0..self.y1).rev().find(|&y| self.row_has_foreground(y))? + 1;
        let left = (self.x0..self.x1).find(|&x| self.column_has_foreground(x))?;
        let right = (self.x0..self.x1).rev().find(|&x| self.column_has_foreground(x))? + 1;

        Some(Bounds {
            top: top as u32,
            bottom: bottom as u32,
            left: left as u32,
            right: right as u32,
        })
    }

    fn has_foreground(&self) -> bool {
        (self.y0..self.y1).any(|y| self.row_has_foreground(y))
    }
}

/// Lattice of rigid cells laid over an image's foreground
#[derive(Debug, Clone)]
pub struct DeformationGrid {
    width: u32,
    height: u32,
    cell_size: u32,
    pin_weight: f64,
    points: Vec<LatticePoint>,
    /// Rest coordinate -> index into `points`
    index: HashMap<(i32, i32), usize>,
    /// Left, right, up, down lattice neighbours of every point
    neighbours: Vec<[Option<usize>; 4]>,
    cells: Vec<RigidCell>,
    controls: HashMap<ControlId, Control>,
    bounds: Option<Bounds>,
}

impl DeformationGrid {
    pub fn from_source(source: &ImageSource, config: &LatticeConfig) -> Self {
        Self::new(source.mask(), source.width(), source.height(), config)
    }

    /// Tile the foreground of `mask` with square cells
    pub fn new(mask: &[bool], width: u32, height: u32, config: &LatticeConfig) -> Self {
        let mut grid = Self {
            width,
            height,
            cell_size: config.cell_size.max(1),
            pin_weight: config.pin_weight,
            points: Vec::new(),
            index: HashMap::new(),
            neighbours: Vec::new(),
            cells: Vec::new(),
            controls: HashMap::new(),
            bounds: None,
        };

        let (w, h) = (width as usize, height as usize);
        if mask.len() < w * h {
            warn!("Mask has {} entries, expected {}; building an empty grid", mask.len(), w * h);
            return grid;
        }

        let full = MaskRegion { mask, stride: w, x0: 0, y0: 0, x1: w, y1: h };
        let Some(bounds) = full.bounds() else {
            warn!("No foreground found in {}x{} image", width, height);
            return grid;
        };
        grid.bounds = Some(bounds);

        let size = grid.cell_size as i64;
        let (bw, bh) = (bounds.width() as i64, bounds.height() as i64);
        let cols = (bw + size - 1) / size;
        let rows = (bh + size - 1) / size;
        let start_x = bounds.left as i64 - (cols * size - bw) / 2;
        let start_y = bounds.top as i64 - (rows * size - bh) / 2;

        let mut y = start_y;
        while y < bounds.bottom as i64 {
            let mut x = start_x;
            while x < bounds.right as i64 {
                let inside = x >= 0 && y >= 0 && x + size <= width as i64 && y + size <= height as i64;
                if inside {
                    let tile = MaskRegion {
                        mask,
                        stride: w,
                        x0: x as usize,
                        y0: y as usize,
                        x1: (x + size) as usize,
                        y1: (y + size) as usize,
                    };
                    if tile.has_foreground() {
                        grid.add_cell(x as i32, y as i32);
                    }
                }
                x += size;
            }
            y += size;
        }

        grid.link_corners();
        grid.propagate_weights();

        info!(
            "Lattice over foreground {}..{} x {}..{}: {} cells, {} points (cell size {})",
            bounds.left,
            bounds.right,
            bounds.top,
            bounds.bottom,
            grid.cells.len(),
            grid.points.len(),
            grid.cell_size
        );
        grid
    }

    fn add_point(&mut self, x: i32, y: i32) -> usize {
        let points = &mut self.points;
        *self.index.entry((x, y)).or_insert_with(|| {
            points.push(LatticePoint::new(x as f64, y as f64));
            points.len() - 1
        })
    }

    fn add_cell(&mut self, x: i32, y: i32) {
        let s = self.cell_size as i32;
        let corners = [
            self.add_point(x, y),
            self.add_point(x + s, y),
            self.add_point(x + s, y + s),
            self.add_point(x, y + s),
        ];
        self.cells.push(RigidCell::new(corners, &self.points));
    }

    /// Build the point -> cell corner back-references and the neighbour table
    fn link_corners(&mut self) {
        for p in &mut self.points {
            p.clear_links();
        }
        for (cell, c) in self.cells.iter().enumerate() {
            for (corner, &point) in c.corners().iter().enumerate() {
                self.points[point].link(CornerRef { cell, corner });
            }
        }

        let s = self.cell_size as i32;
        self.neighbours = self
            .points
            .iter()
            .map(|p| {
                let (x, y) = (p.rest().x as i32, p.rest().y as i32);
                [(x - s, y), (x + s, y), (x, y - s), (x, y + s)]
                    .map(|key| self.index.get(&key).copied())
            })
            .collect();
    }

    /// Foreground bounds found during construction
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn points(&self) -> &[LatticePoint] {
        &self.points
    }

    pub fn cells(&self) -> &[RigidCell] {
        &self.cells
    }

    /// Index of the lattice point resting at (x, y)
    pub fn point_index(&self, x: i32, y: i32) -> Option<usize> {
        self.index.get(&(x, y)).copied()
    }

    /// Lattice point resting at (x, y)
    pub fn point_at(&self, x: i32, y: i32) -> Option<&LatticePoint> {
        self.point_index(x, y).map(|i| &self.points[i])
    }

    pub fn control(&self, id: ControlId) -> Option<&Control> {
        self.controls.get(&id)
    }

    pub fn controls(&self) -> impl Iterator<Item = (ControlId, &Control)> {
        self.controls.iter().map(|(&id, c)| (id, c))
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// Pin the lattice point closest to (x, y) within the first cell that
    /// contains it. Returns the index of the pinned point.
    pub fn create_control(&mut self, id: ControlId, x: f64, y: f64) -> Result<usize, DeformError> {
        let (px, py) = (x.round() as i32, y.round() as i32);
        let cell = self
            .cells
            .iter()
            .find(|cell| cell.has_point(px, py))
            .ok_or(DeformError::NoContainingCell { x, y })?;

        let point = cell.closest_boundary(&self.points, x, y);
        self.points[point].weight = self.pin_weight;

        let pos = self.points[point].position();
        let control = Control {
            point,
            target: pos,
            offset: pos - Point2::new(x, y),
        };
        if self.controls.insert(id, control).is_some() {
            debug!("Control {} replaced", id);
        }
        debug!("Control {} pins point {} at ({:.1}, {:.1})", id, point, pos.x, pos.y);

        self.propagate_weights();
        Ok(point)
    }

    /// Drop a control; the point's weight falls back through re-propagation
    pub fn remove_control(&mut self, id: ControlId) -> Result<(), DeformError> {
        self.controls
            .remove(&id)
            .ok_or(DeformError::UnknownControl(id))?;
        debug!("Control {} removed", id);
        self.propagate_weights();
        Ok(())
    }

    /// Drag a control so its original grab point follows (x, y).
    ///
    /// Targets are clamped to one image size beyond each edge; NaN
    /// coordinates leave the target unchanged.
    pub fn set_control_target(&mut self, id: ControlId, x: f64, y: f64) -> Result<(), DeformError> {
        let (w, h) = (self.width as f64, self.height as f64);
        let control = self
            .controls
            .get_mut(&id)
            .ok_or(DeformError::UnknownControl(id))?;
        if x.is_nan() || y.is_nan() {
            debug!("Ignoring NaN target for control {}", id);
            return Ok(());
        }

        let target = Point2::new(x, y) + control.offset;
        control.target = Point2::new(target.x.clamp(-w, 2.0 * w), target.y.clamp(-h, 2.0 * h));
        Ok(())
    }

    /// Recompute every weight from scratch.
    ///
    /// All points drop to 1, then a breadth-first relaxation runs from every
    /// control at once. Each lattice hop costs `cell_size²`; a point keeps the
    /// largest weight any pin reaches it with, and a path ends once the next
    /// value would be 1 or less.
    pub fn propagate_weights(&mut self) {
        for p in &mut self.points {
            p.weight = 1.0;
        }

        let step = (self.cell_size as f64).powi(2);
        let mut queue = VecDeque::new();
        for control in self.controls.values() {
            let p = &mut self.points[control.point];
            if p.weight < self.pin_weight {
                p.weight = self.pin_weight;
                queue.push_back(control.point);
            }
        }

        while let Some(i) = queue.pop_front() {
            let next = self.points[i].weight - step;
            if next <= 1.0 {
                continue;
            }
            for n in self.neighbours[i].into_iter().flatten() {
                if next > self.points[n].weight {
                    self.points[n].weight = next;
                    queue.push_back(n);
                }
            }
        }

        for cell in &mut self.cells {
            cell.refresh_source_centroid(&self.points);
        }
    }

    /// Snap pins to their targets, fit every cell rigidly, then move every
    /// point to the mean of the rigid copies that reference it.
    pub fn regularize(&mut self) {
        for control in self.controls.values() {
            self.points[control.point].set_position(control.target);
        }

        for cell in &mut self.cells {
            cell.fit(&self.points);
        }

        let cells = &self.cells;
        for point in &mut self.points {
            point.average_linked(|c| cells[c.cell].rigid_position(c.corner));
        }

        self.rebuild_spans();
    }

    fn rebuild_spans(&mut self) {
        for cell in &mut self.cells {
            cell.rebuild_spans(&self.points);
        }
    }

    /// Clear the destination and resample every cell into its current shape.
    /// Degenerate cells are skipped for this frame.
    pub fn project<P>(&mut self, source: &mut ImageSource, projector: &P) -> ProjectionStats
    where
        P: PixelProjector + ?Sized,
    {
        source.clear(projector);

        let mut stats = ProjectionStats::default();
        for (i, cell) in self.cells.iter_mut().enumerate() {
            cell.rebuild_spans(&self.points);
            match cell.project(&self.points, source, projector) {
                Ok(()) => stats.projected += 1,
                Err(e) => {
                    debug!("Skipping cell {}: {}", i, e);
                    stats.skipped += 1;
                }
            }
        }
        stats
    }

    /// Rigid and boundary outline of every cell
    pub fn draw(&self) -> Vec<CellOutline> {
        self.cells.iter().map(|c| c.outline(&self.points)).collect()
    }

    /// Drop all controls and return the lattice to its rest shape
    pub fn reset(&mut self) {
        self.controls.clear();
        for p in &mut self.points {
            p.reset();
        }
        self.propagate_weights();
        for cell in &mut self.cells {
            cell.fit(&self.points);
        }
        self.rebuild_spans();
        info!("Lattice reset");
    }
}
