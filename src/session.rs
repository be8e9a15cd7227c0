//! Interactive deformation session
//!
//! Ties the image, the lattice, the projector and the handle set together
//! and turns pointer events (live or scripted) into control updates. Each
//! call to [`Session::advance`] is one frame: regularize then project.

use anyhow::Result;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cell::CellOutline;
use crate::config::Config;
use crate::grid::{ControlId, DeformationGrid};
use crate::handles::HandleSet;
use crate::projector::{PixelProjector, SoftwareProjector};
use crate::script::{Script, Step};
use crate::source::ImageSource;

/// Timing and coverage of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub projected: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Image, lattice and handles of one deformation session
pub struct Session<P: PixelProjector = SoftwareProjector> {
    source: ImageSource,
    grid: DeformationGrid,
    projector: P,
    handles: HandleSet,
    /// Handle being dragged, if any
    active: Option<ControlId>,

    // Performance tracking
    frame_count: u64,
    stats_interval: u64,
    window_frames: u64,
    window_start: Instant,
}

impl Session<SoftwareProjector> {
    /// Load an image and build its lattice with the software projector
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let projector = SoftwareProjector::new(&config.projection);
        let source = ImageSource::open(path, &projector, config.mask.tolerance)?;
        Ok(Self::new(source, projector, config))
    }
}

impl<P: PixelProjector> Session<P> {
    pub fn new(source: ImageSource, projector: P, config: &Config) -> Self {
        let grid = DeformationGrid::from_source(&source, &config.lattice);
        Self {
            source,
            grid,
            projector,
            handles: HandleSet::new(config.session.handle_radius),
            active: None,
            frame_count: 0,
            stats_interval: config.session.stats_interval,
            window_frames: 0,
            window_start: Instant::now(),
        }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn grid(&self) -> &DeformationGrid {
        &self.grid
    }

    pub fn handles(&self) -> &HandleSet {
        &self.handles
    }

    pub fn active(&self) -> Option<ControlId> {
        self.active
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Pointer down: select the handle under (x, y) or place a new one.
    ///
    /// A new handle only survives if the grid accepts a control there.
    pub fn grab(&mut self, x: f64, y: f64) -> Option<ControlId> {
        let id = match self.handles.select(x, y) {
            Some(id) => id,
            None => {
                let id = self.handles.create(x, y)?;
                if let Err(e) = self.grid.create_control(id, x, y) {
                    debug!("Discarding handle {}: {}", id, e);
                    self.handles.remove(id);
                    return None;
                }
                debug!("Handle {} placed at ({:.1}, {:.1})", id, x, y);
                id
            }
        };

        self.active = Some(id);
        Some(id)
    }

    /// Pointer up
    pub fn release(&mut self) {
        self.active = None;
    }

    /// Pointer move while a handle is held
    pub fn drag(&mut self, x: f64, y: f64) -> bool {
        let Some(id) = self.active else {
            return false;
        };

        self.handles.move_to(id, x, y);
        match self.grid.set_control_target(id, x, y) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping stale handle {}: {}", id, e);
                self.handles.remove(id);
                self.active = None;
                false
            }
        }
    }

    /// Remove the handle hit at (x, y) together with its control
    pub fn remove_at(&mut self, x: f64, y: f64) -> bool {
        let Some(id) = self.handles.select(x, y) else {
            return false;
        };

        if let Err(e) = self.grid.remove_control(id) {
            debug!("Handle {} had no control: {}", id, e);
        }
        self.handles.remove(id);
        if self.active == Some(id) {
            self.active = None;
        }
        debug!("Handle {} removed", id);
        true
    }

    /// Run one frame
    pub fn advance(&mut self) -> FrameStats {
        let start = Instant::now();

        self.grid.regularize();
        let projection = self.grid.project(&mut self.source, &self.projector);

        let elapsed = start.elapsed();
        self.frame_count += 1;
        self.window_frames += 1;

        if self.stats_interval > 0 && self.window_frames >= self.stats_interval {
            let secs = self.window_start.elapsed().as_secs_f64();
            let fps = if secs > 0.0 { self.window_frames as f64 / secs } else { 0.0 };
            info!(
                "Performance: {:.1} fps ({} frames in {:.2}s, {} cells, {} skipped)",
                fps, self.window_frames, secs, projection.projected, projection.skipped
            );
            self.window_frames = 0;
            self.window_start = Instant::now();
        }

        FrameStats {
            frame: self.frame_count,
            projected: projection.projected,
            skipped: projection.skipped,
            elapsed,
        }
    }

    /// Advance `frames` frames, returning the stats of the last one
    pub fn settle(&mut self, frames: u32) -> Option<FrameStats> {
        (0..frames).map(|_| self.advance()).last()
    }

    /// Drop every handle and control and return to the rest shape
    pub fn reset(&mut self) {
        self.grid.reset();
        self.handles.clear();
        self.active = None;
        self.grid.project(&mut self.source, &self.projector);
    }

    /// Replay a script. Steps that cannot be applied are logged and skipped.
    pub fn play(&mut self, script: &Script) -> u64 {
        let before = self.frame_count;

        for (i, step) in script.steps.iter().enumerate() {
            debug!("Step {}: {:?}", i, step);
            match *step {
                Step::Pin { x, y } => {
                    if self.grab(x, y).is_none() {
                        warn!("Step {}: cannot pin at ({:.1}, {:.1})", i, x, y);
                    }
                    self.release();
                }
                Step::Drag { from, to, frames } => {
                    if self.grab(from[0], from[1]).is_none() {
                        warn!("Step {}: nothing to drag at ({:.1}, {:.1})", i, from[0], from[1]);
                        continue;
                    }
                    let n = frames.max(1);
                    for k in 1..=n {
                        let t = k as f64 / n as f64;
                        self.drag(from[0] + (to[0] - from[0]) * t, from[1] + (to[1] - from[1]) * t);
                        self.advance();
                    }
                    self.release();
                }
                Step::Unpin { x, y } => {
                    if !self.remove_at(x, y) {
                        warn!("Step {}: no handle at ({:.1}, {:.1})", i, x, y);
                    }
                }
                Step::Settle { frames } => {
                    self.settle(frames);
                }
            }
        }

        let frames = self.frame_count - before;
        info!("Script finished: {} steps, {} frames", script.steps.len(), frames);
        frames
    }

    /// Outlines of every cell for drawing
    pub fn outlines(&self) -> Vec<CellOutline> {
        self.grid.draw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 192x192 white image with a gradient square on [32, 160)
    fn square_session() -> Session {
        let mut data = Vec::with_capacity(192 * 192 * 3);
        for y in 0..192u32 {
            for x in 0..192u32 {
                let inside = (32..160).contains(&x) && (32..160).contains(&y);
                let px = if inside { [x as u8, y as u8, 40] } else { [255, 255, 255] };
                data.extend_from_slice(&px);
            }
        }

        let config = Config::default();
        let projector = SoftwareProjector::new(&config.projection);
        let source = ImageSource::from_rgb(192, 192, data, &projector, 10).unwrap();
        Session::new(source, projector, &config)
    }

    #[test]
    fn test_advance_at_rest() {
        let mut session = square_session();
        let stats = session.advance();

        assert_eq!(stats.frame, 1);
        assert_eq!(stats.projected, 16);
        assert_eq!(stats.skipped, 0);
        assert_eq!(session.source().pixels(), session.source().original());
    }

    #[test]
    fn test_grab_creates_then_selects() {
        let mut session = square_session();
        let id = session.grab(96.0, 96.0).unwrap();
        assert_eq!(session.active(), Some(id));
        session.release();

        assert_eq!(session.grab(98.0, 94.0), Some(id));
        assert_eq!(session.handles().len(), 1);
        assert_eq!(session.grid().control_count(), 1);
    }

    #[test]
    fn test_grab_outside_lattice_rolls_back_handle() {
        let mut session = square_session();
        assert_eq!(session.grab(5.0, 5.0), None);
        assert!(session.handles().is_empty());
        assert_eq!(session.grid().control_count(), 0);
        assert_eq!(session.active(), None);
    }

    #[test]
    fn test_drag_deforms_image() {
        let mut session = square_session();
        session.grab(96.0, 96.0).unwrap();
        assert!(session.drag(110.0, 96.0));
        session.release();
        assert!(!session.drag(0.0, 0.0));

        session.settle(5);
        let center = session.grid().point_at(96, 96).unwrap().position();
        assert!(center.x > 96.0);
        assert_ne!(session.source().pixels(), session.source().original());
    }

    #[test]
    fn test_drag_far_outside_image_still_advances() {
        let mut session = square_session();
        session.grab(96.0, 96.0).unwrap();
        assert!(session.drag(1.0e10, 96.0));
        session.release();

        let stats = session.settle(3).unwrap();
        assert_eq!(stats.projected + stats.skipped, 16);
        for p in session.grid().points() {
            assert!(p.x().is_finite() && p.x() < 1000.0);
        }
    }

    #[test]
    fn test_remove_at() {
        let mut session = square_session();
        session.grab(64.0, 64.0).unwrap();
        assert!(!session.remove_at(120.0, 120.0));
        assert!(session.remove_at(66.0, 62.0));

        assert!(session.handles().is_empty());
        assert_eq!(session.grid().control_count(), 0);
        assert_eq!(session.active(), None);
    }

    #[test]
    fn test_reset() {
        let mut session = square_session();
        session.grab(96.0, 96.0).unwrap();
        session.drag(120.0, 80.0);
        session.settle(3);

        session.reset();
        assert!(session.handles().is_empty());
        assert_eq!(session.grid().control_count(), 0);
        assert_eq!(session.source().pixels(), session.source().original());
    }

    #[test]
    fn test_play_script() {
        let mut session = square_session();
        let script = Script {
            steps: vec![
                Step::Pin { x: 32.0, y: 32.0 },
                Step::Pin { x: 2.0, y: 2.0 },
                Step::Drag { from: [160.0, 160.0], to: [176.0, 170.0], frames: 4 },
                Step::Settle { frames: 3 },
                Step::Unpin { x: 32.0, y: 32.0 },
                Step::Unpin { x: 90.0, y: 10.0 },
            ],
        };

        let frames = session.play(&script);
        assert_eq!(frames, 7);
        assert_eq!(session.frame_count(), 7);
        assert_eq!(session.handles().len(), 1);
        assert_eq!(session.grid().control_count(), 1);
        assert_eq!(session.active(), None);

        let corner = session.grid().point_at(160, 160).unwrap().position();
        assert!(corner.x > 160.0 && corner.y > 160.0);
        assert_eq!(session.outlines().len(), 16);
    }
}
