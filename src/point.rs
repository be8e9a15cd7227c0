//! Lattice points
//!
//! A lattice point has a fixed rest position, a live position and an
//! influence weight. Points shared by several cells keep a list of the
//! cell corners whose rigid copies they are reconciled against.

use nalgebra::{Matrix2, Point2, Vector2};

/// Reference to one corner of one cell in the grid's cell list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CornerRef {
    pub cell: usize,
    pub corner: usize,
}

/// A mutable 2D lattice vertex
#[derive(Debug, Clone)]
pub struct LatticePoint {
    rest: Point2<f64>,
    pos: Point2<f64>,
    pub weight: f64,
    links: Vec<CornerRef>,
}

impl LatticePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self::with_weight(x, y, 1.0)
    }

    pub fn with_weight(x: f64, y: f64, weight: f64) -> Self {
        let p = Point2::new(x, y);
        Self {
            rest: p,
            pos: p,
            weight,
            links: Vec::new(),
        }
    }

    /// Independent point at the current position with the same weight.
    /// The copy rests where this point currently is and has no links.
    pub fn copy(&self) -> Self {
        Self::with_weight(self.pos.x, self.pos.y, self.weight)
    }

    #[inline]
    pub fn position(&self) -> Point2<f64> {
        self.pos
    }

    #[inline]
    pub fn rest(&self) -> Point2<f64> {
        self.rest
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.pos.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.pos.y
    }

    pub fn set_position(&mut self, pos: Point2<f64>) {
        self.pos = pos;
    }

    /// Move back to the rest position
    pub fn reset(&mut self) {
        self.pos = self.rest;
    }

    /// Register a dependent cell corner this point tracks
    pub fn link(&mut self, corner: CornerRef) {
        self.links.push(corner);
    }

    pub fn clear_links(&mut self) {
        self.links.clear();
    }

    pub fn links(&self) -> &[CornerRef] {
        &self.links
    }

    /// Apply a linear map in place
    pub fn rotate(&mut self, rotation: &Matrix2<f64>) -> &mut Self {
        self.pos = Point2::from(rotation * self.pos.coords);
        self
    }

    /// Offset in place
    pub fn translate(&mut self, translation: &Vector2<f64>) -> &mut Self {
        self.pos += *translation;
        self
    }

    /// Set the position to the mean of the linked corners' positions.
    /// `lookup` resolves a corner reference to its current position.
    pub fn average_linked<F>(&mut self, lookup: F)
    where
        F: Fn(CornerRef) -> Point2<f64>,
    {
        if self.links.is_empty() {
            return;
        }

        let sum = self
            .links
            .iter()
            .fold(Vector2::<f64>::zeros(), |acc, &c| acc + lookup(c).coords);
        self.pos = Point2::from(sum / self.links.len() as f64);
    }
}
