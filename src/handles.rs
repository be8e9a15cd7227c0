//! Handle management for pointer interaction
//!
//! A handle is the on-screen marker of a control. Handles are hit-tested
//! with a square box of half-size `radius` around their centre.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::grid::ControlId;

/// A draggable marker bound to one grid control
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Handle {
    pub id: ControlId,
    pub x: f64,
    pub y: f64,
}

impl Handle {
    /// Whether (x, y) falls inside this handle's hit box
    pub fn hit(&self, x: f64, y: f64, radius: f64) -> bool {
        (self.x - x).abs() <= radius && (self.y - y).abs() <= radius
    }

    /// Whether the hit boxes of two handles centred at `self` and (x, y) touch
    fn overlaps(&self, x: f64, y: f64, radius: f64) -> bool {
        self.hit(x, y, 2.0 * radius)
    }
}

/// All handles currently placed, keyed by id
#[derive(Debug, Clone)]
pub struct HandleSet {
    handles: BTreeMap<ControlId, Handle>,
    next_id: ControlId,
    radius: f64,
}

impl HandleSet {
    pub fn new(radius: f64) -> Self {
        Self {
            handles: BTreeMap::new(),
            next_id: 1,
            radius,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Id of the first handle whose hit box contains (x, y)
    pub fn select(&self, x: f64, y: f64) -> Option<ControlId> {
        self.handles
            .values()
            .find(|h| h.hit(x, y, self.radius))
            .map(|h| h.id)
    }

    /// Place a new handle unless its hit box would overlap an existing one
    pub fn create(&mut self, x: f64, y: f64) -> Option<ControlId> {
        if self.handles.values().any(|h| h.overlaps(x, y, self.radius)) {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.handles.insert(id, Handle { id, x, y });
        Some(id)
    }

    /// Move a handle's centre; returns false for unknown ids
    pub fn move_to(&mut self, id: ControlId, x: f64, y: f64) -> bool {
        match self.handles.get_mut(&id) {
            Some(h) => {
                h.x = x;
                h.y = y;
                true
            }
            None => {
                tracing::warn!("Invalid handle ID: {}", id);
                false
            }
        }
    }

    pub fn remove(&mut self, id: ControlId) -> Option<Handle> {
        self.handles.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}
