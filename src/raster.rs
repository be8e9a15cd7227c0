//! Span rasterization of closed polygons
//!
//! Edges are traced with an integer Bresenham walk. For every row the walk
//! touches, the leftmost and rightmost column are kept. The resulting span
//! map answers containment queries and drives per-row pixel iteration.
//!
//! A span map is a snapshot of the polygon it was built from and has to be
//! rebuilt whenever the polygon changes shape.

use std::collections::BTreeMap;

/// One covered row and its inclusive column bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub row: i32,
    pub min_col: i32,
    pub max_col: i32,
}

/// Row -> (min column, max column) map of a rasterized polygon
#[derive(Debug, Clone, Default)]
pub struct SpanMap {
    spans: BTreeMap<i32, (i32, i32)>,
}

impl SpanMap {
    /// Rasterize the closed loop through `vertices`
    pub fn from_polygon(vertices: &[(i32, i32)]) -> Self {
        let mut map = Self::default();
        match vertices.len() {
            0 => {}
            1 => map.store(vertices[0].0, vertices[0].1),
            n => {
                for i in 0..n {
                    map.trace(vertices[i], vertices[(i + 1) % n]);
                }
            }
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Number of covered rows
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Column bounds recorded for `row`
    pub fn span(&self, row: i32) -> Option<(i32, i32)> {
        self.spans.get(&row).copied()
    }

    #[inline]
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        match self.spans.get(&y) {
            Some(&(min, max)) => min <= x && x <= max,
            None => false,
        }
    }

    /// Covered rows top to bottom. Each call starts a fresh iteration.
    pub fn row_spans(&self) -> impl Iterator<Item = RowSpan> + '_ {
        self.spans.iter().map(|(&row, &(min_col, max_col))| RowSpan {
            row,
            min_col,
            max_col,
        })
    }

    fn store(&mut self, x: i32, y: i32) {
        self.spans
            .entry(y)
            .and_modify(|(min, max)| {
                *min = (*min).min(x);
                *max = (*max).max(x);
            })
            .or_insert((x, x));
    }

    /// All-octant Bresenham walk, both endpoints included
    fn trace(&mut self, (x0, y0): (i32, i32), (x1, y1): (i32, i32)) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };

        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.store(x, y);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}
