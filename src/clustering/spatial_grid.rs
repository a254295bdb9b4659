//! Uniform hash grid for fixed-radius neighbour queries.
//!
//! Points are bucketed into cubic cells whose side equals the query radius, so every
//! neighbour of a point lies in the 27 cells around it. Returned neighbour lists are sorted
//! by point index, which keeps the clustering scan deterministic.
use std::collections::HashMap;

use ahash::RandomState;
use itertools::iproduct;

use crate::point_cloud::Point;

type CellKey = (i64, i64, i64);

pub(crate) struct SpatialGrid<'a> {
    points: &'a [Point],
    radius: f64,
    cells: HashMap<CellKey, Vec<usize>, RandomState>,
}

impl<'a> SpatialGrid<'a> {
    pub(crate) fn new(points: &'a [Point], radius: f64) -> Self {
        let mut cells: HashMap<CellKey, Vec<usize>, RandomState> = HashMap::default();
        for (idx, p) in points.iter().enumerate() {
            cells.entry(cell_of(p, radius)).or_default().push(idx);
        }
        SpatialGrid {
            points,
            radius,
            cells,
        }
    }

    /// Indices of all points within `radius` of point `idx`, itself included, in ascending order.
    pub(crate) fn neighbors(&self, idx: usize) -> Vec<usize> {
        let center = &self.points[idx];
        let (cx, cy, cz) = cell_of(center, self.radius);
        let r2 = self.radius * self.radius;

        let mut found: Vec<usize> = iproduct!(-1..=1, -1..=1, -1..=1)
            .filter_map(|(dx, dy, dz)| self.cells.get(&(cx + dx, cy + dy, cz + dz)))
            .flatten()
            .copied()
            .filter(|&j| self.points[j].distance_squared(center) <= r2)
            .collect();
        found.sort_unstable();
        found
    }
}

#[inline]
fn cell_of(p: &Point, size: f64) -> CellKey {
    (
        (p.x / size).floor() as i64,
        (p.y / size).floor() as i64,
        (p.z / size).floor() as i64,
    )
}
