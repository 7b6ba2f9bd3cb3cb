//! Uniform grid index for exact nearest-neighbor queries on one frame's candidates

use nalgebra::Point3;
use std::collections::HashMap;

type Cell = (i64, i64, i64);

/// Spatial grid over a fixed set of points.
///
/// Built fresh for every frame from the gated candidate set and dropped
/// afterwards; nothing is shared across frames.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    grid: HashMap<Cell, Vec<usize>>,
    points: Vec<Point3<f64>>,
    lower: Cell,
    upper: Cell,
}

/// Nearest point found by [`SpatialGrid::nearest`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index into the slice the grid was built from
    pub index: usize,
    pub distance: f64,
}

impl SpatialGrid {
    /// Build the grid over `points`.
    ///
    /// # Arguments
    /// * `points` - Candidate positions; query results index into this slice
    /// * `cell_size` - Edge length of one cell, roughly the typical marker spacing
    pub fn build(points: &[Point3<f64>], cell_size: f64) -> Self {
        let mut grid: HashMap<Cell, Vec<usize>> = HashMap::new();
        let mut lower = (i64::MAX, i64::MAX, i64::MAX);
        let mut upper = (i64::MIN, i64::MIN, i64::MIN);

        for (i, p) in points.iter().enumerate() {
            let cell = Self::cell_of(p, cell_size);
            lower = (lower.0.min(cell.0), lower.1.min(cell.1), lower.2.min(cell.2));
            upper = (upper.0.max(cell.0), upper.1.max(cell.1), upper.2.max(cell.2));
            grid.entry(cell).or_default().push(i);
        }

        Self {
            cell_size,
            grid,
            points: points.to_vec(),
            lower,
            upper,
        }
    }

    fn cell_of(p: &Point3<f64>, cell_size: f64) -> Cell {
        (
            (p.x / cell_size).floor() as i64,
            (p.y / cell_size).floor() as i64,
            (p.z / cell_size).floor() as i64,
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Exact nearest point to `query` by Euclidean distance.
    ///
    /// Searches shells of cells around the query's cell until no unvisited
    /// cell can hold a closer point. Queries far outside the occupied cells
    /// fall back to a linear scan. Equal distances resolve to the lowest
    /// point index.
    pub fn nearest(&self, query: &Point3<f64>) -> Option<Neighbor> {
        if self.points.is_empty() {
            return None;
        }

        let center = Self::cell_of(query, self.cell_size);
        let max_ring = [
            (center.0 - self.lower.0).abs(),
            (center.0 - self.upper.0).abs(),
            (center.1 - self.lower.1).abs(),
            (center.1 - self.upper.1).abs(),
            (center.2 - self.lower.2).abs(),
            (center.2 - self.upper.2).abs(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        let mut best: Option<Neighbor> = None;
        for ring in 0..=max_ring {
            // Past this size the cube holds more cells than there are points
            if (2 * ring + 1).pow(3) > self.points.len() as i64 {
                return self.scan(query);
            }
            for cell in shell(center, ring) {
                let Some(ids) = self.grid.get(&cell) else {
                    continue;
                };
                for &index in ids {
                    let distance = (self.points[index] - query).norm();
                    let closer = match best {
                        None => true,
                        Some(b) => {
                            distance < b.distance || (distance == b.distance && index < b.index)
                        }
                    };
                    if closer {
                        best = Some(Neighbor { index, distance });
                    }
                }
            }

            // Every point beyond this shell is at least `ring` whole cells away
            if let Some(b) = best {
                if b.distance < ring as f64 * self.cell_size {
                    break;
                }
            }
        }
        best
    }

    /// Linear pass over all points, same tie rule as the shell search
    fn scan(&self, query: &Point3<f64>) -> Option<Neighbor> {
        self.points
            .iter()
            .enumerate()
            .map(|(index, p)| Neighbor {
                index,
                distance: (p - query).norm(),
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)))
    }
}

/// Cells at Chebyshev distance exactly `ring` from `center`
fn shell(center: Cell, ring: i64) -> Vec<Cell> {
    if ring == 0 {
        return vec![center];
    }
    let mut cells = Vec::new();
    for dx in -ring..=ring {
        for dy in -ring..=ring {
            if dx.abs() == ring || dy.abs() == ring {
                for dz in -ring..=ring {
                    cells.push((center.0 + dx, center.1 + dy, center.2 + dz));
                }
            } else {
                cells.push((center.0 + dx, center.1 + dy, center.2 - ring));
                cells.push((center.0 + dx, center.1 + dy, center.2 + ring));
            }
        }
    }
    cells
}
