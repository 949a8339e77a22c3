//! Triangulation-based linear interpolation of scattered data.
//!
//! Nodes are triangulated with a Delaunay triangulation; a query is answered
//! by locating the triangle that contains it and blending the three node
//! values with barycentric weights. Queries outside the convex hull of the
//! nodes have no containing triangle and interpolate to NaN. A query that
//! coincides with a node returns that node's value exactly.
//!
//! Triangles are located through a uniform bucket grid laid over the node
//! bounding box, so a query only tests the few triangles overlapping its
//! bucket.

use delaunator::{triangulate, Point};
use log::{debug, warn};
use nalgebra::Vector2;

/// Weights down to this (negative) value still count as inside, so queries
/// on shared edges are not lost to rounding.
const BARYCENTRIC_TOLERANCE: f64 = 1e-9;
/// Upper bound on buckets per axis.
const MAX_BUCKETS_PER_AXIS: usize = 2048;

/// Piecewise-linear interpolator over a set of 2D nodes.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    nodes: Vec<Vector2<f64>>,
    triangles: Vec<[usize; 3]>,
    locator: TriangleGrid,
}

impl LinearInterpolator {
    /// Triangulates `nodes`. Non-finite nodes must be removed by the caller.
    pub fn new(nodes: Vec<Vector2<f64>>) -> Self {
        let triangles: Vec<[usize; 3]> = if nodes.len() < 3 {
            Vec::new()
        } else {
            let points: Vec<Point> = nodes.iter().map(|p| Point { x: p.x, y: p.y }).collect();
            triangulate(&points)
                .triangles
                .chunks_exact(3)
                .map(|t| [t[0], t[1], t[2]])
                .filter(|t| signed_double_area(&nodes, t) != 0.0)
                .collect()
        };

        if triangles.is_empty() && !nodes.is_empty() {
            warn!(
                "Triangulation of {} nodes produced no triangles (fewer than three distinct or collinear nodes)",
                nodes.len()
            );
        } else {
            debug!(
                "Triangulated {} nodes into {} triangles",
                nodes.len(),
                triangles.len()
            );
        }

        let locator = TriangleGrid::new(&nodes, &triangles);
        LinearInterpolator {
            nodes,
            triangles,
            locator,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn nodes(&self) -> &[Vector2<f64>] {
        &self.nodes
    }

    /// Finds the triangle containing `query` and its barycentric weights.
    pub fn locate(&self, query: &Vector2<f64>) -> Option<([usize; 3], [f64; 3])> {
        if !query.x.is_finite() || !query.y.is_finite() {
            return None;
        }
        let candidates = self.locator.candidates(query)?;

        // Exact node hits first, so nodes reproduce their values bit for bit.
        for &t in candidates {
            let tri = self.triangles[t];
            if let Some(k) = tri.iter().position(|&i| self.nodes[i] == *query) {
                let mut weights = [0.0; 3];
                weights[k] = 1.0;
                return Some((tri, weights));
            }
        }

        candidates.iter().find_map(|&t| {
            let tri = self.triangles[t];
            barycentric(&self.nodes, &tri, query)
                .filter(|w| w.iter().all(|v| *v >= -BARYCENTRIC_TOLERANCE))
                .map(|w| (tri, w))
        })
    }

    /// Interpolates one channel of node values at `query`.
    pub fn interpolate(&self, query: &Vector2<f64>, values: &[f64]) -> f64 {
        match self.locate(query) {
            Some((tri, weights)) => blend(&tri, &weights, values),
            None => f64::NAN,
        }
    }

    /// Interpolates several channels, locating the query once.
    pub fn interpolate_channels<const C: usize>(
        &self,
        query: &Vector2<f64>,
        channels: [&[f64]; C],
    ) -> [f64; C] {
        match self.locate(query) {
            Some((tri, weights)) => channels.map(|values| blend(&tri, &weights, values)),
            None => [f64::NAN; C],
        }
    }
}

fn blend(tri: &[usize; 3], weights: &[f64; 3], values: &[f64]) -> f64 {
    tri.iter()
        .zip(weights.iter())
        .filter(|(_, w)| **w != 0.0)
        .map(|(&i, w)| w * values[i])
        .sum()
}

fn signed_double_area(nodes: &[Vector2<f64>], tri: &[usize; 3]) -> f64 {
    let (a, b, c) = (nodes[tri[0]], nodes[tri[1]], nodes[tri[2]]);
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

fn barycentric(nodes: &[Vector2<f64>], tri: &[usize; 3], q: &Vector2<f64>) -> Option<[f64; 3]> {
    let (a, b, c) = (nodes[tri[0]], nodes[tri[1]], nodes[tri[2]]);
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det == 0.0 {
        return None;
    }
    let l1 = ((b.y - c.y) * (q.x - c.x) + (c.x - b.x) * (q.y - c.y)) / det;
    let l2 = ((c.y - a.y) * (q.x - c.x) + (a.x - c.x) * (q.y - c.y)) / det;
    Some([l1, l2, 1.0 - l1 - l2])
}

/// Uniform grid of buckets, each listing the triangles whose bounding box
/// overlaps it.
#[derive(Debug, Clone)]
struct TriangleGrid {
    min: Vector2<f64>,
    max: Vector2<f64>,
    cell: Vector2<f64>,
    cols: usize,
    rows: usize,
    buckets: Vec<Vec<usize>>,
}

impl TriangleGrid {
    fn new(nodes: &[Vector2<f64>], triangles: &[[usize; 3]]) -> Self {
        let mut min = Vector2::repeat(f64::INFINITY);
        let mut max = Vector2::repeat(f64::NEG_INFINITY);
        for tri in triangles {
            for &i in tri {
                min = min.inf(&nodes[i]);
                max = max.sup(&nodes[i]);
            }
        }

        if triangles.is_empty() {
            return TriangleGrid {
                min,
                max,
                cell: Vector2::repeat(1.0),
                cols: 0,
                rows: 0,
                buckets: Vec::new(),
            };
        }

        let side = ((triangles.len() as f64).sqrt().ceil() as usize).clamp(1, MAX_BUCKETS_PER_AXIS);
        let extent = max - min;
        let cell = Vector2::new(
            if extent.x > 0.0 { extent.x / side as f64 } else { 1.0 },
            if extent.y > 0.0 { extent.y / side as f64 } else { 1.0 },
        );

        let mut grid = TriangleGrid {
            min,
            max,
            cell,
            cols: side,
            rows: side,
            buckets: vec![Vec::new(); side * side],
        };

        for (t, tri) in triangles.iter().enumerate() {
            let (lo, hi) = tri.iter().fold(
                (Vector2::repeat(f64::INFINITY), Vector2::repeat(f64::NEG_INFINITY)),
                |(lo, hi), &i| (lo.inf(&nodes[i]), hi.sup(&nodes[i])),
            );
            let (c0, r0) = grid.cell_coords(&lo);
            let (c1, r1) = grid.cell_coords(&hi);
            for r in r0..=r1 {
                for c in c0..=c1 {
                    grid.buckets[r * grid.cols + c].push(t);
                }
            }
        }
        grid
    }

    fn cell_coords(&self, p: &Vector2<f64>) -> (usize, usize) {
        let col = ((p.x - self.min.x) / self.cell.x).floor().max(0.0) as usize;
        let row = ((p.y - self.min.y) / self.cell.y).floor().max(0.0) as usize;
        (col.min(self.cols - 1), row.min(self.rows - 1))
    }

    fn candidates(&self, q: &Vector2<f64>) -> Option<&[usize]> {
        if self.buckets.is_empty()
            || q.x < self.min.x
            || q.x > self.max.x
            || q.y < self.min.y
            || q.y > self.max.y
        {
            return None;
        }
        let (c, r) = self.cell_coords(q);
        Some(&self.buckets[r * self.cols + c])
    }
}
