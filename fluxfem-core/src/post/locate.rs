//! Point location on the solver mesh.

use crate::mesh::Mesh;
use crate::types::Point2;

/// Barycentric coordinates below −TOLERANCE are outside the triangle.
const TOLERANCE: f64 = 1e-9;

/// Element boxes grow by this fraction of a cell when binned.
const GRID_PAD: f64 = 1e-6;

/// Finds the triangle containing a point.
///
/// Elements are binned by bounding box into a uniform grid whose cells are
/// about one mean element extent wide. A query tests only the elements of
/// the cell holding the point.
#[derive(Debug, Clone)]
pub struct Locator {
    lo: Point2,
    hi: Point2,
    cell: f64,
    nx: usize,
    ny: usize,
    /// Elements of cell `k` are `items[starts[k]..starts[k + 1]]`.
    starts: Vec<usize>,
    items: Vec<usize>,
}

impl Locator {
    pub fn new(mesh: &Mesh) -> Self {
        let n = mesh.n_elements();
        let boxes: Vec<(Point2, Point2)> = (0..n)
            .map(|e| {
                let [a, b, c] = mesh.corners(e);
                (a.inf(&b).inf(&c), a.sup(&b).sup(&c))
            })
            .collect();
        let Some(&first) = boxes.first() else {
            return Self {
                lo: Point2::zeros(),
                hi: Point2::zeros(),
                cell: 1.0,
                nx: 0,
                ny: 0,
                starts: vec![0],
                items: Vec::new(),
            };
        };
        let (lo, hi) = boxes
            .iter()
            .fold(first, |(lo, hi), (l, h)| (lo.inf(l), hi.sup(h)));

        let span = hi - lo;
        let mean = boxes.iter().map(|(l, h)| (h - l).max()).sum::<f64>() / n as f64;
        let mut cell = if mean > 0.0 { mean } else { span.max().max(1.0) };
        let limit = (4 * n) as f64;
        if (span.x / cell) * (span.y / cell) > limit {
            cell = (span.x * span.y / limit).sqrt();
        }
        let nx = (span.x / cell).floor() as usize + 1;
        let ny = (span.y / cell).floor() as usize + 1;

        let mut locator = Self {
            lo,
            hi,
            cell,
            nx,
            ny,
            starts: vec![0; nx * ny + 1],
            items: Vec::new(),
        };
        let pad = cell * GRID_PAD;
        let ranges: Vec<_> = boxes
            .iter()
            .map(|(l, h)| {
                let (ix0, iy0) = locator.cell_of(l.add_scalar(-pad));
                let (ix1, iy1) = locator.cell_of(h.add_scalar(pad));
                (ix0, ix1, iy0, iy1)
            })
            .collect();
        for &(ix0, ix1, iy0, iy1) in &ranges {
            for iy in iy0..=iy1 {
                for ix in ix0..=ix1 {
                    locator.starts[iy * nx + ix + 1] += 1;
                }
            }
        }
        for k in 0..nx * ny {
            locator.starts[k + 1] += locator.starts[k];
        }
        let mut next = locator.starts.clone();
        locator.items = vec![0; locator.starts[nx * ny]];
        for (e, &(ix0, ix1, iy0, iy1)) in ranges.iter().enumerate() {
            for iy in iy0..=iy1 {
                for ix in ix0..=ix1 {
                    let k = iy * nx + ix;
                    locator.items[next[k]] = e;
                    next[k] += 1;
                }
            }
        }
        locator
    }

    /// Grid cell of `p`, clamped to the grid.
    fn cell_of(&self, p: Point2) -> (usize, usize) {
        let index = |v: f64, o: f64, n: usize| {
            let i = ((v - o) / self.cell).floor();
            if i <= 0.0 {
                0
            } else {
                (i as usize).min(n - 1)
            }
        };
        (index(p.x, self.lo.x, self.nx), index(p.y, self.lo.y, self.ny))
    }

    /// Element containing `p` (length units), if any.
    pub fn locate(&self, mesh: &Mesh, p: Point2) -> Option<usize> {
        let pad = self.cell * GRID_PAD;
        if self.nx == 0
            || p.x < self.lo.x - pad
            || p.y < self.lo.y - pad
            || p.x > self.hi.x + pad
            || p.y > self.hi.y + pad
        {
            return None;
        }
        let (ix, iy) = self.cell_of(p);
        let k = iy * self.nx + ix;
        self.items[self.starts[k]..self.starts[k + 1]]
            .iter()
            .copied()
            .find(|&e| barycentric(mesh, e, p).iter().all(|&l| l >= -TOLERANCE))
    }
}

/// Barycentric coordinates of `p` in element `e`.
pub fn barycentric(mesh: &Mesh, e: usize, p: Point2) -> [f64; 3] {
    let [a, b, c] = mesh.corners(e);
    let area2 = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
    let l1 = ((b.x - p.x) * (c.y - p.y) - (c.x - p.x) * (b.y - p.y)) / area2;
    let l2 = ((c.x - p.x) * (a.y - p.y) - (a.x - p.x) * (c.y - p.y)) / area2;
    [l1, l2, 1.0 - l1 - l2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::testing::{half_disc, rectangle};
    use approx::assert_relative_eq;

    #[test]
    fn test_centroids_locate_their_element() {
        for mesh in [rectangle(0.0, 3.0, -1.0, 1.0, 7, 5, None), half_disc(2.0, 5, 3, None)] {
            let locator = Locator::new(&mesh);
            for e in 0..mesh.n_elements() {
                assert_eq!(locator.locate(&mesh, mesh.centroid(e)), Some(e));
            }
        }
    }

    #[test]
    fn test_outside_point() {
        let mesh = rectangle(0.0, 1.0, 0.0, 1.0, 2, 2, None);
        let locator = Locator::new(&mesh);
        assert_eq!(locator.locate(&mesh, Point2::new(1.5, 0.5)), None);
        assert!(locator.locate(&mesh, Point2::new(1.0, 1.0)).is_some());
    }

    #[test]
    fn test_grid_agrees_with_full_scan() {
        let mesh = half_disc(2.0, 6, 4, None);
        let locator = Locator::new(&mesh);
        let inside = |e: usize, p: Point2| barycentric(&mesh, e, p).iter().all(|&l| l >= -TOLERANCE);
        for i in 0..=40 {
            for j in 0..=40 {
                let p = Point2::new(-2.2 + 4.4 * i as f64 / 40.0, -2.2 + 4.4 * j as f64 / 40.0);
                match locator.locate(&mesh, p) {
                    Some(e) => assert!(inside(e, p), "element {} does not hold {:?}", e, p),
                    None => assert!(
                        (0..mesh.n_elements()).all(|e| !inside(e, p)),
                        "missed {:?}",
                        p
                    ),
                }
            }
        }
    }

    #[test]
    fn test_grid_is_bounded_by_element_count() {
        let mesh = rectangle(0.0, 100.0, 0.0, 0.01, 50, 1, None);
        let locator = Locator::new(&mesh);
        assert!(locator.nx * locator.ny <= 4 * mesh.n_elements() + locator.nx + locator.ny + 1);
        assert!(locator.locate(&mesh, Point2::new(99.9, 0.005)).is_some());
    }

    #[test]
    fn test_barycentric_reproduces_point() {
        let mesh = rectangle(0.0, 2.0, 0.0, 1.0, 1, 1, None);
        let p = Point2::new(1.5, 0.25);
        let l = barycentric(&mesh, 0, p);
        let [a, b, c] = mesh.corners(0);
        let q = a * l[0] + b * l[1] + c * l[2];
        assert_relative_eq!(q.x, p.x, epsilon = 1e-12);
        assert_relative_eq!(q.y, p.y, epsilon = 1e-12);
    }
}
