//! Planar straight-line graph handed to the triangulator.

use crate::io::mesh_files::pack_marker;
use crate::problem::geometry::arc_points;
use crate::problem::{PeriodicKind, Problem, Region};
use crate::types::Point2;

/// A PSLG vertex with its packed marker.
#[derive(Debug, Clone, PartialEq)]
pub struct PslgPoint {
    pub position: Point2,
    pub marker: i64,
}

/// A PSLG segment with its packed (negated) marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PslgSegment {
    pub a: usize,
    pub b: usize,
    pub marker: i64,
}

/// Region seed point. `attribute` is the block label index plus one.
#[derive(Debug, Clone, PartialEq)]
pub struct PslgRegion {
    pub position: Point2,
    pub attribute: usize,
    pub max_area: Option<f64>,
}

/// Triangulator input built from a problem.
#[derive(Debug, Clone, Default)]
pub struct Pslg {
    pub points: Vec<PslgPoint>,
    pub segments: Vec<PslgSegment>,
    pub holes: Vec<Point2>,
    pub regions: Vec<PslgRegion>,
    /// Matched point pairs on periodic boundaries.
    pub periodic: Vec<(usize, usize, PeriodicKind)>,
}

/// Boundary polyline of one segment or arc, in PSLG point indices.
struct Chain {
    points: Vec<usize>,
}

impl Pslg {
    /// Build the PSLG.
    ///
    /// Segments with no length hint are split into pieces of about
    /// `default_length`. Periodic partners are split into the same number of
    /// pieces so their points can be matched one to one.
    pub fn build(problem: &Problem, default_length: Option<f64>) -> Self {
        let g = &problem.geometry;
        let mut pslg = Pslg::default();
        for n in &g.nodes {
            pslg.points.push(PslgPoint {
                position: n.position,
                marker: pack_marker(n.point_property, n.conductor),
            });
        }

        let pieces_for_length = |len: f64, hint: Option<f64>| -> usize {
            match hint.or(default_length) {
                Some(h) if h > 0.0 => ((len / h).ceil() as usize).max(1),
                _ => 1,
            }
        };

        let mut seg_pieces: Vec<usize> = g
            .segments
            .iter()
            .map(|s| {
                let len = (g.nodes[s.n1].position - g.nodes[s.n0].position).norm();
                pieces_for_length(len, s.max_side_length)
            })
            .collect();
        let mut arc_pieces: Vec<usize> = g.arcs.iter().map(|a| a.pieces()).collect();

        // equalize periodic partners
        let mut partners: Vec<(bool, usize, usize, PeriodicKind)> = Vec::new();
        for b in 0..boundary_count(problem) {
            let Some(kind) = problem.properties.boundary_periodic(b) else {
                continue;
            };
            let segs: Vec<usize> = (0..g.segments.len())
                .filter(|&i| g.segments[i].boundary == Some(b))
                .collect();
            let arcs: Vec<usize> = (0..g.arcs.len())
                .filter(|&i| g.arcs[i].boundary == Some(b))
                .collect();
            if segs.len() == 2 {
                let k = seg_pieces[segs[0]].max(seg_pieces[segs[1]]);
                seg_pieces[segs[0]] = k;
                seg_pieces[segs[1]] = k;
                partners.push((false, segs[0], segs[1], kind));
            } else if arcs.len() == 2 {
                let k = arc_pieces[arcs[0]].max(arc_pieces[arcs[1]]);
                arc_pieces[arcs[0]] = k;
                arc_pieces[arcs[1]] = k;
                partners.push((true, arcs[0], arcs[1], kind));
            }
        }

        let mut seg_chains = Vec::with_capacity(g.segments.len());
        for (i, s) in g.segments.iter().enumerate() {
            let marker = -pack_marker(s.boundary, s.conductor);
            let p0 = g.nodes[s.n0].position;
            let p1 = g.nodes[s.n1].position;
            let k = seg_pieces[i];
            let inner: Vec<Point2> = (1..k).map(|j| p0 + (p1 - p0) * (j as f64 / k as f64)).collect();
            seg_chains.push(pslg.chain(s.n0, s.n1, &inner, marker));
        }
        let mut arc_chains = Vec::with_capacity(g.arcs.len());
        for (i, a) in g.arcs.iter().enumerate() {
            let marker = -pack_marker(a.boundary, a.conductor);
            let pts = arc_points(
                g.nodes[a.n0].position,
                g.nodes[a.n1].position,
                a.arc_angle,
                arc_pieces[i],
            );
            let inner = &pts[1..pts.len() - 1];
            arc_chains.push(pslg.chain(a.n0, a.n1, inner, marker));
        }

        for (is_arc, first, second, kind) in partners {
            let (c0, c1) = if is_arc {
                (&arc_chains[first], &arc_chains[second])
            } else {
                (&seg_chains[first], &seg_chains[second])
            };
            let mut other = c1.points.clone();
            if pslg.runs_opposite(c0, c1) {
                other.reverse();
            }
            for (&a, &b) in c0.points.iter().zip(other.iter()) {
                if a != b || kind == PeriodicKind::Antiperiodic {
                    pslg.periodic.push((a, b, kind));
                }
            }
        }

        for (i, l) in g.labels.iter().enumerate() {
            match l.region {
                Region::NoMesh => pslg.holes.push(l.position),
                Region::Material(_) | Region::Unassigned => pslg.regions.push(PslgRegion {
                    position: l.position,
                    attribute: i + 1,
                    max_area: l.max_area,
                }),
            }
        }
        pslg
    }

    fn chain(&mut self, n0: usize, n1: usize, inner: &[Point2], marker: i64) -> Chain {
        let mut points = Vec::with_capacity(inner.len() + 2);
        points.push(n0);
        for &p in inner {
            self.points.push(PslgPoint { position: p, marker });
            points.push(self.points.len() - 1);
        }
        points.push(n1);
        for w in points.windows(2) {
            self.segments.push(PslgSegment {
                a: w[0],
                b: w[1],
                marker,
            });
        }
        Chain { points }
    }

    /// Whether the first point of `c0` corresponds to the last point of `c1`.
    ///
    /// Partners related by a translation have equal end offsets. Otherwise
    /// they are taken as rotated about the origin: ends match by radius, and
    /// by turning sense when the radii are the same at both ends.
    fn runs_opposite(&self, c0: &Chain, c1: &Chain) -> bool {
        let at = |c: &Chain, last: bool| {
            let i = if last { c.points[c.points.len() - 1] } else { c.points[0] };
            self.points[i].position
        };
        let (a0, a1) = (at(c0, false), at(c0, true));
        let (b0, b1) = (at(c1, false), at(c1, true));
        let tol = 1e-9 * ((a1 - a0).norm() + (b1 - b0).norm()).max(f64::MIN_POSITIVE);

        if ((b0 - a0) - (b1 - a1)).norm() <= tol {
            return false;
        }
        if ((b1 - a0) - (b0 - a1)).norm() <= tol {
            return true;
        }
        let same = (a0.norm() - b0.norm()).abs() + (a1.norm() - b1.norm()).abs();
        let swapped = (a0.norm() - b1.norm()).abs() + (a1.norm() - b0.norm()).abs();
        if (same - swapped).abs() > tol {
            return swapped < same;
        }
        let turn = |p: Point2, q: Point2| p.x * q.y - p.y * q.x;
        turn(a0, a1) * turn(b0, b1) < 0.0
    }

    pub fn has_periodic(&self) -> bool {
        !self.periodic.is_empty()
    }
}

fn boundary_count(problem: &Problem) -> usize {
    use crate::problem::Properties;
    match &problem.properties {
        Properties::Magnetic(t) => t.boundaries.len(),
        Properties::Electrostatic(t) => t.boundaries.len(),
        Properties::Heat(t) => t.boundaries.len(),
        Properties::Current(t) => t.boundaries.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mesh_files::unpack_marker;
    use crate::problem::electrostatic::{ElectrostaticBoundary, ElectrostaticBoundaryKind};
    use crate::problem::{BlockLabel, Domain, Properties};
    use approx::assert_relative_eq;

    fn strip(kind: ElectrostaticBoundaryKind) -> Problem {
        let mut p = Problem::new(Domain::Electrostatic);
        let g = &mut p.geometry;
        for (x, y) in [(0.0, 0.0), (4.0, 0.0), (4.0, 1.0), (0.0, 1.0)] {
            g.add_node(x, y);
        }
        for i in 0..4 {
            g.add_segment(i, (i + 1) % 4);
        }
        g.add_label(BlockLabel::new(2.0, 0.5, Region::Material(0)));
        g.add_label(BlockLabel::new(9.0, 9.0, Region::NoMesh));
        if let Properties::Electrostatic(t) = &mut p.properties {
            t.boundaries.push(ElectrostaticBoundary {
                name: "pbc".into(),
                kind,
            });
        }
        // right side runs up (1 -> 2), left side runs down (3 -> 0)
        p.geometry.segments[1].boundary = Some(0);
        p.geometry.segments[3].boundary = Some(0);
        p.geometry.segments[1].max_side_length = Some(0.25);
        p
    }

    #[test]
    fn test_periodic_sides_get_matched_points() {
        let p = strip(ElectrostaticBoundaryKind::Periodic);
        let pslg = Pslg::build(&p, None);
        assert_eq!(pslg.periodic.len(), 5);
        for &(a, b, kind) in &pslg.periodic {
            assert_eq!(kind, PeriodicKind::Periodic);
            let (pa, pb) = (pslg.points[a].position, pslg.points[b].position);
            assert_relative_eq!(pa.y, pb.y, epsilon = 1e-12);
            assert_relative_eq!((pa.x - pb.x).abs(), 4.0, epsilon = 1e-12);
        }
        assert_eq!(pslg.holes.len(), 1);
        assert_eq!(pslg.regions.len(), 1);
        assert_eq!(pslg.regions[0].attribute, 1);
    }

    #[test]
    fn test_antiperiodic_sides_pair_equal_heights() {
        let p = strip(ElectrostaticBoundaryKind::Antiperiodic);
        let pslg = Pslg::build(&p, None);
        assert_eq!(pslg.periodic.len(), 5);
        let mut heights: Vec<f64> = Vec::new();
        for &(a, b, kind) in &pslg.periodic {
            assert_eq!(kind, PeriodicKind::Antiperiodic);
            let (pa, pb) = (pslg.points[a].position, pslg.points[b].position);
            assert_relative_eq!(pa.y, pb.y, epsilon = 1e-12);
            assert_relative_eq!(pa.x, 4.0, epsilon = 1e-12);
            assert_relative_eq!(pb.x, 0.0, epsilon = 1e-12);
            heights.push(pa.y);
        }
        assert_eq!(heights, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_rotated_sector_sides_pair_equal_radii() {
        // quarter annulus 1 < r < 2; the two radial sides run opposite ways
        let mut p = Problem::new(Domain::Electrostatic);
        let g = &mut p.geometry;
        for (x, y) in [(1.0, 0.0), (2.0, 0.0), (0.0, 2.0), (0.0, 1.0)] {
            g.add_node(x, y);
        }
        g.add_segment(0, 1);
        g.add_segment(2, 3);
        g.add_label(BlockLabel::new(1.0, 1.0, Region::Material(0)));
        p.geometry.arcs.push(crate::problem::ArcSegment::new(1, 2, 90.0));
        p.geometry.arcs.push(crate::problem::ArcSegment::new(0, 3, 90.0));
        if let Properties::Electrostatic(t) = &mut p.properties {
            t.boundaries.push(ElectrostaticBoundary {
                name: "pbc".into(),
                kind: ElectrostaticBoundaryKind::Periodic,
            });
        }
        for s in p.geometry.segments.iter_mut() {
            s.boundary = Some(0);
            s.max_side_length = Some(0.25);
        }
        let pslg = Pslg::build(&p, None);
        assert_eq!(pslg.periodic.len(), 5);
        for &(a, b, _) in &pslg.periodic {
            let (pa, pb) = (pslg.points[a].position, pslg.points[b].position);
            assert_relative_eq!(pa.norm(), pb.norm(), epsilon = 1e-12);
            assert_relative_eq!(pa.y, 0.0, epsilon = 1e-12);
            assert_relative_eq!(pb.x, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_aligned_sides_keep_their_order() {
        let mut p = strip(ElectrostaticBoundaryKind::Periodic);
        p.geometry.segments[3] = crate::problem::Segment::new(0, 3);
        p.geometry.segments[3].boundary = Some(0);
        let pslg = Pslg::build(&p, None);
        assert_eq!(pslg.periodic.len(), 5);
        for &(a, b, _) in &pslg.periodic {
            let (pa, pb) = (pslg.points[a].position, pslg.points[b].position);
            assert_relative_eq!(pa.y, pb.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_segment_markers_are_negated() {
        let p = strip(ElectrostaticBoundaryKind::Antiperiodic);
        let pslg = Pslg::build(&p, None);
        let inner = &pslg.points[4];
        assert!(inner.marker < 0);
        assert_eq!(unpack_marker(-inner.marker), (Some(0), None));
        // 1 + 4 + 1 + 4 pieces
        assert_eq!(pslg.segments.len(), 10);
    }
}
