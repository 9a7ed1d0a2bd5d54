//! Authoring geometry: nodes, segments, arcs and block labels.

use super::magdir::MagDirection;
use crate::error::{Error, Result};
use crate::types::Point2;

/// A geometry node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub position: Point2,
    /// Point property index.
    pub point_property: Option<usize>,
    pub group: i32,
    /// Conductor index (electrostatics, heat and current flow).
    pub conductor: Option<usize>,
    pub selected: bool,
}

impl Node {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            point_property: None,
            group: 0,
            conductor: None,
            selected: false,
        }
    }
}

/// A straight boundary segment between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub n0: usize,
    pub n1: usize,
    pub boundary: Option<usize>,
    /// Maximum mesh edge length along the segment; `None` lets the mesher decide.
    pub max_side_length: Option<f64>,
    pub hidden: bool,
    pub group: i32,
    pub conductor: Option<usize>,
    pub selected: bool,
}

impl Segment {
    pub fn new(n0: usize, n1: usize) -> Self {
        Self {
            n0,
            n1,
            boundary: None,
            max_side_length: None,
            hidden: false,
            group: 0,
            conductor: None,
            selected: false,
        }
    }
}

/// A circular arc from `n0` to `n1`, turning counter-clockwise by `arc_angle` degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcSegment {
    pub n0: usize,
    pub n1: usize,
    pub arc_angle: f64,
    /// Maximum angle in degrees subtended by one discretized piece.
    pub max_side_angle: f64,
    pub boundary: Option<usize>,
    pub hidden: bool,
    pub group: i32,
    pub conductor: Option<usize>,
    pub selected: bool,
}

impl ArcSegment {
    pub fn new(n0: usize, n1: usize, arc_angle: f64) -> Self {
        Self {
            n0,
            n1,
            arc_angle,
            max_side_angle: 10.0,
            boundary: None,
            hidden: false,
            group: 0,
            conductor: None,
            selected: false,
        }
    }

    /// Number of straight pieces used to discretize the arc.
    pub fn pieces(&self) -> usize {
        let step = if self.max_side_angle > 0.0 {
            self.max_side_angle
        } else {
            10.0
        };
        ((self.arc_angle / step).ceil() as usize).max(1)
    }
}

/// Material assignment of a labeled region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Meshed with the given block property.
    Material(usize),
    /// Meshed, but no material has been assigned.
    Unassigned,
    /// A hole: not meshed.
    NoMesh,
}

/// A point tagging the region that encloses it.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLabel {
    pub position: Point2,
    pub region: Region,
    /// Circuit (magnetics) index.
    pub circuit: Option<usize>,
    /// Maximum element area; `None` lets the mesher decide.
    pub max_area: Option<f64>,
    pub group: i32,
    /// Winding turns (magnetics). Negative turns reverse the current.
    pub turns: i32,
    pub magnetization: MagDirection,
    pub is_default: bool,
    /// Region lies in the Kelvin-transformed exterior.
    pub is_external: bool,
    pub selected: bool,
}

impl BlockLabel {
    pub fn new(x: f64, y: f64, region: Region) -> Self {
        Self {
            position: Point2::new(x, y),
            region,
            circuit: None,
            max_area: None,
            group: 0,
            turns: 1,
            magnetization: MagDirection::default(),
            is_default: false,
            is_external: false,
            selected: false,
        }
    }

    pub fn material(&self) -> Option<usize> {
        match self.region {
            Region::Material(m) => Some(m),
            _ => None,
        }
    }
}

/// Which kind of geometry entity a selection operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Segment,
    Arc,
    Label,
}

/// Center and radius of the circle through an arc.
pub fn arc_circle(p0: Point2, p1: Point2, arc_angle: f64) -> (Point2, f64) {
    let d = p1 - p0;
    let len = d.norm();
    let half = 0.5 * arc_angle.to_radians();
    let radius = len / (2.0 * half.sin());
    let t = d / len;
    let normal = Point2::new(-t.y, t.x);
    let offset = 0.5 * len / half.tan();
    (0.5 * (p0 + p1) + normal * offset, radius)
}

/// Points along an arc, both end points included.
pub fn arc_points(p0: Point2, p1: Point2, arc_angle: f64, pieces: usize) -> Vec<Point2> {
    let (center, radius) = arc_circle(p0, p1, arc_angle);
    let start = (p0.y - center.y).atan2(p0.x - center.x);
    let step = arc_angle.to_radians() / pieces as f64;
    let mut out = Vec::with_capacity(pieces + 1);
    out.push(p0);
    for i in 1..pieces {
        let phi = start + step * i as f64;
        out.push(center + Point2::new(phi.cos(), phi.sin()) * radius);
    }
    out.push(p1);
    out
}

/// Complete authoring geometry.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub nodes: Vec<Node>,
    pub segments: Vec<Segment>,
    pub arcs: Vec<ArcSegment>,
    pub labels: Vec<BlockLabel>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, x: f64, y: f64) -> usize {
        self.nodes.push(Node::new(x, y));
        self.nodes.len() - 1
    }

    pub fn add_segment(&mut self, n0: usize, n1: usize) -> usize {
        self.segments.push(Segment::new(n0, n1));
        self.segments.len() - 1
    }

    pub fn add_arc(&mut self, n0: usize, n1: usize, arc_angle: f64) -> usize {
        self.arcs.push(ArcSegment::new(n0, n1, arc_angle));
        self.arcs.len() - 1
    }

    pub fn add_label(&mut self, label: BlockLabel) -> usize {
        self.labels.push(label);
        self.labels.len() - 1
    }

    /// Index of the default label, if any.
    pub fn default_label(&self) -> Option<usize> {
        self.labels.iter().position(|l| l.is_default)
    }

    /// Typical length scale: the diagonal of the bounding box.
    pub fn extent(&self) -> f64 {
        let mut lo = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut hi = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in self
            .nodes
            .iter()
            .map(|n| n.position)
            .chain(self.labels.iter().map(|l| l.position))
        {
            lo = lo.inf(&p);
            hi = hi.sup(&p);
        }
        if lo.x > hi.x {
            return 0.0;
        }
        (hi - lo).norm()
    }

    /// Topological checks that do not depend on property tables.
    pub fn check(&self) -> Result<()> {
        let n = self.nodes.len();
        for (i, s) in self.segments.iter().enumerate() {
            check_ends("segment", i, s.n0, s.n1, n)?;
        }
        for (i, a) in self.arcs.iter().enumerate() {
            check_ends("arc", i, a.n0, a.n1, n)?;
            if !(a.arc_angle > 0.0 && a.arc_angle <= 180.0) {
                return Err(Error::Geometry(format!(
                    "arc {} has angle {} outside (0, 180]",
                    i, a.arc_angle
                )));
            }
        }

        let tol = 1e-10 * self.extent().max(f64::MIN_POSITIVE);
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| self.nodes[a].position.x.total_cmp(&self.nodes[b].position.x));
        for (k, &i) in order.iter().enumerate() {
            let pi = self.nodes[i].position;
            for &j in order[k + 1..].iter() {
                let pj = self.nodes[j].position;
                if pj.x - pi.x > tol {
                    break;
                }
                if (pj - pi).norm() <= tol {
                    return Err(Error::Geometry(format!(
                        "nodes {} and {} coincide at ({}, {})",
                        i.min(j),
                        i.max(j),
                        pi.x,
                        pi.y
                    )));
                }
            }
        }

        let defaults: Vec<usize> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_default)
            .map(|(i, _)| i)
            .collect();
        if defaults.len() > 1 {
            return Err(Error::Geometry(format!(
                "more than one default block label: {:?}",
                defaults
            )));
        }
        Ok(())
    }

    fn anchor(&self, kind: EntityKind, i: usize) -> Point2 {
        match kind {
            EntityKind::Node => self.nodes[i].position,
            EntityKind::Segment => {
                let s = &self.segments[i];
                0.5 * (self.nodes[s.n0].position + self.nodes[s.n1].position)
            }
            EntityKind::Arc => {
                let a = &self.arcs[i];
                let pts = arc_points(self.nodes[a.n0].position, self.nodes[a.n1].position, a.arc_angle, 2);
                pts[1]
            }
            EntityKind::Label => self.labels[i].position,
        }
    }

    fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => self.nodes.len(),
            EntityKind::Segment => self.segments.len(),
            EntityKind::Arc => self.arcs.len(),
            EntityKind::Label => self.labels.len(),
        }
    }

    fn group(&self, kind: EntityKind, i: usize) -> i32 {
        match kind {
            EntityKind::Node => self.nodes[i].group,
            EntityKind::Segment => self.segments[i].group,
            EntityKind::Arc => self.arcs[i].group,
            EntityKind::Label => self.labels[i].group,
        }
    }

    fn set_selected(&mut self, kind: EntityKind, i: usize, on: bool) {
        match kind {
            EntityKind::Node => self.nodes[i].selected = on,
            EntityKind::Segment => self.segments[i].selected = on,
            EntityKind::Arc => self.arcs[i].selected = on,
            EntityKind::Label => self.labels[i].selected = on,
        }
    }

    fn is_selected(&self, kind: EntityKind, i: usize) -> bool {
        match kind {
            EntityKind::Node => self.nodes[i].selected,
            EntityKind::Segment => self.segments[i].selected,
            EntityKind::Arc => self.arcs[i].selected,
            EntityKind::Label => self.labels[i].selected,
        }
    }

    /// Toggle the entity of `kind` nearest to `point`. Returns its index.
    pub fn select_nearest(&mut self, kind: EntityKind, point: Point2) -> Option<usize> {
        let nearest = (0..self.count(kind)).min_by(|&a, &b| {
            let da = (self.anchor(kind, a) - point).norm_squared();
            let db = (self.anchor(kind, b) - point).norm_squared();
            da.total_cmp(&db)
        })?;
        let on = !self.is_selected(kind, nearest);
        self.set_selected(kind, nearest, on);
        Some(nearest)
    }

    /// Select every entity of `kind` in `group`. Returns the number selected.
    pub fn select_group(&mut self, kind: EntityKind, group: i32) -> usize {
        self.select_where(kind, |g, i, _| g.group(kind, i) == group)
    }

    /// Select entities whose anchor point lies within the circle.
    pub fn select_circle(&mut self, kind: EntityKind, center: Point2, radius: f64) -> usize {
        self.select_where(kind, |_, _, p| (p - center).norm() <= radius)
    }

    /// Select entities whose anchor point lies within the rectangle.
    pub fn select_rectangle(&mut self, kind: EntityKind, corner0: Point2, corner1: Point2) -> usize {
        let lo = corner0.inf(&corner1);
        let hi = corner0.sup(&corner1);
        self.select_where(kind, |_, _, p| {
            p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y
        })
    }

    fn select_where(&mut self, kind: EntityKind, pred: impl Fn(&Self, usize, Point2) -> bool) -> usize {
        let hits: Vec<usize> = (0..self.count(kind))
            .filter(|&i| pred(self, i, self.anchor(kind, i)))
            .collect();
        for &i in &hits {
            self.set_selected(kind, i, true);
        }
        hits.len()
    }

    pub fn clear_selection(&mut self) {
        self.nodes.iter_mut().for_each(|n| n.selected = false);
        self.segments.iter_mut().for_each(|s| s.selected = false);
        self.arcs.iter_mut().for_each(|a| a.selected = false);
        self.labels.iter_mut().for_each(|l| l.selected = false);
    }

    /// Delete the selected entities of `kind`.
    ///
    /// Deleting nodes also deletes the segments and arcs attached to them;
    /// remaining node references are renumbered.
    pub fn delete_selected(&mut self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => {
                let mut remap = vec![None; self.nodes.len()];
                let mut next = 0;
                for (i, n) in self.nodes.iter().enumerate() {
                    if !n.selected {
                        remap[i] = Some(next);
                        next += 1;
                    }
                }
                let removed = self.nodes.len() - next;
                self.nodes.retain(|n| !n.selected);
                self.segments.retain_mut(|s| match (remap[s.n0], remap[s.n1]) {
                    (Some(a), Some(b)) => {
                        s.n0 = a;
                        s.n1 = b;
                        true
                    }
                    _ => false,
                });
                self.arcs.retain_mut(|s| match (remap[s.n0], remap[s.n1]) {
                    (Some(a), Some(b)) => {
                        s.n0 = a;
                        s.n1 = b;
                        true
                    }
                    _ => false,
                });
                removed
            }
            EntityKind::Segment => {
                let before = self.segments.len();
                self.segments.retain(|s| !s.selected);
                before - self.segments.len()
            }
            EntityKind::Arc => {
                let before = self.arcs.len();
                self.arcs.retain(|a| !a.selected);
                before - self.arcs.len()
            }
            EntityKind::Label => {
                let before = self.labels.len();
                self.labels.retain(|l| !l.selected);
                before - self.labels.len()
            }
        }
    }
}

fn check_ends(what: &str, i: usize, n0: usize, n1: usize, n_nodes: usize) -> Result<()> {
    if n0 >= n_nodes || n1 >= n_nodes {
        return Err(Error::Geometry(format!(
            "{} {} references node {} but only {} nodes exist",
            what,
            i,
            n0.max(n1),
            n_nodes
        )));
    }
    if n0 == n1 {
        return Err(Error::Geometry(format!(
            "{} {} starts and ends at node {}",
            what, i, n0
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> Geometry {
        let mut g = Geometry::new();
        g.add_node(0.0, 0.0);
        g.add_node(1.0, 0.0);
        g.add_node(1.0, 1.0);
        g.add_node(0.0, 1.0);
        for i in 0..4 {
            g.add_segment(i, (i + 1) % 4);
        }
        g.add_label(BlockLabel::new(0.5, 0.5, Region::Material(0)));
        g
    }

    #[test]
    fn test_square_passes_check() {
        assert!(square().check().is_ok());
    }

    #[test]
    fn test_check_failures() {
        let mut g = square();
        g.segments[0].n1 = 0;
        assert!(matches!(g.check(), Err(Error::Geometry(_))));

        let mut g = square();
        g.add_segment(0, 9);
        assert!(g.check().is_err());

        let mut g = square();
        g.add_node(1.0, 1.0);
        let err = g.check().unwrap_err().to_string();
        assert!(err.contains("coincide"), "{}", err);

        let mut g = square();
        g.labels[0].is_default = true;
        let mut extra = BlockLabel::new(0.2, 0.2, Region::Material(0));
        extra.is_default = true;
        g.add_label(extra);
        assert!(g.check().is_err());
    }

    #[test]
    fn test_arc_circle() {
        let (c, r) = arc_circle(Point2::new(1.0, 0.0), Point2::new(0.0, 1.0), 90.0);
        assert_relative_eq!(c.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(c.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(r, 1.0, epsilon = 1e-12);

        let pts = arc_points(Point2::new(1.0, 0.0), Point2::new(-1.0, 0.0), 180.0, 4);
        assert_eq!(pts.len(), 5);
        assert_relative_eq!(pts[2].y, 1.0, epsilon = 1e-12);
        for p in &pts {
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_selection_and_delete() {
        let mut g = square();
        assert_eq!(g.select_nearest(EntityKind::Node, Point2::new(0.9, 0.1)), Some(1));
        assert_eq!(g.delete_selected(EntityKind::Node), 1);
        assert_eq!(g.nodes.len(), 3);
        // segments 0-1 and 1-2 go away, 2-3 and 3-0 are renumbered
        assert_eq!(g.segments.len(), 2);
        assert_eq!((g.segments[0].n0, g.segments[0].n1), (1, 2));
        assert_eq!((g.segments[1].n0, g.segments[1].n1), (2, 0));

        let mut g = square();
        g.segments[2].group = 7;
        assert_eq!(g.select_group(EntityKind::Segment, 7), 1);
        assert_eq!(g.select_rectangle(EntityKind::Node, Point2::new(-0.1, -0.1), Point2::new(0.5, 2.0)), 2);
        assert_eq!(g.select_circle(EntityKind::Label, Point2::new(0.5, 0.5), 0.1), 1);
    }
}
