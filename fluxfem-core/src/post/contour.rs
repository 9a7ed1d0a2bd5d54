//! User contours for line integrals.

use crate::error::{Error, Result};
use crate::problem::geometry::arc_points;
use crate::problem::Geometry;
use crate::types::Point2;

/// Polyline in problem length units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contour {
    points: Vec<Point2>,
    /// Geometry node the contour last ended on.
    last_node: Option<usize>,
}

impl Contour {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, p: Point2) {
        if self.points.last() != Some(&p) {
            self.points.push(p);
        }
        self.last_node = None;
    }

    /// Append a geometry node. If the previous point was a node joined to
    /// this one by an arc, the contour follows the arc.
    pub fn add_node(&mut self, geometry: &Geometry, node: usize) -> Result<()> {
        let target = geometry
            .nodes
            .get(node)
            .ok_or_else(|| Error::InvalidQuery(format!("no geometry node {}", node)))?
            .position;
        if let Some(prev) = self.last_node {
            let joined = geometry.arcs.iter().find(|a| {
                (a.n0 == prev && a.n1 == node) || (a.n0 == node && a.n1 == prev)
            });
            if let Some(arc) = joined {
                let p0 = geometry.nodes[arc.n0].position;
                let p1 = geometry.nodes[arc.n1].position;
                let mut path = arc_points(p0, p1, arc.arc_angle, arc.pieces());
                if arc.n0 == node {
                    path.reverse();
                }
                self.points.extend(path.into_iter().skip(1).take_while(|&p| p != target));
            }
        }
        self.add_point(target);
        self.last_node = Some(node);
        Ok(())
    }

    /// Append the geometry node nearest to `p`; returns its index.
    pub fn add_nearest_node(&mut self, geometry: &Geometry, p: Point2) -> Result<usize> {
        let node = (0..geometry.nodes.len())
            .min_by(|&a, &b| {
                let da = (geometry.nodes[a].position - p).norm_squared();
                let db = (geometry.nodes[b].position - p).norm_squared();
                da.total_cmp(&db)
            })
            .ok_or_else(|| Error::InvalidQuery("geometry has no nodes".into()))?;
        self.add_node(geometry, node)?;
        Ok(node)
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.last_node = None;
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    /// A contour needs two distinct points to integrate along.
    pub fn is_empty(&self) -> bool {
        self.points.len() < 2
    }

    /// Total length in length units.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }
}
