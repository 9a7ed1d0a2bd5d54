//! Solver-side triangular mesh.
//!
//! Stores node coordinates (in problem length units), decoded node markers,
//! linear triangles with their edge boundaries, and the periodic node pairs.
//! Every mesh carries a generation number so that selections and masks built
//! against one mesh are rejected on another.

pub mod adapter;
pub mod pslg;

pub use adapter::{MeshAdapter, MeshOptions, TriangleCommand, TriangulationOptions, Triangulator};
pub use pslg::Pslg;

pub use crate::problem::PeriodicKind;

use crate::error::{Error, Result};
use crate::types::Point2;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// A mesh node.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    pub position: Point2,
    /// Point property index.
    pub point_property: Option<usize>,
    /// Conductor index (domains with geometric conductors).
    pub conductor: Option<usize>,
}

impl MeshNode {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            point_property: None,
            conductor: None,
        }
    }
}

/// Linear triangle. Edge k joins corner k and corner (k+1) mod 3.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshElement {
    pub nodes: [usize; 3],
    pub edge_boundaries: [Option<usize>; 3],
    /// Block label the element inherits its material from.
    pub label: usize,
}

impl MeshElement {
    pub fn new(nodes: [usize; 3], label: usize) -> Self {
        Self {
            nodes,
            edge_boundaries: [None; 3],
            label,
        }
    }
}

/// Two boundary nodes whose unknowns are tied together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicPair {
    pub a: usize,
    pub b: usize,
    pub kind: PeriodicKind,
}

/// Finite element mesh.
#[derive(Debug, Clone)]
pub struct Mesh {
    nodes: Vec<MeshNode>,
    elements: Vec<MeshElement>,
    periodic: Vec<PeriodicPair>,
    generation: u64,
}

impl Mesh {
    /// Build a mesh, validating indices and counter-clockwise orientation.
    pub fn new(
        nodes: Vec<MeshNode>,
        elements: Vec<MeshElement>,
        periodic: Vec<PeriodicPair>,
    ) -> Result<Self> {
        let n = nodes.len();
        for (i, e) in elements.iter().enumerate() {
            if let Some(&bad) = e.nodes.iter().find(|&&k| k >= n) {
                return Err(Error::Mesh(format!(
                    "element {} references node {} (mesh has {} nodes)",
                    i, bad, n
                )));
            }
        }
        for p in &periodic {
            if p.a >= n || p.b >= n {
                return Err(Error::Mesh(format!(
                    "periodic pair ({}, {}) out of range (mesh has {} nodes)",
                    p.a, p.b, n
                )));
            }
        }
        let mesh = Self {
            nodes,
            elements,
            periodic,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        };
        for i in 0..mesh.elements.len() {
            let a = mesh.signed_area(i);
            if !(a > 0.0) {
                return Err(Error::Mesh(format!(
                    "element {} has non-positive area {:e} (nodes must be counter-clockwise)",
                    i, a
                )));
            }
        }
        Ok(mesh)
    }

    pub fn nodes(&self) -> &[MeshNode] {
        &self.nodes
    }

    pub fn elements(&self) -> &[MeshElement] {
        &self.elements
    }

    pub fn periodic_pairs(&self) -> &[PeriodicPair] {
        &self.periodic
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Corner coordinates of an element.
    pub fn corners(&self, element: usize) -> [Point2; 3] {
        let e = &self.elements[element];
        [
            self.nodes[e.nodes[0]].position,
            self.nodes[e.nodes[1]].position,
            self.nodes[e.nodes[2]].position,
        ]
    }

    /// Signed area in length units squared; positive for counter-clockwise corners.
    pub fn signed_area(&self, element: usize) -> f64 {
        let [a, b, c] = self.corners(element);
        0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))
    }

    pub fn centroid(&self, element: usize) -> Point2 {
        let [a, b, c] = self.corners(element);
        (a + b + c) / 3.0
    }

    /// Elements incident to each node.
    pub fn node_elements(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nodes.len()];
        for (i, e) in self.elements.iter().enumerate() {
            for &n in &e.nodes {
                out[n].push(i);
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory meshes for tests.

    use super::*;

    /// Structured mesh of the rectangle [x0, x1] × [y0, y1] with `nx` × `ny`
    /// cells, each split into two triangles. Boundary edges carry
    /// `boundary` and all elements use label 0.
    pub fn rectangle(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
        boundary: Option<usize>,
    ) -> Mesh {
        let mut nodes = Vec::new();
        for j in 0..=ny {
            for i in 0..=nx {
                let x = x0 + (x1 - x0) * i as f64 / nx as f64;
                let y = y0 + (y1 - y0) * j as f64 / ny as f64;
                nodes.push(MeshNode::new(x, y));
            }
        }
        let id = |i: usize, j: usize| j * (nx + 1) + i;
        let mut elements = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let (a, b, c, d) = (id(i, j), id(i + 1, j), id(i + 1, j + 1), id(i, j + 1));
                let mut lower = MeshElement::new([a, b, c], 0);
                let mut upper = MeshElement::new([a, c, d], 0);
                if j == 0 {
                    lower.edge_boundaries[0] = boundary;
                }
                if i == nx - 1 {
                    lower.edge_boundaries[1] = boundary;
                }
                if j == ny - 1 {
                    upper.edge_boundaries[1] = boundary;
                }
                if i == 0 {
                    upper.edge_boundaries[2] = boundary;
                }
                elements.push(lower);
                elements.push(upper);
            }
        }
        Mesh::new(nodes, elements, Vec::new()).unwrap()
    }

    /// Copy of `mesh` with outer edges re-marked by `marker(p0, p1)`.
    pub fn mark_edges(mesh: &Mesh, marker: impl Fn(Point2, Point2) -> Option<usize>) -> Mesh {
        use std::collections::HashMap;
        let mut uses: HashMap<(usize, usize), usize> = HashMap::new();
        for e in mesh.elements() {
            for k in 0..3 {
                let (a, b) = (e.nodes[k], e.nodes[(k + 1) % 3]);
                *uses.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        let mut elements = mesh.elements().to_vec();
        for e in elements.iter_mut() {
            for k in 0..3 {
                let (a, b) = (e.nodes[k], e.nodes[(k + 1) % 3]);
                if uses[&(a.min(b), a.max(b))] == 1 {
                    e.edge_boundaries[k] =
                        marker(mesh.nodes()[a].position, mesh.nodes()[b].position);
                }
            }
        }
        Mesh::new(mesh.nodes().to_vec(), elements, mesh.periodic_pairs().to_vec()).unwrap()
    }

    /// Copy of `mesh` with each element's label chosen from its centroid.
    pub fn relabel(mesh: &Mesh, label: impl Fn(Point2) -> usize) -> Mesh {
        let elements = mesh
            .elements()
            .iter()
            .enumerate()
            .map(|(e, el)| MeshElement {
                label: label(mesh.centroid(e)),
                ..el.clone()
            })
            .collect();
        Mesh::new(mesh.nodes().to_vec(), elements, mesh.periodic_pairs().to_vec()).unwrap()
    }

    /// Index of the structured-grid node at column i, row j.
    pub fn grid_node(nx: usize, i: usize, j: usize) -> usize {
        j * (nx + 1) + i
    }

    /// Half disc of radius `radius` in the r-z plane (r >= 0), in polar rings.
    /// The curved boundary carries `boundary`.
    pub fn half_disc(radius: f64, rings: usize, sectors: usize, boundary: Option<usize>) -> Mesh {
        use std::f64::consts::PI;
        let mut nodes = vec![MeshNode::new(0.0, 0.0)];
        // ring k has sectors*k + 1 nodes from angle -pi/2 to pi/2
        let mut ring_start = vec![0usize];
        for k in 1..=rings {
            ring_start.push(nodes.len());
            let rho = radius * k as f64 / rings as f64;
            let m = sectors * k;
            for s in 0..=m {
                let phi = -0.5 * PI + PI * s as f64 / m as f64;
                let (r, z) = (rho * phi.cos(), rho * phi.sin());
                nodes.push(MeshNode::new(r.max(0.0), z));
            }
        }
        let mut elements = Vec::new();
        for s in 0..sectors {
            elements.push(MeshElement::new([0, ring_start[1] + s, ring_start[1] + s + 1], 0));
        }
        for k in 1..rings {
            let inner = ring_start[k];
            let outer = ring_start[k + 1];
            let mi = sectors * k;
            let mo = sectors * (k + 1);
            // merge walk over both rings by angle
            let (mut i, mut o) = (0usize, 0usize);
            while i < mi || o < mo {
                let ai = (i + 1) as f64 / mi as f64;
                let ao = (o + 1) as f64 / mo as f64;
                if o < mo && (i >= mi || ao <= ai) {
                    elements.push(MeshElement::new([inner + i, outer + o, outer + o + 1], 0));
                    o += 1;
                } else {
                    elements.push(MeshElement::new([inner + i, outer + o, inner + i + 1], 0));
                    i += 1;
                }
            }
        }
        let outer = ring_start[rings];
        let m = sectors * rings;
        let mesh = Mesh::new(nodes, elements, Vec::new()).unwrap();
        let mut elements = mesh.elements().to_vec();
        for e in elements.iter_mut() {
            for k in 0..3 {
                let (a, b) = (e.nodes[k], e.nodes[(k + 1) % 3]);
                let on_rim = |n: usize| n >= outer && n <= outer + m;
                if on_rim(a) && on_rim(b) && a.abs_diff(b) == 1 {
                    e.edge_boundaries[k] = boundary;
                }
            }
        }
        Mesh::new(mesh.nodes().to_vec(), elements, Vec::new()).unwrap()
    }
}
