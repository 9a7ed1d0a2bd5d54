//! Finite element assembly shared by the four physics domains.
//!
//! Element contributions are computed in parallel with Rayon and accumulated
//! into the global [`SparseSystem`] sequentially in element order, so the
//! assembled system does not depend on thread scheduling.

pub mod current;
pub mod electrostatic;
pub mod heat;
pub mod magnetic;

pub use current::CurrentAssembler;
pub use electrostatic::ElectrostaticAssembler;
pub use heat::HeatAssembler;
pub use magnetic::MagneticAssembler;

use crate::error::{Error, Result};
use crate::mesh::{Mesh, PeriodicKind};
use crate::problem::{BlockLabel, Conductor, ConductorDrive, NamedList, Problem};
use crate::sparse::SparseSystem;
use crate::types::{FieldScalar, FieldVector, Point2, ProblemType};
use rayon::prelude::*;
use std::collections::HashSet;
use std::f64::consts::PI;

/// Geometry of one linear triangle in meters.
///
/// For corner i with successors j, k: p_i = y_j − y_k and q_i = x_k − x_j,
/// so ∂N_i/∂x = p_i / 2a and ∂N_i/∂y = q_i / 2a.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementGeometry {
    pub p: [f64; 3],
    pub q: [f64; 3],
    /// Area (m²).
    pub area: f64,
    /// Centroid (m).
    pub centroid: Point2,
    /// Corners (m).
    pub corners: [Point2; 3],
}

impl ElementGeometry {
    /// `unit` converts mesh coordinates to meters.
    pub fn new(mesh: &Mesh, element: usize, unit: f64) -> Result<Self> {
        let corners = mesh.corners(element).map(|c| c * unit);
        let mut p = [0.0; 3];
        let mut q = [0.0; 3];
        for i in 0..3 {
            let j = (i + 1) % 3;
            let k = (i + 2) % 3;
            p[i] = corners[j].y - corners[k].y;
            q[i] = corners[k].x - corners[j].x;
        }
        let area = 0.5 * (p[1] * q[2] - p[2] * q[1]);
        if !(area > 0.0) {
            return Err(Error::Mesh(format!(
                "element {} has non-positive area {:e}",
                element, area
            )));
        }
        Ok(Self {
            p,
            q,
            area,
            centroid: (corners[0] + corners[1] + corners[2]) / 3.0,
            corners,
        })
    }

    /// Gradient of the interpolant through the corner values.
    pub fn gradient<T: FieldScalar>(&self, values: &[T; 3]) -> FieldVector<T> {
        let mut g = FieldVector::zero();
        for i in 0..3 {
            g.x += values[i] * T::from_real(self.p[i]);
            g.y += values[i] * T::from_real(self.q[i]);
        }
        g.scale(0.5 / self.area)
    }

    /// ∫ (cx ∂Ni/∂x ∂Nj/∂x + cy ∂Ni/∂y ∂Nj/∂y) dA.
    pub fn laplacian<T: FieldScalar>(&self, cx: T, cy: T) -> [[T; 3]; 3] {
        let s = 0.25 / self.area;
        let mut k = [[T::zero(); 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                k[i][j] = (cx * T::from_real(self.p[i] * self.p[j])
                    + cy * T::from_real(self.q[i] * self.q[j]))
                    * T::from_real(s);
            }
        }
        k
    }

    /// Consistent mass matrix ∫ Ni Nj dA.
    pub fn mass(&self) -> [[f64; 3]; 3] {
        let d = self.area / 6.0;
        let o = self.area / 12.0;
        [[d, o, o], [o, d, o], [o, o, d]]
    }
}

/// Integration weights of one element or edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    /// Multiplies stiffness, mass and mixed-boundary terms.
    pub stiffness: f64,
    /// Multiplies source terms.
    pub source: f64,
}

/// How planar integrals are weighted out of the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weighting {
    /// Constant depth (m).
    Planar { depth: f64 },
    /// Revolved about the y axis: weight 2πr.
    Axisymmetric,
    /// Axisymmetric magnetics with unknown ψ = 2πr·A: stiffness weight
    /// 1/(2πr), unit source weight.
    FluxFunction,
}

impl Weighting {
    pub fn for_problem(problem: &Problem, flux_function: bool) -> Self {
        match problem.header.problem_type {
            ProblemType::Planar => Weighting::Planar {
                depth: problem.header.depth_meters(),
            },
            ProblemType::Axisymmetric if flux_function => Weighting::FluxFunction,
            ProblemType::Axisymmetric => Weighting::Axisymmetric,
        }
    }

    /// Weights at radius `r` (m).
    pub fn at(&self, r: f64) -> Weights {
        match *self {
            Weighting::Planar { depth } => Weights {
                stiffness: depth,
                source: depth,
            },
            Weighting::Axisymmetric => Weights {
                stiffness: 2.0 * PI * r,
                source: 2.0 * PI * r,
            },
            Weighting::FluxFunction => Weights {
                stiffness: if r > 0.0 { 1.0 / (2.0 * PI * r) } else { 0.0 },
                source: 1.0,
            },
        }
    }

    pub fn is_axisymmetric(&self) -> bool {
        !matches!(self, Weighting::Planar { .. })
    }
}

/// Mesh, units and precomputed element geometry for one assembly.
pub struct MeshContext<'a> {
    pub mesh: &'a Mesh,
    pub problem: &'a Problem,
    /// Meters per length unit.
    pub unit: f64,
    pub weighting: Weighting,
    pub geometry: Vec<ElementGeometry>,
}

impl<'a> MeshContext<'a> {
    pub fn new(mesh: &'a Mesh, problem: &'a Problem, flux_function: bool) -> Result<Self> {
        let unit = problem.header.length_units.to_meters();
        let geometry = (0..mesh.n_elements())
            .into_par_iter()
            .map(|e| ElementGeometry::new(mesh, e, unit))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            mesh,
            problem,
            unit,
            weighting: Weighting::for_problem(problem, flux_function),
            geometry,
        })
    }

    pub fn weights(&self, element: usize) -> Weights {
        self.weighting.at(self.geometry[element].centroid.x)
    }

    /// Label of the element.
    pub fn label(&self, element: usize) -> &BlockLabel {
        &self.problem.geometry.labels[self.mesh.elements()[element].label]
    }

    /// Material index of the element.
    pub fn material(&self, element: usize) -> Result<usize> {
        self.label(element).material().ok_or_else(|| {
            Error::Assembly(format!(
                "element {} lies in a region without a material",
                element
            ))
        })
    }

    /// Kelvin transformation factor for exterior-region elements.
    ///
    /// (r² + (z − Zo)²) / (Ri·Ro) at the centroid, all in length units;
    /// 1 everywhere else.
    pub fn exterior_factor(&self, element: usize) -> f64 {
        if self.problem.header.problem_type != ProblemType::Axisymmetric
            || !self.label(element).is_external
        {
            return 1.0;
        }
        let ext = self.problem.header.exterior;
        let c = self.mesh.centroid(element);
        (c.x * c.x + (c.y - ext.zo).powi(2)) / (ext.ri * ext.ro)
    }

    /// Boundary edges, one entry per distinct node pair.
    pub fn boundary_edges(&self) -> Vec<BoundaryEdge> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (i, e) in self.mesh.elements().iter().enumerate() {
            for k in 0..3 {
                let Some(boundary) = e.edge_boundaries[k] else { continue };
                let (a, b) = (e.nodes[k], e.nodes[(k + 1) % 3]);
                if seen.insert((a.min(b), a.max(b))) {
                    out.push(self.edge(i, [a, b], boundary));
                }
            }
        }
        out
    }

    fn edge(&self, element: usize, nodes: [usize; 2], boundary: usize) -> BoundaryEdge {
        let p0 = self.mesh.nodes()[nodes[0]].position * self.unit;
        let p1 = self.mesh.nodes()[nodes[1]].position * self.unit;
        BoundaryEdge {
            element,
            nodes,
            boundary,
            length: (p1 - p0).norm(),
            midpoint: (p0 + p1) * 0.5,
            weights: self.weighting.at(0.5 * (p0.x + p1.x)),
        }
    }

    /// Nodes lying on the symmetry axis (axisymmetric problems).
    pub fn axis_nodes(&self) -> Vec<usize> {
        let tol = 1e-10 * self.length_scale();
        self.mesh
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| n.position.x.abs() <= tol)
            .map(|(i, _)| i)
            .collect()
    }

    fn length_scale(&self) -> f64 {
        let mut lo = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut hi = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for n in self.mesh.nodes() {
            lo = lo.inf(&n.position);
            hi = hi.sup(&n.position);
        }
        (hi - lo).norm().max(f64::MIN_POSITIVE)
    }
}

/// A mesh edge carrying a boundary condition.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryEdge {
    pub element: usize,
    pub nodes: [usize; 2],
    pub boundary: usize,
    /// Length (m).
    pub length: f64,
    /// Midpoint (m).
    pub midpoint: Point2,
    pub weights: Weights,
}

/// Mixed condition c0·u + c1 on an edge: the 2×2 block
/// c0·L·w/6·[[2,1],[1,2]] and load −c1·L·w/2 on each end.
pub fn mixed_edge<T: FieldScalar>(edge: &BoundaryEdge, c0: T, c1: T) -> ([[T; 2]; 2], [T; 2]) {
    let kl = T::from_real(edge.length * edge.weights.stiffness / 6.0);
    let fl = T::from_real(-edge.length * edge.weights.source / 2.0);
    let d = c0 * kl * T::from_real(2.0);
    let o = c0 * kl;
    ([[d, o], [o, d]], [c1 * fl, c1 * fl])
}

/// Surface source qs on an edge: qs·L·w/2 on each end.
pub fn flux_edge<T: FieldScalar>(edge: &BoundaryEdge, qs: T) -> [T; 2] {
    let f = qs * T::from_real(edge.length * edge.weights.source / 2.0);
    [f, f]
}

/// Node-to-unknown map.
///
/// Nodes of a conductor driven by its total share one extra unknown
/// after the node unknowns. Some domains add further extra unknowns.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMap {
    pub dof: Vec<usize>,
    n: usize,
    /// Extra unknown of each conductor driven by its total.
    pub conductor_unknowns: Vec<Option<usize>>,
    /// Nodes belonging to each conductor.
    pub conductor_nodes: Vec<Vec<usize>>,
}

impl UnknownMap {
    /// One unknown per node, no conductors.
    pub fn nodal(n_nodes: usize) -> Self {
        Self {
            dof: (0..n_nodes).collect(),
            n: n_nodes,
            conductor_unknowns: Vec::new(),
            conductor_nodes: Vec::new(),
        }
    }

    /// Map conductor nodes; `total_driven[c]` is true for conductors
    /// driven by their total.
    pub fn with_conductors(mesh: &Mesh, total_driven: &[bool]) -> Self {
        let mut map = Self::nodal(mesh.n_nodes());
        map.conductor_nodes = vec![Vec::new(); total_driven.len()];
        for (i, node) in mesh.nodes().iter().enumerate() {
            if let Some(c) = node.conductor.filter(|&c| c < total_driven.len()) {
                map.conductor_nodes[c].push(i);
            }
        }
        map.conductor_unknowns = vec![None; total_driven.len()];
        for (c, &total) in total_driven.iter().enumerate() {
            if total && !map.conductor_nodes[c].is_empty() {
                let k = map.push_extra();
                map.conductor_unknowns[c] = Some(k);
                for &i in &map.conductor_nodes[c] {
                    map.dof[i] = k;
                }
            }
        }
        map
    }

    /// Reserve one more extra unknown.
    pub fn push_extra(&mut self) -> usize {
        self.n += 1;
        self.n - 1
    }

    pub fn n_unknowns(&self) -> usize {
        self.n
    }

    pub fn dofs(&self, nodes: &[usize; 3]) -> [usize; 3] {
        nodes.map(|n| self.dof[n])
    }

    /// Nodal values from a full solution vector.
    pub fn node_values<T: FieldScalar>(&self, unknowns: &[T]) -> Vec<T> {
        self.dof.iter().map(|&d| unknowns[d]).collect()
    }
}

/// For each conductor, whether it is driven by its total.
pub fn total_driven<T>(conductors: &NamedList<Conductor<T>>) -> Vec<bool> {
    conductors
        .iter()
        .map(|c| matches!(c.drive, ConductorDrive::Total(_)))
        .collect()
}

/// One element's contribution.
#[derive(Debug, Clone)]
pub struct ElementBlock<T> {
    pub dofs: [usize; 3],
    pub k: [[T; 3]; 3],
    pub f: [T; 3],
    /// Coupling to one extra unknown g: column entries K[i][g] = K[g][i]
    /// and the diagonal K[g][g].
    pub coupling: Option<(usize, [T; 3], T)>,
}

impl<T: FieldScalar> ElementBlock<T> {
    pub fn new(dofs: [usize; 3]) -> Self {
        Self {
            dofs,
            k: [[T::zero(); 3]; 3],
            f: [T::zero(); 3],
            coupling: None,
        }
    }
}

/// Compute element blocks in parallel and accumulate them in order.
pub fn assemble_elements<T, F>(system: &mut SparseSystem<T>, n_elements: usize, block: F) -> Result<()>
where
    T: FieldScalar,
    F: Fn(usize) -> Result<ElementBlock<T>> + Sync + Send,
{
    let blocks = (0..n_elements)
        .into_par_iter()
        .map(block)
        .collect::<Result<Vec<_>>>()?;
    for b in &blocks {
        system.add_block(&b.dofs, &b.k, &b.f);
        if let Some((g, col, diag)) = b.coupling {
            for i in 0..3 {
                system.add(b.dofs[i], g, col[i]);
                system.add(g, b.dofs[i], col[i]);
            }
            system.add(g, g, diag);
        }
    }
    Ok(())
}

/// Add a 2×2 edge block.
pub fn add_edge<T: FieldScalar>(system: &mut SparseSystem<T>, dofs: [usize; 2], k: [[T; 2]; 2], f: [T; 2]) {
    system.add_block(&dofs, &k, &f);
}

/// Tie periodic node pairs.
pub fn apply_periodic<T: FieldScalar>(system: &mut SparseSystem<T>, mesh: &Mesh, map: &UnknownMap) {
    for pair in mesh.periodic_pairs() {
        let (a, b) = (map.dof[pair.a], map.dof[pair.b]);
        match pair.kind {
            PeriodicKind::Periodic => system.periodicity(a, b),
            PeriodicKind::Antiperiodic => system.antiperiodicity(a, b),
        }
    }
}

/// Potential and total of one conductor after the solve.
#[derive(Debug, Clone, PartialEq)]
pub struct ConductorResult<T> {
    pub name: String,
    pub potential: T,
    /// Charge (C), heat flow (W) or current (A).
    pub total: T,
}

/// Conductor potentials and totals from a solved system.
///
/// Potential-driven totals are the reactions of the conductor's nodes on
/// the assembled, unconstrained equations.
pub fn conductor_results<T: FieldScalar>(
    conductors: &NamedList<Conductor<T>>,
    map: &UnknownMap,
    system: &SparseSystem<T>,
    unknowns: &[T],
) -> Vec<ConductorResult<T>> {
    conductors
        .iter()
        .enumerate()
        .map(|(c, conductor)| {
            let nodes = map.conductor_nodes.get(c).map(Vec::as_slice).unwrap_or(&[]);
            let (potential, total) = match conductor.drive {
                ConductorDrive::Total(total) => {
                    let k = map.conductor_unknowns.get(c).copied().flatten();
                    (k.map(|k| unknowns[k]).unwrap_or_else(T::zero), total)
                }
                ConductorDrive::Potential(v) => {
                    let rows: Vec<usize> = nodes.iter().map(|&n| map.dof[n]).collect();
                    (v, system.reaction_sum(&rows, unknowns))
                }
            };
            ConductorResult {
                name: conductor.name.clone(),
                potential,
                total,
            }
        })
        .collect()
}

/// Fix or drive the conductors of a domain with geometric conductors.
pub fn apply_conductors<T: FieldScalar>(
    system: &mut SparseSystem<T>,
    conductors: &NamedList<Conductor<T>>,
    map: &UnknownMap,
) {
    for (c, conductor) in conductors.iter().enumerate() {
        let nodes = map.conductor_nodes.get(c).map(Vec::as_slice).unwrap_or(&[]);
        match conductor.drive {
            ConductorDrive::Potential(v) => {
                for &n in nodes {
                    system.set_value(map.dof[n], v);
                }
            }
            ConductorDrive::Total(total) => {
                if let Some(k) = map.conductor_unknowns.get(c).copied().flatten() {
                    system.add_rhs(k, total);
                }
            }
        }
    }
}

/// A physics domain that can assemble its system, given the previous iterate.
pub trait PhysicsAssembler: Sync {
    type Scalar: FieldScalar;

    /// Number of unknowns, nodes included.
    fn n_unknowns(&self) -> usize;

    /// Assemble with material and boundary responses evaluated at
    /// `previous` (full unknown vector), or at their initial values.
    fn assemble(&self, previous: Option<&[Self::Scalar]>) -> Result<SparseSystem<Self::Scalar>>;

    /// True if the response depends on the solution.
    fn is_nonlinear(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::solver::{PcgSolver, Solver};
    use crate::sparse::SparseSystem;
    use crate::types::FieldScalar;

    /// Finish and solve a system, returning every unknown.
    pub fn solve<T: FieldScalar>(system: &SparseSystem<T>) -> Vec<T> {
        let reduced = system.finish().unwrap();
        let x = PcgSolver::new(1e-12, 10_000)
            .solve(&reduced.matrix, &reduced.rhs)
            .unwrap();
        reduced.expand(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::testing::rectangle;
    use crate::problem::Domain;
    use approx::assert_relative_eq;

    #[test]
    fn test_element_geometry() {
        let mesh = rectangle(0.0, 1.0, 0.0, 1.0, 1, 1, None);
        let g = ElementGeometry::new(&mesh, 0, 2.0).unwrap();
        assert_relative_eq!(g.area, 2.0);
        assert_relative_eq!(g.p.iter().sum::<f64>(), 0.0);
        // u = 3x − y at the scaled corners
        let vals = g.corners.map(|c| 3.0 * c.x - c.y);
        let grad = g.gradient(&vals);
        assert_relative_eq!(grad.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(grad.y, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_laplacian_rows_sum_to_zero() {
        let mesh = rectangle(0.0, 2.0, 0.0, 1.0, 1, 1, None);
        let g = ElementGeometry::new(&mesh, 1, 1.0).unwrap();
        let k = g.laplacian(2.0, 5.0);
        for row in &k {
            assert_relative_eq!(row.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        }
        let m: f64 = g.mass().iter().flatten().sum();
        assert_relative_eq!(m, g.area, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_edges_are_unique() {
        let mesh = rectangle(0.0, 1.0, 0.0, 1.0, 3, 2, Some(0));
        let problem = Problem::new(Domain::Heat);
        let ctx = MeshContext::new(&mesh, &problem, false).unwrap();
        let edges = ctx.boundary_edges();
        assert_eq!(edges.len(), 10);
        let total: f64 = edges.iter().map(|e| e.length).sum();
        // default length unit is the inch
        assert_relative_eq!(total, 4.0 * 0.0254, epsilon = 1e-12);
    }

    #[test]
    fn test_weighting() {
        let w = Weighting::Axisymmetric.at(0.5);
        assert_relative_eq!(w.stiffness, PI);
        let w = Weighting::FluxFunction.at(0.5);
        assert_relative_eq!(w.stiffness, 1.0 / PI);
        assert_relative_eq!(w.source, 1.0);
        assert_eq!(Weighting::FluxFunction.at(0.0).stiffness, 0.0);
    }

    #[test]
    fn test_mixed_edge_block() {
        let edge = BoundaryEdge {
            element: 0,
            nodes: [0, 1],
            boundary: 0,
            length: 3.0,
            midpoint: Point2::new(0.0, 0.0),
            weights: Weights {
                stiffness: 2.0,
                source: 2.0,
            },
        };
        let (k, f) = mixed_edge(&edge, 1.0, -4.0);
        assert_relative_eq!(k[0][0], 2.0);
        assert_relative_eq!(k[0][1], 1.0);
        assert_relative_eq!(f[0], 12.0);
        assert_relative_eq!(flux_edge(&edge, 5.0)[1], 15.0);
    }
}
