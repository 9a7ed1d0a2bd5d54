//! Magnetostatics and time-harmonic magnetics.
//!
//! Planar problems solve for the out-of-plane vector potential A. In
//! axisymmetric problems the unknown is the flux function ψ = 2πr·A, which is
//! zero on the axis. Time-harmonic problems add the eddy-current term jωσA
//! and, for solid conductors carrying a circuit current, one voltage unknown
//! per conductor whose equation enforces the current.

use super::{
    apply_periodic, assemble_elements, mixed_edge, ElementBlock, ElementGeometry, MeshContext,
    PhysicsAssembler, UnknownMap,
};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::magnetic::{CircuitKind, Lamination, MagneticBoundaryKind, MagneticMaterial};
use crate::problem::{MagneticProperties, MaterialBehavior, PointSource, Problem, Properties};
use crate::sparse::SparseSystem;
use crate::types::{Complex, FieldScalar, FieldVector, Point2, ProblemType, MU_0};
use std::f64::consts::PI;
use std::marker::PhantomData;

/// How the elements of one block label are driven by its circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LabelDrive {
    None,
    /// Imposed current density (A/m²).
    Stranded(Complex),
    /// Solid conductor; `unknown` is its voltage.
    Solid { unknown: usize },
}

/// Circuit unknowns and label drives of one assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitLayout {
    /// Drive per block label.
    pub drives: Vec<LabelDrive>,
    /// Voltage unknowns of each circuit.
    pub circuit_unknowns: Vec<Vec<usize>>,
    /// Current enforced by each voltage unknown.
    pub enforced: Vec<(usize, Complex)>,
    /// Meshed cross-section area of each block label (m²).
    pub label_areas: Vec<f64>,
}

/// Conductivity carried by the bulk of the material; laminated stacks
/// carry their eddy currents through the effective permeability instead.
pub fn bulk_conductivity(material: &MagneticMaterial) -> f64 {
    match material.lamination {
        Lamination::InPlane if material.lam_thickness > 0.0 => 0.0,
        Lamination::ParallelX | Lamination::ParallelY => 0.0,
        _ => material.sigma,
    }
}

/// Reluctivities (νx, νy) in m/H at flux density magnitude `b` (T).
///
/// Includes lamination fill, thin-lamination eddy currents and hysteresis
/// lag at angular frequency `omega`; the last two vanish when static.
pub fn reluctivity(material: &MagneticMaterial, b: f64, omega: f64) -> (Complex, Complex) {
    let (mut mx, mut my) = if material.is_nonlinear() {
        let mu = 1.0 / (MU_0 * material.nu_of_b(b));
        (Complex::new(mu, 0.0), Complex::new(mu, 0.0))
    } else {
        (Complex::new(material.mu_x, 0.0), Complex::new(material.mu_y, 0.0))
    };

    let d = material.lam_thickness;
    if omega > 0.0 && d > 0.0 && material.sigma > 0.0 && material.lamination == Lamination::InPlane {
        let skin = |mu: Complex| {
            let k = (Complex::new(0.0, omega * material.sigma * MU_0) * mu).sqrt() * (0.5 * d);
            if k.norm() < 1e-9 {
                mu
            } else {
                mu * k.tanh() / k
            }
        };
        mx = skin(mx);
        my = skin(my);
    }

    let fill = material.lam_fill;
    let one = Complex::new(1.0, 0.0);
    let series = |mu: Complex| fill * mu + (1.0 - fill);
    let parallel = |mu: Complex| one / (fill / mu + (1.0 - fill));
    match material.lamination {
        Lamination::InPlane if fill < 1.0 => {
            mx = series(mx);
            my = series(my);
        }
        Lamination::ParallelX => {
            (mx, my) = (series(mx), parallel(my));
        }
        Lamination::ParallelY => {
            (mx, my) = (parallel(mx), series(my));
        }
        _ => {}
    }

    let lag = |phi: f64| {
        if omega > 0.0 {
            Complex::from_polar(1.0, phi.to_radians())
        } else {
            one
        }
    };
    (
        lag(material.phi_hx) / (mx * MU_0),
        lag(material.phi_hy) / (my * MU_0),
    )
}

/// Flux density from the corner potentials of an element.
///
/// Planar: B = (∂A/∂y, −∂A/∂x). Axisymmetric: B = (−∂ψ/∂z, ∂ψ/∂r) / 2πr.
pub fn flux_density<T: FieldScalar>(
    g: &ElementGeometry,
    axisymmetric: bool,
    values: &[T; 3],
) -> FieldVector<T> {
    let grad = g.gradient(values);
    if axisymmetric {
        FieldVector::new(-grad.y, grad.x).scale(1.0 / (2.0 * PI * g.centroid.x))
    } else {
        FieldVector::new(grad.y, -grad.x)
    }
}

/// Assembles the magnetic system for one mesh. `T` is `f64` for
/// magnetostatics and [`Complex`] for time-harmonic problems.
pub struct MagneticAssembler<'a, T> {
    ctx: MeshContext<'a>,
    tables: &'a MagneticProperties,
    map: UnknownMap,
    layout: CircuitLayout,
    omega: f64,
    axisymmetric: bool,
    nonlinear: bool,
    _scalar: PhantomData<T>,
}

impl<'a, T: FieldScalar> MagneticAssembler<'a, T> {
    pub fn new(mesh: &'a Mesh, problem: &'a Problem) -> Result<Self> {
        let Properties::Magnetic(tables) = &problem.properties else {
            return Err(Error::Assembly("not a magnetics problem".into()));
        };
        let harmonic = problem.header.frequency > 0.0;
        if harmonic && !T::is_complex() {
            return Err(Error::Assembly(
                "time-harmonic magnetics needs complex unknowns".into(),
            ));
        }
        let ctx = MeshContext::new(mesh, problem, true)?;
        let mut map = UnknownMap::nodal(mesh.n_nodes());
        let layout = circuit_layout(&ctx, tables, harmonic, &mut map);
        Ok(Self {
            ctx,
            tables,
            map,
            layout,
            omega: 2.0 * PI * problem.header.frequency,
            axisymmetric: problem.header.problem_type == ProblemType::Axisymmetric,
            nonlinear: problem.is_nonlinear(),
            _scalar: PhantomData,
        })
    }

    pub fn layout(&self) -> &CircuitLayout {
        &self.layout
    }

    pub fn unknown_map(&self) -> &UnknownMap {
        &self.map
    }

    fn material(&self, e: usize) -> Result<&'a MagneticMaterial> {
        let m = self.ctx.material(e)?;
        self.tables.materials.get(m).ok_or_else(|| {
            Error::Assembly(format!("element {} references missing material {}", e, m))
        })
    }

    /// Unknown value for vector potential `a` at a point in length units.
    fn potential_at(&self, p: Point2, a: Complex) -> T {
        if self.axisymmetric {
            T::from_complex(a * (2.0 * PI * p.x * self.ctx.unit))
        } else {
            T::from_complex(a)
        }
    }

    fn element(&self, e: usize, previous: Option<&[T]>) -> Result<ElementBlock<T>> {
        let g = &self.ctx.geometry[e];
        let material = self.material(e)?;
        let label = self.ctx.label(e);
        let nodes = self.ctx.mesh.elements()[e].nodes;
        let dofs = self.map.dofs(&nodes);

        let b = match previous {
            Some(x) if material.is_nonlinear() => {
                flux_density(g, self.axisymmetric, &dofs.map(|d| x[d])).magnitude()
            }
            _ => 0.0,
        };
        let (nu_x, nu_y) = reluctivity(material, b, self.omega);
        let w = self.ctx.weights(e);
        let s = T::from_real(w.stiffness * self.ctx.exterior_factor(e));

        let mut block = ElementBlock::new(dofs);
        block.k = g.laplacian(T::from_complex(nu_y) * s, T::from_complex(nu_x) * s);

        let sigma = bulk_conductivity(material);
        let harmonic = self.omega > 0.0;
        if harmonic && sigma > 0.0 {
            let jw = T::from_complex(Complex::new(0.0, self.omega * sigma * w.stiffness));
            let m = g.mass();
            for i in 0..3 {
                for j in 0..3 {
                    block.k[i][j] += jw * T::from_real(m[i][j]);
                }
            }
        }

        let mut density = material.j;
        match self.layout.drives[self.ctx.mesh.elements()[e].label] {
            LabelDrive::Stranded(j) => density += j,
            LabelDrive::Solid { unknown } => {
                let c = -sigma * w.stiffness * g.area / 3.0;
                let diag = Complex::new(sigma * g.area * w.stiffness, 0.0) / Complex::new(0.0, self.omega);
                block.coupling = Some((unknown, [T::from_real(c); 3], T::from_complex(diag)));
            }
            LabelDrive::None => {}
        }
        let f = T::from_complex(density * (g.area / 3.0 * w.source));
        block.f = [f; 3];

        if !harmonic && material.hc != 0.0 {
            let c = self.ctx.mesh.centroid(e);
            let theta = label.magnetization.angle_at(c.x, c.y)?.to_radians();
            let (hx, hy) = (material.hc * theta.cos(), material.hc * theta.sin());
            let sign = if self.axisymmetric { -1.0 } else { 1.0 };
            for i in 0..3 {
                block.f[i] += T::from_real(sign * (hx * g.q[i] - hy * g.p[i]) / 2.0 * w.source);
            }
        }
        Ok(block)
    }
}

fn circuit_layout(
    ctx: &MeshContext<'_>,
    tables: &MagneticProperties,
    harmonic: bool,
    map: &mut UnknownMap,
) -> CircuitLayout {
    let labels = &ctx.problem.geometry.labels;
    let mut label_areas = vec![0.0; labels.len()];
    for (e, element) in ctx.mesh.elements().iter().enumerate() {
        label_areas[element.label] += ctx.geometry[e].area;
    }
    let mut layout = CircuitLayout {
        drives: vec![LabelDrive::None; labels.len()],
        circuit_unknowns: vec![Vec::new(); tables.circuits.len()],
        enforced: Vec::new(),
        label_areas,
    };

    for (c, circuit) in tables.circuits.iter().enumerate() {
        let members: Vec<usize> = (0..labels.len())
            .filter(|&l| labels[l].circuit == Some(c) && layout.label_areas[l] > 0.0)
            .collect();
        if members.is_empty() {
            log::warn!("circuit {} is not assigned to any meshed region", circuit.name);
            continue;
        }
        let total_area: f64 = members.iter().map(|&l| layout.label_areas[l]).sum();
        let mut shared = None;
        for &l in &members {
            let solid = harmonic
                && labels[l]
                    .material()
                    .and_then(|m| tables.materials.get(m))
                    .is_some_and(|m| bulk_conductivity(m) > 0.0);
            let turns = f64::from(labels[l].turns);
            layout.drives[l] = match (circuit.kind, solid) {
                (CircuitKind::Parallel, false) => LabelDrive::Stranded(circuit.current / total_area),
                (CircuitKind::Series, false) => {
                    LabelDrive::Stranded(circuit.current * turns / layout.label_areas[l])
                }
                (CircuitKind::Parallel, true) => {
                    let unknown = match shared {
                        Some(k) => k,
                        None => {
                            let k = map.push_extra();
                            layout.enforced.push((k, circuit.current));
                            layout.circuit_unknowns[c].push(k);
                            shared = Some(k);
                            k
                        }
                    };
                    LabelDrive::Solid { unknown }
                }
                (CircuitKind::Series, true) => {
                    let k = map.push_extra();
                    layout.enforced.push((k, circuit.current * turns));
                    layout.circuit_unknowns[c].push(k);
                    LabelDrive::Solid { unknown: k }
                }
            };
        }
    }
    layout
}

impl<T: FieldScalar> PhysicsAssembler for MagneticAssembler<'_, T> {
    type Scalar = T;

    fn n_unknowns(&self) -> usize {
        self.map.n_unknowns()
    }

    fn assemble(&self, previous: Option<&[T]>) -> Result<SparseSystem<T>> {
        let mut system = SparseSystem::new(self.n_unknowns());
        assemble_elements(&mut system, self.ctx.mesh.n_elements(), |e| self.element(e, previous))?;

        // current enforced through each solid conductor voltage
        let depth = match self.ctx.weighting {
            super::Weighting::Planar { depth } => depth,
            _ => 1.0,
        };
        for &(k, current) in &self.layout.enforced {
            system.add_rhs(k, T::from_complex(current * depth / Complex::new(0.0, self.omega)));
        }

        let mut fixed = Vec::new();
        let mut skin_warned = false;
        for edge in self.ctx.boundary_edges() {
            let Some(boundary) = self.tables.boundaries.get(edge.boundary) else {
                continue;
            };
            let dofs = edge.nodes.map(|n| self.map.dof[n]);
            match boundary.kind {
                MagneticBoundaryKind::Prescribed { a0, a1, a2, phi } => {
                    for (&n, &d) in edge.nodes.iter().zip(&dofs) {
                        let p = self.ctx.mesh.nodes()[n].position;
                        let a = Complex::from_polar(a0 + a1 * p.x + a2 * p.y, phi.to_radians());
                        fixed.push((d, self.potential_at(p, a)));
                    }
                }
                MagneticBoundaryKind::SmallSkinDepth { mu, sigma } => {
                    if self.omega == 0.0 {
                        if !skin_warned {
                            log::warn!("small skin depth boundary {} ignored in a static problem", boundary.name);
                            skin_warned = true;
                        }
                        continue;
                    }
                    let delta = (2.0 / (self.omega * sigma * mu * MU_0)).sqrt();
                    let c0 = Complex::new(1.0, 1.0) / (mu * MU_0 * delta);
                    let (k, f) = mixed_edge(&edge, T::from_complex(c0), T::zero());
                    system.add_block(&dofs, &k, &f);
                }
                MagneticBoundaryKind::Mixed { c0, c1 } => {
                    let (k, f) = mixed_edge(&edge, T::from_complex(c0), T::from_complex(c1));
                    system.add_block(&dofs, &k, &f);
                }
                MagneticBoundaryKind::Periodic | MagneticBoundaryKind::Antiperiodic => {}
                MagneticBoundaryKind::StrategicDualImage
                | MagneticBoundaryKind::PeriodicAirGap
                | MagneticBoundaryKind::AntiperiodicAirGap => {
                    return Err(Error::Assembly(format!(
                        "boundary {} uses an unsupported formulation",
                        boundary.name
                    )));
                }
            }
        }
        for (d, v) in fixed {
            system.set_value(d, v);
        }

        for (i, node) in self.ctx.mesh.nodes().iter().enumerate() {
            let Some(point) = node.point_property.and_then(|p| self.tables.points.get(p)) else {
                continue;
            };
            let d = self.map.dof[i];
            match point.value {
                PointSource::Fixed(a) => system.set_value(d, self.potential_at(node.position, a)),
                PointSource::Source(current) => {
                    let w = self.ctx.weighting.at(node.position.x * self.ctx.unit);
                    system.add_rhs(d, T::from_complex(current * w.source));
                }
            }
        }

        if self.axisymmetric {
            for n in self.ctx.axis_nodes() {
                system.set_value(self.map.dof[n], T::zero());
            }
        }
        apply_periodic(&mut system, self.ctx.mesh, &self.map);
        Ok(system)
    }

    fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }
}
