//! Problem model: header, geometry and per-domain property tables.
//!
//! Property families are keyed by [`Domain`]. Every family exposes the same
//! capability surface through [`MaterialBehavior`] and [`BoundaryBehavior`],
//! which is all the mesh adapter and the nonlinear controller need to know.

pub mod curve;
pub mod current;
pub mod electrostatic;
pub mod geometry;
pub mod heat;
pub mod magdir;
pub mod magnetic;
pub mod named;

pub use curve::Curve;
pub use geometry::{ArcSegment, BlockLabel, EntityKind, Geometry, Node, Region, Segment};
pub use magdir::MagDirection;
pub use named::{Named, NamedList};

use crate::error::{Error, Result};
use crate::types::{LengthUnit, ProblemType};
use current::{CurrentBoundary, CurrentConductor, CurrentMaterial, CurrentPoint};
use electrostatic::{
    ElectrostaticBoundary, ElectrostaticConductor, ElectrostaticMaterial, ElectrostaticPoint,
};
use heat::{HeatBoundary, HeatConductor, HeatMaterial, HeatPoint};
use magnetic::{MagneticBoundary, MagneticCircuit, MagneticMaterial, MagneticPoint};

/// Physics domain of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Magnetic,
    Electrostatic,
    Heat,
    Current,
}

impl Domain {
    /// Conventional problem file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Domain::Magnetic => "fem",
            Domain::Electrostatic => "fee",
            Domain::Heat => "feh",
            Domain::Current => "fec",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "fem" => Some(Domain::Magnetic),
            "fee" => Some(Domain::Electrostatic),
            "feh" => Some(Domain::Heat),
            "fec" => Some(Domain::Current),
            _ => None,
        }
    }
}

/// Whether matched boundary unknowns are equal or opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicKind {
    Periodic,
    Antiperiodic,
}

/// Point property value: a fixed potential or a concentrated source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointSource<T> {
    Fixed(T),
    Source(T),
}

/// How a conductor is driven.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConductorDrive<T> {
    /// Known potential; the total is computed from the reactions.
    Potential(T),
    /// Known total (charge, heat or current); the potential is an extra unknown.
    Total(T),
}

/// Conductor of the electrostatic, heat and current domains.
#[derive(Debug, Clone, PartialEq)]
pub struct Conductor<T> {
    pub name: String,
    pub drive: ConductorDrive<T>,
}

impl<T> Named for Conductor<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Capabilities every material family provides.
pub trait MaterialBehavior {
    /// Response depends on the field (B-H or K-T curve).
    fn is_nonlinear(&self) -> bool;
    fn is_anisotropic(&self) -> bool;
}

/// Capabilities every boundary family provides.
pub trait BoundaryBehavior {
    fn periodic(&self) -> Option<PeriodicKind>;

    /// Boundary coefficients depend on the solution (radiation).
    fn is_nonlinear(&self) -> bool {
        false
    }

    /// Name of the boundary format if it cannot be solved here.
    fn unsupported(&self) -> Option<&'static str> {
        None
    }
}

/// The four property tables of one domain.
#[derive(Debug, Clone)]
pub struct PropertyTables<P, B, M, C> {
    pub points: NamedList<P>,
    pub boundaries: NamedList<B>,
    pub materials: NamedList<M>,
    /// Circuits (magnetics) or conductors (other domains).
    pub circuits: NamedList<C>,
}

impl<P, B, M, C> Default for PropertyTables<P, B, M, C> {
    fn default() -> Self {
        Self {
            points: NamedList::default(),
            boundaries: NamedList::default(),
            materials: NamedList::default(),
            circuits: NamedList::default(),
        }
    }
}

pub type MagneticProperties =
    PropertyTables<MagneticPoint, MagneticBoundary, MagneticMaterial, MagneticCircuit>;
pub type ElectrostaticProperties = PropertyTables<
    ElectrostaticPoint,
    ElectrostaticBoundary,
    ElectrostaticMaterial,
    ElectrostaticConductor,
>;
pub type HeatProperties = PropertyTables<HeatPoint, HeatBoundary, HeatMaterial, HeatConductor>;
pub type CurrentProperties =
    PropertyTables<CurrentPoint, CurrentBoundary, CurrentMaterial, CurrentConductor>;

/// Property tables tagged by domain.
#[derive(Debug, Clone)]
pub enum Properties {
    Magnetic(MagneticProperties),
    Electrostatic(ElectrostaticProperties),
    Heat(HeatProperties),
    Current(CurrentProperties),
}

impl Properties {
    pub fn empty(domain: Domain) -> Self {
        match domain {
            Domain::Magnetic => Properties::Magnetic(Default::default()),
            Domain::Electrostatic => Properties::Electrostatic(Default::default()),
            Domain::Heat => Properties::Heat(Default::default()),
            Domain::Current => Properties::Current(Default::default()),
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Properties::Magnetic(_) => Domain::Magnetic,
            Properties::Electrostatic(_) => Domain::Electrostatic,
            Properties::Heat(_) => Domain::Heat,
            Properties::Current(_) => Domain::Current,
        }
    }

    /// Periodic kind of a boundary index, if it is periodic.
    pub fn boundary_periodic(&self, boundary: usize) -> Option<PeriodicKind> {
        fn get<P, B: BoundaryBehavior, M, C>(t: &PropertyTables<P, B, M, C>, i: usize) -> Option<PeriodicKind> {
            t.boundaries.get(i).and_then(|b| b.periodic())
        }
        match self {
            Properties::Magnetic(t) => get(t, boundary),
            Properties::Electrostatic(t) => get(t, boundary),
            Properties::Heat(t) => get(t, boundary),
            Properties::Current(t) => get(t, boundary),
        }
    }
}

/// Kelvin-transform exterior region parameters (problem length units).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Exterior {
    /// Center of the exterior region on the axis.
    pub zo: f64,
    /// Radius of the exterior region.
    pub ro: f64,
    /// Radius of the interior region.
    pub ri: f64,
}

/// How node coordinates are displayed and entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coordinates {
    #[default]
    Cartesian,
    Polar,
}

/// Problem-wide settings from the file header.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemHeader {
    pub format: f64,
    /// Linear solver precision.
    pub precision: f64,
    /// Minimum mesh angle (degrees).
    pub min_angle: f64,
    /// Out-of-plane depth in length units (planar problems).
    pub depth: f64,
    pub length_units: LengthUnit,
    pub problem_type: ProblemType,
    pub coordinates: Coordinates,
    /// Frequency (Hz). Magnetics and current flow.
    pub frequency: f64,
    /// Transient time step (s). Heat flow only; 0 means steady state.
    pub dt: f64,
    pub exterior: Exterior,
    pub comment: String,
}

impl Default for ProblemHeader {
    fn default() -> Self {
        Self {
            format: 4.0,
            precision: 1e-8,
            min_angle: 30.0,
            depth: 1.0,
            length_units: LengthUnit::Inches,
            problem_type: ProblemType::Planar,
            coordinates: Coordinates::Cartesian,
            frequency: 0.0,
            dt: 0.0,
            exterior: Exterior::default(),
            comment: String::new(),
        }
    }
}

impl ProblemHeader {
    /// Out-of-plane depth in meters.
    pub fn depth_meters(&self) -> f64 {
        self.depth * self.length_units.to_meters()
    }
}

/// A complete problem description.
#[derive(Debug, Clone)]
pub struct Problem {
    pub header: ProblemHeader,
    pub geometry: Geometry,
    pub properties: Properties,
}

impl Problem {
    pub fn new(domain: Domain) -> Self {
        Self {
            header: ProblemHeader::default(),
            geometry: Geometry::new(),
            properties: Properties::empty(domain),
        }
    }

    pub fn domain(&self) -> Domain {
        self.properties.domain()
    }

    /// Pre-mesh consistency check.
    pub fn check(&self) -> Result<()> {
        self.geometry.check()?;
        match &self.properties {
            Properties::Magnetic(t) => check_tables(self, t, false),
            Properties::Electrostatic(t) => check_tables(self, t, true),
            Properties::Heat(t) => check_tables(self, t, true),
            Properties::Current(t) => check_tables(self, t, true),
        }
    }

    /// True if any material or boundary in use makes the problem nonlinear.
    pub fn is_nonlinear(&self) -> bool {
        match &self.properties {
            Properties::Magnetic(t) => uses_nonlinear(&self.geometry, t),
            Properties::Electrostatic(t) => uses_nonlinear(&self.geometry, t),
            Properties::Heat(t) => uses_nonlinear(&self.geometry, t),
            Properties::Current(t) => uses_nonlinear(&self.geometry, t),
        }
    }
}

fn uses_nonlinear<P, B: BoundaryBehavior, M: MaterialBehavior, C>(
    geometry: &Geometry,
    tables: &PropertyTables<P, B, M, C>,
) -> bool {
    let material = geometry
        .labels
        .iter()
        .filter_map(|l| l.material())
        .filter_map(|m| tables.materials.get(m))
        .any(|m| m.is_nonlinear());
    let boundary = geometry
        .segments
        .iter()
        .filter_map(|s| s.boundary)
        .chain(geometry.arcs.iter().filter_map(|a| a.boundary))
        .filter_map(|b| tables.boundaries.get(b))
        .any(|b| b.is_nonlinear());
    material || boundary
}

fn in_range(what: &str, owner: &str, i: usize, index: Option<usize>, len: usize) -> Result<()> {
    match index {
        Some(k) if k >= len => Err(Error::Geometry(format!(
            "{} {} references {} {} but only {} are defined",
            owner, i, what, k, len
        ))),
        _ => Ok(()),
    }
}

fn check_tables<P, B: BoundaryBehavior, M: MaterialBehavior, C>(
    problem: &Problem,
    tables: &PropertyTables<P, B, M, C>,
    geometry_conductors: bool,
) -> Result<()> {
    let g = &problem.geometry;
    let n_circuits = tables.circuits.len();

    for (i, n) in g.nodes.iter().enumerate() {
        in_range("point property", "node", i, n.point_property, tables.points.len())?;
        if geometry_conductors {
            in_range("conductor", "node", i, n.conductor, n_circuits)?;
        }
    }
    for (i, s) in g.segments.iter().enumerate() {
        in_range("boundary", "segment", i, s.boundary, tables.boundaries.len())?;
        if geometry_conductors {
            in_range("conductor", "segment", i, s.conductor, n_circuits)?;
        }
    }
    for (i, a) in g.arcs.iter().enumerate() {
        in_range("boundary", "arc", i, a.boundary, tables.boundaries.len())?;
        if geometry_conductors {
            in_range("conductor", "arc", i, a.conductor, n_circuits)?;
        }
    }
    for (i, l) in g.labels.iter().enumerate() {
        match l.region {
            Region::Material(m) => in_range("material", "block label", i, Some(m), tables.materials.len())?,
            Region::Unassigned => {
                return Err(Error::Geometry(format!(
                    "block label {} at ({}, {}) has no material assigned",
                    i, l.position.x, l.position.y
                )))
            }
            Region::NoMesh => {}
        }
        if !geometry_conductors {
            in_range("circuit", "block label", i, l.circuit, n_circuits)?;
        }
    }

    // periodic boundaries pair exactly two entities of one kind
    for (b, boundary) in tables.boundaries.iter().enumerate() {
        let used = g.segments.iter().any(|s| s.boundary == Some(b))
            || g.arcs.iter().any(|a| a.boundary == Some(b));
        if !used {
            continue;
        }
        if let Some(what) = boundary.unsupported() {
            return Err(Error::Geometry(format!(
                "boundary {} uses {}, which are not supported",
                b, what
            )));
        }
        if boundary.periodic().is_some() {
            let segs = g.segments.iter().filter(|s| s.boundary == Some(b)).count();
            let arcs: Vec<&ArcSegment> = g.arcs.iter().filter(|a| a.boundary == Some(b)).collect();
            let pair = (segs == 2 && arcs.is_empty()) || (segs == 0 && arcs.len() == 2);
            if !pair {
                return Err(Error::Geometry(format!(
                    "periodic boundary {} must be assigned to exactly two segments or two arcs \
                     (found {} segments, {} arcs)",
                    b,
                    segs,
                    arcs.len()
                )));
            }
            if arcs.len() == 2 && (arcs[0].arc_angle - arcs[1].arc_angle).abs() > 1e-9 {
                return Err(Error::Geometry(format!(
                    "periodic boundary {} joins arcs with different angles",
                    b
                )));
            }
        }
    }

    let external: Vec<usize> = g
        .labels
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_external)
        .map(|(i, _)| i)
        .collect();
    if !external.is_empty() {
        if problem.header.problem_type != ProblemType::Axisymmetric {
            log::warn!("external region flags are ignored in planar problems");
        } else {
            let ext = problem.header.exterior;
            if !(ext.ri > 0.0 && ext.ro > 0.0) {
                return Err(Error::Geometry(
                    "exterior region radii must be positive".into(),
                ));
            }
            for i in external {
                if let Some(m) = g.labels[i].material().and_then(|m| tables.materials.get(m)) {
                    if m.is_nonlinear() || m.is_anisotropic() {
                        return Err(Error::Geometry(format!(
                            "block label {} lies in the exterior region and must be linear and isotropic",
                            i
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
