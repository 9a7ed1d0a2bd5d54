//! Electrostatic property records.

use super::named::Named;
use super::{BoundaryBehavior, Conductor, MaterialBehavior, PeriodicKind, PointSource};

/// Dielectric with relative permittivities and a volume charge density (C/m³).
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrostaticMaterial {
    pub name: String,
    pub ex: f64,
    pub ey: f64,
    pub qv: f64,
}

impl ElectrostaticMaterial {
    pub fn linear(name: impl Into<String>, permittivity: f64) -> Self {
        Self {
            name: name.into(),
            ex: permittivity,
            ey: permittivity,
            qv: 0.0,
        }
    }
}

impl Named for ElectrostaticMaterial {
    fn name(&self) -> &str {
        &self.name
    }
}

impl MaterialBehavior for ElectrostaticMaterial {
    fn is_nonlinear(&self) -> bool {
        false
    }

    fn is_anisotropic(&self) -> bool {
        self.ex != self.ey
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElectrostaticBoundaryKind {
    /// Fixed voltage (V).
    Fixed(f64),
    /// Surface charge density (C/m²).
    SurfaceCharge(f64),
    /// ε ∂V/∂n + c0·V + c1 = 0.
    Mixed { c0: f64, c1: f64 },
    Periodic,
    Antiperiodic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElectrostaticBoundary {
    pub name: String,
    pub kind: ElectrostaticBoundaryKind,
}

impl Named for ElectrostaticBoundary {
    fn name(&self) -> &str {
        &self.name
    }
}

impl BoundaryBehavior for ElectrostaticBoundary {
    fn periodic(&self) -> Option<PeriodicKind> {
        match self.kind {
            ElectrostaticBoundaryKind::Periodic => Some(PeriodicKind::Periodic),
            ElectrostaticBoundaryKind::Antiperiodic => Some(PeriodicKind::Antiperiodic),
            _ => None,
        }
    }
}

/// Fixed voltage (V) or point charge (C/m).
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrostaticPoint {
    pub name: String,
    pub value: PointSource<f64>,
}

impl Named for ElectrostaticPoint {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Conductor held at a voltage or carrying a total charge (C).
pub type ElectrostaticConductor = Conductor<f64>;
