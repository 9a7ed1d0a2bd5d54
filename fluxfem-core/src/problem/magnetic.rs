//! Magnetic property records.

use super::curve::Curve;
use super::named::Named;
use super::{BoundaryBehavior, MaterialBehavior, PeriodicKind, PointSource};
use crate::error::Result;
use crate::types::{Complex, MU_0};

/// How a block is laminated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Lamination {
    /// Solid, or laminated in the plane of the problem.
    #[default]
    InPlane,
    /// Laminations parallel to the x (r) axis.
    ParallelX,
    /// Laminations parallel to the y (z) axis.
    ParallelY,
    /// Stranded or magnet wire; modelled as a solid conductor.
    Wire { strands: u32, diameter: f64 },
}

/// Magnetic material.
///
/// Permeabilities are relative; everything else is SI.
#[derive(Debug, Clone, PartialEq)]
pub struct MagneticMaterial {
    pub name: String,
    pub mu_x: f64,
    pub mu_y: f64,
    /// Coercivity magnitude (A/m).
    pub hc: f64,
    /// Source current density (A/m²).
    pub j: Complex,
    /// Electrical conductivity (S/m).
    pub sigma: f64,
    /// Lamination thickness (m).
    pub lam_thickness: f64,
    pub lam_fill: f64,
    pub lamination: Lamination,
    /// Hysteresis lag angles (degrees).
    pub phi_hx: f64,
    pub phi_hy: f64,
    /// B (T) against H (A/m). Empty for linear materials.
    pub bh_curve: Curve,
}

impl Default for MagneticMaterial {
    fn default() -> Self {
        Self {
            name: "New Material".into(),
            mu_x: 1.0,
            mu_y: 1.0,
            hc: 0.0,
            j: Complex::new(0.0, 0.0),
            sigma: 0.0,
            lam_thickness: 0.0,
            lam_fill: 1.0,
            lamination: Lamination::InPlane,
            phi_hx: 0.0,
            phi_hy: 0.0,
            bh_curve: Curve::empty(),
        }
    }
}

impl MagneticMaterial {
    /// Linear isotropic material with relative permeability `mu`.
    pub fn linear(name: impl Into<String>, mu: f64) -> Self {
        Self {
            name: name.into(),
            mu_x: mu,
            mu_y: mu,
            ..Default::default()
        }
    }

    /// Reluctivity ν(|B|) = H/B of the B-H curve (m/H).
    ///
    /// At B = 0 the initial slope is used. Linear materials return the
    /// x-direction value.
    pub fn nu_of_b(&self, b: f64) -> f64 {
        if self.bh_curve.is_empty() {
            return 1.0 / (MU_0 * self.mu_x);
        }
        let b = b.abs();
        let h = self.bh_curve.value(b);
        if b < 1e-12 || h == 0.0 {
            let slope = self.bh_curve.slope(0.0);
            // slope is dH/dB
            return slope.max(f64::MIN_POSITIVE);
        }
        h / b
    }

    /// Stored energy density ∫H dB from 0 to |B| along the curve (J/m³).
    pub fn energy_density(&self, b: f64) -> f64 {
        if self.bh_curve.is_empty() {
            0.5 * b * b / (MU_0 * self.mu_x)
        } else {
            self.bh_curve.integral(b.abs())
        }
    }

    /// Prepare the B-H curve for use: anchor it at the origin.
    pub fn normalized(mut self) -> Result<Self> {
        if !self.bh_curve.is_empty() {
            self.bh_curve = self.bh_curve.with_origin()?;
        }
        Ok(self)
    }
}

impl Named for MagneticMaterial {
    fn name(&self) -> &str {
        &self.name
    }
}

impl MaterialBehavior for MagneticMaterial {
    fn is_nonlinear(&self) -> bool {
        !self.bh_curve.is_empty()
    }

    fn is_anisotropic(&self) -> bool {
        self.mu_x != self.mu_y || !matches!(self.lamination, Lamination::InPlane | Lamination::Wire { .. })
    }
}

/// Magnetic boundary condition formats.
#[derive(Debug, Clone, PartialEq)]
pub enum MagneticBoundaryKind {
    /// A = (a0 + a1·x + a2·y)·e^{jφ}, φ in degrees.
    Prescribed { a0: f64, a1: f64, a2: f64, phi: f64 },
    /// Surface impedance of a conductor with relative permeability `mu` (S/m `sigma`).
    SmallSkinDepth { mu: f64, sigma: f64 },
    /// ν ∂A/∂n + c0·A + c1 = 0.
    Mixed { c0: Complex, c1: Complex },
    StrategicDualImage,
    Periodic,
    Antiperiodic,
    PeriodicAirGap,
    AntiperiodicAirGap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MagneticBoundary {
    pub name: String,
    pub kind: MagneticBoundaryKind,
}

impl Named for MagneticBoundary {
    fn name(&self) -> &str {
        &self.name
    }
}

impl BoundaryBehavior for MagneticBoundary {
    fn periodic(&self) -> Option<PeriodicKind> {
        match self.kind {
            MagneticBoundaryKind::Periodic => Some(PeriodicKind::Periodic),
            MagneticBoundaryKind::Antiperiodic => Some(PeriodicKind::Antiperiodic),
            _ => None,
        }
    }

    fn unsupported(&self) -> Option<&'static str> {
        match self.kind {
            MagneticBoundaryKind::StrategicDualImage => Some("strategic dual image boundaries"),
            MagneticBoundaryKind::PeriodicAirGap | MagneticBoundaryKind::AntiperiodicAirGap => {
                Some("air gap periodic boundaries")
            }
            _ => None,
        }
    }
}

/// Point property: prescribed A (Wb/m) or a line current (A).
#[derive(Debug, Clone, PartialEq)]
pub struct MagneticPoint {
    pub name: String,
    pub value: PointSource<Complex>,
}

impl Named for MagneticPoint {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Series circuits carry the same current through every labelled region;
/// parallel circuits share it across their regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitKind {
    Parallel,
    Series,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MagneticCircuit {
    pub name: String,
    /// Total current (A).
    pub current: Complex,
    pub kind: CircuitKind,
}

impl Named for MagneticCircuit {
    fn name(&self) -> &str {
        &self.name
    }
}
