//! Current flow property records.

use super::named::Named;
use super::{BoundaryBehavior, Conductor, MaterialBehavior, PeriodicKind, PointSource};
use crate::types::{Complex, EPSILON_0};

/// Conducting dielectric: conductivity (S/m), relative permittivity and
/// loss tangent (degrees).
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentMaterial {
    pub name: String,
    pub ox: f64,
    pub oy: f64,
    pub ex: f64,
    pub ey: f64,
    pub ltx: f64,
    pub lty: f64,
}

impl CurrentMaterial {
    pub fn conductor(name: impl Into<String>, sigma: f64) -> Self {
        Self {
            name: name.into(),
            ox: sigma,
            oy: sigma,
            ex: 1.0,
            ey: 1.0,
            ltx: 0.0,
            lty: 0.0,
        }
    }

    /// Complex conductivities (κx, κy) at angular frequency ω.
    ///
    /// κ = σ + ω·ε0·ε·tan(δ) + jω·ε0·ε.
    pub fn admittivity(&self, omega: f64) -> (Complex, Complex) {
        let k = |sigma: f64, eps: f64, lt: f64| {
            let we = omega * EPSILON_0 * eps;
            Complex::new(sigma + we * lt.to_radians().tan(), we)
        };
        (k(self.ox, self.ex, self.ltx), k(self.oy, self.ey, self.lty))
    }
}

impl Named for CurrentMaterial {
    fn name(&self) -> &str {
        &self.name
    }
}

impl MaterialBehavior for CurrentMaterial {
    fn is_nonlinear(&self) -> bool {
        false
    }

    fn is_anisotropic(&self) -> bool {
        self.ox != self.oy || self.ex != self.ey || self.ltx != self.lty
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurrentBoundaryKind {
    /// Fixed voltage (V).
    Fixed(Complex),
    /// Surface current density into the region (A/m²).
    SurfaceCurrent(Complex),
    /// κ ∂V/∂n + c0·V + c1 = 0.
    Mixed { c0: Complex, c1: Complex },
    Periodic,
    Antiperiodic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentBoundary {
    pub name: String,
    pub kind: CurrentBoundaryKind,
}

impl Named for CurrentBoundary {
    fn name(&self) -> &str {
        &self.name
    }
}

impl BoundaryBehavior for CurrentBoundary {
    fn periodic(&self) -> Option<PeriodicKind> {
        match self.kind {
            CurrentBoundaryKind::Periodic => Some(PeriodicKind::Periodic),
            CurrentBoundaryKind::Antiperiodic => Some(PeriodicKind::Antiperiodic),
            _ => None,
        }
    }
}

/// Fixed voltage (V) or point current (A/m).
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentPoint {
    pub name: String,
    pub value: PointSource<Complex>,
}

impl Named for CurrentPoint {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Conductor held at a voltage or carrying a total current (A).
pub type CurrentConductor = Conductor<Complex>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_admittivity() {
        let m = CurrentMaterial {
            ex: 2.0,
            ey: 2.0,
            ltx: 45.0,
            lty: 0.0,
            ..CurrentMaterial::conductor("lossy", 1.0)
        };
        let omega = 1.0e6;
        let (kx, ky) = m.admittivity(omega);
        let we = omega * EPSILON_0 * 2.0;
        assert_relative_eq!(kx.re, 1.0 + we, epsilon = 1e-12);
        assert_relative_eq!(kx.im, we, epsilon = 1e-18);
        assert_relative_eq!(ky.re, 1.0, epsilon = 1e-12);
        assert!(m.is_anisotropic());
    }
}
