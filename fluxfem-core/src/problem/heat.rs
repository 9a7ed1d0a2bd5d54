//! Heat flow property records.

use super::curve::Curve;
use super::named::Named;
use super::{BoundaryBehavior, Conductor, MaterialBehavior, PeriodicKind, PointSource};

/// Thermal material.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatMaterial {
    pub name: String,
    /// Thermal conductivity (W/(m·K)).
    pub kx: f64,
    pub ky: f64,
    /// Volume heat generation (W/m³).
    pub qv: f64,
    /// Volumetric heat capacity (J/(m³·K)).
    pub kt: f64,
    /// Conductivity against temperature (K, W/(m·K)). Overrides kx/ky when present.
    pub kt_curve: Curve,
}

impl HeatMaterial {
    pub fn linear(name: impl Into<String>, k: f64) -> Self {
        Self {
            name: name.into(),
            kx: k,
            ky: k,
            qv: 0.0,
            kt: 0.0,
            kt_curve: Curve::empty(),
        }
    }

    /// Conductivities (kx, ky) at temperature `t`.
    pub fn conductivity(&self, t: f64) -> (f64, f64) {
        if self.kt_curve.is_empty() {
            (self.kx, self.ky)
        } else {
            let k = self.kt_curve.value(t);
            (k, k)
        }
    }
}

impl Named for HeatMaterial {
    fn name(&self) -> &str {
        &self.name
    }
}

impl MaterialBehavior for HeatMaterial {
    fn is_nonlinear(&self) -> bool {
        !self.kt_curve.is_empty()
    }

    fn is_anisotropic(&self) -> bool {
        self.kt_curve.is_empty() && self.kx != self.ky
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeatBoundaryKind {
    /// Fixed temperature (K).
    FixedTemperature(f64),
    /// Heat flux into the region (W/m²).
    HeatFlux(f64),
    /// Convection with coefficient `h` (W/(m²·K)) to ambient `t_inf` (K).
    Convection { h: f64, t_inf: f64 },
    /// Radiation with emissivity `beta` to ambient `t_inf` (K).
    Radiation { beta: f64, t_inf: f64 },
    Periodic,
    Antiperiodic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatBoundary {
    pub name: String,
    pub kind: HeatBoundaryKind,
}

impl Named for HeatBoundary {
    fn name(&self) -> &str {
        &self.name
    }
}

impl BoundaryBehavior for HeatBoundary {
    fn periodic(&self) -> Option<PeriodicKind> {
        match self.kind {
            HeatBoundaryKind::Periodic => Some(PeriodicKind::Periodic),
            HeatBoundaryKind::Antiperiodic => Some(PeriodicKind::Antiperiodic),
            _ => None,
        }
    }

    fn is_nonlinear(&self) -> bool {
        matches!(self.kind, HeatBoundaryKind::Radiation { .. })
    }
}

/// Fixed temperature (K) or line heat source (W/m).
#[derive(Debug, Clone, PartialEq)]
pub struct HeatPoint {
    pub name: String,
    pub value: PointSource<f64>,
}

impl Named for HeatPoint {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Conductor held at a temperature or carrying a total heat flow (W).
pub type HeatConductor = Conductor<f64>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_curve_overrides_constant_conductivity() {
        let mut m = HeatMaterial::linear("copper", 400.0);
        assert_eq!(m.conductivity(500.0), (400.0, 400.0));
        m.kt_curve = Curve::new(vec![(300.0, 400.0), (500.0, 380.0)]).unwrap();
        let (kx, ky) = m.conductivity(400.0);
        assert_relative_eq!(kx, 390.0);
        assert_relative_eq!(ky, 390.0);
        assert!(m.is_nonlinear());
    }

    #[test]
    fn test_radiation_is_nonlinear() {
        let b = HeatBoundary {
            name: "rad".into(),
            kind: HeatBoundaryKind::Radiation { beta: 0.8, t_inf: 300.0 },
        };
        assert!(b.is_nonlinear());
        assert_eq!(b.periodic(), None);
    }
}
