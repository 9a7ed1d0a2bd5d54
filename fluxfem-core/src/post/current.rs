//! Current flow field evaluation: E, J, power and stress tensor forces.

use super::{maxwell_stress, weighted_stress, Contour, FieldMesh, Mask, Selection, Solution};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::{CurrentProperties, Problem, Properties};
use crate::types::{Complex, FieldVector, Point2, EPSILON_0};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Current flow block integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentBlockIntegral {
    /// Real power (W).
    RealPower,
    /// Reactive power (var), negative when capacitive.
    ReactivePower,
    /// Apparent power |S| (VA).
    ApparentPower,
    /// Stored electric energy (J).
    Energy,
    Area,
    Volume,
    StressForceX,
    StressForceY,
    StressTorque,
    StressForceX2,
    StressForceY2,
    StressTorque2,
}

impl CurrentBlockIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use CurrentBlockIntegral::*;
        const KINDS: [CurrentBlockIntegral; 12] = [
            RealPower,
            ReactivePower,
            ApparentPower,
            Energy,
            Area,
            Volume,
            StressForceX,
            StressForceY,
            StressTorque,
            StressForceX2,
            StressForceY2,
            StressTorque2,
        ];
        KINDS.get(code as usize).copied().ok_or_else(|| {
            Error::InvalidQuery(format!("unknown current flow block integral {}", code))
        })
    }

    pub fn requires_mask(self) -> bool {
        use CurrentBlockIntegral::*;
        matches!(
            self,
            StressForceX | StressForceY | StressTorque | StressForceX2 | StressForceY2 | StressTorque2
        )
    }
}

/// Current flow line integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentLineIntegral {
    /// [∫ E·t dl, average E·t]
    TangentialField,
    /// [∫ J·n dS, average J·n]
    Current,
    /// [length, swept surface]
    Extent,
    /// [average V, 0]
    Voltage,
    /// [Fx, Fy], steady part.
    StressForce,
    /// [steady torque, double-frequency torque]
    StressTorque,
}

impl CurrentLineIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use CurrentLineIntegral::*;
        match code {
            0 => Ok(TangentialField),
            1 => Ok(Current),
            2 => Ok(Extent),
            3 => Ok(Voltage),
            4 => Ok(StressForce),
            5 => Ok(StressTorque),
            _ => Err(Error::InvalidQuery(format!(
                "unknown current flow line integral {}",
                code
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentElement {
    pub e: FieldVector<Complex>,
    /// Total current density κE, displacement current included (A/m²).
    pub j: FieldVector<Complex>,
    /// Admittivity (κx, κy) in S/m.
    pub kappa: (Complex, Complex),
    /// Absolute permittivity (εx, εy) in F/m.
    pub eps: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentPointValues {
    pub v: Complex,
    pub e: FieldVector<Complex>,
    pub j: FieldVector<Complex>,
    pub kappa: (Complex, Complex),
}

/// Queries on a solved current flow problem.
pub struct CurrentField<'a> {
    field: FieldMesh<'a>,
    solution: &'a Solution<Complex>,
    harmonic: bool,
    smoothing: bool,
    elements: Vec<CurrentElement>,
    corners: Vec<[FieldVector<Complex>; 3]>,
}

impl<'a> CurrentField<'a> {
    pub fn new(
        mesh: &'a Mesh,
        problem: &'a Problem,
        solution: &'a Solution<Complex>,
        smoothing: bool,
    ) -> Result<Self> {
        let Properties::Current(tables) = &problem.properties else {
            return Err(Error::InvalidQuery("not a current flow problem".into()));
        };
        solution.check(mesh)?;
        let omega = 2.0 * PI * problem.header.frequency;
        let field = FieldMesh::new(mesh, problem)?;
        let elements = (0..mesh.n_elements())
            .into_par_iter()
            .map(|e| element(&field, tables, solution, omega, e))
            .collect::<Result<Vec<_>>>()?;
        let ef: Vec<_> = elements.iter().map(|el| el.e).collect();
        let corners = field.smooth(&ef);
        Ok(Self {
            field,
            solution,
            harmonic: omega > 0.0,
            smoothing,
            elements,
            corners,
        })
    }

    pub fn set_smoothing(&mut self, on: bool) {
        self.smoothing = on;
    }

    pub fn elements(&self) -> &[CurrentElement] {
        &self.elements
    }

    fn e_at(&self, e: usize, p: Point2) -> FieldVector<Complex> {
        if self.smoothing {
            self.field.blend(e, p, &self.corners[e])
        } else {
            self.elements[e].e
        }
    }

    fn j_at(&self, e: usize, p: Point2) -> FieldVector<Complex> {
        let el = &self.elements[e];
        if !self.smoothing {
            return el.j;
        }
        let ef = self.e_at(e, p);
        FieldVector::new(ef.x * el.kappa.0, ef.y * el.kappa.1)
    }

    /// Power factor of time averages: ½ for phasors.
    fn average(&self) -> f64 {
        if self.harmonic {
            0.5
        } else {
            1.0
        }
    }

    pub fn point_values(&self, p: Point2) -> Result<CurrentPointValues> {
        let e = self.field.require(p)?;
        Ok(CurrentPointValues {
            v: self.field.interpolate(e, p, &self.solution.nodal),
            e: self.e_at(e, p),
            j: self.j_at(e, p),
            kappa: self.elements[e].kappa,
        })
    }

    pub fn block_integral(&self, selection: &Selection, kind: CurrentBlockIntegral) -> Result<Complex> {
        selection.check(self.field.mesh())?;
        if kind.requires_mask() {
            return Err(Error::MaskRequired(format!("{:?}", kind)));
        }
        Ok(self.integrate(selection, kind))
    }

    pub fn block_integral_with_mask(
        &self,
        selection: &Selection,
        mask: &Mask,
        kind: CurrentBlockIntegral,
    ) -> Result<Complex> {
        use CurrentBlockIntegral::*;
        let mesh = self.field.mesh();
        selection.check(mesh)?;
        mask.check(mesh, selection)?;
        if !kind.requires_mask() {
            return Ok(self.integrate(selection, kind));
        }
        let double = matches!(kind, StressForceX2 | StressForceY2 | StressTorque2);
        let [fx, fy, torque] = weighted_stress(&self.field, mask, |e| {
            let (steady, twice) = maxwell_stress(self.elements[e].e, EPSILON_0, self.harmonic);
            if double {
                twice
            } else {
                steady
            }
        });
        Ok(match kind {
            StressForceX | StressForceX2 => fx,
            StressForceY | StressForceY2 => fy,
            _ => torque,
        })
    }

    /// Complex power s·∫ E·J* dV.
    fn power(&self, selection: &Selection) -> Complex {
        let s = self.average();
        selection
            .iter()
            .map(|e| {
                let el = &self.elements[e];
                (el.e.dot(&el.j.conj())) * (s * self.field.volume(e))
            })
            .sum()
    }

    fn integrate(&self, selection: &Selection, kind: CurrentBlockIntegral) -> Complex {
        use CurrentBlockIntegral::*;
        let real = |v: f64| Complex::new(v, 0.0);
        match kind {
            RealPower => real(self.power(selection).re),
            ReactivePower => real(self.power(selection).im),
            ApparentPower => real(self.power(selection).norm()),
            Energy => {
                let s = 0.5 * self.average();
                real(
                    selection
                        .iter()
                        .map(|e| {
                            let el = &self.elements[e];
                            let w = el.eps.0 * el.e.x.norm_sqr() + el.eps.1 * el.e.y.norm_sqr();
                            s * w * self.field.volume(e)
                        })
                        .sum(),
                )
            }
            Area => real(selection.iter().map(|e| self.field.ctx.geometry[e].area).sum()),
            Volume => real(selection.iter().map(|e| self.field.volume(e)).sum()),
            StressForceX | StressForceY | StressTorque | StressForceX2 | StressForceY2
            | StressTorque2 => real(0.0),
        }
    }

    pub fn line_integral(&self, contour: &Contour, kind: CurrentLineIntegral) -> Result<[Complex; 2]> {
        let samples = self.field.samples(contour)?;
        let zero = Complex::new(0.0, 0.0);
        let mut first = zero;
        let mut second = zero;
        let mut measure = 0.0;
        match kind {
            CurrentLineIntegral::Extent => return Ok(self.field.contour_extent(&samples)),
            CurrentLineIntegral::TangentialField => {
                for s in &samples {
                    measure += s.length;
                    let Some(e) = s.element else { continue };
                    let ef = self.e_at(e, s.point);
                    first += (ef.x * s.tangent.x + ef.y * s.tangent.y) * s.length;
                }
            }
            CurrentLineIntegral::Current => {
                for s in &samples {
                    measure += s.surface();
                    let Some(e) = s.element else { continue };
                    let j = self.j_at(e, s.point);
                    first += (j.x * s.normal.x + j.y * s.normal.y) * s.surface();
                }
            }
            CurrentLineIntegral::Voltage => {
                for s in &samples {
                    measure += s.length;
                    let Some(e) = s.element else { continue };
                    first += self.field.interpolate(e, s.point, &self.solution.nodal) * s.length;
                }
                let average = if measure > 0.0 { first / measure } else { zero };
                return Ok([average, zero]);
            }
            CurrentLineIntegral::StressForce | CurrentLineIntegral::StressTorque => {
                let axisymmetric = self.field.ctx.weighting.is_axisymmetric();
                for s in &samples {
                    let Some(e) = s.element else { continue };
                    let (steady, twice) = maxwell_stress(self.e_at(e, s.point), EPSILON_0, self.harmonic);
                    let t0 = steady.traction(s.normal).scale(s.surface());
                    let t1 = twice.traction(s.normal).scale(s.surface());
                    if kind == CurrentLineIntegral::StressForce {
                        if !axisymmetric {
                            first += t0.x;
                        }
                        second += t0.y;
                    } else if !axisymmetric {
                        let p = s.meters(self.field.ctx.unit);
                        first += t0.y * p.x - t0.x * p.y;
                        second += t1.y * p.x - t1.x * p.y;
                    }
                }
                return Ok([first, second]);
            }
        }
        let average = if measure > 0.0 { first / measure } else { zero };
        Ok([first, average])
    }
}

fn element(
    field: &FieldMesh<'_>,
    tables: &CurrentProperties,
    solution: &Solution<Complex>,
    omega: f64,
    e: usize,
) -> Result<CurrentElement> {
    let ctx = &field.ctx;
    let m = ctx.material(e)?;
    let material = tables.materials.get(m).ok_or_else(|| {
        Error::InvalidQuery(format!("element {} references missing material {}", e, m))
    })?;
    let values = ctx.mesh.elements()[e].nodes.map(|n| solution.nodal[n]);
    let grad = ctx.geometry[e].gradient(&values);
    let ef = FieldVector::new(-grad.x, -grad.y);
    let kappa = material.admittivity(omega);
    Ok(CurrentElement {
        e: ef,
        j: FieldVector::new(ef.x * kappa.0, ef.y * kappa.1),
        kappa,
        eps: (EPSILON_0 * material.ex, EPSILON_0 * material.ey),
    })
}
