//! Magnetic field evaluation: B, H, J, energies, losses, forces and circuits.

use super::{
    maxwell_stress, sum_over, weighted_stress, Contour, FieldMesh, Mask, Selection, Solution,
};
use crate::assembly::magnetic::{bulk_conductivity, flux_density, reluctivity, CircuitLayout, LabelDrive};
use crate::assembly::{ElementGeometry, Weighting};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::magnetic::{CircuitKind, MagneticCircuit};
use crate::problem::{MagneticProperties, MaterialBehavior, Problem, Properties};
use crate::types::{Complex, FieldVector, Point2, ProblemType, MU_0};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Magnetic block integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagneticBlockIntegral {
    /// ∫ A·J* dV
    AJ,
    /// ∫ A dV
    A,
    /// Stored magnetic energy (time average when harmonic).
    Energy,
    /// Hysteresis and lamination eddy losses.
    HysteresisLosses,
    /// Resistive losses.
    ResistiveLosses,
    Area,
    TotalLosses,
    /// ∫ J dA
    TotalCurrent,
    /// ∫ Bx dV
    FluxX,
    /// ∫ By dV
    FluxY,
    Volume,
    LorentzForceX,
    LorentzForceY,
    LorentzForceX2,
    LorentzForceY2,
    LorentzTorque,
    LorentzTorque2,
    Coenergy,
    StressForceX,
    StressForceY,
    StressForceX2,
    StressForceY2,
    StressTorque,
    StressTorque2,
    /// ∫ (x² + y²) dV
    RadiusSquared,
}

impl MagneticBlockIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use MagneticBlockIntegral::*;
        const KINDS: [MagneticBlockIntegral; 25] = [
            AJ,
            A,
            Energy,
            HysteresisLosses,
            ResistiveLosses,
            Area,
            TotalLosses,
            TotalCurrent,
            FluxX,
            FluxY,
            Volume,
            LorentzForceX,
            LorentzForceY,
            LorentzForceX2,
            LorentzForceY2,
            LorentzTorque,
            LorentzTorque2,
            Coenergy,
            StressForceX,
            StressForceY,
            StressForceX2,
            StressForceY2,
            StressTorque,
            StressTorque2,
            RadiusSquared,
        ];
        KINDS
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::InvalidQuery(format!("unknown magnetic block integral {}", code)))
    }

    /// Weighted stress tensor kinds.
    pub fn requires_mask(self) -> bool {
        use MagneticBlockIntegral::*;
        matches!(
            self,
            StressForceX | StressForceY | StressForceX2 | StressForceY2 | StressTorque | StressTorque2
        )
    }
}

/// Magnetic line integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagneticLineIntegral {
    /// [∫ B·n dS, average B·n]
    NormalFlux,
    /// [∫ H·t dl, average H·t]
    TangentialField,
    /// [length, swept surface]
    Extent,
    /// [Fx, Fy] from the Maxwell stress tensor.
    StressForce,
    /// [steady torque, double-frequency torque]
    StressTorque,
    /// [∫ |B·n|² dS, average |B·n|²]
    NormalFluxSquared,
}

impl MagneticLineIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use MagneticLineIntegral::*;
        match code {
            0 => Ok(NormalFlux),
            1 => Ok(TangentialField),
            2 => Ok(Extent),
            3 => Ok(StressForce),
            4 => Ok(StressTorque),
            5 => Ok(NormalFluxSquared),
            _ => Err(Error::InvalidQuery(format!("unknown magnetic line integral {}", code))),
        }
    }
}

/// Fields of one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticElement {
    /// Mean vector potential (Wb/m).
    pub a: Complex,
    pub b: FieldVector<Complex>,
    pub h: FieldVector<Complex>,
    /// Total current density (A/m²), eddy currents included.
    pub j: Complex,
    /// Reluctivity (νx, νy) in m/H.
    pub nu: (Complex, Complex),
    /// Material conductivity (S/m).
    pub sigma: f64,
    /// Stored energy density (J/m³).
    pub energy: f64,
    pub coenergy: f64,
    /// Hysteresis and lamination loss density (W/m³).
    pub hysteresis: f64,
    /// Resistive loss density (W/m³).
    pub resistive: f64,
}

/// Field values at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticPointValues {
    /// Vector potential (Wb/m).
    pub a: Complex,
    pub b: FieldVector<Complex>,
    pub h: FieldVector<Complex>,
    pub j: Complex,
    /// Relative permeability (x, y).
    pub mu: (Complex, Complex),
    pub sigma: f64,
    pub energy_density: f64,
}

/// Current, voltage and flux linkage of one circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitResult {
    pub name: String,
    pub current: Complex,
    pub voltage: Complex,
    pub flux_linkage: Complex,
}

/// Queries on a solved magnetics problem.
pub struct MagneticField<'a> {
    field: FieldMesh<'a>,
    tables: &'a MagneticProperties,
    solution: &'a Solution<Complex>,
    layout: &'a CircuitLayout,
    omega: f64,
    axisymmetric: bool,
    smoothing: bool,
    elements: Vec<MagneticElement>,
    corners: Vec<[FieldVector<Complex>; 3]>,
}

impl<'a> MagneticField<'a> {
    /// `solution` holds nodal A (planar) or ψ = 2πr·A (axisymmetric).
    pub fn new(
        mesh: &'a Mesh,
        problem: &'a Problem,
        solution: &'a Solution<Complex>,
        layout: &'a CircuitLayout,
        smoothing: bool,
    ) -> Result<Self> {
        let Properties::Magnetic(tables) = &problem.properties else {
            return Err(Error::InvalidQuery("not a magnetics problem".into()));
        };
        solution.check(mesh)?;
        let mut out = Self {
            field: FieldMesh::new(mesh, problem)?,
            tables,
            solution,
            layout,
            omega: 2.0 * PI * problem.header.frequency,
            axisymmetric: problem.header.problem_type == ProblemType::Axisymmetric,
            smoothing,
            elements: Vec::new(),
            corners: Vec::new(),
        };
        out.elements = (0..mesh.n_elements())
            .into_par_iter()
            .map(|e| out.element(e))
            .collect::<Result<Vec<_>>>()?;
        let b: Vec<_> = out.elements.iter().map(|el| el.b).collect();
        out.corners = out.field.smooth(&b);
        Ok(out)
    }

    pub fn set_smoothing(&mut self, on: bool) {
        self.smoothing = on;
    }

    pub fn elements(&self) -> &[MagneticElement] {
        &self.elements
    }

    fn harmonic(&self) -> bool {
        self.omega > 0.0
    }

    fn element(&self, e: usize) -> Result<MagneticElement> {
        let ctx = &self.field.ctx;
        let g = &ctx.geometry[e];
        let m = ctx.material(e)?;
        let material = self.tables.materials.get(m).ok_or_else(|| {
            Error::InvalidQuery(format!("element {} references missing material {}", e, m))
        })?;
        let element = &ctx.mesh.elements()[e];
        let values = element.nodes.map(|n| self.solution.nodal[n]);
        let harmonic = self.harmonic();

        let b = flux_density(g, self.axisymmetric, &values);
        let bmag = b.magnitude();
        let nu = reluctivity(material, bmag, self.omega);
        let mut h = FieldVector::new(b.x * nu.0, b.y * nu.1);
        if !harmonic && material.hc != 0.0 {
            let c = ctx.mesh.centroid(e);
            let theta = ctx.label(e).magnetization.angle_at(c.x, c.y)?.to_radians();
            h = h - FieldVector::new(
                Complex::new(material.hc * theta.cos(), 0.0),
                Complex::new(material.hc * theta.sin(), 0.0),
            );
        }

        // A from the element mean of A or ψ
        let to_a = if self.axisymmetric {
            1.0 / (2.0 * PI * g.centroid.x)
        } else {
            1.0
        };
        let a = (values[0] + values[1] + values[2]) * (to_a / 3.0);

        let sigma = bulk_conductivity(material);
        let mut j = if harmonic {
            material.j
        } else {
            Complex::new(material.j.re, 0.0)
        };
        match self.layout.drives.get(element.label) {
            Some(LabelDrive::Stranded(js)) => j += *js,
            Some(LabelDrive::Solid { unknown }) => {
                j += self.solution.unknowns[*unknown] * (sigma * to_a);
            }
            _ => {}
        }
        if harmonic && sigma > 0.0 {
            j -= Complex::new(0.0, self.omega * sigma) * a;
        }

        let (bx2, by2) = (b.x.norm_sqr(), b.y.norm_sqr());
        let stored = nu.0.re * bx2 + nu.1.re * by2;
        let (energy, coenergy, hysteresis) = if harmonic {
            let lag = 0.5 * self.omega * (nu.0.im * bx2 + nu.1.im * by2);
            (0.25 * stored, 0.25 * stored, lag)
        } else if material.is_nonlinear() {
            let w = material.energy_density(bmag);
            (w, bmag * bmag * material.nu_of_b(bmag) - w, 0.0)
        } else {
            (0.5 * stored, 0.5 * stored, 0.0)
        };
        let resistive = if material.sigma > 0.0 {
            let s = if harmonic { 0.5 } else { 1.0 };
            s * j.norm_sqr() / material.sigma
        } else {
            0.0
        };

        Ok(MagneticElement {
            a,
            b,
            h,
            j,
            nu,
            sigma: material.sigma,
            energy,
            coenergy,
            hysteresis,
            resistive,
        })
    }

    fn b_at(&self, e: usize, p: Point2) -> FieldVector<Complex> {
        if self.smoothing {
            self.field.blend(e, p, &self.corners[e])
        } else {
            self.elements[e].b
        }
    }

    fn h_at(&self, e: usize, p: Point2) -> FieldVector<Complex> {
        let el = &self.elements[e];
        if !self.smoothing {
            return el.h;
        }
        // keep the element's coercive offset
        let offset = el.h - FieldVector::new(el.b.x * el.nu.0, el.b.y * el.nu.1);
        let b = self.b_at(e, p);
        FieldVector::new(b.x * el.nu.0, b.y * el.nu.1) + offset
    }

    /// Field values at `p` (length units).
    pub fn point_values(&self, p: Point2) -> Result<MagneticPointValues> {
        let e = self.field.require(p)?;
        let el = &self.elements[e];
        let potential = self.field.interpolate(e, p, &self.solution.nodal);
        let r = p.x * self.field.ctx.unit;
        let a = match (self.axisymmetric, r > 0.0) {
            (false, _) => potential,
            (true, true) => potential / (2.0 * PI * r),
            (true, false) => el.a,
        };
        let one = Complex::new(1.0, 0.0);
        Ok(MagneticPointValues {
            a,
            b: self.b_at(e, p),
            h: self.h_at(e, p),
            j: el.j,
            mu: (one / (el.nu.0 * MU_0), one / (el.nu.1 * MU_0)),
            sigma: el.sigma,
            energy_density: el.energy,
        })
    }

    /// Block integral over `selection`; stress tensor kinds need
    /// [`Self::block_integral_with_mask`].
    pub fn block_integral(&self, selection: &Selection, kind: MagneticBlockIntegral) -> Result<Complex> {
        selection.check(self.field.mesh())?;
        if kind.requires_mask() {
            return Err(Error::MaskRequired(format!("{:?}", kind)));
        }
        Ok(self.integrate(selection, kind))
    }

    /// Block integral with the stress tensor mask built for `selection`.
    pub fn block_integral_with_mask(
        &self,
        selection: &Selection,
        mask: &Mask,
        kind: MagneticBlockIntegral,
    ) -> Result<Complex> {
        let mesh = self.field.mesh();
        selection.check(mesh)?;
        mask.check(mesh, selection)?;
        if !kind.requires_mask() {
            return Ok(self.integrate(selection, kind));
        }
        use MagneticBlockIntegral::*;
        let double = matches!(kind, StressForceX2 | StressForceY2 | StressTorque2);
        let harmonic = self.harmonic();
        let [fx, fy, torque] = weighted_stress(&self.field, mask, |e| {
            let (steady, twice) = maxwell_stress(self.elements[e].b, 1.0 / MU_0, harmonic);
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

    /// Steady and double-frequency parts of the product j·b.
    fn products(&self, j: Complex, b: Complex) -> (Complex, Complex) {
        if self.harmonic() {
            (Complex::new(0.5 * (j * b.conj()).re, 0.0), j * b * 0.5)
        } else {
            (Complex::new(j.re * b.re, 0.0), Complex::new(0.0, 0.0))
        }
    }

    /// Lorentz force density J × B, steady and double-frequency.
    fn lorentz(&self, el: &MagneticElement) -> [FieldVector<Complex>; 2] {
        let (sx, dx) = self.products(el.j, el.b.x);
        let (sy, dy) = self.products(el.j, el.b.y);
        let zero = Complex::new(0.0, 0.0);
        if self.axisymmetric {
            // net radial force on a ring vanishes
            [FieldVector::new(zero, -sx), FieldVector::new(zero, -dx)]
        } else {
            [FieldVector::new(-sy, sx), FieldVector::new(-dy, dx)]
        }
    }

    fn integrate(&self, selection: &Selection, kind: MagneticBlockIntegral) -> Complex {
        use MagneticBlockIntegral::*;
        let real = |v: f64| Complex::new(v, 0.0);
        sum_over(selection, |e| {
            let el = &self.elements[e];
            let g = &self.field.ctx.geometry[e];
            let v = self.field.volume(e);
            match kind {
                AJ => el.a * el.j.conj() * v,
                A => el.a * v,
                Energy => real(el.energy * v),
                HysteresisLosses => real(el.hysteresis * v),
                ResistiveLosses => real(el.resistive * v),
                Area => real(g.area),
                TotalLosses => real((el.hysteresis + el.resistive) * v),
                TotalCurrent => el.j * g.area,
                FluxX => el.b.x * v,
                FluxY => el.b.y * v,
                Volume => real(v),
                LorentzForceX => self.lorentz(el)[0].x * v,
                LorentzForceY => self.lorentz(el)[0].y * v,
                LorentzForceX2 => self.lorentz(el)[1].x * v,
                LorentzForceY2 => self.lorentz(el)[1].y * v,
                LorentzTorque | LorentzTorque2 => {
                    if self.axisymmetric {
                        return real(0.0);
                    }
                    let f = self.lorentz(el)[usize::from(kind == LorentzTorque2)];
                    (f.y * g.centroid.x - f.x * g.centroid.y) * v
                }
                Coenergy => real(el.coenergy * v),
                RadiusSquared => real(second_moment(g) * self.field.ctx.weights(e).source),
                // stress kinds are integrated through the mask
                StressForceX | StressForceY | StressForceX2 | StressForceY2 | StressTorque
                | StressTorque2 => real(0.0),
            }
        })
    }

    /// Line integral along `contour`.
    pub fn line_integral(&self, contour: &Contour, kind: MagneticLineIntegral) -> Result<[Complex; 2]> {
        let samples = self.field.samples(contour)?;
        let unit = self.field.ctx.unit;
        let zero = Complex::new(0.0, 0.0);
        let mut first = zero;
        let mut second = zero;
        let mut measure = 0.0;
        match kind {
            MagneticLineIntegral::Extent => return Ok(self.field.contour_extent(&samples)),
            MagneticLineIntegral::NormalFlux | MagneticLineIntegral::NormalFluxSquared => {
                for s in &samples {
                    measure += s.surface();
                    let Some(e) = s.element else { continue };
                    let b = self.b_at(e, s.point);
                    let bn = b.x * s.normal.x + b.y * s.normal.y;
                    first += if kind == MagneticLineIntegral::NormalFlux {
                        bn * s.surface()
                    } else {
                        Complex::new(bn.norm_sqr() * s.surface(), 0.0)
                    };
                }
            }
            MagneticLineIntegral::TangentialField => {
                for s in &samples {
                    measure += s.length;
                    let Some(e) = s.element else { continue };
                    let h = self.h_at(e, s.point);
                    first += (h.x * s.tangent.x + h.y * s.tangent.y) * s.length;
                }
            }
            MagneticLineIntegral::StressForce | MagneticLineIntegral::StressTorque => {
                for s in &samples {
                    let Some(e) = s.element else { continue };
                    let (steady, twice) = maxwell_stress(self.b_at(e, s.point), 1.0 / MU_0, self.harmonic());
                    let t0 = steady.traction(s.normal).scale(s.surface());
                    let t1 = twice.traction(s.normal).scale(s.surface());
                    if kind == MagneticLineIntegral::StressForce {
                        if !self.axisymmetric {
                            first += t0.x;
                        }
                        second += t0.y;
                    } else if !self.axisymmetric {
                        let p = s.meters(unit);
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

    /// Current, voltage and flux linkage of every circuit.
    pub fn circuit_results(&self) -> Vec<CircuitResult> {
        self.tables
            .circuits
            .iter()
            .enumerate()
            .map(|(c, circuit)| self.circuit_result(c, circuit))
            .collect()
    }

    fn circuit_result(&self, c: usize, circuit: &MagneticCircuit) -> CircuitResult {
        let ctx = &self.field.ctx;
        let labels = &ctx.problem.geometry.labels;
        let current = circuit.current;
        let zero = Complex::new(0.0, 0.0);
        let total_area: f64 = (0..labels.len())
            .filter(|&l| labels[l].circuit == Some(c))
            .map(|l| self.layout.label_areas.get(l).copied().unwrap_or(0.0))
            .sum();

        let mut aj = zero;
        let mut aj_stranded = zero;
        let mut linked = zero;
        let mut dissipated = 0.0;
        for (e, el) in self.elements.iter().enumerate() {
            let l = ctx.mesh.elements()[e].label;
            if labels[l].circuit != Some(c) {
                continue;
            }
            let v = self.field.volume(e);
            aj += el.a * el.j.conj() * v;
            if let Some(LabelDrive::Stranded(_)) = self.layout.drives.get(l) {
                aj_stranded += el.a * el.j.conj() * v;
                let density = match circuit.kind {
                    CircuitKind::Series => f64::from(labels[l].turns) / self.layout.label_areas[l],
                    CircuitKind::Parallel => 1.0 / total_area,
                };
                linked += el.a * (density * v);
                if el.sigma > 0.0 {
                    dissipated += el.j.norm_sqr() / el.sigma * v;
                }
            }
        }

        let depth = match ctx.weighting {
            Weighting::Planar { depth } => depth,
            _ => 1.0,
        };
        let solid: Complex = self
            .layout
            .circuit_unknowns
            .get(c)
            .map(|ks| ks.iter().map(|&k| self.solution.unknowns[k] * depth).sum())
            .unwrap_or(zero);

        let driven = current.norm() > 0.0;
        let (flux_linkage, stranded_linkage) = if driven {
            (aj / current.conj(), aj_stranded / current.conj())
        } else {
            (linked, linked)
        };
        let resistive = if driven {
            Complex::new(dissipated, 0.0) / current.conj()
        } else {
            zero
        };
        let voltage = solid + Complex::new(0.0, self.omega) * stranded_linkage + resistive;

        CircuitResult {
            name: circuit.name.clone(),
            current,
            voltage,
            flux_linkage,
        }
    }
}

/// ∫ (x² + y²) dA over a triangle (m⁴).
fn second_moment(g: &ElementGeometry) -> f64 {
    let c = g.corners;
    let moment = |a: f64, b: f64, d: f64| a * a + b * b + d * d + a * b + b * d + d * a;
    g.area / 6.0 * (moment(c[0].x, c[1].x, c[2].x) + moment(c[0].y, c[1].y, c[2].y))
}
