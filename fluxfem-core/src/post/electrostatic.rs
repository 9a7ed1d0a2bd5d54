//! Electrostatic field evaluation.

use super::{maxwell_stress, weighted_stress, Contour, FieldMesh, Mask, Selection, Solution};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::{ElectrostaticProperties, Problem, Properties};
use crate::types::{FieldVector, Point2, EPSILON_0};
use rayon::prelude::*;

/// Electrostatic block integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectrostaticBlockIntegral {
    /// Stored energy (J).
    Energy,
    Area,
    Volume,
    AverageDx,
    AverageDy,
    AverageEx,
    AverageEy,
    StressForceX,
    StressForceY,
    StressTorque,
}

impl ElectrostaticBlockIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use ElectrostaticBlockIntegral::*;
        const KINDS: [ElectrostaticBlockIntegral; 10] = [
            Energy,
            Area,
            Volume,
            AverageDx,
            AverageDy,
            AverageEx,
            AverageEy,
            StressForceX,
            StressForceY,
            StressTorque,
        ];
        KINDS.get(code as usize).copied().ok_or_else(|| {
            Error::InvalidQuery(format!("unknown electrostatic block integral {}", code))
        })
    }

    pub fn requires_mask(self) -> bool {
        use ElectrostaticBlockIntegral::*;
        matches!(self, StressForceX | StressForceY | StressTorque)
    }
}

/// Electrostatic line integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectrostaticLineIntegral {
    /// [∫ E·t dl, average E·t]
    TangentialField,
    /// [∫ D·n dS, average D·n]
    NormalFlux,
    /// [length, swept surface]
    Extent,
    /// [Fx, Fy]
    StressForce,
    /// [torque, 0]
    StressTorque,
}

impl ElectrostaticLineIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use ElectrostaticLineIntegral::*;
        match code {
            0 => Ok(TangentialField),
            1 => Ok(NormalFlux),
            2 => Ok(Extent),
            3 => Ok(StressForce),
            4 => Ok(StressTorque),
            _ => Err(Error::InvalidQuery(format!(
                "unknown electrostatic line integral {}",
                code
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectrostaticElement {
    pub d: FieldVector<f64>,
    pub e: FieldVector<f64>,
    /// Absolute permittivity (εx, εy) in F/m.
    pub eps: (f64, f64),
    /// Energy density (J/m³).
    pub energy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectrostaticPointValues {
    pub v: f64,
    pub d: FieldVector<f64>,
    pub e: FieldVector<f64>,
    /// Relative permittivity (x, y).
    pub eps: (f64, f64),
    pub energy_density: f64,
}

/// Queries on a solved electrostatics problem.
pub struct ElectrostaticField<'a> {
    field: FieldMesh<'a>,
    solution: &'a Solution<f64>,
    smoothing: bool,
    elements: Vec<ElectrostaticElement>,
    corners: Vec<[FieldVector<f64>; 3]>,
}

impl<'a> ElectrostaticField<'a> {
    pub fn new(
        mesh: &'a Mesh,
        problem: &'a Problem,
        solution: &'a Solution<f64>,
        smoothing: bool,
    ) -> Result<Self> {
        let Properties::Electrostatic(tables) = &problem.properties else {
            return Err(Error::InvalidQuery("not an electrostatics problem".into()));
        };
        solution.check(mesh)?;
        let field = FieldMesh::new(mesh, problem)?;
        let elements = (0..mesh.n_elements())
            .into_par_iter()
            .map(|e| element(&field, tables, solution, e))
            .collect::<Result<Vec<_>>>()?;
        let d: Vec<_> = elements.iter().map(|el| el.d).collect();
        let corners = field.smooth(&d);
        Ok(Self {
            field,
            solution,
            smoothing,
            elements,
            corners,
        })
    }

    pub fn set_smoothing(&mut self, on: bool) {
        self.smoothing = on;
    }

    pub fn elements(&self) -> &[ElectrostaticElement] {
        &self.elements
    }

    fn d_at(&self, e: usize, p: Point2) -> FieldVector<f64> {
        if self.smoothing {
            self.field.blend(e, p, &self.corners[e])
        } else {
            self.elements[e].d
        }
    }

    fn e_at(&self, e: usize, p: Point2) -> FieldVector<f64> {
        let el = &self.elements[e];
        if !self.smoothing {
            return el.e;
        }
        let d = self.d_at(e, p);
        FieldVector::new(d.x / el.eps.0, d.y / el.eps.1)
    }

    pub fn point_values(&self, p: Point2) -> Result<ElectrostaticPointValues> {
        let e = self.field.require(p)?;
        let el = &self.elements[e];
        let d = self.d_at(e, p);
        let ef = self.e_at(e, p);
        Ok(ElectrostaticPointValues {
            v: self.field.interpolate(e, p, &self.solution.nodal),
            d,
            e: ef,
            eps: (el.eps.0 / EPSILON_0, el.eps.1 / EPSILON_0),
            energy_density: 0.5 * (d.x * ef.x + d.y * ef.y),
        })
    }

    pub fn block_integral(&self, selection: &Selection, kind: ElectrostaticBlockIntegral) -> Result<f64> {
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
        kind: ElectrostaticBlockIntegral,
    ) -> Result<f64> {
        let mesh = self.field.mesh();
        selection.check(mesh)?;
        mask.check(mesh, selection)?;
        if !kind.requires_mask() {
            return Ok(self.integrate(selection, kind));
        }
        let [fx, fy, torque] = weighted_stress(&self.field, mask, |e| {
            maxwell_stress(self.elements[e].e.to_complex(), EPSILON_0, false).0
        });
        Ok(match kind {
            ElectrostaticBlockIntegral::StressForceX => fx.re,
            ElectrostaticBlockIntegral::StressForceY => fy.re,
            _ => torque.re,
        })
    }

    fn integrate(&self, selection: &Selection, kind: ElectrostaticBlockIntegral) -> f64 {
        use ElectrostaticBlockIntegral::*;
        let total = |f: &dyn Fn(usize) -> f64| selection.iter().map(f).sum::<f64>();
        let volume = total(&|e| self.field.volume(e));
        let average = |f: &dyn Fn(&ElectrostaticElement) -> f64| {
            total(&|e| f(&self.elements[e]) * self.field.volume(e)) / volume
        };
        match kind {
            Energy => total(&|e| self.elements[e].energy * self.field.volume(e)),
            Area => total(&|e| self.field.ctx.geometry[e].area),
            Volume => volume,
            AverageDx => average(&|el| el.d.x),
            AverageDy => average(&|el| el.d.y),
            AverageEx => average(&|el| el.e.x),
            AverageEy => average(&|el| el.e.y),
            StressForceX | StressForceY | StressTorque => 0.0,
        }
    }

    pub fn line_integral(&self, contour: &Contour, kind: ElectrostaticLineIntegral) -> Result<[f64; 2]> {
        let samples = self.field.samples(contour)?;
        let mut first = 0.0;
        let mut second = 0.0;
        let mut measure = 0.0;
        match kind {
            ElectrostaticLineIntegral::Extent => {
                let [length, surface] = self.field.contour_extent(&samples);
                return Ok([length.re, surface.re]);
            }
            ElectrostaticLineIntegral::TangentialField => {
                for s in &samples {
                    measure += s.length;
                    let Some(e) = s.element else { continue };
                    let f = self.e_at(e, s.point);
                    first += (f.x * s.tangent.x + f.y * s.tangent.y) * s.length;
                }
            }
            ElectrostaticLineIntegral::NormalFlux => {
                for s in &samples {
                    measure += s.surface();
                    let Some(e) = s.element else { continue };
                    let d = self.d_at(e, s.point);
                    first += (d.x * s.normal.x + d.y * s.normal.y) * s.surface();
                }
            }
            ElectrostaticLineIntegral::StressForce | ElectrostaticLineIntegral::StressTorque => {
                let axisymmetric = self.field.ctx.weighting.is_axisymmetric();
                for s in &samples {
                    let Some(e) = s.element else { continue };
                    let (stress, _) = maxwell_stress(self.e_at(e, s.point).to_complex(), EPSILON_0, false);
                    let t = stress.traction(s.normal).scale(s.surface());
                    if kind == ElectrostaticLineIntegral::StressForce {
                        if !axisymmetric {
                            first += t.x.re;
                        }
                        second += t.y.re;
                    } else if !axisymmetric {
                        let p = s.meters(self.field.ctx.unit);
                        first += t.y.re * p.x - t.x.re * p.y;
                    }
                }
                return Ok([first, second]);
            }
        }
        let average = if measure > 0.0 { first / measure } else { 0.0 };
        Ok([first, average])
    }
}

fn element(
    field: &FieldMesh<'_>,
    tables: &ElectrostaticProperties,
    solution: &Solution<f64>,
    e: usize,
) -> Result<ElectrostaticElement> {
    let ctx = &field.ctx;
    let m = ctx.material(e)?;
    let material = tables.materials.get(m).ok_or_else(|| {
        Error::InvalidQuery(format!("element {} references missing material {}", e, m))
    })?;
    let values = ctx.mesh.elements()[e].nodes.map(|n| solution.nodal[n]);
    let grad = ctx.geometry[e].gradient(&values);
    let ef = FieldVector::new(-grad.x, -grad.y);
    let eps = (EPSILON_0 * material.ex, EPSILON_0 * material.ey);
    let d = FieldVector::new(ef.x * eps.0, ef.y * eps.1);
    Ok(ElectrostaticElement {
        d,
        e: ef,
        eps,
        energy: 0.5 * (d.x * ef.x + d.y * ef.y),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::testing::solve;
    use crate::assembly::{ElectrostaticAssembler, PhysicsAssembler};
    use crate::mesh::testing::{mark_edges, rectangle, relabel};
    use crate::problem::electrostatic::{
        ElectrostaticBoundary, ElectrostaticBoundaryKind, ElectrostaticMaterial,
    };
    use crate::problem::{BlockLabel, Domain, Region};
    use crate::types::LengthUnit;
    use approx::assert_relative_eq;

    const V0: f64 = 100.0;

    fn plates() -> (Problem, Mesh) {
        let mut p = Problem::new(Domain::Electrostatic);
        p.header.length_units = LengthUnit::Meters;
        p.geometry.add_label(BlockLabel::new(0.1, 0.1, Region::Material(0)));
        p.geometry.add_label(BlockLabel::new(0.5, 0.5, Region::Material(0)));
        if let Properties::Electrostatic(t) = &mut p.properties {
            t.materials.push(ElectrostaticMaterial::linear("dielectric", 4.0));
            for (name, v) in [("bottom", 0.0), ("top", V0)] {
                t.boundaries.push(ElectrostaticBoundary {
                    name: name.into(),
                    kind: ElectrostaticBoundaryKind::Fixed(v),
                });
            }
        }
        let mesh = rectangle(0.0, 1.0, 0.0, 1.0, 6, 6, None);
        let mesh = relabel(&mesh, |c| {
            usize::from((0.3..0.7).contains(&c.x) && (0.3..0.7).contains(&c.y))
        });
        let mesh = mark_edges(&mesh, |p0, p1| {
            if p0.y == 0.0 && p1.y == 0.0 {
                Some(0)
            } else if p0.y == 1.0 && p1.y == 1.0 {
                Some(1)
            } else {
                None
            }
        });
        (p, mesh)
    }

    fn solved(mesh: &Mesh, p: &Problem) -> Solution<f64> {
        let a = ElectrostaticAssembler::new(mesh, p).unwrap();
        let unknowns = solve(&a.assemble(None).unwrap());
        Solution {
            nodal: a.unknown_map().node_values(&unknowns),
            unknowns,
            iterations: 1,
            mesh_generation: mesh.generation(),
        }
    }

    #[test]
    fn test_uniform_field_between_plates() {
        let (p, mesh) = plates();
        let s = solved(&mesh, &p);
        let field = ElectrostaticField::new(&mesh, &p, &s, true).unwrap();
        let v = field.point_values(Point2::new(0.3, 0.4)).unwrap();
        assert_relative_eq!(v.v, 0.4 * V0, max_relative = 1e-8);
        assert_relative_eq!(v.e.y, -V0, max_relative = 1e-8);
        assert_relative_eq!(v.d.y, -4.0 * EPSILON_0 * V0, max_relative = 1e-8);
        assert_relative_eq!(v.eps.0, 4.0, max_relative = 1e-12);

        let all = Selection::all(&mesh);
        let w = field.block_integral(&all, ElectrostaticBlockIntegral::Energy).unwrap();
        assert_relative_eq!(w, 2.0 * EPSILON_0 * V0 * V0, max_relative = 1e-8);
        let dy = field.block_integral(&all, ElectrostaticBlockIntegral::AverageDy).unwrap();
        assert_relative_eq!(dy, -4.0 * EPSILON_0 * V0, max_relative = 1e-8);
        let vol = field.block_integral(&all, ElectrostaticBlockIntegral::Volume).unwrap();
        assert_relative_eq!(vol, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_line_integrals() {
        let (p, mesh) = plates();
        let s = solved(&mesh, &p);
        let field = ElectrostaticField::new(&mesh, &p, &s, false).unwrap();
        let mut across = Contour::new();
        across.add_point(Point2::new(0.2, 0.5));
        across.add_point(Point2::new(0.8, 0.5));
        // normal points to −y, along D
        let [flux, avg] = field
            .line_integral(&across, ElectrostaticLineIntegral::NormalFlux)
            .unwrap();
        assert_relative_eq!(flux, 4.0 * EPSILON_0 * V0 * 0.6, max_relative = 1e-8);
        assert_relative_eq!(avg, 4.0 * EPSILON_0 * V0, max_relative = 1e-8);

        let mut up = Contour::new();
        up.add_point(Point2::new(0.5, 0.1));
        up.add_point(Point2::new(0.5, 0.9));
        let [emf, _] = field
            .line_integral(&up, ElectrostaticLineIntegral::TangentialField)
            .unwrap();
        assert_relative_eq!(emf, -0.8 * V0, max_relative = 1e-8);
        let [length, _] = field.line_integral(&up, ElectrostaticLineIntegral::Extent).unwrap();
        assert_relative_eq!(length, 0.8, max_relative = 1e-12);
    }

    #[test]
    fn test_uniform_stress_gives_no_net_force() {
        let (p, mesh) = plates();
        let s = solved(&mesh, &p);
        let field = ElectrostaticField::new(&mesh, &p, &s, false).unwrap();
        let block = Selection::labels(&mesh, &[1]);
        assert!(matches!(
            field.block_integral(&block, ElectrostaticBlockIntegral::StressForceY),
            Err(Error::MaskRequired(_))
        ));
        let mask = Mask::build(&mesh, &block).unwrap();
        let scale = EPSILON_0 * V0 * V0;
        for kind in [
            ElectrostaticBlockIntegral::StressForceX,
            ElectrostaticBlockIntegral::StressForceY,
        ] {
            let f = field.block_integral_with_mask(&block, &mask, kind).unwrap();
            assert!(f.abs() < 1e-8 * scale, "{:?} = {}", kind, f);
        }
        let area = field
            .block_integral_with_mask(&block, &mask, ElectrostaticBlockIntegral::Area)
            .unwrap();
        assert_relative_eq!(area, 4.0 / 36.0, max_relative = 1e-9);
        assert!(ElectrostaticBlockIntegral::from_code(10).is_err());
    }
}
