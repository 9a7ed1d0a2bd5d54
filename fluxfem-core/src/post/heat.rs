//! Heat flow field evaluation: temperature, gradient and heat flux density.

use super::{Contour, FieldMesh, Selection, Solution};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::{HeatProperties, Problem, Properties};
use crate::types::{FieldVector, Point2};
use rayon::prelude::*;

/// Heat flow block integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatBlockIntegral {
    AverageTemperature,
    Area,
    Volume,
    AverageFx,
    AverageFy,
    AverageGx,
    AverageGy,
}

impl HeatBlockIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use HeatBlockIntegral::*;
        const KINDS: [HeatBlockIntegral; 7] = [
            AverageTemperature,
            Area,
            Volume,
            AverageFx,
            AverageFy,
            AverageGx,
            AverageGy,
        ];
        KINDS
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::InvalidQuery(format!("unknown heat block integral {}", code)))
    }
}

/// Heat flow line integral kinds, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatLineIntegral {
    /// [∫ G·t dl, average G·t]
    TemperatureDrop,
    /// [∫ F·n dS, average F·n]
    HeatFlux,
    /// [length, swept surface]
    Extent,
    /// [average T, ∫ T dl]
    Temperature,
}

impl HeatLineIntegral {
    pub fn from_code(code: u32) -> Result<Self> {
        use HeatLineIntegral::*;
        match code {
            0 => Ok(TemperatureDrop),
            1 => Ok(HeatFlux),
            2 => Ok(Extent),
            3 => Ok(Temperature),
            _ => Err(Error::InvalidQuery(format!("unknown heat line integral {}", code))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatElement {
    /// Mean temperature (K).
    pub t: f64,
    /// Temperature gradient (K/m).
    pub g: FieldVector<f64>,
    /// Heat flux density −k∇T (W/m²).
    pub f: FieldVector<f64>,
    /// Conductivity (kx, ky) at the mean temperature.
    pub k: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatPointValues {
    pub t: f64,
    pub f: FieldVector<f64>,
    pub g: FieldVector<f64>,
    pub k: (f64, f64),
}

/// Queries on a solved heat flow problem.
pub struct HeatField<'a> {
    field: FieldMesh<'a>,
    solution: &'a Solution<f64>,
    smoothing: bool,
    elements: Vec<HeatElement>,
    corners: Vec<[FieldVector<f64>; 3]>,
}

impl<'a> HeatField<'a> {
    pub fn new(
        mesh: &'a Mesh,
        problem: &'a Problem,
        solution: &'a Solution<f64>,
        smoothing: bool,
    ) -> Result<Self> {
        let Properties::Heat(tables) = &problem.properties else {
            return Err(Error::InvalidQuery("not a heat flow problem".into()));
        };
        solution.check(mesh)?;
        let field = FieldMesh::new(mesh, problem)?;
        let elements = (0..mesh.n_elements())
            .into_par_iter()
            .map(|e| element(&field, tables, solution, e))
            .collect::<Result<Vec<_>>>()?;
        let g: Vec<_> = elements.iter().map(|el| el.g).collect();
        let corners = field.smooth(&g);
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

    pub fn elements(&self) -> &[HeatElement] {
        &self.elements
    }

    fn g_at(&self, e: usize, p: Point2) -> FieldVector<f64> {
        if self.smoothing {
            self.field.blend(e, p, &self.corners[e])
        } else {
            self.elements[e].g
        }
    }

    fn f_at(&self, e: usize, p: Point2) -> FieldVector<f64> {
        let el = &self.elements[e];
        if !self.smoothing {
            return el.f;
        }
        let g = self.g_at(e, p);
        FieldVector::new(-el.k.0 * g.x, -el.k.1 * g.y)
    }

    pub fn point_values(&self, p: Point2) -> Result<HeatPointValues> {
        let e = self.field.require(p)?;
        Ok(HeatPointValues {
            t: self.field.interpolate(e, p, &self.solution.nodal),
            f: self.f_at(e, p),
            g: self.g_at(e, p),
            k: self.elements[e].k,
        })
    }

    pub fn block_integral(&self, selection: &Selection, kind: HeatBlockIntegral) -> Result<f64> {
        use HeatBlockIntegral::*;
        selection.check(self.field.mesh())?;
        let total = |f: &dyn Fn(usize) -> f64| selection.iter().map(f).sum::<f64>();
        let volume = total(&|e| self.field.volume(e));
        let average = |f: &dyn Fn(&HeatElement) -> f64| {
            total(&|e| f(&self.elements[e]) * self.field.volume(e)) / volume
        };
        Ok(match kind {
            AverageTemperature => average(&|el| el.t),
            Area => total(&|e| self.field.ctx.geometry[e].area),
            Volume => volume,
            AverageFx => average(&|el| el.f.x),
            AverageFy => average(&|el| el.f.y),
            AverageGx => average(&|el| el.g.x),
            AverageGy => average(&|el| el.g.y),
        })
    }

    pub fn line_integral(&self, contour: &Contour, kind: HeatLineIntegral) -> Result<[f64; 2]> {
        let samples = self.field.samples(contour)?;
        let mut total = 0.0;
        let mut measure = 0.0;
        match kind {
            HeatLineIntegral::Extent => {
                let [length, surface] = self.field.contour_extent(&samples);
                return Ok([length.re, surface.re]);
            }
            HeatLineIntegral::TemperatureDrop => {
                for s in &samples {
                    measure += s.length;
                    let Some(e) = s.element else { continue };
                    let g = self.g_at(e, s.point);
                    total += (g.x * s.tangent.x + g.y * s.tangent.y) * s.length;
                }
            }
            HeatLineIntegral::HeatFlux => {
                for s in &samples {
                    measure += s.surface();
                    let Some(e) = s.element else { continue };
                    let f = self.f_at(e, s.point);
                    total += (f.x * s.normal.x + f.y * s.normal.y) * s.surface();
                }
            }
            HeatLineIntegral::Temperature => {
                for s in &samples {
                    measure += s.length;
                    let Some(e) = s.element else { continue };
                    total += self.field.interpolate(e, s.point, &self.solution.nodal) * s.length;
                }
                let average = if measure > 0.0 { total / measure } else { 0.0 };
                return Ok([average, total]);
            }
        }
        let average = if measure > 0.0 { total / measure } else { 0.0 };
        Ok([total, average])
    }
}

fn element(
    field: &FieldMesh<'_>,
    tables: &HeatProperties,
    solution: &Solution<f64>,
    e: usize,
) -> Result<HeatElement> {
    let ctx = &field.ctx;
    let m = ctx.material(e)?;
    let material = tables.materials.get(m).ok_or_else(|| {
        Error::InvalidQuery(format!("element {} references missing material {}", e, m))
    })?;
    let values = ctx.mesh.elements()[e].nodes.map(|n| solution.nodal[n]);
    let t = values.iter().sum::<f64>() / 3.0;
    let k = material.conductivity(t);
    let g = ctx.geometry[e].gradient(&values);
    Ok(HeatElement {
        t,
        g,
        f: FieldVector::new(-k.0 * g.x, -k.1 * g.y),
        k,
    })
}
