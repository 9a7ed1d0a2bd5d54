//! Post-processing: point values, block integrals and line integrals over a
//! solved mesh.
//!
//! Each domain has a field evaluator that derives element fields from the
//! nodal solution once, then answers queries:
//!
//! - **Point values** from raw element fields, or from corner values
//!   smoothed over elements sharing the node and block label, blended with
//!   barycentric weights.
//! - **Block integrals** over a [`Selection`]. Weighted stress tensor
//!   kinds need a [`Mask`] built for that selection.
//! - **Line integrals** along a [`Contour`], sampled at piece midpoints.

pub mod contour;
pub mod current;
pub mod electrostatic;
pub mod heat;
pub mod locate;
pub mod magnetic;
pub mod selection;

pub use contour::Contour;
pub use current::CurrentField;
pub use electrostatic::ElectrostaticField;
pub use heat::HeatField;
pub use locate::Locator;
pub use magnetic::{CircuitResult, MagneticField};
pub use selection::{Mask, Selection};

use crate::assembly::MeshContext;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::Problem;
use crate::types::{Complex, FieldScalar, FieldVector, Point2};
use rayon::prelude::*;

/// Converged solution of one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution<T> {
    /// Potential (or temperature) at every mesh node.
    pub nodal: Vec<T>,
    /// Every unknown, nodes first.
    pub unknowns: Vec<T>,
    pub iterations: usize,
    /// Generation of the mesh the solution belongs to.
    pub mesh_generation: u64,
}

impl<T> Solution<T> {
    pub fn check(&self, mesh: &Mesh) -> Result<()> {
        if self.mesh_generation != mesh.generation() || self.nodal.len() != mesh.n_nodes() {
            return Err(Error::StaleState(format!(
                "solution belongs to mesh generation {}, current is {}",
                self.mesh_generation,
                mesh.generation()
            )));
        }
        Ok(())
    }
}

/// One midpoint sample of a contour.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Midpoint in length units.
    pub point: Point2,
    /// Element containing the midpoint; `None` outside the mesh.
    pub element: Option<usize>,
    /// Unit tangent along the direction of travel.
    pub tangent: Point2,
    /// Unit normal to the right of the direction of travel.
    pub normal: Point2,
    /// Piece length (m).
    pub length: f64,
    /// Out-of-plane weight: depth (m) or 2πr.
    pub weight: f64,
}

impl Sample {
    /// Surface element dS = length × weight.
    pub fn surface(&self) -> f64 {
        self.length * self.weight
    }

    /// Midpoint in meters.
    pub fn meters(&self, unit: f64) -> Point2 {
        self.point * unit
    }
}

/// Mesh queries shared by the field evaluators.
pub struct FieldMesh<'a> {
    pub ctx: MeshContext<'a>,
    locator: Locator,
    node_elements: Vec<Vec<usize>>,
}

impl<'a> FieldMesh<'a> {
    pub fn new(mesh: &'a Mesh, problem: &'a Problem) -> Result<Self> {
        Ok(Self {
            ctx: MeshContext::new(mesh, problem, false)?,
            locator: Locator::new(mesh),
            node_elements: mesh.node_elements(),
        })
    }

    pub fn mesh(&self) -> &'a Mesh {
        self.ctx.mesh
    }

    pub fn locate(&self, p: Point2) -> Option<usize> {
        self.locator.locate(self.ctx.mesh, p)
    }

    /// Element containing `p`, or an error naming the point.
    pub fn require(&self, p: Point2) -> Result<usize> {
        self.locate(p).ok_or_else(|| {
            Error::InvalidQuery(format!("point ({}, {}) is outside the mesh", p.x, p.y))
        })
    }

    /// Volume of an element (m³): area × depth, or area × 2πr.
    pub fn volume(&self, e: usize) -> f64 {
        self.ctx.geometry[e].area * self.ctx.weights(e).source
    }

    /// Linear interpolation of nodal values.
    pub fn interpolate<T: FieldScalar>(&self, e: usize, p: Point2, nodal: &[T]) -> T {
        let l = locate::barycentric(self.ctx.mesh, e, p);
        let nodes = self.ctx.mesh.elements()[e].nodes;
        (0..3).fold(T::zero(), |acc, k| acc + nodal[nodes[k]] * T::from_real(l[k]))
    }

    /// Corner values averaged over the elements sharing each node and the
    /// same block label, weighted by the corner angle.
    pub fn smooth<T: FieldScalar>(&self, values: &[FieldVector<T>]) -> Vec<[FieldVector<T>; 3]> {
        let mesh = self.ctx.mesh;
        (0..mesh.n_elements())
            .into_par_iter()
            .map(|e| {
                let element = &mesh.elements()[e];
                let mut out = [values[e]; 3];
                for (k, slot) in out.iter_mut().enumerate() {
                    let node = element.nodes[k];
                    let mut sum = FieldVector::zero();
                    let mut total = 0.0;
                    for &o in &self.node_elements[node] {
                        if mesh.elements()[o].label != element.label {
                            continue;
                        }
                        let w = corner_angle(mesh, o, node);
                        sum += values[o].scale(w);
                        total += w;
                    }
                    if total > 0.0 {
                        *slot = sum.scale(1.0 / total);
                    }
                }
                out
            })
            .collect()
    }

    /// Barycentric blend of smoothed corner values.
    pub fn blend<T: FieldScalar>(&self, e: usize, p: Point2, corners: &[FieldVector<T>; 3]) -> FieldVector<T> {
        let l = locate::barycentric(self.ctx.mesh, e, p);
        (0..3).fold(FieldVector::zero(), |acc, k| acc + corners[k].scale(l[k]))
    }

    /// Midpoint samples along a contour.
    pub fn samples(&self, contour: &Contour) -> Result<Vec<Sample>> {
        if contour.is_empty() {
            return Err(Error::InvalidQuery("contour has fewer than two points".into()));
        }
        let mesh = self.ctx.mesh;
        let mean_area = (0..mesh.n_elements()).map(|e| mesh.signed_area(e)).sum::<f64>()
            / mesh.n_elements().max(1) as f64;
        let h = mean_area.sqrt().max(f64::MIN_POSITIVE);
        let unit = self.ctx.unit;

        let mut out = Vec::new();
        for w in contour.points().windows(2) {
            let d = w[1] - w[0];
            let len = d.norm();
            if len == 0.0 {
                continue;
            }
            let pieces = ((4.0 * len / h).ceil() as usize).clamp(1, 2000);
            let tangent = d / len;
            let normal = Point2::new(tangent.y, -tangent.x);
            for i in 0..pieces {
                let point = w[0] + d * ((i as f64 + 0.5) / pieces as f64);
                out.push(Sample {
                    point,
                    element: self.locate(point),
                    tangent,
                    normal,
                    length: len / pieces as f64 * unit,
                    weight: self.ctx.weighting.at(point.x * unit).source,
                });
            }
        }
        Ok(out)
    }

    /// Length (m) and surface (m²) swept by a contour.
    pub fn contour_extent(&self, samples: &[Sample]) -> [Complex; 2] {
        let length: f64 = samples.iter().map(|s| s.length).sum();
        let surface: f64 = samples.iter().map(Sample::surface).sum();
        [Complex::new(length, 0.0), Complex::new(surface, 0.0)]
    }
}

fn corner_angle(mesh: &Mesh, element: usize, node: usize) -> f64 {
    let nodes = mesh.elements()[element].nodes;
    let Some(k) = nodes.iter().position(|&n| n == node) else {
        return 0.0;
    };
    let c = mesh.corners(element);
    let a = c[(k + 1) % 3] - c[k];
    let b = c[(k + 2) % 3] - c[k];
    (a.x * b.y - a.y * b.x).atan2(a.dot(&b)).abs()
}

/// Symmetric 2×2 stress tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stress {
    pub xx: Complex,
    pub xy: Complex,
    pub yy: Complex,
}

impl Stress {
    /// Traction T·n.
    pub fn traction(&self, n: Point2) -> FieldVector<Complex> {
        FieldVector::new(
            self.xx * n.x + self.xy * n.y,
            self.xy * n.x + self.yy * n.y,
        )
    }
}

/// Maxwell stress c·(F⊗F − ½|F|²I) of field F with constant c (1/μ0 or ε0).
///
/// Returns the steady part and the double-frequency part. For phasor fields
/// the steady part is the time average ½Re(F⊗F*) and the double-frequency
/// part is ½F⊗F; static fields have no double-frequency part.
pub fn maxwell_stress(f: FieldVector<Complex>, c: f64, harmonic: bool) -> (Stress, Stress) {
    let tensor = |xx: Complex, xy: Complex, yy: Complex| Stress {
        xx: (xx - yy) * (0.5 * c),
        xy: xy * c,
        yy: (yy - xx) * (0.5 * c),
    };
    if harmonic {
        let avg = |a: Complex, b: Complex| Complex::new(0.5 * (a * b.conj()).re, 0.0);
        let steady = tensor(avg(f.x, f.x), avg(f.x, f.y), avg(f.y, f.y));
        let double = tensor(f.x * f.x * 0.5, f.x * f.y * 0.5, f.y * f.y * 0.5);
        (steady, double)
    } else {
        let (x, y) = (f.x.re, f.y.re);
        let steady = tensor(
            Complex::new(x * x, 0.0),
            Complex::new(x * y, 0.0),
            Complex::new(y * y, 0.0),
        );
        let zero = Complex::new(0.0, 0.0);
        (steady, Stress { xx: zero, xy: zero, yy: zero })
    }
}

/// Sum `f` over selected elements in element order.
pub fn sum_over<F>(selection: &Selection, f: F) -> Complex
where
    F: Fn(usize) -> Complex,
{
    selection.iter().map(f).sum()
}

/// Force and torque about the origin from a weighted stress tensor:
/// F = −∫ T·∇m dV, τ = ∫ (x·f_y − y·f_x) dV.
///
/// `stress` gives the stress of an element. The mask gradient vanishes
/// inside the selection, so only the surrounding elements contribute.
/// Axisymmetric problems keep only the axial force and no torque.
pub fn weighted_stress<F>(field: &FieldMesh<'_>, mask: &Mask, stress: F) -> [Complex; 3]
where
    F: Fn(usize) -> Stress,
{
    let mesh = field.mesh();
    let axisymmetric = field.ctx.weighting.is_axisymmetric();
    let mut fx = Complex::new(0.0, 0.0);
    let mut fy = Complex::new(0.0, 0.0);
    let mut torque = Complex::new(0.0, 0.0);
    for e in 0..mesh.n_elements() {
        let g = &field.ctx.geometry[e];
        let grad = g.gradient(&mask.corners(mesh, e));
        if grad.x == 0.0 && grad.y == 0.0 {
            continue;
        }
        let t = stress(e);
        let v = field.volume(e);
        let f = t.traction(Point2::new(grad.x, grad.y));
        let (ex, ey) = (-f.x * v, -f.y * v);
        fy += ey;
        if !axisymmetric {
            fx += ex;
            torque += ey * g.centroid.x - ex * g.centroid.y;
        }
    }
    [fx, fy, torque]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::testing::rectangle;
    use crate::problem::Domain;
    use crate::types::LengthUnit;
    use approx::assert_relative_eq;

    #[test]
    fn test_smoothing_linear_field_is_exact_inside() {
        let mesh = rectangle(0.0, 2.0, 0.0, 2.0, 4, 4, None);
        let mut p = Problem::new(Domain::Heat);
        p.header.length_units = LengthUnit::Meters;
        let field = FieldMesh::new(&mesh, &p).unwrap();
        let values: Vec<FieldVector<f64>> = (0..mesh.n_elements())
            .map(|_| FieldVector::new(1.0, -2.0))
            .collect();
        let corners = field.smooth(&values);
        for c in corners.iter().flatten() {
            assert_relative_eq!(c.x, 1.0, epsilon = 1e-12);
            assert_relative_eq!(c.y, -2.0, epsilon = 1e-12);
        }
        let e = field.locate(Point2::new(0.3, 0.7)).unwrap();
        let v = field.blend(e, Point2::new(0.3, 0.7), &corners[e]);
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interpolation_is_linear() {
        let mesh = rectangle(0.0, 1.0, 0.0, 1.0, 3, 3, None);
        let p = Problem::new(Domain::Electrostatic);
        let field = FieldMesh::new(&mesh, &p).unwrap();
        let nodal: Vec<f64> = mesh
            .nodes()
            .iter()
            .map(|n| 2.0 * n.position.x + n.position.y)
            .collect();
        let q = Point2::new(0.41, 0.77);
        let e = field.require(q).unwrap();
        assert_relative_eq!(field.interpolate(e, q, &nodal), 0.82 + 0.77, epsilon = 1e-12);
        assert!(field.require(Point2::new(2.0, 0.0)).is_err());
    }

    #[test]
    fn test_samples_cover_contour() {
        let mesh = rectangle(0.0, 1.0, 0.0, 1.0, 4, 4, None);
        let mut p = Problem::new(Domain::Heat);
        p.header.length_units = LengthUnit::Millimeters;
        let field = FieldMesh::new(&mesh, &p).unwrap();
        let mut c = Contour::new();
        assert!(field.samples(&c).is_err());
        c.add_point(Point2::new(0.1, 0.1));
        c.add_point(Point2::new(0.9, 0.1));
        c.add_point(Point2::new(0.9, 0.5));
        let s = field.samples(&c).unwrap();
        let [length, _] = field.contour_extent(&s);
        assert_relative_eq!(length.re, 1.2e-3, max_relative = 1e-12);
        assert!(s.iter().all(|x| x.element.is_some()));
        // first leg runs along +x: normal points to −y
        assert_relative_eq!(s[0].normal.y, -1.0);
    }

    #[test]
    fn test_maxwell_stress_of_normal_field() {
        // field along x: tension c·B²/2 on a surface with normal x
        let (steady, double) = maxwell_stress(
            FieldVector::new(Complex::new(2.0, 0.0), Complex::new(0.0, 0.0)),
            3.0,
            false,
        );
        let t = steady.traction(Point2::new(1.0, 0.0));
        assert_relative_eq!(t.x.re, 6.0);
        assert_relative_eq!(t.y.re, 0.0);
        assert_eq!(double.xx, Complex::new(0.0, 0.0));
        // phasor of the same peak: half the average, double-frequency part equal in size
        let (steady, double) = maxwell_stress(
            FieldVector::new(Complex::new(0.0, 2.0), Complex::new(0.0, 0.0)),
            3.0,
            true,
        );
        assert_relative_eq!(steady.xx.re, 3.0);
        assert_relative_eq!(double.xx.re, -3.0);
    }
}
