//! Current flow: ∇·(κ∇V) = 0 with complex conductivity κ = σ + jωε.

use super::{
    apply_conductors, apply_periodic, assemble_elements, conductor_results, flux_edge,
    mixed_edge, total_driven, ConductorResult, ElementBlock, MeshContext, PhysicsAssembler,
    UnknownMap,
};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::current::CurrentBoundaryKind;
use crate::problem::{CurrentProperties, PointSource, Problem, Properties};
use crate::sparse::SparseSystem;
use crate::types::{Complex, FieldScalar};
use std::f64::consts::PI;

/// Assembles the current flow system for one mesh.
pub struct CurrentAssembler<'a> {
    ctx: MeshContext<'a>,
    tables: &'a CurrentProperties,
    map: UnknownMap,
    omega: f64,
}

impl<'a> CurrentAssembler<'a> {
    pub fn new(mesh: &'a Mesh, problem: &'a Problem) -> Result<Self> {
        let Properties::Current(tables) = &problem.properties else {
            return Err(Error::Assembly("not a current flow problem".into()));
        };
        let map = UnknownMap::with_conductors(mesh, &total_driven(&tables.circuits));
        Ok(Self {
            ctx: MeshContext::new(mesh, problem, false)?,
            tables,
            map,
            omega: 2.0 * PI * problem.header.frequency,
        })
    }

    pub fn unknown_map(&self) -> &UnknownMap {
        &self.map
    }

    /// Conductor voltages and currents.
    pub fn conductor_results(
        &self,
        system: &SparseSystem<Complex>,
        unknowns: &[Complex],
    ) -> Vec<ConductorResult<Complex>> {
        conductor_results(&self.tables.circuits, &self.map, system, unknowns)
    }

    fn element(&self, e: usize) -> Result<ElementBlock<Complex>> {
        let g = &self.ctx.geometry[e];
        let m = self.ctx.material(e)?;
        let material = self.tables.materials.get(m).ok_or_else(|| {
            Error::Assembly(format!("element {} references missing material {}", e, m))
        })?;
        let (kx, ky) = material.admittivity(self.omega);
        let s = self.ctx.weights(e).stiffness * self.ctx.exterior_factor(e);

        let mut block = ElementBlock::new(self.map.dofs(&self.ctx.mesh.elements()[e].nodes));
        block.k = g.laplacian(kx * s, ky * s);
        Ok(block)
    }
}

impl PhysicsAssembler for CurrentAssembler<'_> {
    type Scalar = Complex;

    fn n_unknowns(&self) -> usize {
        self.map.n_unknowns()
    }

    fn assemble(&self, _previous: Option<&[Complex]>) -> Result<SparseSystem<Complex>> {
        let mut system = SparseSystem::new(self.n_unknowns());
        assemble_elements(&mut system, self.ctx.mesh.n_elements(), |e| self.element(e))?;

        let zero = [[Complex::from_real(0.0); 2]; 2];
        let mut fixed = Vec::new();
        for edge in self.ctx.boundary_edges() {
            let Some(boundary) = self.tables.boundaries.get(edge.boundary) else {
                continue;
            };
            let dofs = edge.nodes.map(|n| self.map.dof[n]);
            match boundary.kind {
                CurrentBoundaryKind::Fixed(v) => fixed.push((dofs, v)),
                CurrentBoundaryKind::SurfaceCurrent(js) => {
                    system.add_block(&dofs, &zero, &flux_edge(&edge, js));
                }
                CurrentBoundaryKind::Mixed { c0, c1 } => {
                    let (k, f) = mixed_edge(&edge, c0, c1);
                    system.add_block(&dofs, &k, &f);
                }
                CurrentBoundaryKind::Periodic | CurrentBoundaryKind::Antiperiodic => {}
            }
        }
        for (dofs, v) in fixed {
            for d in dofs {
                system.set_value(d, v);
            }
        }

        for (i, node) in self.ctx.mesh.nodes().iter().enumerate() {
            let Some(point) = node.point_property.and_then(|p| self.tables.points.get(p)) else {
                continue;
            };
            let d = self.map.dof[i];
            match point.value {
                PointSource::Fixed(v) => system.set_value(d, v),
                PointSource::Source(current) => {
                    let w = self.ctx.weighting.at(node.position.x * self.ctx.unit);
                    system.add_rhs(d, current * w.source);
                }
            }
        }

        apply_conductors(&mut system, &self.tables.circuits, &self.map);
        apply_periodic(&mut system, self.ctx.mesh, &self.map);
        Ok(system)
    }

    fn is_nonlinear(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::testing::solve;
    use crate::mesh::testing::{mark_edges, rectangle};
    use crate::problem::current::{CurrentBoundary, CurrentMaterial};
    use crate::problem::{BlockLabel, Conductor, ConductorDrive, Domain, Region};
    use crate::types::{LengthUnit, EPSILON_0};
    use approx::assert_relative_eq;

    fn resistor(material: CurrentMaterial, frequency: f64, left: ConductorDrive<Complex>) -> (Problem, Mesh) {
        let mut p = Problem::new(Domain::Current);
        p.header.length_units = LengthUnit::Meters;
        p.header.frequency = frequency;
        p.geometry.add_label(BlockLabel::new(0.5, 0.5, Region::Material(0)));
        if let Properties::Current(t) = &mut p.properties {
            t.materials.push(material);
            t.boundaries.push(CurrentBoundary {
                name: "ground".into(),
                kind: CurrentBoundaryKind::Fixed(Complex::new(0.0, 0.0)),
            });
            t.circuits.push(Conductor {
                name: "terminal".into(),
                drive: left,
            });
        }
        let mesh = mark_edges(&rectangle(0.0, 2.0, 0.0, 1.0, 6, 3, None), |p0, p1| {
            (p0.x == 2.0 && p1.x == 2.0).then_some(0)
        });
        let mut nodes = mesh.nodes().to_vec();
        for n in nodes.iter_mut().filter(|n| n.position.x == 0.0) {
            n.conductor = Some(0);
        }
        let mesh = Mesh::new(nodes, mesh.elements().to_vec(), vec![]).unwrap();
        (p, mesh)
    }

    #[test]
    fn test_dc_resistance() {
        let (p, mesh) = resistor(
            CurrentMaterial::conductor("carbon", 5.0),
            0.0,
            ConductorDrive::Potential(Complex::new(4.0, 0.0)),
        );
        let a = CurrentAssembler::new(&mesh, &p).unwrap();
        let system = a.assemble(None).unwrap();
        let v = solve(&system);
        let r = a.conductor_results(&system, &v);
        // I = σ·V·(height·depth)/length
        assert_relative_eq!(r[0].total.re, 5.0 * 4.0 * 1.0 / 2.0, max_relative = 1e-8);
        assert_relative_eq!(r[0].total.im, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_capacitive_current_leads_voltage() {
        let material = CurrentMaterial {
            ex: 3.0,
            ey: 3.0,
            ..CurrentMaterial::conductor("dielectric", 0.0)
        };
        let f = 1.0e6;
        let (p, mesh) = resistor(material, f, ConductorDrive::Total(Complex::new(0.0, 1.0)));
        let a = CurrentAssembler::new(&mesh, &p).unwrap();
        let system = a.assemble(None).unwrap();
        let v = solve(&system);
        let r = a.conductor_results(&system, &v);
        // V = I / (jωC), C = ε·height·depth/length
        let c = EPSILON_0 * 3.0 * 0.5;
        let omega = 2.0 * PI * f;
        assert_relative_eq!(r[0].potential.re, 1.0 / (omega * c), max_relative = 1e-6);
        assert_relative_eq!(r[0].potential.im, 0.0, epsilon = 1e-6 / (omega * c));
    }
}
