//! Electrostatics: ∇·(ε∇V) = −ρ.

use super::{
    apply_conductors, apply_periodic, assemble_elements, conductor_results, flux_edge,
    mixed_edge, total_driven, ConductorResult, ElementBlock, MeshContext, PhysicsAssembler,
    UnknownMap,
};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::electrostatic::ElectrostaticBoundaryKind;
use crate::problem::{ElectrostaticProperties, PointSource, Problem, Properties};
use crate::sparse::SparseSystem;
use crate::types::EPSILON_0;

/// Assembles the electrostatic system for one mesh.
pub struct ElectrostaticAssembler<'a> {
    ctx: MeshContext<'a>,
    tables: &'a ElectrostaticProperties,
    map: UnknownMap,
}

impl<'a> ElectrostaticAssembler<'a> {
    pub fn new(mesh: &'a Mesh, problem: &'a Problem) -> Result<Self> {
        let Properties::Electrostatic(tables) = &problem.properties else {
            return Err(Error::Assembly("not an electrostatics problem".into()));
        };
        let map = UnknownMap::with_conductors(mesh, &total_driven(&tables.circuits));
        Ok(Self {
            ctx: MeshContext::new(mesh, problem, false)?,
            tables,
            map,
        })
    }

    pub fn unknown_map(&self) -> &UnknownMap {
        &self.map
    }

    /// Conductor voltages and charges.
    pub fn conductor_results(
        &self,
        system: &SparseSystem<f64>,
        unknowns: &[f64],
    ) -> Vec<ConductorResult<f64>> {
        conductor_results(&self.tables.circuits, &self.map, system, unknowns)
    }

    fn element(&self, e: usize) -> Result<ElementBlock<f64>> {
        let g = &self.ctx.geometry[e];
        let m = self.ctx.material(e)?;
        let material = self.tables.materials.get(m).ok_or_else(|| {
            Error::Assembly(format!("element {} references missing material {}", e, m))
        })?;
        let w = self.ctx.weights(e);
        let s = w.stiffness * self.ctx.exterior_factor(e);

        let mut block = ElementBlock::new(self.map.dofs(&self.ctx.mesh.elements()[e].nodes));
        block.k = g.laplacian(EPSILON_0 * material.ex * s, EPSILON_0 * material.ey * s);
        block.f = [material.qv * g.area / 3.0 * w.source; 3];
        Ok(block)
    }
}

impl PhysicsAssembler for ElectrostaticAssembler<'_> {
    type Scalar = f64;

    fn n_unknowns(&self) -> usize {
        self.map.n_unknowns()
    }

    fn assemble(&self, _previous: Option<&[f64]>) -> Result<SparseSystem<f64>> {
        let mut system = SparseSystem::new(self.n_unknowns());
        assemble_elements(&mut system, self.ctx.mesh.n_elements(), |e| self.element(e))?;

        let mut fixed = Vec::new();
        for edge in self.ctx.boundary_edges() {
            let Some(boundary) = self.tables.boundaries.get(edge.boundary) else {
                continue;
            };
            let dofs = edge.nodes.map(|n| self.map.dof[n]);
            match boundary.kind {
                ElectrostaticBoundaryKind::Fixed(v) => fixed.push((dofs, v)),
                ElectrostaticBoundaryKind::SurfaceCharge(qs) => {
                    system.add_block(&dofs, &[[0.0; 2]; 2], &flux_edge(&edge, qs));
                }
                ElectrostaticBoundaryKind::Mixed { c0, c1 } => {
                    let (k, f) = mixed_edge(&edge, c0, c1);
                    system.add_block(&dofs, &k, &f);
                }
                ElectrostaticBoundaryKind::Periodic | ElectrostaticBoundaryKind::Antiperiodic => {}
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
                PointSource::Source(q) => {
                    let w = self.ctx.weighting.at(node.position.x * self.ctx.unit);
                    system.add_rhs(d, q * w.source);
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
    use crate::problem::electrostatic::{ElectrostaticBoundary, ElectrostaticMaterial};
    use crate::problem::{BlockLabel, ConductorDrive, Domain, Region};
    use crate::types::LengthUnit;
    use approx::assert_relative_eq;

    fn plates(bottom: f64, top: f64) -> Problem {
        let mut p = Problem::new(Domain::Electrostatic);
        p.header.length_units = LengthUnit::Meters;
        p.geometry.add_label(BlockLabel::new(0.5, 0.5, Region::Material(0)));
        if let Properties::Electrostatic(t) = &mut p.properties {
            t.materials.push(ElectrostaticMaterial::linear("dielectric", 4.0));
            for (name, v) in [("bottom", bottom), ("top", top)] {
                t.boundaries.push(ElectrostaticBoundary {
                    name: name.into(),
                    kind: ElectrostaticBoundaryKind::Fixed(v),
                });
            }
        }
        p
    }

    fn bottom_top(p0: crate::types::Point2, p1: crate::types::Point2) -> Option<usize> {
        if p0.y == 0.0 && p1.y == 0.0 {
            Some(0)
        } else if p0.y == 1.0 && p1.y == 1.0 {
            Some(1)
        } else {
            None
        }
    }

    #[test]
    fn test_constant_potential() {
        let problem = plates(7.5, 7.5);
        let mesh = mark_edges(&rectangle(0.0, 1.0, 0.0, 1.0, 4, 4, None), |_, _| Some(0));
        let a = ElectrostaticAssembler::new(&mesh, &problem).unwrap();
        let v = solve(&a.assemble(None).unwrap());
        for x in v {
            assert_relative_eq!(x, 7.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_parallel_plates_are_linear() {
        let problem = plates(0.0, 10.0);
        let mesh = mark_edges(&rectangle(0.0, 1.0, 0.0, 1.0, 5, 4, None), bottom_top);
        let a = ElectrostaticAssembler::new(&mesh, &problem).unwrap();
        let v = solve(&a.assemble(None).unwrap());
        for (node, x) in mesh.nodes().iter().zip(&v) {
            assert_relative_eq!(*x, 10.0 * node.position.y, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_conductor_charge() {
        let mut problem = plates(0.0, 0.0);
        if let Properties::Electrostatic(t) = &mut problem.properties {
            t.circuits.push(crate::problem::Conductor {
                name: "plate".into(),
                drive: ConductorDrive::Potential(10.0),
            });
        }
        let mesh = mark_edges(&rectangle(0.0, 1.0, 0.0, 1.0, 4, 4, None), |p0, p1| {
            (p0.y == 0.0 && p1.y == 0.0).then_some(0)
        });
        let mut nodes = mesh.nodes().to_vec();
        for n in nodes.iter_mut().filter(|n| n.position.y == 1.0) {
            n.conductor = Some(0);
        }
        let mesh = Mesh::new(nodes, mesh.elements().to_vec(), vec![]).unwrap();
        let a = ElectrostaticAssembler::new(&mesh, &problem).unwrap();
        let system = a.assemble(None).unwrap();
        let v = solve(&system);
        let results = a.conductor_results(&system, &v);
        // Q = ε·V·width/gap with unit depth
        assert_relative_eq!(results[0].total, EPSILON_0 * 4.0 * 10.0, max_relative = 1e-8);
        assert_relative_eq!(results[0].potential, 10.0);
    }

    #[test]
    fn test_total_charge_conductor() {
        let mut problem = plates(0.0, 0.0);
        let q = EPSILON_0 * 4.0 * 3.0;
        if let Properties::Electrostatic(t) = &mut problem.properties {
            t.circuits.push(crate::problem::Conductor {
                name: "plate".into(),
                drive: ConductorDrive::Total(q),
            });
        }
        let mesh = mark_edges(&rectangle(0.0, 1.0, 0.0, 1.0, 3, 3, None), |p0, p1| {
            (p0.y == 0.0 && p1.y == 0.0).then_some(0)
        });
        let mut nodes = mesh.nodes().to_vec();
        for n in nodes.iter_mut().filter(|n| n.position.y == 1.0) {
            n.conductor = Some(0);
        }
        let mesh = Mesh::new(nodes, mesh.elements().to_vec(), vec![]).unwrap();
        let a = ElectrostaticAssembler::new(&mesh, &problem).unwrap();
        assert_eq!(a.n_unknowns(), mesh.n_nodes() + 1);
        let system = a.assemble(None).unwrap();
        let v = solve(&system);
        let results = a.conductor_results(&system, &v);
        assert_relative_eq!(results[0].potential, 3.0, max_relative = 1e-8);
    }
}
