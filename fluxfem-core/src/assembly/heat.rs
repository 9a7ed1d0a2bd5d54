//! Steady and single-step transient heat conduction: ∇·(k∇T) + qv = ρc ∂T/∂t.

use super::{
    apply_conductors, apply_periodic, assemble_elements, conductor_results, flux_edge,
    mixed_edge, total_driven, BoundaryEdge, ConductorResult, ElementBlock, MeshContext,
    PhysicsAssembler, UnknownMap,
};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::heat::HeatBoundaryKind;
use crate::problem::{HeatProperties, PointSource, Problem, Properties};
use crate::sparse::SparseSystem;
use crate::types::STEFAN_BOLTZMANN;

/// Assembles the heat flow system for one mesh.
pub struct HeatAssembler<'a> {
    ctx: MeshContext<'a>,
    tables: &'a HeatProperties,
    map: UnknownMap,
    /// Nodal temperatures of the previous time step.
    previous_step: Option<&'a [f64]>,
    nonlinear: bool,
}

impl<'a> HeatAssembler<'a> {
    pub fn new(mesh: &'a Mesh, problem: &'a Problem) -> Result<Self> {
        let Properties::Heat(tables) = &problem.properties else {
            return Err(Error::Assembly("not a heat flow problem".into()));
        };
        let map = UnknownMap::with_conductors(mesh, &total_driven(&tables.circuits));
        Ok(Self {
            ctx: MeshContext::new(mesh, problem, false)?,
            tables,
            map,
            previous_step: None,
            nonlinear: problem.is_nonlinear(),
        })
    }

    /// Take one time step of `[dt]` from these nodal temperatures.
    pub fn with_previous_step(mut self, temperatures: &'a [f64]) -> Result<Self> {
        if temperatures.len() != self.ctx.mesh.n_nodes() {
            return Err(Error::Assembly(format!(
                "previous temperature field has {} values for {} nodes",
                temperatures.len(),
                self.ctx.mesh.n_nodes()
            )));
        }
        self.previous_step = Some(temperatures);
        Ok(self)
    }

    /// Time step in effect, if the solve is transient.
    fn time_step(&self) -> Option<(f64, &'a [f64])> {
        let dt = self.ctx.problem.header.dt;
        match self.previous_step {
            Some(prev) if dt > 0.0 => Some((dt, prev)),
            _ => None,
        }
    }

    pub fn unknown_map(&self) -> &UnknownMap {
        &self.map
    }

    /// Conductor temperatures and heat flows.
    pub fn conductor_results(
        &self,
        system: &SparseSystem<f64>,
        unknowns: &[f64],
    ) -> Vec<ConductorResult<f64>> {
        conductor_results(&self.tables.circuits, &self.map, system, unknowns)
    }

    fn element(&self, e: usize, previous: Option<&[f64]>) -> Result<ElementBlock<f64>> {
        let g = &self.ctx.geometry[e];
        let m = self.ctx.material(e)?;
        let material = self.tables.materials.get(m).ok_or_else(|| {
            Error::Assembly(format!("element {} references missing material {}", e, m))
        })?;
        let nodes = self.ctx.mesh.elements()[e].nodes;
        let dofs = self.map.dofs(&nodes);
        let t_avg = previous
            .map(|x| dofs.iter().map(|&d| x[d]).sum::<f64>() / 3.0)
            .unwrap_or(0.0);
        let (kx, ky) = material.conductivity(t_avg);
        let w = self.ctx.weights(e);
        let s = w.stiffness * self.ctx.exterior_factor(e);

        let mut block = ElementBlock::new(dofs);
        block.k = g.laplacian(kx * s, ky * s);
        block.f = [material.qv * g.area / 3.0 * w.source; 3];

        if let Some((dt, prev)) = self.time_step() {
            let c = material.kt * g.area / 3.0 * w.stiffness / dt;
            for i in 0..3 {
                block.k[i][i] += c;
                block.f[i] += c * prev[nodes[i]];
            }
        }
        Ok(block)
    }

    fn radiation(&self, edge: &BoundaryEdge, beta: f64, t_inf: f64, previous: Option<&[f64]>) -> (f64, f64) {
        let t0 = previous
            .map(|x| 0.5 * (x[self.map.dof[edge.nodes[0]]] + x[self.map.dof[edge.nodes[1]]]))
            .unwrap_or(t_inf);
        let c0 = 4.0 * beta * STEFAN_BOLTZMANN * t0.powi(3);
        let c1 = -beta * STEFAN_BOLTZMANN * (t_inf.powi(4) + 3.0 * t0.powi(4));
        (c0, c1)
    }
}

impl PhysicsAssembler for HeatAssembler<'_> {
    type Scalar = f64;

    fn n_unknowns(&self) -> usize {
        self.map.n_unknowns()
    }

    fn assemble(&self, previous: Option<&[f64]>) -> Result<SparseSystem<f64>> {
        if self.ctx.problem.header.dt > 0.0 && self.previous_step.is_none() {
            log::warn!("time step given without a previous temperature field, solving steady state");
        }
        let mut system = SparseSystem::new(self.n_unknowns());
        assemble_elements(&mut system, self.ctx.mesh.n_elements(), |e| self.element(e, previous))?;

        let mut fixed = Vec::new();
        for edge in self.ctx.boundary_edges() {
            let Some(boundary) = self.tables.boundaries.get(edge.boundary) else {
                continue;
            };
            let dofs = edge.nodes.map(|n| self.map.dof[n]);
            match boundary.kind {
                HeatBoundaryKind::FixedTemperature(t) => fixed.push((dofs, t)),
                HeatBoundaryKind::HeatFlux(qs) => {
                    system.add_block(&dofs, &[[0.0; 2]; 2], &flux_edge(&edge, qs));
                }
                HeatBoundaryKind::Convection { h, t_inf } => {
                    let (k, f) = mixed_edge(&edge, h, -h * t_inf);
                    system.add_block(&dofs, &k, &f);
                }
                HeatBoundaryKind::Radiation { beta, t_inf } => {
                    let (c0, c1) = self.radiation(&edge, beta, t_inf, previous);
                    let (k, f) = mixed_edge(&edge, c0, c1);
                    system.add_block(&dofs, &k, &f);
                }
                HeatBoundaryKind::Periodic | HeatBoundaryKind::Antiperiodic => {}
            }
        }
        for (dofs, t) in fixed {
            for d in dofs {
                system.set_value(d, t);
            }
        }

        for (i, node) in self.ctx.mesh.nodes().iter().enumerate() {
            let Some(point) = node.point_property.and_then(|p| self.tables.points.get(p)) else {
                continue;
            };
            let d = self.map.dof[i];
            match point.value {
                PointSource::Fixed(t) => system.set_value(d, t),
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
        self.nonlinear
    }
}
