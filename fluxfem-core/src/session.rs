//! One problem, its current mesh and its latest solution.
//!
//! A [`Session`] owns the problem model. Re-meshing replaces the mesh and
//! drops the solution, and every post-processor borrows from the session,
//! so nothing computed on an old mesh can outlive the re-mesh. Selections
//! and masks built earlier are rejected through the mesh generation.

use crate::assembly::magnetic::CircuitLayout;
use crate::assembly::{
    ConductorResult, CurrentAssembler, ElectrostaticAssembler, HeatAssembler, MagneticAssembler,
    UnknownMap,
};
use crate::error::{Error, Result};
use crate::io::read_problem;
use crate::mesh::{Mesh, MeshAdapter, MeshOptions, Triangulator};
use crate::nonlinear::{self, NonlinearOptions, NonlinearSolution};
use crate::post::{
    CurrentField, ElectrostaticField, HeatField, MagneticField, Mask, Selection, Solution,
};
use crate::problem::{Domain, Problem};
use crate::solver::{SolverConfig, SolverSelect};
use crate::types::{Complex, FieldScalar};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything a session needs besides the problem.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub solver: SolverConfig,
    pub nonlinear: NonlinearOptions,
    pub mesh: MeshOptions,
    /// Default smoothing of post-processors.
    pub smoothing: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            nonlinear: NonlinearOptions::default(),
            mesh: MeshOptions::default(),
            smoothing: true,
        }
    }
}

impl SessionOptions {
    /// Defaults with precision and minimum angle taken from the problem header.
    pub fn for_problem(problem: &Problem) -> Self {
        let mut options = Self::default();
        if problem.header.precision > 0.0 {
            options.solver.precision = problem.header.precision;
        }
        if problem.header.min_angle > 0.0 {
            options.mesh.min_angle = problem.header.min_angle;
        }
        options
    }
}

/// Solution of one solve, by domain.
#[derive(Debug, Clone)]
pub enum Analysis {
    /// A (planar) or ψ = 2πr·A (axisymmetric); complex for static problems too.
    Magnetic {
        solution: Solution<Complex>,
        layout: CircuitLayout,
    },
    Electrostatic {
        solution: Solution<f64>,
        conductors: Vec<ConductorResult<f64>>,
    },
    Heat {
        solution: Solution<f64>,
        conductors: Vec<ConductorResult<f64>>,
    },
    Current {
        solution: Solution<Complex>,
        conductors: Vec<ConductorResult<Complex>>,
    },
}

impl Analysis {
    pub fn domain(&self) -> Domain {
        match self {
            Analysis::Magnetic { .. } => Domain::Magnetic,
            Analysis::Electrostatic { .. } => Domain::Electrostatic,
            Analysis::Heat { .. } => Domain::Heat,
            Analysis::Current { .. } => Domain::Current,
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            Analysis::Magnetic { solution, .. } | Analysis::Current { solution, .. } => {
                solution.iterations
            }
            Analysis::Electrostatic { solution, .. } | Analysis::Heat { solution, .. } => {
                solution.iterations
            }
        }
    }
}

/// Problem, mesh and solution of one analysis run.
pub struct Session {
    problem: Problem,
    pub options: SessionOptions,
    mesh: Option<Mesh>,
    analysis: Option<Analysis>,
    /// Nodal temperatures a transient heat step starts from.
    previous_step: Option<Vec<f64>>,
    cancel: AtomicBool,
}

impl Session {
    pub fn new(problem: Problem, options: SessionOptions) -> Self {
        Self {
            problem,
            options,
            mesh: None,
            analysis: None,
            previous_step: None,
            cancel: AtomicBool::new(false),
        }
    }

    /// Load a problem file, taking the domain from its extension.
    pub fn open(path: &Path) -> Result<Self> {
        let problem = read_problem(path)?;
        let options = SessionOptions::for_problem(&problem);
        Ok(Self::new(problem, options))
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Mutable problem. The solution is dropped; geometry edits also need
    /// [`Session::remesh`] before the next solve.
    pub fn problem_mut(&mut self) -> &mut Problem {
        self.analysis = None;
        &mut self.problem
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    /// Triangulate the problem, replacing the mesh and dropping the solution.
    pub fn remesh(&mut self, triangulator: &dyn Triangulator) -> Result<&Mesh> {
        let adapter = MeshAdapter::new(self.options.mesh.clone());
        let mesh = adapter.triangulate(&self.problem, triangulator)?;
        log::info!(
            "meshed with {}: {} nodes, {} elements",
            triangulator.name(),
            mesh.n_nodes(),
            mesh.n_elements()
        );
        Ok(self.set_mesh(mesh))
    }

    /// Use a mesh built elsewhere.
    pub fn set_mesh(&mut self, mesh: Mesh) -> &Mesh {
        self.analysis = None;
        self.previous_step = None;
        self.mesh.insert(mesh)
    }

    /// Request cancellation of a running nonlinear solve.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Start the next heat solve as a time step from these temperatures.
    pub fn set_previous_step(&mut self, temperatures: Vec<f64>) {
        self.previous_step = Some(temperatures);
    }

    /// Start the next heat solve as a time step from the current solution.
    pub fn advance_step(&mut self) -> Result<()> {
        match &self.analysis {
            Some(Analysis::Heat { solution, .. }) => {
                self.previous_step = Some(solution.nodal.clone());
                Ok(())
            }
            _ => Err(Error::StaleState("no heat flow solution to step from".into())),
        }
    }

    /// Solve the problem on the current mesh. On failure the previous
    /// solution stays in place.
    pub fn solve(&mut self) -> Result<&Analysis> {
        let mesh = self
            .mesh
            .as_ref()
            .ok_or_else(|| Error::StaleState("problem has not been meshed".into()))?;
        self.cancel.store(false, Ordering::Relaxed);
        let problem = &self.problem;
        let run = Run {
            options: &self.options,
            cancel: &self.cancel,
            mesh,
        };

        let analysis = match problem.domain() {
            Domain::Magnetic if problem.header.frequency > 0.0 => {
                run.magnetic(&MagneticAssembler::<Complex>::new(mesh, problem)?)?
            }
            Domain::Magnetic => run.magnetic(&MagneticAssembler::<f64>::new(mesh, problem)?)?,
            Domain::Electrostatic => {
                let a = ElectrostaticAssembler::new(mesh, problem)?;
                let result = run.solve(&a)?;
                Analysis::Electrostatic {
                    conductors: a.conductor_results(&result.system, &result.unknowns),
                    solution: run.solution(a.unknown_map(), result),
                }
            }
            Domain::Heat => {
                let mut a = HeatAssembler::new(mesh, problem)?;
                if let Some(prev) = &self.previous_step {
                    a = a.with_previous_step(prev)?;
                }
                let result = run.solve(&a)?;
                Analysis::Heat {
                    conductors: a.conductor_results(&result.system, &result.unknowns),
                    solution: run.solution(a.unknown_map(), result),
                }
            }
            Domain::Current => {
                let a = CurrentAssembler::new(mesh, problem)?;
                let result = run.solve(&a)?;
                Analysis::Current {
                    conductors: a.conductor_results(&result.system, &result.unknowns),
                    solution: run.solution(a.unknown_map(), result),
                }
            }
        };
        log::info!(
            "{:?} solve finished in {} iterations",
            analysis.domain(),
            analysis.iterations()
        );
        Ok(self.analysis.insert(analysis))
    }

    fn solved(&self) -> Result<(&Mesh, &Analysis)> {
        match (&self.mesh, &self.analysis) {
            (Some(mesh), Some(analysis)) => Ok((mesh, analysis)),
            _ => Err(Error::StaleState("problem has not been solved".into())),
        }
    }

    fn wrong_domain(&self, wanted: Domain) -> Error {
        Error::InvalidQuery(format!(
            "{:?} post-processing requested on a {:?} problem",
            wanted,
            self.problem.domain()
        ))
    }

    pub fn magnetic_field(&self) -> Result<MagneticField<'_>> {
        match self.solved()? {
            (mesh, Analysis::Magnetic { solution, layout }) => {
                MagneticField::new(mesh, &self.problem, solution, layout, self.options.smoothing)
            }
            _ => Err(self.wrong_domain(Domain::Magnetic)),
        }
    }

    pub fn electrostatic_field(&self) -> Result<ElectrostaticField<'_>> {
        match self.solved()? {
            (mesh, Analysis::Electrostatic { solution, .. }) => {
                ElectrostaticField::new(mesh, &self.problem, solution, self.options.smoothing)
            }
            _ => Err(self.wrong_domain(Domain::Electrostatic)),
        }
    }

    pub fn heat_field(&self) -> Result<HeatField<'_>> {
        match self.solved()? {
            (mesh, Analysis::Heat { solution, .. }) => {
                HeatField::new(mesh, &self.problem, solution, self.options.smoothing)
            }
            _ => Err(self.wrong_domain(Domain::Heat)),
        }
    }

    pub fn current_field(&self) -> Result<CurrentField<'_>> {
        match self.solved()? {
            (mesh, Analysis::Current { solution, .. }) => {
                CurrentField::new(mesh, &self.problem, solution, self.options.smoothing)
            }
            _ => Err(self.wrong_domain(Domain::Current)),
        }
    }

    /// Elements of the block labels selected in the problem geometry.
    pub fn selection(&self) -> Result<Selection> {
        let mesh = self
            .mesh
            .as_ref()
            .ok_or_else(|| Error::StaleState("problem has not been meshed".into()))?;
        let selection = Selection::from_labels(mesh, &self.problem);
        selection.check(mesh)?;
        Ok(selection)
    }

    /// Stress tensor mask of a selection on the current mesh.
    pub fn mask(&self, selection: &Selection) -> Result<Mask> {
        let mesh = self
            .mesh
            .as_ref()
            .ok_or_else(|| Error::StaleState("problem has not been meshed".into()))?;
        Mask::build(mesh, selection)
    }
}

/// Shared parameters of one solve.
struct Run<'a> {
    options: &'a SessionOptions,
    cancel: &'a AtomicBool,
    mesh: &'a Mesh,
}

impl Run<'_> {
    fn solve<A>(&self, assembler: &A) -> Result<NonlinearSolution<A::Scalar>>
    where
        A: crate::assembly::PhysicsAssembler,
        A::Scalar: SolverSelect,
    {
        nonlinear::solve(
            assembler,
            &self.options.solver,
            &self.options.nonlinear,
            None,
            Some(self.cancel),
        )
    }

    fn solution<T: FieldScalar>(&self, map: &UnknownMap, result: NonlinearSolution<T>) -> Solution<T> {
        Solution {
            nodal: map.node_values(&result.unknowns),
            unknowns: result.unknowns,
            iterations: result.iterations,
            mesh_generation: self.mesh.generation(),
        }
    }

    fn magnetic<T: SolverSelect>(&self, assembler: &MagneticAssembler<'_, T>) -> Result<Analysis> {
        let result = self.solve(assembler)?;
        let unknowns: Vec<Complex> = result.unknowns.iter().map(|v| v.to_complex()).collect();
        Ok(Analysis::Magnetic {
            solution: Solution {
                nodal: assembler.unknown_map().node_values(&unknowns),
                unknowns,
                iterations: result.iterations,
                mesh_generation: self.mesh.generation(),
            },
            layout: assembler.layout().clone(),
        })
    }
}
