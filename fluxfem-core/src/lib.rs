//! fluxfem core: 2-D finite element analysis of magnetics, electrostatics,
//! heat flow and current flow.
//!
//! - Problem model with per-domain property tables and a problem file reader
//! - Mesh adapter driving an external Delaunay triangulator
//! - Parallel element assembly into sparse systems (planar and axisymmetric)
//! - Picard iteration for field-dependent materials and boundaries
//! - Sparse direct and preconditioned conjugate gradient solvers
//! - Post-processing: point values, block and line integrals, forces
//!
//! # Architecture
//!
//! - [`Problem`]: geometry, properties and header of one analysis
//! - [`Mesh`]: triangles with resolved labels and boundary markers
//! - [`assembly::PhysicsAssembler`]: per-domain system assembly
//! - [`Solver`] trait: linear system solution strategies
//! - [`Session`]: problem, mesh and solution, with post-processor access

pub mod assembly;
pub mod error;
pub mod io;
pub mod mesh;
pub mod nonlinear;
pub mod post;
pub mod problem;
pub mod session;
pub mod solver;
pub mod sparse;
pub mod types;

pub use error::{Error, Result};
pub use mesh::{Mesh, MeshOptions, Triangulator};
pub use nonlinear::NonlinearOptions;
pub use post::{Contour, Mask, Selection};
pub use problem::{Domain, Problem};
pub use session::{Analysis, Session, SessionOptions};
pub use solver::{Solver, SolverConfig, SolverType};
pub use sparse::SparseSystem;
pub use types::{Complex, LengthUnit, Point2, ProblemType};
