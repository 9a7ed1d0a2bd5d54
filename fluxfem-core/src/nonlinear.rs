//! Picard iteration for field-dependent materials and boundaries.
//!
//! Each iteration reassembles the system with responses evaluated at an
//! immutable snapshot of the previous solution and solves it with that
//! solution as the initial guess. Linear problems take a single solve.

use crate::assembly::PhysicsAssembler;
use crate::error::{Error, Result};
use crate::solver::{select_solver, SolverConfig, SolverSelect};
use crate::sparse::SparseSystem;
use crate::types::FieldScalar;
use num_traits::Zero;
use std::sync::atomic::{AtomicBool, Ordering};

/// Nonlinear iteration configuration.
#[derive(Debug, Clone)]
pub struct NonlinearOptions {
    /// Iteration cap; exceeding it is an error.
    pub max_iterations: usize,
    /// Under-relaxation factor in (0, 1].
    pub relaxation: f64,
}

impl Default for NonlinearOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            relaxation: 1.0,
        }
    }
}

/// Result of a (possibly nonlinear) solve.
#[derive(Debug, Clone)]
pub struct NonlinearSolution<T> {
    /// Value of every unknown, nodes first.
    pub unknowns: Vec<T>,
    pub iterations: usize,
    /// Relative change of the last iteration.
    pub change: f64,
    /// System assembled at the final iteration, before constraints.
    pub system: SparseSystem<T>,
}

fn norm<T: FieldScalar>(x: &[T]) -> f64 {
    x.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt()
}

fn relative_change<T: FieldScalar>(new: &[T], old: &[T]) -> f64 {
    let diff = new
        .iter()
        .zip(old)
        .map(|(&a, &b)| (a - b).norm_sqr())
        .sum::<f64>()
        .sqrt();
    let base = norm(old);
    if base > 0.0 {
        diff / base
    } else if diff > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Solve the assembled problem, iterating while responses depend on the field.
///
/// `seed` starts the iteration from a known solution. Converges when the
/// relative change drops below 100 × `config.precision`. `cancel` is checked
/// before every iteration.
pub fn solve<A>(
    assembler: &A,
    config: &SolverConfig,
    options: &NonlinearOptions,
    seed: Option<&[A::Scalar]>,
    cancel: Option<&AtomicBool>,
) -> Result<NonlinearSolution<A::Scalar>>
where
    A: PhysicsAssembler,
    A::Scalar: SolverSelect,
{
    let n = assembler.n_unknowns();
    if let Some(s) = seed {
        if s.len() != n {
            return Err(Error::Solver(format!(
                "seed has {} values for {} unknowns",
                s.len(),
                n
            )));
        }
    }
    let solver = select_solver::<A::Scalar>(config, n);
    let nonlinear = assembler.is_nonlinear();
    log::info!(
        "solving {} unknowns with {} ({})",
        n,
        solver.name(),
        if nonlinear { "nonlinear" } else { "linear" }
    );

    let threshold = 100.0 * config.precision;
    let relaxation = options.relaxation.clamp(f64::EPSILON, 1.0);
    let mut previous: Option<Vec<A::Scalar>> = seed.map(<[A::Scalar]>::to_vec);
    let mut change = f64::INFINITY;
    let max_iterations = if nonlinear { options.max_iterations.max(1) } else { 1 };

    for iteration in 1..=max_iterations {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(Error::Cancelled {
                iterations: iteration - 1,
            });
        }
        let system = assembler.assemble(previous.as_deref())?;
        let reduced = system.finish()?;
        let guess = match &previous {
            Some(p) => reduced.restrict(p),
            None => vec![A::Scalar::zero(); n],
        };
        let x = solver.solve_with_guess(&reduced.matrix, &reduced.rhs, &guess)?;
        let mut unknowns = reduced.expand(&x);

        if !nonlinear {
            return Ok(NonlinearSolution {
                unknowns,
                iterations: 1,
                change: 0.0,
                system,
            });
        }

        if let Some(old) = &previous {
            change = relative_change(&unknowns, old);
            if relaxation < 1.0 {
                let r = A::Scalar::from_real(relaxation);
                for (u, &o) in unknowns.iter_mut().zip(old) {
                    *u = o + r * (*u - o);
                }
            }
        }
        log::debug!("nonlinear iteration {}: relative change {:e}", iteration, change);

        if change < threshold {
            log::info!("converged after {} iterations", iteration);
            return Ok(NonlinearSolution {
                unknowns,
                iterations: iteration,
                change,
                system,
            });
        }
        previous = Some(unknowns);
    }
    Err(Error::NotConverged {
        iterations: max_iterations,
        change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::HeatAssembler;
    use crate::mesh::testing::{mark_edges, rectangle};
    use crate::mesh::Mesh;
    use crate::problem::heat::{HeatBoundary, HeatBoundaryKind, HeatMaterial};
    use crate::problem::{BlockLabel, Domain, Problem, Properties, Region};
    use crate::types::{LengthUnit, STEFAN_BOLTZMANN};
    use approx::assert_relative_eq;

    fn radiating_bar() -> (Problem, Mesh) {
        let mut p = Problem::new(Domain::Heat);
        p.header.length_units = LengthUnit::Meters;
        p.geometry.add_label(BlockLabel::new(0.5, 0.1, Region::Material(0)));
        if let Properties::Heat(t) = &mut p.properties {
            t.materials.push(HeatMaterial::linear("bar", 1.0));
            t.boundaries.push(HeatBoundary {
                name: "hot".into(),
                kind: HeatBoundaryKind::FixedTemperature(1000.0),
            });
            t.boundaries.push(HeatBoundary {
                name: "sky".into(),
                kind: HeatBoundaryKind::Radiation {
                    beta: 1.0,
                    t_inf: 300.0,
                },
            });
        }
        let mesh = mark_edges(&rectangle(0.0, 1.0, 0.0, 0.2, 5, 1, None), |p0, p1| {
            if p0.x == 0.0 && p1.x == 0.0 {
                Some(0)
            } else if p0.x == 1.0 && p1.x == 1.0 {
                Some(1)
            } else {
                None
            }
        });
        (p, mesh)
    }

    fn config() -> SolverConfig {
        SolverConfig {
            precision: 1e-10,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn test_radiation_balance() {
        let (p, mesh) = radiating_bar();
        let a = HeatAssembler::new(&mesh, &p).unwrap();
        let s = solve(&a, &config(), &NonlinearOptions::default(), None, None).unwrap();
        assert!(s.iterations > 1);
        let t_right = s.unknowns[5];
        let conducted = 1000.0 - t_right;
        let radiated = STEFAN_BOLTZMANN * (t_right.powi(4) - 300.0_f64.powi(4));
        assert_relative_eq!(conducted, radiated, max_relative = 1e-5);
    }

    #[test]
    fn test_converged_seed_takes_one_iteration() {
        let (p, mesh) = radiating_bar();
        let a = HeatAssembler::new(&mesh, &p).unwrap();
        let first = solve(&a, &config(), &NonlinearOptions::default(), None, None).unwrap();
        let again = solve(
            &a,
            &config(),
            &NonlinearOptions::default(),
            Some(&first.unknowns),
            None,
        )
        .unwrap();
        assert_eq!(again.iterations, 1);
    }

    #[test]
    fn test_iteration_cap() {
        let (p, mesh) = radiating_bar();
        let a = HeatAssembler::new(&mesh, &p).unwrap();
        let options = NonlinearOptions {
            max_iterations: 2,
            ..Default::default()
        };
        let err = solve(&a, &config(), &options, None, None).unwrap_err();
        assert!(matches!(err, Error::NotConverged { iterations: 2, .. }));
    }

    #[test]
    fn test_cancellation() {
        let (p, mesh) = radiating_bar();
        let a = HeatAssembler::new(&mesh, &p).unwrap();
        let cancel = AtomicBool::new(true);
        let err = solve(&a, &config(), &NonlinearOptions::default(), None, Some(&cancel)).unwrap_err();
        assert!(matches!(err, Error::Cancelled { iterations: 0 }));
    }

    #[test]
    fn test_linear_problem_single_solve() {
        let (mut p, mesh) = radiating_bar();
        if let Properties::Heat(t) = &mut p.properties {
            t.boundaries.modify(1, |b| {
                b.kind = HeatBoundaryKind::FixedTemperature(500.0);
            });
        }
        let a = HeatAssembler::new(&mesh, &p).unwrap();
        let s = solve(&a, &config(), &NonlinearOptions::default(), None, None).unwrap();
        assert_eq!(s.iterations, 1);
        assert_relative_eq!(s.unknowns[2], 1000.0 - 500.0 * 0.4, epsilon = 1e-8);
    }
}
