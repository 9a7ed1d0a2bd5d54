//! Linear system solvers.
//!
//! Solves the finished system Ax = b produced by [`crate::sparse::SparseSystem`].
//!
//! # Solver Backends
//!
//! - [`PcgSolver`]: preconditioned conjugate gradients. For phasor systems the
//!   unconjugated bilinear product is used (COCG), which is the right
//!   Krylov method for complex-symmetric matrices. Preconditioned with a
//!   zero-fill incomplete LDLᵀ factorization, falling back to Jacobi when a
//!   pivot vanishes.
//! - [`FaerCholeskySolver`]: sparse Cholesky factorization using the faer
//!   library, for real symmetric positive definite systems.

use crate::error::{Error, Result};
use crate::sparse::{mul_vec_into, CsrMatrix};
use crate::types::{Complex, FieldScalar};
use faer::linalg::cholesky::llt::factor::LltError;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::linalg::LltError as SparseLltError;
use faer::sparse::{SparseColMat, SymbolicSparseColMat};

/// Linear solver interface.
pub trait Solver<T: FieldScalar>: Send + Sync {
    /// Solve the linear system Ax = b.
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &[T]) -> Result<Vec<T>>;

    /// Solve starting from `guess`. Direct solvers ignore the guess.
    fn solve_with_guess(&self, matrix: &CsrMatrix<T>, rhs: &[T], _guess: &[T]) -> Result<Vec<T>> {
        self.solve(matrix, rhs)
    }

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Solver selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverType {
    /// Sparse Cholesky (real systems only).
    Direct,
    /// Preconditioned conjugate gradients.
    Iterative,
    /// Direct below `auto_threshold` unknowns, iterative above.
    #[default]
    Auto,
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Solver type to use.
    pub solver_type: SolverType,
    /// Relative residual ‖b − Ax‖ / ‖b‖ at which iterative solves stop.
    pub precision: f64,
    /// Maximum iterations for iterative solvers.
    pub max_iterations: usize,
    /// Problem size threshold for auto-selection (direct below, iterative above).
    pub auto_threshold: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver_type: SolverType::Auto,
            precision: 1e-8,
            max_iterations: 100_000,
            auto_threshold: 100_000,
        }
    }
}

fn check_dims<T: FieldScalar>(matrix: &CsrMatrix<T>, rhs: &[T]) -> Result<usize> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(Error::Solver("Matrix must be square".into()));
    }
    if n != rhs.len() {
        return Err(Error::Solver("RHS size mismatch".into()));
    }
    Ok(n)
}

/// Unconjugated product Σ xᵢyᵢ.
fn dot<T: FieldScalar>(x: &[T], y: &[T]) -> T {
    x.iter().zip(y).fold(T::zero(), |acc, (&a, &b)| acc + a * b)
}

fn norm<T: FieldScalar>(x: &[T]) -> f64 {
    x.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt()
}

/// Preconditioner z = M⁻¹r.
pub trait Preconditioner<T>: Send + Sync {
    fn apply(&self, r: &[T], z: &mut [T]);
}

/// Diagonal (Jacobi) preconditioner.
#[derive(Debug, Clone)]
pub struct Jacobi<T> {
    inv_diag: Vec<T>,
}

impl<T: FieldScalar> Jacobi<T> {
    pub fn new(matrix: &CsrMatrix<T>) -> Self {
        let mut inv_diag = vec![T::one(); matrix.nrows()];
        for (i, row) in matrix.row_iter().enumerate() {
            if let Some(k) = row.col_indices().iter().position(|&j| j == i) {
                let d = row.values()[k];
                if d.norm() > 0.0 {
                    inv_diag[i] = T::one() / d;
                }
            }
        }
        Self { inv_diag }
    }
}

impl<T: FieldScalar> Preconditioner<T> for Jacobi<T> {
    fn apply(&self, r: &[T], z: &mut [T]) {
        for ((zi, &ri), &di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * di;
        }
    }
}

/// Zero-fill incomplete factorization A ≈ L·D·Lᵀ stored in the pattern of A.
///
/// Row i holds the unit-lower multipliers left of the diagonal and the
/// upper factor D·Lᵀ from the diagonal on.
#[derive(Debug, Clone)]
pub struct IncompleteLdlt<T> {
    offsets: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<T>,
    diag: Vec<usize>,
}

impl<T: FieldScalar> IncompleteLdlt<T> {
    /// Factor `matrix`. Returns `None` if a diagonal is missing or a pivot
    /// vanishes (or turns non-positive for real systems).
    pub fn new(matrix: &CsrMatrix<T>) -> Option<Self> {
        let n = matrix.nrows();
        let offsets = matrix.row_offsets().to_vec();
        let cols = matrix.col_indices().to_vec();
        let mut values = matrix.values().to_vec();

        let mut diag = vec![usize::MAX; n];
        for i in 0..n {
            diag[i] = (offsets[i]..offsets[i + 1]).find(|&k| cols[k] == i)?;
        }
        let scale: Vec<f64> = diag.iter().map(|&k| values[k].norm()).collect();

        let mut pos = vec![usize::MAX; n];
        for i in 0..n {
            for k in offsets[i]..offsets[i + 1] {
                pos[cols[k]] = k;
            }
            for idx in offsets[i]..diag[i] {
                let k = cols[idx];
                let pivot = values[diag[k]];
                let l = values[idx] / pivot;
                values[idx] = l;
                for kj in diag[k] + 1..offsets[k + 1] {
                    let p = pos[cols[kj]];
                    if p != usize::MAX {
                        let u = values[kj];
                        values[p] -= l * u;
                    }
                }
            }
            let d = values[diag[i]];
            let bad = if T::is_complex() {
                d.norm() <= 1e-14 * scale[i]
            } else {
                d.re() <= 1e-14 * scale[i]
            };
            if bad {
                return None;
            }
            for k in offsets[i]..offsets[i + 1] {
                pos[cols[k]] = usize::MAX;
            }
        }
        Some(Self {
            offsets,
            cols,
            values,
            diag,
        })
    }
}

impl<T: FieldScalar> Preconditioner<T> for IncompleteLdlt<T> {
    fn apply(&self, r: &[T], z: &mut [T]) {
        let n = self.diag.len();
        z.copy_from_slice(r);
        for i in 0..n {
            for k in self.offsets[i]..self.diag[i] {
                let v = self.values[k] * z[self.cols[k]];
                z[i] -= v;
            }
        }
        for i in (0..n).rev() {
            for k in self.diag[i] + 1..self.offsets[i + 1] {
                let v = self.values[k] * z[self.cols[k]];
                z[i] -= v;
            }
            let d = self.values[self.diag[i]];
            z[i] /= d;
        }
    }
}

/// Preconditioned conjugate gradient solver (COCG for phasor systems).
#[derive(Debug, Clone)]
pub struct PcgSolver {
    pub precision: f64,
    pub max_iterations: usize,
}

impl PcgSolver {
    pub fn new(precision: f64, max_iterations: usize) -> Self {
        Self {
            precision,
            max_iterations,
        }
    }
}

impl Default for PcgSolver {
    fn default() -> Self {
        let c = SolverConfig::default();
        Self::new(c.precision, c.max_iterations)
    }
}

impl<T: FieldScalar> Solver<T> for PcgSolver {
    fn solve(&self, matrix: &CsrMatrix<T>, rhs: &[T]) -> Result<Vec<T>> {
        let guess = vec![T::zero(); rhs.len()];
        self.solve_with_guess(matrix, rhs, &guess)
    }

    fn solve_with_guess(&self, matrix: &CsrMatrix<T>, rhs: &[T], guess: &[T]) -> Result<Vec<T>> {
        let n = check_dims(matrix, rhs)?;
        if guess.len() != n {
            return Err(Error::Solver("initial guess size mismatch".into()));
        }
        let b_norm = norm(rhs);
        if n == 0 || b_norm == 0.0 {
            return Ok(vec![T::zero(); n]);
        }

        let preconditioner: Box<dyn Preconditioner<T>> = match IncompleteLdlt::new(matrix) {
            Some(ic) => Box::new(ic),
            None => {
                log::warn!("incomplete factorization broke down, falling back to Jacobi preconditioning");
                Box::new(Jacobi::new(matrix))
            }
        };

        let mut x = guess.to_vec();
        let mut q = vec![T::zero(); n];
        mul_vec_into(matrix, &x, &mut q);
        let mut r: Vec<T> = rhs.iter().zip(&q).map(|(&b, &ax)| b - ax).collect();
        if norm(&r) / b_norm < self.precision {
            log::debug!("{}: initial guess already converged", Solver::<T>::name(self));
            return Ok(x);
        }
        let mut z = vec![T::zero(); n];
        preconditioner.apply(&r, &mut z);
        let mut p = z.clone();
        let mut rho = dot(&r, &z);

        for iter in 0..self.max_iterations {
            mul_vec_into(matrix, &p, &mut q);
            let pq = dot(&p, &q);
            if pq.norm() == 0.0 {
                return Err(Error::SingularMatrix(format!(
                    "conjugate gradient breakdown at iteration {}",
                    iter
                )));
            }
            let alpha = rho / pq;
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * q[i];
            }
            let residual = norm(&r) / b_norm;
            if residual < self.precision {
                log::debug!(
                    "{}: converged in {} iterations (relative residual {:.3e})",
                    Solver::<T>::name(self),
                    iter + 1,
                    residual
                );
                return Ok(x);
            }
            preconditioner.apply(&r, &mut z);
            let rho_new = dot(&r, &z);
            if rho.norm() == 0.0 {
                return Err(Error::SingularMatrix(format!(
                    "conjugate gradient breakdown at iteration {}",
                    iter
                )));
            }
            let beta = rho_new / rho;
            rho = rho_new;
            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }
        Err(Error::Solver(format!(
            "conjugate gradient did not converge in {} iterations",
            self.max_iterations
        )))
    }

    fn name(&self) -> &str {
        if T::is_complex() {
            "COCG (incomplete LDLᵀ)"
        } else {
            "PCG (incomplete LDLᵀ)"
        }
    }
}

/// Wrap a symmetric CSR matrix as a faer column matrix.
///
/// For a symmetric matrix the CSR arrays are also valid CSC arrays.
fn csr_to_faer_csc(csr: &CsrMatrix<f64>) -> SparseColMat<usize, f64> {
    let n = csr.nrows();
    // SAFETY: offsets are monotone and row indices are sorted and in range,
    // as guaranteed by the CsrMatrix invariants.
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(
                n,
                n,
                csr.row_offsets().to_vec(),
                None,
                csr.col_indices().to_vec(),
            ),
            csr.values().to_vec(),
        )
    }
}

/// Sparse Cholesky solver using the faer library.
///
/// Real symmetric positive definite systems only, which is what static
/// problems produce after constraint application.
pub struct FaerCholeskySolver;

impl FaerCholeskySolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FaerCholeskySolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver<f64> for FaerCholeskySolver {
    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_dims(matrix, rhs)?;
        if n == 0 {
            return Ok(vec![]);
        }

        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        let symbolic = SymbolicLlt::try_new(csc_ref.symbolic(), faer::Side::Lower)
            .map_err(|_| Error::Solver("Symbolic Cholesky analysis failed".into()))?;

        let llt = Llt::try_new_with_symbolic(symbolic, csc_ref, faer::Side::Lower).map_err(
            |e| match e {
                SparseLltError::Generic(err) => {
                    Error::Solver(format!("Sparse Cholesky error: {:?}", err))
                }
                SparseLltError::Numeric(LltError::NonPositivePivot { index }) => {
                    Error::SingularMatrix(format!(
                        "Matrix is not positive definite at pivot {}",
                        index
                    ))
                }
            },
        )?;

        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        llt.solve_in_place(x.as_mut());
        Ok((0..n).map(|i| x[(i, 0)]).collect())
    }

    fn name(&self) -> &str {
        "faer Sparse Cholesky (LLᵀ)"
    }
}

/// Scalars that know which solvers they can use.
pub trait SolverSelect: FieldScalar {
    fn select_solver(config: &SolverConfig, n_dofs: usize) -> Box<dyn Solver<Self>>;
}

impl SolverSelect for f64 {
    fn select_solver(config: &SolverConfig, n_dofs: usize) -> Box<dyn Solver<f64>> {
        let direct = match config.solver_type {
            SolverType::Direct => true,
            SolverType::Iterative => false,
            SolverType::Auto => n_dofs < config.auto_threshold,
        };
        if direct {
            Box::new(FaerCholeskySolver::new())
        } else {
            Box::new(PcgSolver::new(config.precision, config.max_iterations))
        }
    }
}

impl SolverSelect for Complex {
    fn select_solver(config: &SolverConfig, _n_dofs: usize) -> Box<dyn Solver<Complex>> {
        if config.solver_type == SolverType::Direct {
            log::warn!("no direct solver for complex systems, using COCG");
        }
        Box::new(PcgSolver::new(config.precision, config.max_iterations))
    }
}

/// Select a solver based on configuration and problem size.
pub fn select_solver<T: SolverSelect>(config: &SolverConfig, n_dofs: usize) -> Box<dyn Solver<T>> {
    T::select_solver(config, n_dofs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{mul_vec, SparseSystem};
    use approx::assert_relative_eq;

    fn matrix(n: usize, entries: &[(usize, usize, f64)]) -> CsrMatrix<f64> {
        let mut s = SparseSystem::<f64>::new(n);
        for &(i, j, v) in entries {
            s.add(i, j, v);
        }
        s.finish().unwrap().matrix
    }

    /// 2-D five-point Laplacian on an m × m grid plus a small shift.
    fn laplacian(m: usize) -> CsrMatrix<f64> {
        let mut s = SparseSystem::<f64>::new(m * m);
        for j in 0..m {
            for i in 0..m {
                let k = j * m + i;
                s.add(k, k, 4.01);
                if i + 1 < m {
                    s.add(k, k + 1, -1.0);
                    s.add(k + 1, k, -1.0);
                }
                if j + 1 < m {
                    s.add(k, k + m, -1.0);
                    s.add(k + m, k, -1.0);
                }
            }
        }
        s.finish().unwrap().matrix
    }

    #[test]
    fn test_faer_cholesky_simple_spd() {
        // [4 2; 2 3] x = [4; 5]  =>  x = [0.25, 1.5]
        let a = matrix(2, &[(0, 0, 4.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 3.0)]);
        let x = FaerCholeskySolver::new().solve(&a, &[4.0, 5.0]).unwrap();
        assert_relative_eq!(x[0], 0.25, epsilon = 1e-10);
        assert_relative_eq!(x[1], 1.5, epsilon = 1e-10);
    }

    #[test]
    fn test_faer_cholesky_not_positive_definite() {
        // eigenvalues 3 and -1
        let a = matrix(2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 1.0)]);
        assert!(FaerCholeskySolver::new().solve(&a, &[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_rhs_mismatch() {
        let a = matrix(2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        assert!(FaerCholeskySolver::new().solve(&a, &[1.0, 2.0, 3.0]).is_err());
        assert!(Solver::<f64>::solve(&PcgSolver::default(), &a, &[1.0]).is_err());
    }

    #[test]
    fn test_pcg_matches_cholesky() {
        let a = laplacian(12);
        let b: Vec<f64> = (0..144).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let direct = FaerCholeskySolver::new().solve(&a, &b).unwrap();
        let pcg = PcgSolver::new(1e-12, 1000).solve(&a, &b).unwrap();
        for (d, p) in direct.iter().zip(&pcg) {
            assert_relative_eq!(*d, *p, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_incomplete_factorization_is_exact_for_tridiagonal() {
        let n = 8;
        let mut entries = Vec::new();
        for i in 0..n {
            entries.push((i, i, 2.5));
            if i + 1 < n {
                entries.push((i, i + 1, -1.0));
                entries.push((i + 1, i, -1.0));
            }
        }
        let a = matrix(n, &entries);
        let ic = IncompleteLdlt::new(&a).unwrap();
        let b: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut z = vec![0.0; n];
        ic.apply(&b, &mut z);
        let az = mul_vec(&a, &z);
        for (l, r) in az.iter().zip(&b) {
            assert_relative_eq!(*l, *r, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_incomplete_factorization_breakdown() {
        // symmetric but indefinite: second pivot is 1 - 4 < 0
        let a = matrix(2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 1.0)]);
        assert!(IncompleteLdlt::new(&a).is_none());
    }

    #[test]
    fn test_pcg_converged_guess_returns_immediately() {
        let a = laplacian(4);
        let x_true: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let b = mul_vec(&a, &x_true);
        let x = PcgSolver::new(1e-10, 0).solve_with_guess(&a, &b, &x_true).unwrap();
        assert_eq!(x, x_true);
    }

    #[test]
    fn test_cocg_complex_symmetric() {
        let n = 10;
        let mut s = SparseSystem::<Complex>::new(n);
        for i in 0..n {
            s.add(i, i, Complex::new(2.0, 0.5));
            if i + 1 < n {
                s.add(i, i + 1, Complex::new(-1.0, 0.0));
                s.add(i + 1, i, Complex::new(-1.0, 0.0));
            }
        }
        let a = s.finish().unwrap().matrix;
        let x_true: Vec<Complex> = (0..n).map(|i| Complex::new(1.0, i as f64)).collect();
        let b = mul_vec(&a, &x_true);
        let x = PcgSolver::new(1e-12, 200).solve(&a, &b).unwrap();
        for (xi, ti) in x.iter().zip(&x_true) {
            assert_relative_eq!(xi.re, ti.re, epsilon = 1e-8);
            assert_relative_eq!(xi.im, ti.im, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_select_solver() {
        let config = SolverConfig::default();
        assert_eq!(select_solver::<f64>(&config, 100).name(), "faer Sparse Cholesky (LLᵀ)");
        let iterative = SolverConfig {
            solver_type: SolverType::Iterative,
            ..SolverConfig::default()
        };
        assert_eq!(select_solver::<f64>(&iterative, 100).name(), "PCG (incomplete LDLᵀ)");
        assert_eq!(select_solver::<Complex>(&config, 100).name(), "COCG (incomplete LDLᵀ)");
    }
}
