//! Sparse system assembly.
//!
//! [`SparseSystem`] accumulates a symmetric matrix and right-hand side entry
//! by entry. Fixed values and periodic ties are recorded as they are
//! declared and applied together by [`SparseSystem::finish`], which yields a
//! CSR system of the same dimension ready for the solvers. Solutions of the
//! finished system are mapped back with [`ReducedSystem::expand`], which
//! makes tied unknowns exactly equal or opposite.

use crate::error::{Error, Result};
use crate::types::FieldScalar;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;
use std::collections::BTreeMap;

/// Compressed Sparse Row matrix.
pub type CsrMatrix<T> = NalgebraCsr<T>;

/// Accumulating symmetric system with deferred constraints.
#[derive(Debug, Clone)]
pub struct SparseSystem<T> {
    rows: Vec<BTreeMap<usize, T>>,
    rhs: Vec<T>,
    fixed: Vec<Option<T>>,
    ties: Vec<(usize, usize, bool)>,
}

impl<T: FieldScalar> SparseSystem<T> {
    /// Zero system with `n` unknowns.
    pub fn new(n: usize) -> Self {
        Self {
            rows: vec![BTreeMap::new(); n],
            rhs: vec![T::zero(); n],
            fixed: vec![None; n],
            ties: Vec::new(),
        }
    }

    pub fn n(&self) -> usize {
        self.rhs.len()
    }

    /// Add `value` to entry (i, j). Callers add both triangles.
    pub fn add(&mut self, i: usize, j: usize, value: T) {
        *self.rows[i].entry(j).or_insert_with(T::zero) += value;
    }

    pub fn add_rhs(&mut self, i: usize, value: T) {
        self.rhs[i] += value;
    }

    /// Add a dense element block at the given unknowns.
    pub fn add_block<const N: usize>(&mut self, dofs: &[usize; N], k: &[[T; N]; N], f: &[T; N]) {
        for a in 0..N {
            for b in 0..N {
                self.add(dofs[a], dofs[b], k[a][b]);
            }
            self.add_rhs(dofs[a], f[a]);
        }
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        self.rows[i].get(&j).copied().unwrap_or_else(T::zero)
    }

    pub fn rhs(&self) -> &[T] {
        &self.rhs
    }

    /// Fix unknown `i` to `value` (static condensation at finish).
    pub fn set_value(&mut self, i: usize, value: T) {
        self.fixed[i] = Some(value);
    }

    pub fn is_fixed(&self, i: usize) -> bool {
        self.fixed[i].is_some()
    }

    /// Tie unknowns so that x[a] == x[b].
    pub fn periodicity(&mut self, a: usize, b: usize) {
        self.ties.push((a, b, false));
    }

    /// Tie unknowns so that x[a] == -x[b].
    pub fn antiperiodicity(&mut self, a: usize, b: usize) {
        self.ties.push((a, b, true));
    }

    /// Σ over `rows` of (K·x − b)_i on the unconstrained equations.
    ///
    /// For fixed-potential conductors this is the total source the
    /// constraint has to supply.
    pub fn reaction_sum(&self, rows: &[usize], x: &[T]) -> T {
        let mut total = T::zero();
        for &i in rows {
            let mut s = T::zero();
            for (&j, &v) in &self.rows[i] {
                s += v * x[j];
            }
            total += s - self.rhs[i];
        }
        total
    }

    /// Apply ties and fixed values and convert to CSR.
    pub fn finish(&self) -> Result<ReducedSystem<T>> {
        let n = self.n();
        let classes = TieClasses::resolve(n, &self.ties);
        let mut map = Vec::with_capacity(n);
        for i in 0..n {
            map.push(classes.map(i));
        }

        let sign = |s: bool| if s { -T::one() } else { T::one() };

        // fixed values move to class roots
        let mut fixed: Vec<Option<T>> = vec![None; n];
        for i in 0..n {
            let (root, negated) = map[i];
            if classes.is_zero(root) {
                fixed[root] = Some(T::zero());
                continue;
            }
            if let Some(v) = self.fixed[i] {
                let v = sign(negated) * v;
                match fixed[root] {
                    Some(old) if (old - v).norm() > 1e-12 * (old.norm() + v.norm()) => {
                        log::warn!(
                            "unknown {} is fixed to conflicting values through periodic ties",
                            root
                        );
                    }
                    Some(_) => {}
                    None => fixed[root] = Some(v),
                }
            }
        }

        let mut rows: Vec<BTreeMap<usize, T>> = vec![BTreeMap::new(); n];
        let mut rhs = vec![T::zero(); n];
        for i in 0..n {
            let (ri, si) = map[i];
            for (&j, &v) in &self.rows[i] {
                let (rj, sj) = map[j];
                *rows[ri].entry(rj).or_insert_with(T::zero) += sign(si != sj) * v;
            }
            rhs[ri] += sign(si) * self.rhs[i];
        }

        for r in 0..n {
            let Some(v) = fixed[r] else { continue };
            let row = std::mem::take(&mut rows[r]);
            for (&j, &k) in &row {
                if j != r {
                    rows[j].remove(&r);
                    rhs[j] -= k * v;
                }
            }
            let diag = row
                .get(&r)
                .copied()
                .filter(|d| d.norm() > 0.0)
                .unwrap_or_else(T::one);
            rows[r].insert(r, diag);
            rhs[r] = diag * v;
        }

        // merged-away rows and unconnected unknowns become identity rows
        for (i, row) in rows.iter_mut().enumerate() {
            if row.values().all(|v| v.norm() == 0.0) {
                row.clear();
                row.insert(i, T::one());
            }
        }

        let matrix = to_csr(n, &rows)?;
        Ok(ReducedSystem {
            matrix,
            rhs,
            map,
            fixed,
        })
    }
}

/// CSR system produced by [`SparseSystem::finish`].
#[derive(Debug, Clone)]
pub struct ReducedSystem<T: FieldScalar> {
    pub matrix: CsrMatrix<T>,
    pub rhs: Vec<T>,
    map: Vec<(usize, bool)>,
    fixed: Vec<Option<T>>,
}

impl<T: FieldScalar> ReducedSystem<T> {
    /// Map a solution of the reduced system back to every unknown.
    pub fn expand(&self, x: &[T]) -> Vec<T> {
        self.map
            .iter()
            .map(|&(root, negated)| {
                let v = self.fixed[root].unwrap_or(x[root]);
                if negated {
                    -v
                } else {
                    v
                }
            })
            .collect()
    }

    /// Restrict a full-length guess to the reduced unknowns.
    pub fn restrict(&self, guess: &[T]) -> Vec<T> {
        self.map
            .iter()
            .enumerate()
            .map(|(i, &(root, _))| {
                if root == i {
                    self.fixed[i].unwrap_or(guess[i])
                } else {
                    T::zero()
                }
            })
            .collect()
    }
}

/// Union-find over tied unknowns with an odd/even sign per member.
struct TieClasses {
    parent: Vec<usize>,
    odd: Vec<bool>,
    zero: Vec<bool>,
}

impl TieClasses {
    fn resolve(n: usize, ties: &[(usize, usize, bool)]) -> Self {
        let mut c = Self {
            parent: (0..n).collect(),
            odd: vec![false; n],
            zero: vec![false; n],
        };
        for &(a, b, negated) in ties {
            c.union(a, b, negated);
        }
        c
    }

    fn find(&mut self, i: usize) -> (usize, bool) {
        let mut path = Vec::new();
        let mut r = i;
        while self.parent[r] != r {
            path.push(r);
            r = self.parent[r];
        }
        let mut acc = false;
        for &k in path.iter().rev() {
            acc ^= self.odd[k];
            self.odd[k] = acc;
            self.parent[k] = r;
        }
        (r, if path.is_empty() { false } else { self.odd[i] })
    }

    fn union(&mut self, a: usize, b: usize, negated: bool) {
        let (ra, pa) = self.find(a);
        let (rb, pb) = self.find(b);
        if ra == rb {
            if pa ^ pb != negated {
                // x = -x
                self.zero[ra] = true;
            }
            return;
        }
        let (root, other) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[other] = root;
        self.odd[other] = pa ^ pb ^ negated;
        self.zero[root] |= self.zero[other];
    }

    fn map(&self, i: usize) -> (usize, bool) {
        let mut r = i;
        let mut odd = false;
        while self.parent[r] != r {
            odd ^= self.odd[r];
            r = self.parent[r];
        }
        (r, odd)
    }

    fn is_zero(&self, root: usize) -> bool {
        self.zero[root]
    }
}

fn to_csr<T: FieldScalar>(n: usize, rows: &[BTreeMap<usize, T>]) -> Result<CsrMatrix<T>> {
    let nnz = rows.iter().map(|r| r.len()).sum();
    let mut offsets = Vec::with_capacity(n + 1);
    let mut cols = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    offsets.push(0);
    for row in rows {
        for (&j, &v) in row {
            cols.push(j);
            values.push(v);
        }
        offsets.push(cols.len());
    }
    CsrMatrix::try_from_csr_data(n, n, offsets, cols, values)
        .map_err(|e| Error::Assembly(format!("invalid CSR structure: {}", e)))
}

/// y = A·x.
pub fn mul_vec<T: FieldScalar>(a: &CsrMatrix<T>, x: &[T]) -> Vec<T> {
    let mut y = vec![T::zero(); a.nrows()];
    mul_vec_into(a, x, &mut y);
    y
}

pub fn mul_vec_into<T: FieldScalar>(a: &CsrMatrix<T>, x: &[T], y: &mut [T]) {
    for (i, row) in a.row_iter().enumerate() {
        let mut s = T::zero();
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            s += v * x[j];
        }
        y[i] = s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complex;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    fn dense_solve(sys: &ReducedSystem<f64>) -> Vec<f64> {
        let a = DMatrix::from(&sys.matrix);
        let b = DVector::from_column_slice(&sys.rhs);
        let x = a.lu().solve(&b).unwrap();
        sys.expand(x.as_slice())
    }

    /// 1-D Laplacian chain with unit springs.
    fn chain(n: usize) -> SparseSystem<f64> {
        let mut s = SparseSystem::new(n);
        for i in 0..n - 1 {
            s.add_block(&[i, i + 1], &[[1.0, -1.0], [-1.0, 1.0]], &[0.0, 0.0]);
        }
        s
    }

    #[test]
    fn test_accumulates_entries() {
        let mut s = SparseSystem::<f64>::new(2);
        s.add(0, 0, 1.0);
        s.add(0, 0, 2.0);
        s.add_rhs(1, 4.0);
        assert_relative_eq!(s.get(0, 0), 3.0);
        assert_relative_eq!(s.get(1, 0), 0.0);
        assert_relative_eq!(s.rhs()[1], 4.0);
    }

    #[test]
    fn test_dirichlet_condensation() {
        let mut s = chain(5);
        s.set_value(0, 1.0);
        s.set_value(4, 3.0);
        let reduced = s.finish().unwrap();
        // condensed matrix stays symmetric
        let a = DMatrix::from(&reduced.matrix);
        assert_eq!(a, a.transpose());
        let x = dense_solve(&reduced);
        for (i, xi) in x.iter().enumerate() {
            assert_relative_eq!(*xi, 1.0 + 0.5 * i as f64, epsilon = 1e-12);
        }
        assert_eq!(x[4], 3.0);
    }

    #[test]
    fn test_periodic_values_are_exact() {
        let mut s = chain(6);
        s.set_value(0, 2.0);
        s.add_rhs(3, 1.0);
        s.periodicity(5, 2);
        let x = dense_solve(&s.finish().unwrap());
        assert_eq!(x[5].to_bits(), x[2].to_bits());
    }

    #[test]
    fn test_antiperiodic_values_are_negated() {
        let mut s = chain(4);
        s.add_rhs(1, 1.0);
        s.antiperiodicity(0, 3);
        let x = dense_solve(&s.finish().unwrap());
        assert_eq!(x[0], -x[3]);
        assert!(x[1].abs() > 0.0);
    }

    #[test]
    fn test_tie_chains_and_self_antiperiodic() {
        let mut s = chain(5);
        s.add_rhs(2, 1.0);
        s.set_value(4, 1.0);
        s.periodicity(0, 1);
        s.antiperiodicity(1, 3);
        let x = dense_solve(&s.finish().unwrap());
        assert_eq!(x[0], x[1]);
        assert_eq!(x[1], -x[3]);

        let mut s = chain(3);
        s.set_value(2, 1.0);
        s.periodicity(0, 1);
        s.antiperiodicity(1, 0);
        let x = dense_solve(&s.finish().unwrap());
        assert_eq!(x[0], 0.0);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn test_reaction_sum() {
        let mut s = chain(3);
        s.set_value(0, 0.0);
        s.set_value(2, 2.0);
        let x = dense_solve(&s.finish().unwrap());
        // unit current flows from node 2 to node 0
        assert_relative_eq!(s.reaction_sum(&[2], &x), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.reaction_sum(&[0], &x), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unconnected_unknown_gets_identity_row() {
        let mut s = SparseSystem::new(4);
        for i in 0..2 {
            s.add_block(&[i, i + 1], &[[1.0, -1.0], [-1.0, 1.0]], &[0.0, 0.0]);
        }
        s.set_value(0, 1.0);
        let reduced = s.finish().unwrap();
        assert_relative_eq!(DMatrix::from(&reduced.matrix)[(3, 3)], 1.0);
        let x = dense_solve(&reduced);
        assert_relative_eq!(x[2], 1.0, epsilon = 1e-12);
        assert_eq!(x[3], 0.0);
    }

    #[test]
    fn test_complex_mul_vec() {
        let mut s = SparseSystem::<Complex>::new(2);
        s.add(0, 0, Complex::new(1.0, 1.0));
        s.add(0, 1, Complex::new(0.0, 2.0));
        s.add(1, 0, Complex::new(0.0, 2.0));
        s.add(1, 1, Complex::new(3.0, 0.0));
        let r = s.finish().unwrap();
        let y = mul_vec(&r.matrix, &[Complex::new(1.0, 0.0), Complex::new(0.0, 1.0)]);
        assert_eq!(y[0], Complex::new(-1.0, 1.0));
        assert_eq!(y[1], Complex::new(0.0, 5.0));
    }
}
