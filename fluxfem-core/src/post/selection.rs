//! Element selections and weighted stress tensor masks.

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::problem::Problem;
use crate::solver::{select_solver, SolverConfig};
use crate::sparse::SparseSystem;
use std::collections::HashMap;

/// Elements taking part in a block integral, tied to one mesh generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    generation: u64,
    elements: Vec<bool>,
}

impl Selection {
    /// Elements whose block label is selected in the problem geometry.
    pub fn from_labels(mesh: &Mesh, problem: &Problem) -> Self {
        let labels = &problem.geometry.labels;
        let elements = mesh
            .elements()
            .iter()
            .map(|e| labels.get(e.label).is_some_and(|l| l.selected))
            .collect();
        Self {
            generation: mesh.generation(),
            elements,
        }
    }

    /// Every element of the mesh.
    pub fn all(mesh: &Mesh) -> Self {
        Self {
            generation: mesh.generation(),
            elements: vec![true; mesh.n_elements()],
        }
    }

    /// Elements carrying one of the given block labels.
    pub fn labels(mesh: &Mesh, labels: &[usize]) -> Self {
        let elements = mesh
            .elements()
            .iter()
            .map(|e| labels.contains(&e.label))
            .collect();
        Self {
            generation: mesh.generation(),
            elements,
        }
    }

    /// Elements for which `pred` holds.
    pub fn from_fn(mesh: &Mesh, pred: impl Fn(usize) -> bool) -> Self {
        Self {
            generation: mesh.generation(),
            elements: (0..mesh.n_elements()).map(pred).collect(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, element: usize) -> bool {
        self.elements.get(element).copied().unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        !self.elements.iter().any(|&s| s)
    }

    /// Selected element indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, &s)| s)
            .map(|(e, _)| e)
    }

    /// Fails unless the selection is non-empty and belongs to this mesh.
    pub fn check(&self, mesh: &Mesh) -> Result<()> {
        if self.generation != mesh.generation() || self.elements.len() != mesh.n_elements() {
            return Err(Error::StaleState(format!(
                "selection was made on mesh generation {}, current is {}",
                self.generation,
                mesh.generation()
            )));
        }
        if self.is_empty() {
            return Err(Error::NothingSelected);
        }
        Ok(())
    }
}

/// Smooth weighting function for stress tensor integrals.
///
/// Equal to 1 on the nodes of the selected elements and 0 on the outer
/// boundary, harmonic in between, so its gradient lives in the surrounding
/// air gap.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    generation: u64,
    selection: Vec<bool>,
    values: Vec<f64>,
}

impl Mask {
    /// Build the mask of a selection by solving Laplace's equation.
    pub fn build(mesh: &Mesh, selection: &Selection) -> Result<Self> {
        selection.check(mesh)?;
        let n = mesh.n_nodes();
        let mut system = SparseSystem::<f64>::new(n);
        for (e, element) in mesh.elements().iter().enumerate() {
            let corners = mesh.corners(e);
            let area = mesh.signed_area(e);
            let mut k = [[0.0; 3]; 3];
            let mut p = [0.0; 3];
            let mut q = [0.0; 3];
            for i in 0..3 {
                let (j, l) = ((i + 1) % 3, (i + 2) % 3);
                p[i] = corners[j].y - corners[l].y;
                q[i] = corners[l].x - corners[j].x;
            }
            for i in 0..3 {
                for j in 0..3 {
                    k[i][j] = (p[i] * p[j] + q[i] * q[j]) / (4.0 * area);
                }
            }
            system.add_block(&element.nodes, &k, &[0.0; 3]);
        }

        let mut fixed = vec![None; n];
        for node in outer_nodes(mesh) {
            fixed[node] = Some(0.0);
        }
        for e in selection.iter() {
            for &node in &mesh.elements()[e].nodes {
                fixed[node] = Some(1.0);
            }
        }
        for (i, v) in fixed.iter().enumerate() {
            if let Some(v) = *v {
                system.set_value(i, v);
            }
        }

        let reduced = system.finish()?;
        let solver = select_solver::<f64>(&SolverConfig::default(), n);
        let x = solver.solve(&reduced.matrix, &reduced.rhs)?;
        let values = reduced.expand(&x);
        log::debug!(
            "built stress tensor mask over {} elements",
            selection.iter().count()
        );
        Ok(Self {
            generation: mesh.generation(),
            selection: selection.elements.clone(),
            values,
        })
    }

    /// Fails unless the mask was built for this selection on this mesh.
    pub fn check(&self, mesh: &Mesh, selection: &Selection) -> Result<()> {
        if self.generation != mesh.generation() {
            return Err(Error::StaleState(format!(
                "mask was built on mesh generation {}, current is {}",
                self.generation,
                mesh.generation()
            )));
        }
        if self.selection != selection.elements {
            return Err(Error::StaleState(
                "mask was built for a different selection".into(),
            ));
        }
        Ok(())
    }

    /// Nodal mask values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Corner values of one element.
    pub fn corners(&self, mesh: &Mesh, element: usize) -> [f64; 3] {
        mesh.elements()[element].nodes.map(|n| self.values[n])
    }
}

/// Nodes on edges used by a single element.
pub fn outer_nodes(mesh: &Mesh) -> Vec<usize> {
    let mut count: HashMap<(usize, usize), usize> = HashMap::new();
    for e in mesh.elements() {
        for k in 0..3 {
            let (a, b) = (e.nodes[k], e.nodes[(k + 1) % 3]);
            *count.entry((a.min(b), a.max(b))).or_default() += 1;
        }
    }
    let mut on_boundary = vec![false; mesh.n_nodes()];
    for ((a, b), c) in count {
        if c == 1 {
            on_boundary[a] = true;
            on_boundary[b] = true;
        }
    }
    on_boundary
        .iter()
        .enumerate()
        .filter(|(_, &b)| b)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::testing::{grid_node, rectangle, relabel};
    use crate::problem::{BlockLabel, Domain, Region};

    /// 4×4 unit grid whose middle 2×2 cells carry label 1.
    fn two_labels() -> (Mesh, Problem) {
        let mesh = relabel(&rectangle(0.0, 4.0, 0.0, 4.0, 4, 4, None), |c| {
            usize::from((1.0..3.0).contains(&c.x) && (1.0..3.0).contains(&c.y))
        });
        let mut p = Problem::new(Domain::Magnetic);
        p.geometry.add_label(BlockLabel::new(0.5, 0.5, Region::Material(0)));
        p.geometry.add_label(BlockLabel::new(2.0, 2.0, Region::Material(0)));
        (mesh, p)
    }

    #[test]
    fn test_selection_from_labels() {
        let (mesh, mut p) = two_labels();
        let empty = Selection::from_labels(&mesh, &p);
        assert!(matches!(empty.check(&mesh), Err(Error::NothingSelected)));
        p.geometry.labels[1].selected = true;
        let s = Selection::from_labels(&mesh, &p);
        assert!(s.check(&mesh).is_ok());
        assert_eq!(s.iter().count(), 8);
    }

    #[test]
    fn test_mask_values() {
        let (mesh, _) = two_labels();
        let s = Selection::labels(&mesh, &[1]);
        let mask = Mask::build(&mesh, &s).unwrap();
        let m = mask.values();
        assert_eq!(m[grid_node(4, 2, 2)], 1.0);
        assert_eq!(m[grid_node(4, 1, 1)], 1.0);
        assert_eq!(m[grid_node(4, 0, 2)], 0.0);
        assert_eq!(m[grid_node(4, 4, 4)], 0.0);
        assert!(mask.check(&mesh, &s).is_ok());
    }

    #[test]
    fn test_mask_rejects_other_selection() {
        let (mesh, _) = two_labels();
        let s = Selection::labels(&mesh, &[1]);
        let mask = Mask::build(&mesh, &s).unwrap();
        let other = Selection::labels(&mesh, &[0]);
        assert!(matches!(mask.check(&mesh, &other), Err(Error::StaleState(_))));
        let remeshed = Mesh::new(mesh.nodes().to_vec(), mesh.elements().to_vec(), vec![]).unwrap();
        assert!(matches!(mask.check(&remeshed, &s), Err(Error::StaleState(_))));
    }

    #[test]
    fn test_outer_nodes_of_grid() {
        let mesh = rectangle(0.0, 1.0, 0.0, 1.0, 3, 3, None);
        assert_eq!(outer_nodes(&mesh).len(), 12);
        assert_eq!(Selection::all(&mesh).iter().count(), 18);
    }
}
