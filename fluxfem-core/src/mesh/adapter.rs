//! Mesh adapter: problem geometry to triangulator and back.
//!
//! The adapter checks the problem, writes the PSLG, runs a [`Triangulator`]
//! and loads the resulting `.node`/`.ele`/`.edge` files (plus the `.pbc`
//! pair list) into a [`Mesh`]. Intermediate files live for the duration of
//! one call and are removed afterwards unless `keep_files` is set.

use super::pslg::Pslg;
use super::{Mesh, MeshElement};
use crate::error::{Error, Result};
use crate::io::mesh_files::{self, decode_edge_marker};
use crate::problem::Problem;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Switches that vary from run to run.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulationOptions {
    /// Minimum triangle angle (degrees).
    pub min_angle: f64,
    /// Forbid Steiner points on boundary segments (periodic problems).
    pub no_boundary_steiner: bool,
}

/// Black-box Delaunay mesher.
///
/// Given `stem.poly`, an implementation must produce `stem.node`,
/// `stem.ele` and `stem.edge` in Triangle's formats, with region attributes
/// in the element file.
pub trait Triangulator {
    fn triangulate(&self, poly: &Path, options: &TriangulationOptions) -> Result<()>;

    /// Triangulator name for diagnostics.
    fn name(&self) -> &str;
}

/// Runs the external `triangle` executable.
#[derive(Debug, Clone)]
pub struct TriangleCommand {
    pub program: PathBuf,
}

impl TriangleCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line switches for a run.
    pub fn switches(options: &TriangulationOptions) -> String {
        let mut s = format!("-pPq{}eAazQI", options.min_angle);
        if options.no_boundary_steiner {
            s.push('Y');
        }
        s
    }
}

impl Default for TriangleCommand {
    fn default() -> Self {
        Self::new("triangle")
    }
}

impl Triangulator for TriangleCommand {
    fn triangulate(&self, poly: &Path, options: &TriangulationOptions) -> Result<()> {
        let switches = Self::switches(options);
        log::debug!("running {} {} {}", self.program.display(), switches, poly.display());
        let output = Command::new(&self.program)
            .arg(&switches)
            .arg(poly)
            .output()
            .map_err(|e| {
                Error::Triangulator(format!("cannot run {}: {}", self.program.display(), e))
            })?;
        if !output.status.success() {
            return Err(Error::Triangulator(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "triangle"
    }
}

/// Mesh generation configuration.
#[derive(Debug, Clone)]
pub struct MeshOptions {
    /// Directory for the intermediate files.
    pub work_dir: PathBuf,
    /// File stem; a process-unique suffix is appended.
    pub stem: String,
    /// Leave intermediate files in place (debugging).
    pub keep_files: bool,
    /// Minimum triangle angle (degrees).
    pub min_angle: f64,
    /// Default boundary piece length as a fraction of the geometry extent,
    /// used for segments without a length hint when boundary Steiner points
    /// are forbidden.
    pub default_mesh_fraction: f64,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            stem: "fluxfem".into(),
            keep_files: false,
            min_angle: 30.0,
            default_mesh_fraction: 0.02,
        }
    }
}

/// Highest minimum angle Triangle accepts reliably.
const MAX_MIN_ANGLE: f64 = 33.8;

/// Intermediate files of one triangulation, removed on drop.
struct MeshFiles {
    stem: PathBuf,
    keep: bool,
}

impl MeshFiles {
    const EXTENSIONS: [&'static str; 5] = ["poly", "node", "ele", "edge", "pbc"];

    fn new(options: &MeshOptions) -> Self {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let unique = format!(
            "{}-{}-{}",
            options.stem,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            stem: options.work_dir.join(unique),
            keep: options.keep_files,
        }
    }

    fn path(&self, ext: &str) -> PathBuf {
        self.stem.with_extension(ext)
    }
}

impl Drop for MeshFiles {
    fn drop(&mut self) {
        if self.keep {
            log::debug!("keeping mesh files at {}.*", self.stem.display());
            return;
        }
        for ext in Self::EXTENSIONS {
            let _ = std::fs::remove_file(self.path(ext));
        }
    }
}

/// Turns problems into meshes.
#[derive(Debug, Clone, Default)]
pub struct MeshAdapter {
    pub options: MeshOptions,
}

impl MeshAdapter {
    pub fn new(options: MeshOptions) -> Self {
        Self { options }
    }

    /// Check, triangulate and load a problem.
    pub fn triangulate(&self, problem: &Problem, triangulator: &dyn Triangulator) -> Result<Mesh> {
        problem.check()?;

        let has_periodic = problem
            .geometry
            .segments
            .iter()
            .filter_map(|s| s.boundary)
            .chain(problem.geometry.arcs.iter().filter_map(|a| a.boundary))
            .any(|b| problem.properties.boundary_periodic(b).is_some());
        let default_length = if has_periodic {
            Some(problem.geometry.extent() * self.options.default_mesh_fraction)
        } else {
            None
        };
        let pslg = Pslg::build(problem, default_length);

        let files = MeshFiles::new(&self.options);
        mesh_files::write_poly(&files.path("poly"), &pslg)?;
        mesh_files::write_pbc(&files.path("pbc"), &pslg.periodic)?;

        let mut min_angle = self.options.min_angle;
        if !(min_angle > 0.0 && min_angle <= MAX_MIN_ANGLE) {
            log::warn!(
                "minimum angle {} outside (0, {}]; clamping",
                min_angle,
                MAX_MIN_ANGLE
            );
            min_angle = min_angle.clamp(1.0, MAX_MIN_ANGLE);
        }
        let options = TriangulationOptions {
            min_angle,
            no_boundary_steiner: has_periodic,
        };
        triangulator.triangulate(&files.path("poly"), &options)?;

        let mesh = load(&files, problem)?;
        log::info!(
            "{}: {} nodes, {} elements, {} periodic pairs",
            triangulator.name(),
            mesh.n_nodes(),
            mesh.n_elements(),
            mesh.periodic_pairs().len()
        );
        Ok(mesh)
    }
}

fn load(files: &MeshFiles, problem: &Problem) -> Result<Mesh> {
    let (mut nodes, base) = mesh_files::read_nodes(&files.path("node"))?;
    let n = nodes.len();
    let raw_elements = mesh_files::read_elements(&files.path("ele"), base, n)?;
    let edges = mesh_files::read_edges(&files.path("edge"), base, n)?;
    let periodic = mesh_files::read_pbc(&files.path("pbc"), n)?;

    let mut edge_boundary: HashMap<(usize, usize), usize> = HashMap::new();
    for &(a, b, marker) in &edges {
        let (boundary, conductor) = decode_edge_marker(marker);
        if let Some(bd) = boundary {
            edge_boundary.insert((a.min(b), a.max(b)), bd);
        }
        if let Some(c) = conductor {
            for k in [a, b] {
                nodes[k].conductor.get_or_insert(c);
            }
        }
    }

    let labels = &problem.geometry.labels;
    let default_label = problem.geometry.default_label();
    let mut elements = Vec::with_capacity(raw_elements.len());
    for (i, (corners, attribute)) in raw_elements.into_iter().enumerate() {
        let label = match attribute.checked_sub(1) {
            Some(l) if l < labels.len() => l,
            _ => default_label.ok_or(Error::MissingMaterial { element: i })?,
        };
        let mut e = MeshElement::new(corners, label);
        for k in 0..3 {
            let (a, b) = (corners[k], corners[(k + 1) % 3]);
            e.edge_boundaries[k] = edge_boundary.get(&(a.min(b), a.max(b))).copied();
        }
        elements.push(e);
    }
    Mesh::new(nodes, elements, periodic)
}

#[cfg(test)]
pub(crate) mod testing {
    //! A triangulator that replays canned output.

    use super::*;
    use std::cell::RefCell;

    /// Writes pre-baked Triangle output next to the `.poly` file.
    pub struct CannedTriangulator {
        pub node: String,
        pub ele: String,
        pub edge: String,
        pub seen: RefCell<Vec<TriangulationOptions>>,
    }

    impl CannedTriangulator {
        /// Unit square split along its diagonal. The two elements carry the
        /// given region attributes; every outer edge carries `edge_marker`.
        pub fn unit_square(attributes: [usize; 2], edge_marker: i64) -> Self {
            Self {
                node: "4 2 0 1\n0 0 0 1\n1 1 0 1\n2 1 1 1\n3 0 1 1\n".into(),
                ele: format!("2 3 1\n0 0 1 2 {}\n1 0 2 3 {}\n", attributes[0], attributes[1]),
                edge: format!(
                    "5 1\n0 0 1 {m}\n1 1 2 {m}\n2 2 3 {m}\n3 3 0 {m}\n4 0 2 0\n",
                    m = edge_marker
                ),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Triangulator for CannedTriangulator {
        fn triangulate(&self, poly: &Path, options: &TriangulationOptions) -> Result<()> {
            assert!(poly.exists(), "poly file was not written");
            self.seen.borrow_mut().push(options.clone());
            std::fs::write(poly.with_extension("node"), &self.node)?;
            std::fs::write(poly.with_extension("ele"), &self.ele)?;
            std::fs::write(poly.with_extension("edge"), &self.edge)?;
            Ok(())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CannedTriangulator;
    use super::*;
    use crate::io::mesh_files::pack_marker;
    use crate::problem::electrostatic::{ElectrostaticBoundary, ElectrostaticBoundaryKind, ElectrostaticMaterial};
    use crate::problem::{BlockLabel, Domain, Properties, Region};

    fn square_problem() -> Problem {
        let mut p = Problem::new(Domain::Electrostatic);
        let g = &mut p.geometry;
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            g.add_node(x, y);
        }
        for i in 0..4 {
            g.add_segment(i, (i + 1) % 4);
            g.segments[i].boundary = Some(0);
        }
        g.add_label(BlockLabel::new(0.5, 0.5, Region::Material(0)));
        if let Properties::Electrostatic(t) = &mut p.properties {
            t.materials.push(ElectrostaticMaterial::linear("air", 1.0));
            t.boundaries.push(ElectrostaticBoundary {
                name: "ground".into(),
                kind: ElectrostaticBoundaryKind::Fixed(0.0),
            });
        }
        p
    }

    fn scratch_options(name: &str) -> MeshOptions {
        let dir = std::env::temp_dir().join(format!("fluxfem-adapter-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        MeshOptions {
            work_dir: dir,
            ..MeshOptions::default()
        }
    }

    fn leftover_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_switches() {
        let mut o = TriangulationOptions {
            min_angle: 30.0,
            no_boundary_steiner: false,
        };
        assert_eq!(TriangleCommand::switches(&o), "-pPq30eAazQI");
        o.no_boundary_steiner = true;
        assert_eq!(TriangleCommand::switches(&o), "-pPq30eAazQIY");
    }

    #[test]
    fn test_load_resolves_labels_and_boundaries() {
        let options = scratch_options("ok");
        let dir = options.work_dir.clone();
        let adapter = MeshAdapter::new(options);
        let tri = CannedTriangulator::unit_square([1, 1], -pack_marker(Some(0), None));
        let mesh = adapter.triangulate(&square_problem(), &tri).unwrap();

        assert_eq!(mesh.n_nodes(), 4);
        assert_eq!(mesh.n_elements(), 2);
        assert!(mesh.elements().iter().all(|e| e.label == 0));
        // element 0 = (0,1,2): edges 0-1 and 1-2 are outer, 2-0 is the diagonal
        assert_eq!(mesh.elements()[0].edge_boundaries, [Some(0), Some(0), None]);
        assert!(!tri.seen.borrow()[0].no_boundary_steiner);
        assert_eq!(leftover_files(&dir), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_material_cleans_up() {
        let options = scratch_options("missing");
        let dir = options.work_dir.clone();
        let adapter = MeshAdapter::new(options);
        let tri = CannedTriangulator::unit_square([1, 0], 0);
        let err = adapter.triangulate(&square_problem(), &tri).unwrap_err();
        assert!(matches!(err, Error::MissingMaterial { element: 1 }));
        assert_eq!(leftover_files(&dir), 0);

        // a default label fills the gap
        let mut p = square_problem();
        p.geometry.labels[0].is_default = true;
        let mesh = adapter.triangulate(&p, &tri).unwrap();
        assert_eq!(mesh.elements()[1].label, 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_keep_files() {
        let mut options = scratch_options("keep");
        options.keep_files = true;
        let dir = options.work_dir.clone();
        let adapter = MeshAdapter::new(options);
        let tri = CannedTriangulator::unit_square([1, 1], 0);
        adapter.triangulate(&square_problem(), &tri).unwrap();
        assert_eq!(leftover_files(&dir), 5);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_consistency_failure_runs_nothing() {
        let adapter = MeshAdapter::new(scratch_options("bad"));
        let tri = CannedTriangulator::unit_square([1, 1], 0);
        let mut p = square_problem();
        p.geometry.segments[0].n1 = 0;
        assert!(matches!(adapter.triangulate(&p, &tri), Err(Error::Geometry(_))));
        assert!(tri.seen.borrow().is_empty());
        std::fs::remove_dir_all(&adapter.options.work_dir).ok();
    }
}
