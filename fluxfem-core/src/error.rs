//! Error types for fluxfem operations.

use thiserror::Error;

/// Result type alias using the fluxfem Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, meshing, solving or post-processing.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed problem file content.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A counted section did not contain the announced number of records.
    #[error("section [{section}]: expected {expected} records, found {found}")]
    RecordCount {
        section: String,
        expected: usize,
        found: usize,
    },

    /// Geometry failed the pre-mesh consistency check.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// The triangulator's node file could not be read.
    #[error("bad node file: {0}")]
    BadNodeFile(String),

    /// The triangulator's element file could not be read.
    #[error("bad element file: {0}")]
    BadElementFile(String),

    /// The triangulator's edge file could not be read.
    #[error("bad edge file: {0}")]
    BadEdgeFile(String),

    /// The periodic boundary pair file could not be read.
    #[error("bad periodic boundary file: {0}")]
    BadPeriodicFile(String),

    /// A meshed region resolved to no block label and there is no default label.
    #[error("missing material properties: element {element} lies in a region with no block label")]
    MissingMaterial { element: usize },

    /// The external triangulator failed to run.
    #[error("triangulator error: {0}")]
    Triangulator(String),

    /// Mesh data is inconsistent (bad indices, degenerate elements).
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Assembly errors.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Invalid material properties.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// Solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// The nonlinear iteration hit its cap before converging.
    #[error("nonlinear iteration did not converge after {iterations} iterations (relative change {change:e})")]
    NotConverged { iterations: usize, change: f64 },

    /// The solve was cancelled between nonlinear iterations.
    #[error("solve cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    /// A block integral was requested with no elements selected.
    #[error("no area has been selected")]
    NothingSelected,

    /// A stress tensor integral was requested without a mask.
    #[error("{0} requires a mask built from the current selection")]
    MaskRequired(String),

    /// Selection, mask or contour belongs to a different mesh generation or selection state.
    #[error("stale state: {0}")]
    StaleState(String),

    /// Unknown integral kind, empty contour, or another malformed query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// I/O errors (mesh files, problem files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }
}
