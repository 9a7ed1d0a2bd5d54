//! File formats: problem files in, triangulator files out and back.

pub mod mesh_files;
pub mod problem_file;
pub mod records;

pub use problem_file::{parse_problem, read_problem};
