//! Command-line surface

pub mod mirror;

pub use mirror::{cmd_mirror, Cli, ResolvedRun};
