//! Shared utilities for the pulsekit crates.
mod errors;
mod out_file;

pub use errors::{BlockPath, Error, IrLocation, PathSegment, PulseResult, RefKind};
pub use out_file::OutputFile;
