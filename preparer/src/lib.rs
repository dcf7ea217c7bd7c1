//! Sandbox preparation pipeline.
//!
//! Turns a pristine upstream source archive into a build sandbox: the archive
//! is acquired and checked against its hash manifest, extracted without the
//! paths named by the cleaning list, and rewritten by domain substitution.
//! The patch series is assembled from layered resource directories.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`error`] - Run-level error type
//! - [`logging`] - Stderr logger for the binary
//! - [`output`] - Stage summary formatting
//! - [`patches`] - Patch series assembly
//! - [`pipeline`] - Stage orchestration for one sandbox
//! - [`sandbox`] - Sandbox directory, lock and state file
//! - [`source`] - Archive acquisition, verification and extraction
//! - [`substitution`] - Domain regex rules and file rewriting

pub mod cli;
pub mod error;
pub mod logging;
pub mod output;
pub mod patches;
pub mod pipeline;
pub mod sandbox;
pub mod source;
pub mod substitution;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use error::{PrepError, Result};
pub use pipeline::Pipeline;
