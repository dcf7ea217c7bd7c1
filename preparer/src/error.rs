//! Error type for a preparation run.
//!
//! Every stage error converts into [`PrepError`] so the pipeline and CLI can
//! propagate with `?` while keeping the stage's own context.

use crate::patches::PatchError;
use crate::sandbox::SandboxError;
use crate::source::{AcquireError, ExtractionError, VerificationError};
use crate::substitution::{RegexListError, SubstitutionError};
use sourceprep::ConfigError;
use sourceprep_common::{PathError, ResourceError};
use thiserror::Error;

/// Errors that can end a preparation run.
#[derive(Debug, Error)]
pub enum PrepError {
    /// The configuration is unreadable or incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A resource list could not be loaded.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A resource list names a path that cannot live in the sandbox.
    #[error("invalid sandbox path {entry:?}: {source}")]
    SandboxPath {
        /// The list entry.
        entry: String,
        /// Why it was rejected.
        #[source]
        source: PathError,
    },

    /// The sandbox could not be opened or updated.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Acquisition options conflict or a download failed.
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// The archive failed its integrity check.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The domain regex list could not be loaded.
    #[error(transparent)]
    RegexList(#[from] RegexListError),

    /// Domain substitution failed on a file.
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    /// Patch assembly failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Writing command output failed.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for preparation operations.
pub type Result<T> = std::result::Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_keep_their_message() {
        let err = PrepError::from(ConfigError::MissingVersion);
        assert_eq!(err.to_string(), ConfigError::MissingVersion.to_string());
    }

    #[test]
    fn sandbox_path_names_the_entry() {
        let err = PrepError::SandboxPath {
            entry: "../x".to_owned(),
            source: PathError::ParentComponent {
                path: "../x".to_owned(),
            },
        };
        assert!(err.to_string().contains("\"../x\""));
    }
}
