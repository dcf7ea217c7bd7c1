//! Integrity verification of a source archive against its hash manifest.
//!
//! The archive is streamed once through a hasher for every supported
//! algorithm named in the manifest, then each digest is compared with the
//! expected value ignoring hex case.

use super::hashes::{HashAlgorithm, HashManifest, to_hex};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use sha2::digest::DynDigest;
use sourceprep::MismatchAction;
use std::fmt;
use std::io::Read;

/// Read buffer size used while hashing.
const CHUNK_SIZE: usize = 8192;

/// Policy governing how a source archive is verified.
///
/// # Examples
///
/// ```
/// use sourceprep_preparer::source::verification::VerificationPolicy;
///
/// let policy = VerificationPolicy::default();
/// assert!(!policy.allow_empty_manifest);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Accept a manifest with no supported algorithm.
    pub allow_empty_manifest: bool,
    /// What a digest mismatch does.
    pub on_mismatch: MismatchAction,
}

impl From<sourceprep::VerificationConfig> for VerificationPolicy {
    fn from(config: sourceprep::VerificationConfig) -> Self {
        Self {
            allow_empty_manifest: config.allow_empty_manifest,
            on_mismatch: config.on_mismatch,
        }
    }
}

impl fmt::Display for VerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let empty = if self.allow_empty_manifest {
            "empty manifests allowed"
        } else {
            "empty manifests rejected"
        };
        write!(f, "{}, {empty}", self.on_mismatch)
    }
}

/// Errors arising from verification.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// A computed digest differs from the manifest.
    #[error("{algorithm} digest mismatch for {path}: expected {expected}, got {actual}")]
    Mismatch {
        /// The file that was hashed.
        path: Utf8PathBuf,
        /// The algorithm whose digest differs.
        algorithm: HashAlgorithm,
        /// Digest recorded in the manifest.
        expected: String,
        /// Digest computed from the file.
        actual: String,
    },

    /// The manifest names a supported algorithm without a digest.
    #[error("malformed line {line} in hash manifest {manifest}")]
    MalformedLine {
        /// The manifest file.
        manifest: Utf8PathBuf,
        /// 1-based line number.
        line: usize,
    },

    /// No manifest line used a supported algorithm.
    #[error("hash manifest {manifest} lists no supported algorithm")]
    NoSupportedAlgorithms {
        /// The manifest file.
        manifest: Utf8PathBuf,
    },

    /// Reading the file or manifest failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A digest mismatch that the policy downgraded to a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMismatch {
    /// The algorithm whose digest differs.
    pub algorithm: HashAlgorithm,
    /// Digest recorded in the manifest.
    pub expected: String,
    /// Digest computed from the file.
    pub actual: String,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Algorithms whose digests matched.
    pub verified: Vec<HashAlgorithm>,
    /// Algorithm names skipped as unsupported.
    pub skipped: Vec<String>,
    /// Mismatches tolerated under [`MismatchAction::Warn`].
    pub mismatches: Vec<DigestMismatch>,
}

impl VerificationReport {
    /// Returns true when nothing was actually checked.
    #[must_use]
    pub fn is_vacuous(&self) -> bool {
        self.verified.is_empty() && self.mismatches.is_empty()
    }
}

/// Verifies `target` against the manifest file at `manifest_path`.
///
/// # Errors
///
/// Returns [`VerificationError`] on I/O failure, malformed lines, an empty
/// manifest the policy rejects, or a mismatch under [`MismatchAction::Fail`].
pub fn verify_file(
    target: &Utf8Path,
    manifest_path: &Utf8Path,
    policy: VerificationPolicy,
) -> Result<VerificationReport, VerificationError> {
    let text = std::fs::read_to_string(manifest_path).map_err(|source| VerificationError::Io {
        path: manifest_path.to_owned(),
        source,
    })?;
    verify_with_manifest(target, manifest_path, &HashManifest::parse(&text), policy)
}

/// Verifies `target` against an already parsed manifest.
///
/// `manifest_path` is only used to label errors.
///
/// # Errors
///
/// Same as [`verify_file`], minus manifest read failures.
pub fn verify_with_manifest(
    target: &Utf8Path,
    manifest_path: &Utf8Path,
    manifest: &HashManifest,
    policy: VerificationPolicy,
) -> Result<VerificationReport, VerificationError> {
    let mut report = VerificationReport::default();
    let mut expectations = Vec::new();

    for entry in manifest.entries() {
        match (HashAlgorithm::from_name(&entry.algorithm), &entry.digest) {
            (Some(algorithm), Some(digest)) => expectations.push((algorithm, digest.clone())),
            (Some(_), None) => {
                return Err(VerificationError::MalformedLine {
                    manifest: manifest_path.to_owned(),
                    line: entry.line,
                });
            }
            (None, _) => {
                warn!(
                    "Hash algorithm '{}' not available. Skipping...",
                    entry.algorithm
                );
                report.skipped.push(entry.algorithm.clone());
            }
        }
    }

    if expectations.is_empty() {
        if !policy.allow_empty_manifest {
            return Err(VerificationError::NoSupportedAlgorithms {
                manifest: manifest_path.to_owned(),
            });
        }
        warn!("hash manifest {manifest_path} lists no supported algorithm; nothing verified");
        return Ok(report);
    }

    let algorithms: Vec<HashAlgorithm> = expectations.iter().map(|(a, _)| *a).collect();
    let digests = compute_digests(target, &algorithms)?;

    for ((algorithm, expected), actual) in expectations.into_iter().zip(digests) {
        info!("Running '{algorithm}' hash check...");
        if expected.eq_ignore_ascii_case(&actual) {
            debug!("'{algorithm}' hash matches");
            report.verified.push(algorithm);
            continue;
        }
        match policy.on_mismatch {
            MismatchAction::Fail => {
                return Err(VerificationError::Mismatch {
                    path: target.to_owned(),
                    algorithm,
                    expected,
                    actual,
                });
            }
            MismatchAction::Warn => {
                warn!(
                    "{target} does not have matching '{algorithm}' hash: \
                     expected {expected}, got {actual}"
                );
                report.mismatches.push(DigestMismatch {
                    algorithm,
                    expected,
                    actual,
                });
            }
        }
    }

    Ok(report)
}

/// Streams `path` once, returning one lowercase hex digest per algorithm.
///
/// # Errors
///
/// Returns [`VerificationError::Io`] if the file cannot be read.
pub fn compute_digests(
    path: &Utf8Path,
    algorithms: &[HashAlgorithm],
) -> Result<Vec<String>, VerificationError> {
    let io_error = |source| VerificationError::Io {
        path: path.to_owned(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_error)?;
    let mut hashers: Vec<Box<dyn DynDigest>> =
        algorithms.iter().map(|algorithm| algorithm.hasher()).collect();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let bytes_read = file.read(&mut buffer).map_err(io_error)?;
        if bytes_read == 0 {
            break;
        }
        let chunk = buffer.get(..bytes_read).unwrap_or_default();
        for hasher in &mut hashers {
            hasher.update(chunk);
        }
    }
    Ok(hashers
        .into_iter()
        .map(|hasher| to_hex(&hasher.finalize()))
        .collect())
}
