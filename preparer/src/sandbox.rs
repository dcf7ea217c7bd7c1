//! The sandbox directory owned by one preparation run.
//!
//! The sandbox root holds the extracted source tree and a reserved
//! `.sourceprep` metadata directory. Opening a sandbox takes an advisory
//! exclusive lock on `.sourceprep/lock`, released when the [`Sandbox`] is
//! dropped, so two runs never prepare the same tree at once.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::{Deserialize, Serialize};
use sourceprep_common::{PathError, posix_relative};
use std::fs::File;
use std::io::{self, Write};

/// Name of the reserved metadata directory inside the sandbox root.
pub const METADATA_DIR: &str = ".sourceprep";
/// Lock file inside the metadata directory.
const LOCK_FILE: &str = "lock";
/// Stage state inside the metadata directory.
const STATE_FILE: &str = "state.json";
/// Build flag file inside the metadata directory.
pub const BUILD_FLAGS_FILE: &str = "build_flags";

/// Errors arising from sandbox management.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A path that must be a directory is something else.
    #[error("{path} exists but is not a directory")]
    NotADirectory {
        /// The offending path.
        path: Utf8PathBuf,
    },

    /// Another run holds the sandbox lock.
    #[error("sandbox {path} is locked by another run")]
    Locked {
        /// The sandbox root.
        path: Utf8PathBuf,
    },

    /// The state file is not valid JSON for [`SandboxState`].
    #[error("invalid sandbox state {path}: {source}")]
    State {
        /// The state file.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A path inside the sandbox leads outside it through a link on disk.
    #[error("{path} resolves outside the sandbox to {resolved}")]
    Escapes {
        /// The sandbox path as named.
        path: Utf8PathBuf,
        /// Where it really leads.
        resolved: Utf8PathBuf,
    },

    /// A file system operation failed.
    #[error("sandbox I/O error at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Stages completed in a sandbox, persisted across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxState {
    /// The source archive has been extracted.
    pub source_extracted: bool,
    /// Domain substitution has been applied.
    pub domain_substituted: bool,
    /// Cleaning list entries the last extraction did not find.
    pub missing_cleaning_entries: Vec<String>,
}

/// An open, locked sandbox.
#[derive(Debug)]
pub struct Sandbox {
    root: Utf8PathBuf,
    real_root: Utf8PathBuf,
    _lock: File,
}

impl Sandbox {
    /// Creates the sandbox root and metadata directory if needed and takes
    /// the sandbox lock.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::NotADirectory`] when the root or metadata
    /// path is occupied by a file, [`SandboxError::Locked`] when another run
    /// holds the lock, and [`SandboxError::Io`] on other failures.
    pub fn open(root: &Utf8Path) -> Result<Self, SandboxError> {
        ensure_directory(root)?;
        let metadata = root.join(METADATA_DIR);
        ensure_directory(&metadata)?;

        let lock_path = metadata.join(LOCK_FILE);
        let lock = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| SandboxError::Io {
                path: lock_path.clone(),
                source,
            })?;
        fs2::FileExt::try_lock_exclusive(&lock).map_err(|source| {
            if source.kind() == fs2::lock_contended_error().kind() {
                SandboxError::Locked {
                    path: root.to_owned(),
                }
            } else {
                SandboxError::Io {
                    path: lock_path.clone(),
                    source,
                }
            }
        })?;
        debug!("locked sandbox {root}");
        let real_root = root
            .canonicalize_utf8()
            .map_err(|source| SandboxError::Io {
                path: root.to_owned(),
                source,
            })?;

        Ok(Self {
            root: root.to_owned(),
            real_root,
            _lock: lock,
        })
    }

    /// Returns the sandbox root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the metadata directory.
    #[must_use]
    pub fn metadata_dir(&self) -> Utf8PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Resolves a POSIX relative path from a resource list to a sandbox path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] for empty, absolute or `..` paths.
    pub fn resolve(&self, relative: &str) -> Result<Utf8PathBuf, PathError> {
        Ok(self.root.join(posix_relative(relative)?))
    }

    /// Checks that `path` stays inside the sandbox once the links already on
    /// disk are followed. A missing path is judged by its nearest existing
    /// ancestor.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Escapes`] when the path leads outside the
    /// sandbox and [`SandboxError::Io`] when it cannot be resolved.
    pub fn ensure_contained(&self, path: &Utf8Path) -> Result<(), SandboxError> {
        let io_error = |source: io::Error| SandboxError::Io {
            path: path.to_owned(),
            source,
        };
        let mut existing = path;
        let resolved = loop {
            match existing.canonicalize_utf8() {
                Ok(resolved) => break resolved,
                Err(err) if err.kind() == io::ErrorKind::NotFound => match existing.parent() {
                    Some(parent) => existing = parent,
                    None => return Err(io_error(err)),
                },
                Err(source) => return Err(io_error(source)),
            }
        };
        if resolved.starts_with(&self.real_root) {
            Ok(())
        } else {
            Err(SandboxError::Escapes {
                path: path.to_owned(),
                resolved,
            })
        }
    }

    /// Loads the persisted stage state, or the default when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::State`] for a corrupt state file.
    pub fn load_state(&self) -> Result<SandboxState, SandboxError> {
        let path = self.metadata_dir().join(STATE_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SandboxState::default()),
            Err(source) => return Err(SandboxError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| SandboxError::State { path, source })
    }

    /// Persists `state`, replacing the previous file atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Io`] when the file cannot be written.
    pub fn save_state(&self, state: &SandboxState) -> Result<(), SandboxError> {
        let path = self.metadata_dir().join(STATE_FILE);
        let json = serde_json::to_string_pretty(state).map_err(|source| SandboxError::State {
            path: path.clone(),
            source,
        })?;
        self.write_metadata(&path, json.as_bytes())
    }

    /// Loads the state, applies `update` and saves the result.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::load_state`] and [`Self::save_state`].
    pub fn update_state<F>(&self, update: F) -> Result<SandboxState, SandboxError>
    where
        F: FnOnce(&mut SandboxState),
    {
        let mut state = self.load_state()?;
        update(&mut state);
        self.save_state(&state)?;
        Ok(state)
    }

    /// Writes `flags`, one per line, to `.sourceprep/build_flags`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Io`] when the file cannot be written.
    pub fn write_build_flags(&self, flags: &[String]) -> Result<Utf8PathBuf, SandboxError> {
        let path = self.metadata_dir().join(BUILD_FLAGS_FILE);
        let mut contents = String::new();
        for flag in flags {
            contents.push_str(flag);
            contents.push('\n');
        }
        self.write_metadata(&path, contents.as_bytes())?;
        Ok(path)
    }

    fn write_metadata(&self, path: &Utf8Path, contents: &[u8]) -> Result<(), SandboxError> {
        let io_error = |source| SandboxError::Io {
            path: path.to_owned(),
            source,
        };
        let mut staging = tempfile::NamedTempFile::new_in(self.metadata_dir()).map_err(io_error)?;
        staging.write_all(contents).map_err(io_error)?;
        staging.persist(path).map_err(|err| io_error(err.error))?;
        Ok(())
    }
}

fn ensure_directory(path: &Utf8Path) -> Result<(), SandboxError> {
    if path.exists() && !path.is_dir() {
        return Err(SandboxError::NotADirectory {
            path: path.to_owned(),
        });
    }
    std::fs::create_dir_all(path).map_err(|source| SandboxError::Io {
        path: path.to_owned(),
        source,
    })
}
