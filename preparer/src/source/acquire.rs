//! Source acquisition options and download decisions.
//!
//! Option conflicts are rejected before any file system or network access.
//! Without a local archive the archive and manifest live in the download
//! directory under their upstream names and are fetched as the options
//! require.

use super::download::{DownloadError, SourceDownloader};
use super::naming::SourceName;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};

/// Options controlling how the source archive is obtained and unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Download the archive only when it is not already present.
    pub check_if_exists: bool,
    /// Always download, replacing any existing archive.
    pub force_download: bool,
    /// Verify the archive against its hash manifest.
    pub check_integrity: bool,
    /// Extract the archive into the sandbox.
    pub extract_archive: bool,
    /// Skip cleaning list entries during extraction.
    pub use_cleaning_list: bool,
    /// Directory for downloads; the configured one when `None`.
    pub download_dir: Option<Utf8PathBuf>,
    /// A local archive to use instead of downloading.
    pub archive_path: Option<Utf8PathBuf>,
    /// The hash manifest for a local archive.
    pub hashes_path: Option<Utf8PathBuf>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            check_if_exists: true,
            force_download: false,
            check_integrity: true,
            extract_archive: true,
            use_cleaning_list: true,
            download_dir: None,
            archive_path: None,
            hashes_path: None,
        }
    }
}

/// Configuration errors in [`AcquireOptions`] and download failures.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// Two options were set that cannot be combined.
    #[error("`{first}` conflicts with `{second}`")]
    ConflictingOptions {
        /// The first option.
        first: &'static str,
        /// The option it conflicts with.
        second: &'static str,
    },

    /// An option was set without the option it depends on.
    #[error("`{option}` requires `{requires}`")]
    MissingCompanion {
        /// The option that was set.
        option: &'static str,
        /// The option it needs.
        requires: &'static str,
    },

    /// A path that must be a regular file is something else.
    #[error("{path} exists but is not a file")]
    NotAFile {
        /// The offending path.
        path: Utf8PathBuf,
    },

    /// Fetching the archive or manifest failed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Resolved locations of the archive and its manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePlan {
    /// The archive to verify and extract.
    pub archive: Utf8PathBuf,
    /// The manifest, present when integrity checking is on.
    pub hashes: Option<Utf8PathBuf>,
    /// Whether the archive must be downloaded.
    pub download_archive: bool,
    /// Whether the manifest must be downloaded.
    pub download_hashes: bool,
}

impl AcquireOptions {
    /// Rejects conflicting or incomplete option combinations.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::ConflictingOptions`] or
    /// [`AcquireError::MissingCompanion`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sourceprep_preparer::source::acquire::AcquireOptions;
    ///
    /// let options = AcquireOptions { force_download: true, ..AcquireOptions::default() };
    /// assert!(options.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), AcquireError> {
        if self.archive_path.is_some() {
            if self.force_download {
                return Err(AcquireError::ConflictingOptions {
                    first: "force_download",
                    second: "archive_path",
                });
            }
            if self.check_integrity && self.hashes_path.is_none() {
                return Err(AcquireError::MissingCompanion {
                    option: "check_integrity",
                    requires: "hashes_path",
                });
            }
        } else if self.check_if_exists && self.force_download {
            return Err(AcquireError::ConflictingOptions {
                first: "check_if_exists",
                second: "force_download",
            });
        }
        Ok(())
    }

    /// Validates the options and resolves where the source files live.
    ///
    /// `default_dir` is used when [`Self::download_dir`] is unset.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::validate`], or
    /// [`AcquireError::NotAFile`] when a download location is occupied by
    /// something other than a file.
    pub fn plan(
        &self,
        name: &SourceName,
        default_dir: &Utf8Path,
    ) -> Result<SourcePlan, AcquireError> {
        self.validate()?;

        if let Some(archive) = &self.archive_path {
            return Ok(SourcePlan {
                archive: archive.clone(),
                hashes: self.hashes_path.clone().filter(|_| self.check_integrity),
                download_archive: false,
                download_hashes: false,
            });
        }

        let dir = self.download_dir.as_deref().unwrap_or(default_dir);
        let archive = dir.join(name.archive_filename());
        let hashes = dir.join(name.hashes_filename());
        let archive_present = existing_file(&archive)?;
        let hashes_present = existing_file(&hashes)?;

        let needed = |present: bool| self.force_download || (self.check_if_exists && !present);
        Ok(SourcePlan {
            download_archive: needed(archive_present),
            download_hashes: self.check_integrity && needed(hashes_present),
            hashes: self.check_integrity.then_some(hashes),
            archive,
        })
    }
}

impl SourcePlan {
    /// Downloads whatever the plan marks as missing.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Download`] when a fetch fails.
    pub fn fetch(
        &self,
        name: &SourceName,
        url_base: &str,
        downloader: &dyn SourceDownloader,
    ) -> Result<(), AcquireError> {
        if self.download_archive {
            let url = name.archive_url(url_base);
            info!("Downloading {name} source archive from {url}");
            create_parent(&self.archive)?;
            downloader.download(&url, self.archive.as_std_path())?;
        } else {
            debug!("using existing archive {}", self.archive);
        }
        if let (true, Some(hashes)) = (self.download_hashes, &self.hashes) {
            let url = name.hashes_url(url_base);
            info!("Downloading {name} hash manifest from {url}");
            create_parent(hashes)?;
            downloader.download(&url, hashes.as_std_path())?;
        }
        Ok(())
    }
}

/// Returns whether `path` is an existing file, rejecting other file types.
fn existing_file(path: &Utf8Path) -> Result<bool, AcquireError> {
    if !path.exists() {
        return Ok(false);
    }
    if path.is_file() {
        Ok(true)
    } else {
        Err(AcquireError::NotAFile {
            path: path.to_owned(),
        })
    }
}

fn create_parent(path: &Utf8Path) -> Result<(), AcquireError> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| {
                AcquireError::Download(DownloadError::Io {
                    path: parent.to_string(),
                    source,
                })
            })
        }
        _ => Ok(()),
    }
}
