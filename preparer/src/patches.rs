//! Assembly of the patch series from layered resource directories.
//!
//! The common `patches/` tree is copied into the output directory and the
//! platform `patches/` tree is copied over it. The two `patch_order` files
//! are concatenated, common first, into a single order file that replaces
//! the copied placeholders.

use crate::substitution::{
    RuleSet, SubstitutionError, SubstitutionOptions, SubstitutionReport, substitute_files,
};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use sourceprep_common::{PATCH_ORDER, PATCHES_DIR, ResourceError, ResourceLayout};
use std::io;

/// File extension of patch files subjected to domain substitution.
const PATCH_EXTENSION: &str = "patch";

/// Errors arising from patch assembly.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// A patch order file could not be read.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A patch directory could not be walked.
    #[error("failed to walk {root}: {source}")]
    Walk {
        /// The directory being copied.
        root: Utf8PathBuf,
        /// Underlying traversal error.
        #[source]
        source: walkdir::Error,
    },

    /// A patch directory contains a path that is not UTF-8.
    #[error("non UTF-8 path under {root}")]
    NonUtf8Path {
        /// The directory being copied.
        root: Utf8PathBuf,
    },

    /// Copying, removing or writing a file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// The destination path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Domain substitution over the assembled patches failed.
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),
}

/// An assembled patch series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSeries {
    /// Patch file names in application order.
    pub order: Vec<String>,
    /// Directory holding the patches and the order file.
    pub output_dir: Utf8PathBuf,
}

impl PatchSeries {
    /// Returns the path of the written order file.
    #[must_use]
    pub fn order_file(&self) -> Utf8PathBuf {
        self.output_dir.join(PATCH_ORDER)
    }

    /// Lists every `*.patch` file in the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::Walk`] or [`PatchError::NonUtf8Path`] when the
    /// directory cannot be traversed.
    pub fn patch_files(&self) -> Result<Vec<Utf8PathBuf>, PatchError> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.output_dir).sort_by_file_name() {
            let entry = entry.map_err(|source| PatchError::Walk {
                root: self.output_dir.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = utf8_path(&self.output_dir, entry.path())?;
            if path.extension() == Some(PATCH_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Runs domain substitution over every `*.patch` file without no-match
    /// warnings.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] when listing or rewriting a patch fails.
    pub fn substitute(
        &self,
        rules: &RuleSet,
        jobs: usize,
    ) -> Result<SubstitutionReport, PatchError> {
        let report = substitute_files(
            rules,
            self.patch_files()?,
            SubstitutionOptions {
                warn_on_no_match: false,
                jobs,
            },
        )?;
        debug!("{} substitutions across patch files", report.total());
        Ok(report)
    }
}

/// Assembles the patch series from `layout` into `output_dir`.
///
/// # Errors
///
/// Returns [`PatchError::Resource`] when the common patch order is missing
/// and [`PatchError`] variants for copy failures.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use sourceprep_common::ResourceLayout;
/// use sourceprep_preparer::patches::assemble_patches;
///
/// let layout = ResourceLayout::new("resources/common", Some("resources/linux".into()));
/// let series = assemble_patches(&layout, Utf8Path::new("out/patches"))?;
/// println!("{} patches", series.order.len());
/// # Ok::<(), sourceprep_preparer::patches::PatchError>(())
/// ```
pub fn assemble_patches(
    layout: &ResourceLayout,
    output_dir: &Utf8Path,
) -> Result<PatchSeries, PatchError> {
    let order_resource = format!("{PATCHES_DIR}/{PATCH_ORDER}");
    let order = layout.read_list(&order_resource)?;

    copy_tree(&layout.common_dir().join(PATCHES_DIR), output_dir)?;
    if let Some(platform) = layout.platform_dir() {
        let platform_patches = platform.join(PATCHES_DIR);
        if platform_patches.is_dir() {
            copy_tree(&platform_patches, output_dir)?;
        }
    }

    let order_file = output_dir.join(PATCH_ORDER);
    if order_file.symlink_metadata().is_ok() {
        std::fs::remove_file(&order_file).map_err(|source| PatchError::Io {
            path: order_file.clone(),
            source,
        })?;
    }
    let mut contents = String::new();
    for name in &order {
        contents.push_str(name);
        contents.push('\n');
    }
    std::fs::write(&order_file, contents).map_err(|source| PatchError::Io {
        path: order_file.clone(),
        source,
    })?;

    info!("Assembled {} patches into {output_dir}", order.len());
    Ok(PatchSeries {
        order,
        output_dir: output_dir.to_owned(),
    })
}

/// Copies the contents of `from` into `to`, overwriting existing files.
fn copy_tree(from: &Utf8Path, to: &Utf8Path) -> Result<(), PatchError> {
    for entry in walkdir::WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|source| PatchError::Walk {
            root: from.to_owned(),
            source,
        })?;
        let source = utf8_path(from, entry.path())?;
        let relative = source.strip_prefix(from).unwrap_or(&source);
        let dest = to.join(relative);
        let io_error = |err| PatchError::Io {
            path: dest.clone(),
            source: err,
        };
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(io_error)?;
        } else {
            std::fs::copy(&source, &dest).map_err(io_error)?;
        }
    }
    debug!("copied {from} into {to}");
    Ok(())
}

fn utf8_path(root: &Utf8Path, path: &std::path::Path) -> Result<Utf8PathBuf, PatchError> {
    Utf8PathBuf::try_from(path.to_path_buf()).map_err(|_| PatchError::NonUtf8Path {
        root: root.to_owned(),
    })
}
