//! Applies a [`RuleSet`] to a stream of files.
//!
//! Each file is read whole, rewritten only when at least one rule matched,
//! and otherwise left untouched. The first failure stops the batch. With
//! more than one job, paths are fed through a bounded channel to scoped
//! worker threads and a shared flag stops the rest once any worker fails.

use super::rules::RuleSet;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Paths queued per worker before the feeder blocks.
const QUEUE_DEPTH_PER_JOB: usize = 4;

/// Options for one substitution batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubstitutionOptions {
    /// Warn about files in which no rule matched.
    pub warn_on_no_match: bool,
    /// Number of worker threads; `0` and `1` run sequentially.
    pub jobs: usize,
}

/// Caps a requested job count at the parallelism the host reports.
#[must_use]
pub fn clamp_jobs(jobs: usize) -> usize {
    let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    jobs.min(available)
}

impl Default for SubstitutionOptions {
    fn default() -> Self {
        Self {
            warn_on_no_match: true,
            jobs: 1,
        }
    }
}

/// A failure on one file, which aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file being processed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The rewritten content could not be written back.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The file being processed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl SubstitutionError {
    /// Returns the file the error refers to.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Read { path, .. } | Self::Write { path, .. } => path,
        }
    }
}

/// Substitution count for one file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileSubstitution {
    /// The processed file.
    pub path: Utf8PathBuf,
    /// Replacements made across all rules.
    pub count: usize,
}

/// Outcome of a substitution batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionReport {
    /// Every processed file, sorted by path.
    pub files: Vec<FileSubstitution>,
}

impl SubstitutionReport {
    /// Total replacements across the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.files.iter().map(|file| file.count).sum()
    }

    /// Files that were rewritten.
    pub fn modified(&self) -> impl Iterator<Item = &FileSubstitution> {
        self.files.iter().filter(|file| file.count > 0)
    }

    /// Files in which no rule matched.
    pub fn unmatched(&self) -> impl Iterator<Item = &Utf8Path> {
        self.files
            .iter()
            .filter(|file| file.count == 0)
            .map(|file| file.path.as_path())
    }

    /// Returns the count recorded for `path`, if it was processed.
    #[must_use]
    pub fn count_for(&self, path: &Utf8Path) -> Option<usize> {
        self.files
            .binary_search_by(|file| file.path.as_path().cmp(path))
            .ok()
            .and_then(|index| self.files.get(index))
            .map(|file| file.count)
    }
}

/// Applies `rules` to one file, returning the number of replacements.
///
/// The file is only written when the count is non-zero.
///
/// # Errors
///
/// Returns [`SubstitutionError`] when the file cannot be read or written.
pub fn substitute_file(
    rules: &RuleSet,
    path: &Utf8Path,
    warn_on_no_match: bool,
) -> Result<usize, SubstitutionError> {
    let content = std::fs::read(path).map_err(|source| SubstitutionError::Read {
        path: path.to_owned(),
        source,
    })?;
    let (output, count) = rules.apply(content);
    if count == 0 {
        if warn_on_no_match {
            warn!("File has no matches: {path}");
        }
        return Ok(0);
    }
    std::fs::write(path, output).map_err(|source| SubstitutionError::Write {
        path: path.to_owned(),
        source,
    })?;
    debug!("{path}: {count} substitutions");
    Ok(count)
}

/// Applies `rules` to every path produced by `paths`.
///
/// Paths are consumed lazily. The batch stops at the first error.
///
/// # Errors
///
/// Returns the first [`SubstitutionError`] raised by any file.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use sourceprep_preparer::substitution::{RuleSet, SubstitutionOptions, substitute_files};
///
/// let dir = tempfile::tempdir().unwrap();
/// let file = Utf8PathBuf::try_from(dir.path().join("a.cc")).unwrap();
/// std::fs::write(&file, "foo").unwrap();
///
/// let rules = RuleSet::parse(&["foo#bar"]).unwrap();
/// let report = substitute_files(&rules, [file.clone()], SubstitutionOptions::default()).unwrap();
/// assert_eq!(report.total(), 1);
/// assert_eq!(std::fs::read_to_string(&file).unwrap(), "bar");
/// ```
pub fn substitute_files<I>(
    rules: &RuleSet,
    paths: I,
    options: SubstitutionOptions,
) -> Result<SubstitutionReport, SubstitutionError>
where
    I: IntoIterator<Item = Utf8PathBuf>,
{
    let options = SubstitutionOptions {
        jobs: clamp_jobs(options.jobs),
        ..options
    };
    let mut files = if options.jobs > 1 {
        substitute_parallel(rules, paths, options)?
    } else {
        paths
            .into_iter()
            .map(|path| {
                let count = substitute_file(rules, &path, options.warn_on_no_match)?;
                Ok(FileSubstitution { path, count })
            })
            .collect::<Result<Vec<_>, SubstitutionError>>()?
    };
    files.sort();
    Ok(SubstitutionReport { files })
}

fn substitute_parallel<I>(
    rules: &RuleSet,
    paths: I,
    options: SubstitutionOptions,
) -> Result<Vec<FileSubstitution>, SubstitutionError>
where
    I: IntoIterator<Item = Utf8PathBuf>,
{
    let cancelled = AtomicBool::new(false);
    let first_error: Mutex<Option<SubstitutionError>> = Mutex::new(None);
    let results: Mutex<Vec<FileSubstitution>> = Mutex::new(Vec::new());
    let (sender, receiver) =
        crossbeam_channel::bounded::<Utf8PathBuf>(options.jobs.saturating_mul(QUEUE_DEPTH_PER_JOB));

    std::thread::scope(|scope| {
        for _ in 0..options.jobs {
            let receiver = receiver.clone();
            let (cancelled, first_error, results) = (&cancelled, &first_error, &results);
            scope.spawn(move || {
                for path in receiver {
                    if cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    match substitute_file(rules, &path, options.warn_on_no_match) {
                        Ok(count) => results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(FileSubstitution { path, count }),
                        Err(err) => {
                            cancelled.store(true, Ordering::Release);
                            first_error
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .get_or_insert(err);
                            break;
                        }
                    }
                }
            });
        }
        drop(receiver);

        for path in paths {
            if cancelled.load(Ordering::Acquire) || sender.send(path).is_err() {
                break;
            }
        }
        drop(sender);
    });

    if let Some(err) = first_error
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
    {
        return Err(err);
    }
    Ok(results.into_inner().unwrap_or_else(PoisonError::into_inner))
}
