//! Denylist-aware streaming extraction of the upstream source archive.
//!
//! Entries are read one at a time from the tar stream, stripped of the
//! `<product>-<version>` root directory and either skipped (when their
//! relative path is on the denylist) or written under the sandbox root. No
//! member list is kept; the report only carries counts and the skipped
//! denylist entries.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use sourceprep::MissingEntryPolicy;
use sourceprep_common::{PathError, posix_relative, to_posix_string};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::{Mutex, PoisonError};

const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];
/// Link hops followed before a chain is treated as a loop.
const MAX_LINK_HOPS: usize = 40;

/// Denylist entries not yet observed in the archive.
///
/// Removal is guarded by a mutex so one set can be shared between threads.
///
/// # Examples
///
/// ```
/// use sourceprep_preparer::source::extraction::PendingDenylist;
///
/// let denylist = PendingDenylist::new(["a/b.txt", "c/d.txt"]);
/// assert!(denylist.take("a/b.txt"));
/// assert!(!denylist.take("a/b.txt"));
/// assert_eq!(denylist.into_remaining(), vec!["c/d.txt".to_owned()]);
/// ```
#[derive(Debug, Default)]
pub struct PendingDenylist {
    entries: Mutex<BTreeSet<String>>,
}

impl PendingDenylist {
    /// Builds a denylist from relative POSIX paths. Duplicates collapse.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns the number of entries not yet taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when every entry has been taken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes `path` if present, returning whether it was listed.
    pub fn take(&self, path: &str) -> bool {
        self.lock().remove(path)
    }

    /// Consumes the set, returning the entries never taken in sorted order.
    #[must_use]
    pub fn into_remaining(self) -> Vec<String> {
        self.entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Summary of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Number of entries written to the sandbox.
    pub extracted: usize,
    /// Denylisted entries skipped, in archive order.
    pub skipped: Vec<String>,
    /// Denylist entries the archive never contained, sorted.
    pub missing: Vec<String>,
}

/// Why a single archive member could not be extracted.
#[derive(Debug, thiserror::Error)]
pub enum MemberError {
    /// The member path is not valid UTF-8.
    #[error("path is not valid UTF-8")]
    NonUtf8,

    /// The member does not live under the expected root directory.
    #[error("entry is outside the `{prefix}` root directory")]
    OutsidePrefix {
        /// The expected root directory.
        prefix: String,
    },

    /// The member path is absolute or climbs out of its root.
    #[error(transparent)]
    UnsafePath(#[from] PathError),

    /// A symbolic link points outside the sandbox.
    #[error("symbolic link target `{target}` escapes the sandbox")]
    SymlinkEscape {
        /// The link target as stored in the archive.
        target: String,
    },

    /// The member would be written through a link that leaves the sandbox.
    #[error("destination `{path}` resolves outside the sandbox")]
    EscapingDestination {
        /// The resolved destination directory.
        path: Utf8PathBuf,
    },

    /// A link entry carries no target.
    #[error("link entry has no target")]
    MissingLinkTarget,

    /// Writing the member failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The archive or sandbox could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// The path being opened.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The tar stream itself is corrupt or truncated.
    #[error("failed to read archive {archive}: {source}")]
    Read {
        /// The archive being read.
        archive: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// One member could not be extracted; extraction stopped there.
    #[error("failed to extract {path}: {source}")]
    Member {
        /// The member path as stored in the archive.
        path: String,
        /// What went wrong.
        #[source]
        source: MemberError,
    },

    /// None of the denylist entries appeared in the archive.
    #[error("none of the {count} cleaning list entries were found in the archive")]
    AllEntriesMissing {
        /// Size of the denylist.
        count: usize,
    },
}

/// Trait for extracting a source archive into a sandbox, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait SourceExtractor {
    /// Extract `archive` under `sandbox_root`, stripping the `prefix` root
    /// directory and skipping every entry on `denylist`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] when the archive cannot be read, a member
    /// cannot be extracted safely, or the missing-entry policy is violated.
    fn extract(
        &self,
        archive: &Utf8Path,
        sandbox_root: &Utf8Path,
        prefix: &str,
        denylist: PendingDenylist,
    ) -> Result<ExtractionReport, ExtractionError>;
}

/// Tar extractor supporting plain, xz, gzip and zstd archives.
///
/// # Examples
///
/// ```
/// use sourceprep::MissingEntryPolicy;
/// use sourceprep_preparer::source::extraction::TarExtractor;
///
/// let extractor = TarExtractor::new(MissingEntryPolicy::Warn);
/// // Use extractor.extract(archive, sandbox, prefix, denylist) in production
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TarExtractor {
    missing_entries: MissingEntryPolicy,
}

impl TarExtractor {
    /// Creates an extractor applying `missing_entries` after the stream ends.
    #[must_use]
    pub const fn new(missing_entries: MissingEntryPolicy) -> Self {
        Self { missing_entries }
    }
}

impl SourceExtractor for TarExtractor {
    fn extract(
        &self,
        archive: &Utf8Path,
        sandbox_root: &Utf8Path,
        prefix: &str,
        denylist: PendingDenylist,
    ) -> Result<ExtractionReport, ExtractionError> {
        let listed = denylist.len();
        let file = File::open(archive).map_err(|source| ExtractionError::Open {
            path: archive.to_owned(),
            source,
        })?;
        let reader = decompressor(BufReader::new(file)).map_err(|source| ExtractionError::Read {
            archive: archive.to_owned(),
            source,
        })?;
        std::fs::create_dir_all(sandbox_root).map_err(|source| ExtractionError::Open {
            path: sandbox_root.to_owned(),
            source,
        })?;
        let root = sandbox_root
            .canonicalize_utf8()
            .map_err(|source| ExtractionError::Open {
                path: sandbox_root.to_owned(),
                source,
            })?;

        let mut writer = SandboxWriter::new(root);
        let mut report = ExtractionReport::default();
        let mut tar = tar::Archive::new(reader);
        tar.set_preserve_permissions(true);
        tar.set_preserve_mtime(true);
        tar.set_overwrite(true);

        let entries = tar.entries().map_err(|source| ExtractionError::Read {
            archive: archive.to_owned(),
            source,
        })?;
        for entry_result in entries {
            let mut entry = entry_result.map_err(|source| ExtractionError::Read {
                archive: archive.to_owned(),
                source,
            })?;
            let raw_path = entry.path_bytes().into_owned();
            let member_error = |source: MemberError| ExtractionError::Member {
                path: String::from_utf8_lossy(&raw_path).into_owned(),
                source,
            };

            if matches!(
                entry.header().entry_type(),
                tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
            ) {
                debug!("skipping pax header {}", String::from_utf8_lossy(&raw_path));
                continue;
            }

            let name =
                std::str::from_utf8(&raw_path).map_err(|_| member_error(MemberError::NonUtf8))?;
            let Some(relative) = strip_root(name, prefix).map_err(member_error)? else {
                continue;
            };
            let key = to_posix_string(&relative);
            if denylist.take(&key) {
                debug!("skipping cleaning list entry {key}");
                report.skipped.push(key);
                continue;
            }
            if writer
                .write(&mut entry, &relative, prefix)
                .map_err(member_error)?
            {
                report.extracted += 1;
            }
        }
        writer
            .recheck_links()
            .map_err(|(path, source)| ExtractionError::Member { path, source })?;

        report.missing = denylist.into_remaining();
        for entry in &report.missing {
            warn!("{entry}: not found in source archive");
        }
        if self.missing_entries == MissingEntryPolicy::FailWhenAllMissing
            && listed > 0
            && report.skipped.is_empty()
        {
            return Err(ExtractionError::AllEntriesMissing { count: listed });
        }
        Ok(report)
    }
}

/// Wraps `reader` in the decoder matching its leading magic bytes.
fn decompressor(mut reader: BufReader<File>) -> io::Result<Box<dyn Read>> {
    let header = reader.fill_buf()?;
    if header.starts_with(XZ_MAGIC) {
        debug!("detected xz compressed archive");
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    } else if header.starts_with(GZIP_MAGIC) {
        debug!("detected gzip compressed archive");
        Ok(Box::new(flate2::read::GzDecoder::new(reader)))
    } else if header.starts_with(ZSTD_MAGIC) {
        debug!("detected zstd compressed archive");
        Ok(Box::new(zstd::Decoder::with_buffer(reader)?))
    } else {
        Ok(Box::new(reader))
    }
}

/// Strips the archive root directory from `name`.
///
/// Returns `None` for the root directory entry itself.
fn strip_root(name: &str, prefix: &str) -> Result<Option<Utf8PathBuf>, MemberError> {
    let outside = || MemberError::OutsidePrefix {
        prefix: prefix.to_owned(),
    };
    let path = match posix_relative(name) {
        Ok(path) => path,
        Err(PathError::Empty) => return Err(outside()),
        Err(other) => return Err(other.into()),
    };
    let rest = path.strip_prefix(prefix).map_err(|_| outside())?;
    if rest.as_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(rest.to_owned()))
    }
}

/// Returns true when a symlink at `relative` pointing to `target` stays
/// within the sandbox, judged lexically.
fn symlink_target_is_contained(relative: &Utf8Path, target: &str) -> bool {
    if target.starts_with('/') {
        return false;
    }
    let mut depth = relative.components().count().saturating_sub(1);
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(parent) => depth = parent,
                None => return false,
            },
            _ => depth += 1,
        }
    }
    true
}

/// Resolves `target` against the real directory `base`, following every
/// symbolic link that already exists on disk. Components that do not exist
/// yet are taken literally.
fn resolve_on_disk(base: Utf8PathBuf, target: &str, hops: usize) -> io::Result<Utf8PathBuf> {
    let mut resolved = if target.starts_with('/') {
        Utf8PathBuf::from("/")
    } else {
        base
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            name => {
                resolved.push(name);
                if is_symlink(&resolved) {
                    let Some(next_hops) = hops.checked_sub(1) else {
                        let message = format!("too many levels of symbolic links at {resolved}");
                        return Err(io::Error::other(message));
                    };
                    let link = resolved.read_link_utf8()?;
                    resolved.pop();
                    resolved = resolve_on_disk(resolved, link.as_str(), next_hops)?;
                }
            }
        }
    }
    Ok(resolved)
}

/// Writes archive members below a canonical sandbox root.
struct SandboxWriter {
    root: Utf8PathBuf,
    verified_parent: Option<Utf8PathBuf>,
    links: Vec<WrittenLink>,
}

/// A symbolic link created during extraction.
struct WrittenLink {
    relative: Utf8PathBuf,
    dest: Utf8PathBuf,
}

impl SandboxWriter {
    fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            verified_parent: None,
            links: Vec::new(),
        }
    }

    /// Materializes `entry` at `relative`. Returns false for entry types
    /// that are not extracted.
    fn write<R: Read>(
        &mut self,
        entry: &mut tar::Entry<'_, R>,
        relative: &Utf8Path,
        prefix: &str,
    ) -> Result<bool, MemberError> {
        let dest = self.root.join(relative);
        if let Some(parent) = dest.parent() {
            self.ensure_parent(parent)?;
        }

        let entry_type = entry.header().entry_type();
        match entry_type {
            tar::EntryType::Directory => {
                if is_symlink(&dest) {
                    return Err(MemberError::EscapingDestination { path: dest });
                }
                entry.unpack(&dest)?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                remove_symlink(&dest)?;
                entry.unpack(&dest)?;
            }
            tar::EntryType::Symlink => {
                let target = link_target(entry)?;
                if !symlink_target_is_contained(relative, &target) {
                    return Err(MemberError::SymlinkEscape { target });
                }
                entry.unpack(&dest)?;
                let link = WrittenLink {
                    relative: relative.to_owned(),
                    dest,
                };
                self.check_link(&link)?;
                self.links.push(link);
            }
            tar::EntryType::Link => {
                let target = link_target(entry)?;
                let source = match strip_root(&target, prefix)? {
                    Some(source) => self.root.join(source),
                    None => return Err(MemberError::OutsidePrefix {
                        prefix: prefix.to_owned(),
                    }),
                };
                if let Some(parent) = source.parent() {
                    let resolved = parent.canonicalize_utf8()?;
                    if !resolved.starts_with(&self.root) {
                        return Err(MemberError::EscapingDestination { path: resolved });
                    }
                }
                if dest.symlink_metadata().is_ok() {
                    std::fs::remove_file(&dest)?;
                }
                std::fs::hard_link(&source, &dest)?;
            }
            other => {
                warn!("{relative}: unsupported entry type {other:?}; skipped");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Follows `link` through the links already on disk and removes it when
    /// it leads outside the sandbox.
    fn check_link(&self, link: &WrittenLink) -> Result<(), MemberError> {
        if !is_symlink(&link.dest) {
            return Ok(());
        }
        let target = link.dest.read_link_utf8()?;
        let base = link.dest.parent().unwrap_or(self.root.as_path()).canonicalize_utf8()?;
        if resolve_on_disk(base, target.as_str(), MAX_LINK_HOPS)?.starts_with(&self.root) {
            return Ok(());
        }
        std::fs::remove_file(&link.dest)?;
        Err(MemberError::SymlinkEscape {
            target: target.into_string(),
        })
    }

    /// Checks every written link again once the whole tree exists. A later
    /// link can change where an earlier one leads.
    fn recheck_links(&self) -> Result<(), (String, MemberError)> {
        for link in &self.links {
            self.check_link(link)
                .map_err(|source| (to_posix_string(&link.relative), source))?;
        }
        Ok(())
    }

    /// Creates `parent` and checks that it resolves inside the sandbox.
    fn ensure_parent(&mut self, parent: &Utf8Path) -> Result<(), MemberError> {
        if self.verified_parent.as_deref() == Some(parent) {
            return Ok(());
        }
        std::fs::create_dir_all(parent)?;
        let resolved = parent.canonicalize_utf8()?;
        if !resolved.starts_with(&self.root) {
            return Err(MemberError::EscapingDestination { path: resolved });
        }
        self.verified_parent = Some(parent.to_owned());
        Ok(())
    }
}

fn link_target<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String, MemberError> {
    let bytes = entry
        .link_name_bytes()
        .ok_or(MemberError::MissingLinkTarget)?
        .into_owned();
    String::from_utf8(bytes).map_err(|_| MemberError::NonUtf8)
}

fn is_symlink(path: &Utf8Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|metadata| metadata.file_type().is_symlink())
}

/// Removes a symlink at `path` so a regular file is never written through it.
fn remove_symlink(path: &Utf8Path) -> io::Result<()> {
    if is_symlink(path) {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;
