//! Test fixtures shared by unit and behaviour tests.
//!
//! Available under `cfg(test)` or with the `test-support` feature.

#![expect(
    clippy::expect_used,
    reason = "fixtures abort the test on setup failure"
)]

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use tempfile::TempDir;

/// Creates a temporary directory and returns it with its UTF-8 path.
///
/// # Panics
///
/// Panics if the directory cannot be created or its path is not UTF-8.
#[must_use]
pub fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 temp dir");
    (dir, path)
}

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    crate::source::hashes::to_hex(&Sha256::digest(bytes))
}

/// Writes `contents` to `root/relative`, creating parent directories.
///
/// # Panics
///
/// Panics on I/O failure.
pub fn write_file(root: &Utf8Path, relative: &str, contents: impl AsRef<[u8]>) -> Utf8PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directories");
    }
    std::fs::write(&path, contents).expect("write fixture file");
    path
}

/// Compression applied to a fixture archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FixtureCompression {
    /// Uncompressed tar.
    None,
    /// xz, as served by the upstream mirror.
    #[default]
    Xz,
    /// gzip.
    Gzip,
    /// zstd.
    Zstd,
}

#[derive(Debug, Clone)]
enum FixtureEntry {
    File { path: String, contents: Vec<u8>, mode: u32 },
    Dir { path: String },
    Symlink { path: String, target: String },
    HardLink { path: String, target: String },
    PaxGlobalHeader { records: String },
}

/// Builder for small tar archives with arbitrary member names.
///
/// Member names are written verbatim into the header so that hostile names
/// (absolute paths, `..` components) can be produced.
///
/// # Examples
///
/// ```
/// use sourceprep_preparer::test_utils::{ArchiveFixture, utf8_temp_dir};
///
/// let (_dir, root) = utf8_temp_dir();
/// let archive = root.join("chromium-1.0.tar.xz");
/// ArchiveFixture::new()
///     .dir("chromium-1.0/")
///     .file("chromium-1.0/a/b.txt", "b")
///     .write_to(&archive)
///     .unwrap();
/// assert!(archive.exists());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArchiveFixture {
    entries: Vec<FixtureEntry>,
    compression: FixtureCompression,
}

impl ArchiveFixture {
    /// Starts an empty xz-compressed archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an archive rooted at `prefix` holding `files` as
    /// `(relative path, contents)` pairs.
    #[must_use]
    pub fn rooted<'a>(prefix: &str, files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        files
            .into_iter()
            .fold(Self::new().dir(&format!("{prefix}/")), |fixture, (path, contents)| {
                fixture.file(&format!("{prefix}/{path}"), contents)
            })
    }

    /// Selects the compression.
    #[must_use]
    pub fn compression(mut self, compression: FixtureCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Adds a regular file with mode `0644`.
    #[must_use]
    pub fn file(self, path: &str, contents: impl AsRef<[u8]>) -> Self {
        self.file_with_mode(path, contents, 0o644)
    }

    /// Adds a regular file with an explicit mode.
    #[must_use]
    pub fn file_with_mode(mut self, path: &str, contents: impl AsRef<[u8]>, mode: u32) -> Self {
        self.entries.push(FixtureEntry::File {
            path: path.to_owned(),
            contents: contents.as_ref().to_vec(),
            mode,
        });
        self
    }

    /// Adds a directory.
    #[must_use]
    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(FixtureEntry::Dir {
            path: path.to_owned(),
        });
        self
    }

    /// Adds a symbolic link.
    #[must_use]
    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.entries.push(FixtureEntry::Symlink {
            path: path.to_owned(),
            target: target.to_owned(),
        });
        self
    }

    /// Adds a hard link to an earlier member.
    #[must_use]
    pub fn hard_link(mut self, path: &str, target: &str) -> Self {
        self.entries.push(FixtureEntry::HardLink {
            path: path.to_owned(),
            target: target.to_owned(),
        });
        self
    }

    /// Adds a pax global header carrying a `comment` record, as written by
    /// `git archive`.
    #[must_use]
    pub fn pax_global_header(mut self, comment: &str) -> Self {
        self.entries.push(FixtureEntry::PaxGlobalHeader {
            records: pax_record("comment", comment),
        });
        self
    }

    /// Writes the archive to `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the archive cannot be written or a member
    /// name exceeds the 100-byte header field.
    pub fn write_to(&self, path: &Utf8Path) -> io::Result<()> {
        let file = File::create(path)?;
        match self.compression {
            FixtureCompression::None => {
                self.write_tar(file)?;
            }
            FixtureCompression::Xz => {
                self.write_tar(xz2::write::XzEncoder::new(file, 6))?.finish()?;
            }
            FixtureCompression::Gzip => {
                self.write_tar(flate2::write::GzEncoder::new(
                    file,
                    flate2::Compression::default(),
                ))?
                .finish()?;
            }
            FixtureCompression::Zstd => {
                self.write_tar(zstd::Encoder::new(file, 0)?)?.finish()?;
            }
        }
        Ok(())
    }

    fn write_tar<W: Write>(&self, writer: W) -> io::Result<W> {
        let mut builder = tar::Builder::new(writer);
        for entry in &self.entries {
            let mut header = tar::Header::new_gnu();
            header.set_mtime(0);
            let (name, data): (&str, &[u8]) = match entry {
                FixtureEntry::File {
                    path,
                    contents,
                    mode,
                } => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(*mode);
                    (path.as_str(), contents.as_slice())
                }
                FixtureEntry::Dir { path } => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(0o755);
                    (path.as_str(), &[][..])
                }
                FixtureEntry::Symlink { path, target } => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_mode(0o777);
                    copy_field(&mut header.as_old_mut().linkname, target)?;
                    (path.as_str(), &[][..])
                }
                FixtureEntry::HardLink { path, target } => {
                    header.set_entry_type(tar::EntryType::Link);
                    header.set_mode(0o644);
                    copy_field(&mut header.as_old_mut().linkname, target)?;
                    (path.as_str(), &[][..])
                }
                FixtureEntry::PaxGlobalHeader { records } => {
                    header.set_entry_type(tar::EntryType::XGlobalHeader);
                    header.set_mode(0o666);
                    ("pax_global_header", records.as_bytes())
                }
            };
            copy_field(&mut header.as_old_mut().name, name)?;
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append(&header, data)?;
        }
        builder.into_inner()
    }
}

/// Formats one pax record, whose length prefix counts itself.
fn pax_record(key: &str, value: &str) -> String {
    let body = format!(" {key}={value}\n");
    let mut length = body.len();
    while length.to_string().len() + body.len() != length {
        length = length.to_string().len() + body.len();
    }
    format!("{length}{body}")
}

fn copy_field(field: &mut [u8; 100], value: &str) -> io::Result<()> {
    let bytes = value.as_bytes();
    let slot = field.get_mut(..bytes.len()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("name too long: {value}"))
    })?;
    slot.copy_from_slice(bytes);
    Ok(())
}

/// Lists every regular file and symlink under `root` as sorted POSIX paths,
/// ignoring the `.sourceprep` metadata directory.
///
/// # Panics
///
/// Panics if the tree cannot be walked.
#[must_use]
pub fn list_tree(root: &Utf8Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".sourceprep")
        .map(|entry| entry.expect("walk tree"))
        .filter(|entry| !entry.file_type().is_dir())
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).expect("under root");
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}
