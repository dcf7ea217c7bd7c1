//! Layered list resources.
//!
//! Resource lists live in a common directory and may be extended by a
//! platform directory with the same layout. Loading a list reads the common
//! file and appends the platform file when present; blank lines are dropped
//! and duplicates are kept, because patch order depends on position.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use thiserror::Error;

/// Paths excluded from archive extraction.
pub const CLEANING_LIST: &str = "cleaning_list";
/// `pattern#replacement` rules for domain substitution.
pub const DOMAIN_REGEX_LIST: &str = "domain_regex_list";
/// Sandbox files domain substitution is applied to.
pub const DOMAIN_SUBSTITUTION_LIST: &str = "domain_substitution_list";
/// Extra flags handed to the external build stage.
pub const BUILD_FLAGS: &str = "build_flags";
/// Directory holding patch files and the patch order.
pub const PATCHES_DIR: &str = "patches";
/// File naming patches in application order.
pub const PATCH_ORDER: &str = "patch_order";

/// Errors raised while loading resource lists.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A required resource file does not exist.
    #[error("resource not found: {path}")]
    NotFound {
        /// Expected location of the resource.
        path: Utf8PathBuf,
    },

    /// A resource file exists but could not be read.
    #[error("failed to read resource {path}: {source}")]
    Read {
        /// Location of the resource.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A text resource is not valid UTF-8.
    #[error("resource {path} is not valid UTF-8")]
    NotUtf8 {
        /// Location of the resource.
        path: Utf8PathBuf,
    },
}

/// The common resource directory plus an optional platform overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    common: Utf8PathBuf,
    platform: Option<Utf8PathBuf>,
}

impl ResourceLayout {
    /// Creates a layout from the common directory and an optional overlay.
    #[must_use]
    pub fn new(common: impl Into<Utf8PathBuf>, platform: Option<Utf8PathBuf>) -> Self {
        Self {
            common: common.into(),
            platform,
        }
    }

    /// Returns the common resource directory.
    #[must_use]
    pub fn common_dir(&self) -> &Utf8Path {
        &self.common
    }

    /// Returns the platform overlay directory, if configured.
    #[must_use]
    pub fn platform_dir(&self) -> Option<&Utf8Path> {
        self.platform.as_deref()
    }

    /// Loads the text list `name`: common lines followed by platform lines.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] when the common file is missing,
    /// [`ResourceError::Read`] on I/O failure and
    /// [`ResourceError::NotUtf8`] for non-text content.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sourceprep_common::{CLEANING_LIST, ResourceLayout};
    ///
    /// let layout = ResourceLayout::new("resources/common", None);
    /// let denylist = layout.read_list(CLEANING_LIST)?;
    /// # Ok::<(), sourceprep_common::ResourceError>(())
    /// ```
    pub fn read_list(&self, name: &str) -> Result<Vec<String>, ResourceError> {
        self.read_layered(name, |path, bytes| {
            let text = String::from_utf8(bytes).map_err(|_| ResourceError::NotUtf8 {
                path: path.to_owned(),
            })?;
            Ok(parse_lines(&text))
        })
    }

    /// Loads the list `name` as raw byte lines.
    ///
    /// Used for the regex list, whose patterns may contain bytes that are not
    /// valid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] when the common file is missing and
    /// [`ResourceError::Read`] on I/O failure.
    pub fn read_byte_list(&self, name: &str) -> Result<Vec<Vec<u8>>, ResourceError> {
        self.read_layered(name, |_, bytes| Ok(parse_byte_lines(&bytes)))
    }

    fn read_layered<T>(
        &self,
        name: &str,
        parse: impl Fn(&Utf8Path, Vec<u8>) -> Result<Vec<T>, ResourceError>,
    ) -> Result<Vec<T>, ResourceError> {
        let common_path = self.common.join(name);
        let bytes = read_required(&common_path)?;
        let mut lines = parse(&common_path, bytes)?;

        if let Some(platform) = &self.platform {
            let platform_path = platform.join(name);
            if platform_path.is_file() {
                let bytes = read_required(&platform_path)?;
                lines.extend(parse(&platform_path, bytes)?);
                debug!("appended platform list {platform_path}");
            }
        }
        Ok(lines)
    }
}

fn read_required(path: &Utf8Path) -> Result<Vec<u8>, ResourceError> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ResourceError::NotFound {
                path: path.to_owned(),
            }
        } else {
            ResourceError::Read {
                path: path.to_owned(),
                source,
            }
        }
    })
}

/// Splits text into its non-blank lines.
///
/// Lines are split on `\n` with a trailing `\r` removed. Whitespace inside a
/// line is preserved.
///
/// # Examples
///
/// ```
/// use sourceprep_common::parse_lines;
///
/// assert_eq!(parse_lines("a\r\n\nb\n"), vec!["a", "b"]);
/// ```
#[must_use]
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Splits bytes into non-empty lines, matching [`parse_lines`].
#[must_use]
pub fn parse_byte_lines(bytes: &[u8]) -> Vec<Vec<u8>> {
    bytes
        .split(|byte| *byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Dirs {
        _temp: TempDir,
        common: Utf8PathBuf,
        platform: Utf8PathBuf,
    }

    #[fixture]
    fn dirs() -> Dirs {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        let common = root.join("common");
        let platform = root.join("linux");
        std::fs::create_dir_all(&common).expect("create common");
        std::fs::create_dir_all(&platform).expect("create platform");
        Dirs {
            _temp: temp,
            common,
            platform,
        }
    }

    #[rstest]
    fn platform_lines_follow_common_lines(dirs: Dirs) {
        std::fs::write(dirs.common.join(CLEANING_LIST), "a/b.txt\n\nc/d.txt\n").expect("write");
        std::fs::write(dirs.platform.join(CLEANING_LIST), "e/f.txt\na/b.txt\n").expect("write");

        let layout = ResourceLayout::new(dirs.common.clone(), Some(dirs.platform.clone()));
        let list = layout.read_list(CLEANING_LIST).expect("list");

        assert_eq!(list, vec!["a/b.txt", "c/d.txt", "e/f.txt", "a/b.txt"]);
    }

    #[rstest]
    fn missing_platform_file_is_skipped(dirs: Dirs) {
        std::fs::write(dirs.common.join(BUILD_FLAGS), "is_debug=false\n").expect("write");

        let layout = ResourceLayout::new(dirs.common.clone(), Some(dirs.platform.clone()));
        let list = layout.read_list(BUILD_FLAGS).expect("list");

        assert_eq!(list, vec!["is_debug=false"]);
    }

    #[rstest]
    fn missing_common_file_is_an_error(dirs: Dirs) {
        let layout = ResourceLayout::new(dirs.common.clone(), None);
        let err = layout.read_list(CLEANING_LIST).expect_err("missing list");
        assert!(matches!(err, ResourceError::NotFound { path } if path.ends_with(CLEANING_LIST)));
    }

    #[rstest]
    fn byte_lists_keep_non_utf8_content(dirs: Dirs) {
        std::fs::write(dirs.common.join(DOMAIN_REGEX_LIST), b"\xffgoogle#\xfegoogle\r\n\n")
            .expect("write");

        let layout = ResourceLayout::new(dirs.common.clone(), None);
        let list = layout.read_byte_list(DOMAIN_REGEX_LIST).expect("list");

        assert_eq!(list, vec![b"\xffgoogle#\xfegoogle".to_vec()]);
    }

    #[rstest]
    fn text_lists_reject_non_utf8_content(dirs: Dirs) {
        std::fs::write(dirs.common.join(CLEANING_LIST), b"\xff\n").expect("write");

        let layout = ResourceLayout::new(dirs.common.clone(), None);
        let err = layout.read_list(CLEANING_LIST).expect_err("invalid UTF-8");
        assert!(matches!(err, ResourceError::NotUtf8 { .. }));
    }
}
