//! Conversion of POSIX-style relative paths from resource lists and archives
//! into native sandbox-relative paths.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Errors raised for paths that cannot be confined to a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path is empty or consists only of `.` components.
    #[error("empty relative path")]
    Empty,

    /// The path is absolute.
    #[error("absolute path not allowed: {path}")]
    Absolute {
        /// The rejected path.
        path: String,
    },

    /// The path contains a `..` component.
    #[error("parent directory component not allowed: {path}")]
    ParentComponent {
        /// The rejected path.
        path: String,
    },
}

/// Parses a `/`-separated relative path into a native relative path.
///
/// `.` components and repeated separators are dropped. Absolute paths and
/// `..` components are rejected so the result can be joined onto a sandbox
/// root without escaping it.
///
/// # Errors
///
/// Returns [`PathError`] when the path is empty, absolute, or climbs out of
/// its root.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use sourceprep_common::posix_relative;
///
/// let path = posix_relative("chrome/./browser//about.cc").unwrap();
/// assert_eq!(path, Utf8PathBuf::from_iter(["chrome", "browser", "about.cc"]));
/// assert!(posix_relative("../etc/passwd").is_err());
/// ```
pub fn posix_relative(path: &str) -> Result<Utf8PathBuf, PathError> {
    if path.starts_with('/') {
        return Err(PathError::Absolute {
            path: path.to_owned(),
        });
    }
    let mut native = Utf8PathBuf::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(PathError::ParentComponent {
                    path: path.to_owned(),
                });
            }
            normal => native.push(normal),
        }
    }
    if native.as_str().is_empty() {
        return Err(PathError::Empty);
    }
    Ok(native)
}

/// Renders a relative path with `/` separators regardless of platform.
///
/// Only normal components are kept; this is the form denylist entries are
/// written in.
#[must_use]
pub fn to_posix_string(path: &Utf8Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Utf8Component::Normal(segment) => Some(segment),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
