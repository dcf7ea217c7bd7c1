//! Naming policy for upstream source archives.
//!
//! Every file name and URL is derived from the product and version:
//! `<product>-<version>.tar.xz` for the archive, the same name with a
//! `.hashes` suffix for its manifest, and `<product>-<version>` for the single
//! top-level directory inside the archive.

use std::fmt;

/// The archive file extension served by the upstream mirror.
const ARCHIVE_EXTENSION: &str = ".tar.xz";

/// The suffix appended to the archive name for its hash manifest.
const HASHES_SUFFIX: &str = ".hashes";

/// A product/version pair naming one upstream source release.
///
/// # Examples
///
/// ```
/// use sourceprep_preparer::source::naming::SourceName;
///
/// let name = SourceName::new("chromium", "55.0.2883.75");
/// assert_eq!(name.root_prefix(), "chromium-55.0.2883.75");
/// assert_eq!(name.archive_filename(), "chromium-55.0.2883.75.tar.xz");
/// assert_eq!(name.hashes_filename(), "chromium-55.0.2883.75.tar.xz.hashes");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceName {
    product: String,
    version: String,
}

impl SourceName {
    /// Creates a source name.
    #[must_use]
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
        }
    }

    /// Returns the product component.
    #[must_use]
    pub fn product(&self) -> &str {
        &self.product
    }

    /// Returns the version component.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the name of the archive's top-level directory.
    #[must_use]
    pub fn root_prefix(&self) -> String {
        format!("{}-{}", self.product, self.version)
    }

    /// Returns the archive file name.
    #[must_use]
    pub fn archive_filename(&self) -> String {
        format!("{}{ARCHIVE_EXTENSION}", self.root_prefix())
    }

    /// Returns the hash manifest file name.
    #[must_use]
    pub fn hashes_filename(&self) -> String {
        format!("{}{HASHES_SUFFIX}", self.archive_filename())
    }

    /// Returns the archive URL under `url_base`.
    #[must_use]
    pub fn archive_url(&self, url_base: &str) -> String {
        join_url(url_base, &self.archive_filename())
    }

    /// Returns the hash manifest URL under `url_base`.
    #[must_use]
    pub fn hashes_url(&self, url_base: &str) -> String {
        join_url(url_base, &self.hashes_filename())
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.product, self.version)
    }
}

fn join_url(base: &str, filename: &str) -> String {
    format!("{}/{filename}", base.trim_end_matches('/'))
}
