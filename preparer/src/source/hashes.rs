//! Hash manifests and the supported digest algorithms.
//!
//! A manifest lists one `<algorithm>  <hex digest>` pair per line. Only the
//! SHA-2 family is available; other algorithm names parse fine but are
//! reported as unsupported by the verifier.

use sha2::digest::DynDigest;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use std::fmt;

/// Separator between algorithm name and digest.
const FIELD_SEPARATOR: &str = "  ";

/// Digest algorithms the verifier can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [Self; 4] = [Self::Sha224, Self::Sha256, Self::Sha384, Self::Sha512];

    /// Looks up an algorithm by manifest name, ignoring ASCII case.
    ///
    /// # Examples
    ///
    /// ```
    /// use sourceprep_preparer::source::hashes::HashAlgorithm;
    ///
    /// assert_eq!(HashAlgorithm::from_name("SHA256"), Some(HashAlgorithm::Sha256));
    /// assert_eq!(HashAlgorithm::from_name("md5"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name().eq_ignore_ascii_case(name))
    }

    /// Returns the canonical manifest name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Creates a fresh hasher for this algorithm.
    #[must_use]
    pub fn hasher(self) -> Box<dyn DynDigest> {
        match self {
            Self::Sha224 => Box::new(Sha224::default()),
            Self::Sha256 => Box::new(Sha256::default()),
            Self::Sha384 => Box::new(Sha384::default()),
            Self::Sha512 => Box::new(Sha512::default()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// 1-based line number in the manifest.
    pub line: usize,
    /// Algorithm name as written.
    pub algorithm: String,
    /// Expected hex digest, if the line had one.
    pub digest: Option<String>,
}

/// A parsed hash manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashManifest {
    entries: Vec<ManifestEntry>,
}

impl HashManifest {
    /// Parses manifest text. Blank lines are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use sourceprep_preparer::source::hashes::HashManifest;
    ///
    /// let manifest = HashManifest::parse("md5  abc\nsha256  def\n");
    /// assert_eq!(manifest.entries().len(), 2);
    /// assert_eq!(manifest.entries()[1].digest.as_deref(), Some("def"));
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                let (algorithm, digest) = match line.split_once(FIELD_SEPARATOR) {
                    Some((algorithm, digest)) => (algorithm, Some(digest.trim())),
                    None => (line, None),
                };
                ManifestEntry {
                    line: index + 1,
                    algorithm: algorithm.trim().to_owned(),
                    digest: digest.filter(|d| !d.is_empty()).map(str::to_owned),
                }
            })
            .collect();
        Self { entries }
    }

    /// Returns the manifest entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }
}

/// Formats digest bytes as lowercase hex.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    use fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
        out
    })
}
