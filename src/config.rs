//! Run configuration loaded from `sourceprep.toml`.
//!
//! Every field has a default so a missing file, or a file that only pins the
//! upstream version, yields a usable configuration. Unknown keys are rejected
//! to catch typos before any stage touches the sandbox.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Default configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sourceprep.toml";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`PrepConfig`].
    #[error("invalid configuration {path}: {source}")]
    Parse {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A stage needs the upstream version but none was configured.
    #[error("no upstream version configured; set `version` or pass --version-string")]
    MissingVersion,
}

/// Top-level configuration for one preparation run.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PrepConfig {
    /// Product name used for the archive root directory and file names.
    pub product: String,
    /// Upstream version string, e.g. `55.0.2883.75`.
    pub version: Option<String>,
    /// Base URL the archive and its hash manifest are fetched from.
    pub url_base: String,
    /// Directory owned by the pipeline for the extracted tree.
    pub sandbox_root: Utf8PathBuf,
    /// Directory the source archive and hashes are downloaded into.
    pub download_dir: Utf8PathBuf,
    /// Resource directory locations.
    pub resources: ResourcesConfig,
    /// Integrity verification settings.
    pub verification: VerificationConfig,
    /// Archive extraction settings.
    pub extraction: ExtractionConfig,
    /// Domain substitution settings.
    pub substitution: SubstitutionConfig,
}

impl PrepConfig {
    /// Loads configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid configuration.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(path, &source)
    }

    /// Loads `path` when it exists and falls back to defaults otherwise.
    ///
    /// Used for the implicit [`DEFAULT_CONFIG_FILE`]. An explicitly named file
    /// goes through [`Self::load`] and must exist.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::load`] for a file that exists.
    pub fn load_or_default(path: &Utf8Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses configuration text, attributing errors to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when `source` is not valid configuration.
    pub fn from_toml_str(path: &Utf8Path, source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source: Box::new(source),
        })
    }

    /// Returns the configured version, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVersion`] when no version is set or the
    /// value is blank.
    pub fn require_version(&self) -> Result<&str, ConfigError> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .ok_or(ConfigError::MissingVersion)
    }
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            product: "chromium".to_owned(),
            version: None,
            url_base: "https://commondatastorage.googleapis.com/chromium-browser-official"
                .to_owned(),
            sandbox_root: Utf8PathBuf::from("build_sandbox"),
            download_dir: Utf8PathBuf::from("."),
            resources: ResourcesConfig::default(),
            verification: VerificationConfig::default(),
            extraction: ExtractionConfig::default(),
            substitution: SubstitutionConfig::default(),
        }
    }
}

/// Locations of the common and platform resource directories.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Resources shared by every platform.
    pub common: Utf8PathBuf,
    /// Optional platform overlay; its lists are appended to the common ones.
    pub platform: Option<Utf8PathBuf>,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            common: Utf8PathBuf::from("resources/common"),
            platform: None,
        }
    }
}

/// Settings for hash manifest verification.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationConfig {
    /// Accept a manifest that lists no supported algorithm.
    ///
    /// Off by default: a manifest made only of unknown algorithms would
    /// otherwise verify nothing and still report success.
    pub allow_empty_manifest: bool,
    /// What to do when a digest does not match.
    pub on_mismatch: MismatchAction,
}

/// Reaction to a digest mismatch.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchAction {
    /// Abort the run.
    #[default]
    Fail,
    /// Emit a warning and carry on.
    Warn,
}

impl fmt::Display for MismatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => f.write_str("fail on digest mismatch"),
            Self::Warn => f.write_str("warn on digest mismatch"),
        }
    }
}

/// Settings for archive extraction.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// How denylist entries that never appeared in the archive are handled.
    pub missing_entries: MissingEntryPolicy,
}

/// Policy for denylist entries never observed in the archive.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum MissingEntryPolicy {
    /// Warn about each missing entry.
    #[default]
    Warn,
    /// Warn, and fail when a non-empty denylist matched nothing at all.
    FailWhenAllMissing,
}

impl fmt::Display for MissingEntryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => f.write_str("warn"),
            Self::FailWhenAllMissing => f.write_str("fail when all entries are missing"),
        }
    }
}

/// Settings for the domain substitution engine.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SubstitutionConfig {
    /// Number of worker threads; `1` processes files sequentially.
    pub jobs: usize,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PATH: &str = "sourceprep.toml";

    #[rstest]
    fn defaults_match_the_reference_layout() {
        let config = PrepConfig::default();

        assert_eq!(config.product, "chromium");
        assert_eq!(config.sandbox_root, Utf8PathBuf::from("build_sandbox"));
        assert_eq!(config.resources.common, Utf8PathBuf::from("resources/common"));
        assert!(config.resources.platform.is_none());
        assert_eq!(config.substitution.jobs, 1);
        assert!(!config.verification.allow_empty_manifest);
    }

    #[rstest]
    fn deserialises_overrides_from_toml() {
        let source = concat!(
            "version = \"55.0.2883.75\"\n",
            "[resources]\n",
            "platform = \"resources/linux\"\n",
            "[verification]\n",
            "on_mismatch = \"warn\"\n",
            "[extraction]\n",
            "missing_entries = \"fail-when-all-missing\"\n",
            "[substitution]\n",
            "jobs = 4\n",
        );

        let config = PrepConfig::from_toml_str(Utf8Path::new(PATH), source)
            .expect("expected configuration to parse successfully");

        assert_eq!(config.require_version().expect("version"), "55.0.2883.75");
        assert_eq!(
            config.resources.platform,
            Some(Utf8PathBuf::from("resources/linux"))
        );
        assert_eq!(config.verification.on_mismatch, MismatchAction::Warn);
        assert_eq!(
            config.extraction.missing_entries,
            MissingEntryPolicy::FailWhenAllMissing
        );
        assert_eq!(config.substitution.jobs, 4);
    }

    #[rstest]
    fn rejects_unknown_fields() {
        let err = PrepConfig::from_toml_str(Utf8Path::new(PATH), "sandbox = \"x\"\n")
            .expect_err("unknown key should be rejected");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(PATH));
    }

    #[rstest]
    #[case::absent(None)]
    #[case::blank(Some("   "))]
    fn missing_version_is_reported(#[case] version: Option<&str>) {
        let config = PrepConfig {
            version: version.map(str::to_owned),
            ..PrepConfig::default()
        };
        assert!(matches!(
            config.require_version(),
            Err(ConfigError::MissingVersion)
        ));
    }

    #[rstest]
    fn load_or_default_tolerates_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().join(PATH)).expect("UTF-8 path");

        let config = PrepConfig::load_or_default(&path).expect("defaults");
        assert_eq!(config, PrepConfig::default());

        let err = PrepConfig::load(&path).expect_err("explicit load should fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[rstest]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().join(PATH)).expect("UTF-8 path");
        std::fs::write(&path, "product = \"iridium\"\n").expect("write config");

        let config = PrepConfig::load(&path).expect("load");
        assert_eq!(config.product, "iridium");
        assert!(config.version.is_none());
    }
}
