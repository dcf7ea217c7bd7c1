//! CLI argument definitions for `sourceprep`.
//!
//! Global options override values from the configuration file; each
//! subcommand runs one stage of the pipeline, and `prepare` runs the source,
//! substitution and flag stages in order.

use crate::source::AcquireOptions;
use crate::substitution::clamp_jobs;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use sourceprep::{ConfigError, DEFAULT_CONFIG_FILE, PrepConfig};

/// Prepare a pristine upstream source tree for a reproducible build.
#[derive(Parser, Debug)]
#[command(name = "sourceprep")]
#[command(version, about)]
#[command(long_about = concat!(
    "Prepare a pristine upstream source tree for a reproducible build.\n\n",
    "The source stage downloads or reuses the upstream archive, verifies it ",
    "against its hash manifest and extracts it into the sandbox, skipping the ",
    "paths on the cleaning list. The substitution stage rewrites the files on ",
    "the domain substitution list using the domain regex list. The patches ",
    "stage assembles the patch series from the common and platform resources.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Run every sandbox stage for a release:\n",
    "    $ sourceprep --version-string 55.0.2883.75 prepare\n\n",
    "  Extract a local archive without the cleaning list:\n",
    "    $ sourceprep source --archive chromium.tar.xz --hashes chromium.tar.xz.hashes \\\n",
    "        --no-cleaning-list\n\n",
    "  Assemble patches for a platform:\n",
    "    $ sourceprep --platform-resources resources/linux patches --output out/patches",
))]
pub struct Cli {
    /// Configuration file [default: sourceprep.toml when present].
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Sandbox directory, overriding `sandbox_root`.
    #[arg(long, value_name = "DIR", global = true)]
    pub sandbox: Option<Utf8PathBuf>,

    /// Upstream version, overriding `version`.
    #[arg(long, value_name = "VERSION", global = true)]
    pub version_string: Option<String>,

    /// Common resource directory, overriding `resources.common`.
    #[arg(long, value_name = "DIR", global = true)]
    pub common_resources: Option<Utf8PathBuf>,

    /// Platform resource directory, overriding `resources.platform`.
    #[arg(long, value_name = "DIR", global = true)]
    pub platform_resources: Option<Utf8PathBuf>,

    /// Worker threads for domain substitution, overriding `substitution.jobs`.
    /// Capped at the parallelism the host reports.
    #[arg(short, long, value_name = "N", global = true)]
    pub jobs: Option<usize>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet",
        global = true
    )]
    pub verbosity: u8,

    /// Only show warnings and errors.
    #[arg(short, long, conflicts_with = "verbosity", global = true)]
    pub quiet: bool,

    /// Stage to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Acquire, verify and extract the source archive.
    Source(SourceArgs),

    /// Apply domain substitution to the sandbox.
    Substitute,

    /// Assemble the patch series.
    Patches(PatchesArgs),

    /// Write the build flag file into the sandbox.
    Flags,

    /// Run `source`, `substitute` and `flags` in order.
    Prepare(SourceArgs),
}

/// Arguments for the source stage.
#[derive(Parser, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Use a local archive instead of downloading.
    #[arg(long, value_name = "FILE")]
    pub archive: Option<Utf8PathBuf>,

    /// Hash manifest for `--archive`.
    #[arg(long, value_name = "FILE", requires = "archive")]
    pub hashes: Option<Utf8PathBuf>,

    /// Download directory, overriding `download_dir`.
    #[arg(long, value_name = "DIR", conflicts_with = "archive")]
    pub download_dir: Option<Utf8PathBuf>,

    /// Download even when the archive already exists.
    #[arg(long, conflicts_with_all = ["archive", "no_download"])]
    pub force_download: bool,

    /// Never download; use whatever is in the download directory.
    #[arg(long)]
    pub no_download: bool,

    /// Skip hash verification.
    #[arg(long)]
    pub skip_verify: bool,

    /// Skip extraction.
    #[arg(long)]
    pub skip_extract: bool,

    /// Extract every entry, ignoring the cleaning list.
    #[arg(long)]
    pub no_cleaning_list: bool,
}

impl SourceArgs {
    /// Translates the flags into [`AcquireOptions`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sourceprep_preparer::cli::SourceArgs;
    ///
    /// let args = SourceArgs { force_download: true, ..SourceArgs::default() };
    /// let options = args.acquire_options();
    /// assert!(options.force_download);
    /// assert!(!options.check_if_exists);
    /// assert!(options.validate().is_ok());
    /// ```
    #[must_use]
    pub fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            check_if_exists: !self.no_download && !self.force_download,
            force_download: self.force_download,
            check_integrity: !self.skip_verify,
            extract_archive: !self.skip_extract,
            use_cleaning_list: !self.no_cleaning_list,
            download_dir: self.download_dir.clone(),
            archive_path: self.archive.clone(),
            hashes_path: self.hashes.clone(),
        }
    }
}

/// Arguments for the patches stage.
#[derive(Parser, Debug, Clone)]
pub struct PatchesArgs {
    /// Directory to assemble the patch series in.
    #[arg(short, long, value_name = "DIR")]
    pub output: Utf8PathBuf,

    /// Leave the patches untouched by domain substitution.
    #[arg(long)]
    pub skip_substitution: bool,
}

impl Cli {
    /// Loads the configuration and applies command-line overrides.
    ///
    /// An explicit `--config` file must exist; the default file is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load_config(&self) -> Result<PrepConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => PrepConfig::load(path)?,
            None => PrepConfig::load_or_default(Utf8Path::new(DEFAULT_CONFIG_FILE))?,
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    /// Overwrites configuration values with those given on the command line.
    pub fn apply_overrides(&self, config: &mut PrepConfig) {
        if let Some(sandbox) = &self.sandbox {
            config.sandbox_root.clone_from(sandbox);
        }
        if let Some(version) = &self.version_string {
            config.version = Some(version.clone());
        }
        if let Some(common) = &self.common_resources {
            config.resources.common.clone_from(common);
        }
        if let Some(platform) = &self.platform_resources {
            config.resources.platform = Some(platform.clone());
        }
        if let Some(jobs) = self.jobs {
            config.substitution.jobs = clamp_jobs(jobs);
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
