//! Orchestration of the preparation stages for one sandbox.
//!
//! A [`Pipeline`] owns the configuration, the locked sandbox, the resource
//! layout and the domain regex cache. The cache is shared by sandbox
//! substitution and patch assembly so both see the same compiled rules.

use crate::error::{PrepError, Result};
use crate::patches::{PatchSeries, assemble_patches};
use crate::sandbox::Sandbox;
use crate::source::{
    AcquireOptions, ExtractionReport, PendingDenylist, SourceDownloader, SourceExtractor,
    SourceName, SourcePlan, TarExtractor, VerificationPolicy, VerificationReport, verify_file,
};
use crate::substitution::{
    DomainRegexCache, RuleSet, SubstitutionOptions, SubstitutionReport, substitute_files,
};
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use sourceprep::PrepConfig;
use sourceprep_common::{BUILD_FLAGS, CLEANING_LIST, DOMAIN_SUBSTITUTION_LIST, ResourceLayout};

/// What the source stage did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    /// Where the archive and manifest were found or downloaded.
    pub plan: SourcePlan,
    /// Verification outcome, when integrity checking ran.
    pub verification: Option<VerificationReport>,
    /// Extraction outcome, when extraction ran.
    pub extraction: Option<ExtractionReport>,
}

/// What the patch stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// The assembled series.
    pub series: PatchSeries,
    /// Substitution over the patch files, when it ran.
    pub substitution: Option<SubstitutionReport>,
}

/// One preparation run against a sandbox.
#[derive(Debug)]
pub struct Pipeline {
    config: PrepConfig,
    sandbox: Sandbox,
    layout: ResourceLayout,
    regex_cache: DomainRegexCache,
}

impl Pipeline {
    /// Opens and locks the configured sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Sandbox`] when the sandbox cannot be opened or is
    /// locked by another run.
    pub fn open(config: PrepConfig) -> Result<Self> {
        let sandbox = Sandbox::open(&config.sandbox_root)?;
        let layout = ResourceLayout::new(
            config.resources.common.clone(),
            config.resources.platform.clone(),
        );
        Ok(Self {
            config,
            sandbox,
            layout,
            regex_cache: DomainRegexCache::new(),
        })
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Returns the sandbox.
    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Returns the resource layout.
    #[must_use]
    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    /// Returns the upstream source name.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Config`] when no version is configured.
    pub fn source_name(&self) -> Result<SourceName> {
        Ok(SourceName::new(
            self.config.product.clone(),
            self.config.require_version()?,
        ))
    }

    /// Returns the archive extractor configured for this run.
    #[must_use]
    pub fn extractor(&self) -> TarExtractor {
        TarExtractor::new(self.config.extraction.missing_entries)
    }

    /// Returns the compiled domain regex rules, loading them on first use.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::RegexList`] when the list cannot be loaded.
    pub fn domain_rules(&self) -> Result<&RuleSet> {
        Ok(self.regex_cache.get_or_load(&self.layout)?)
    }

    /// Drops the cached regex rules so the list is re-read on next use.
    pub fn invalidate_domain_rules(&mut self) {
        self.regex_cache.invalidate();
    }

    /// Acquires, verifies and extracts the source archive.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError`] for option conflicts, download, verification
    /// or extraction failures.
    pub fn setup_source(
        &self,
        options: &AcquireOptions,
        downloader: &dyn SourceDownloader,
        extractor: &dyn SourceExtractor,
    ) -> Result<SourceReport> {
        let name = self.source_name()?;
        let plan = options.plan(&name, &self.config.download_dir)?;
        plan.fetch(&name, &self.config.url_base, downloader)?;

        let verification = match (&plan.hashes, options.check_integrity) {
            (Some(hashes), true) => {
                info!("Checking source archive integrity...");
                let policy = VerificationPolicy::from(self.config.verification);
                Some(verify_file(&plan.archive, hashes, policy)?)
            }
            _ => None,
        };

        let extraction = if options.extract_archive {
            Some(self.extract(&name, &plan.archive, options.use_cleaning_list, extractor)?)
        } else {
            None
        };

        Ok(SourceReport {
            plan,
            verification,
            extraction,
        })
    }

    fn extract(
        &self,
        name: &SourceName,
        archive: &Utf8Path,
        use_cleaning_list: bool,
        extractor: &dyn SourceExtractor,
    ) -> Result<ExtractionReport> {
        let denylist = if use_cleaning_list {
            PendingDenylist::new(self.layout.read_list(CLEANING_LIST)?)
        } else {
            PendingDenylist::default()
        };
        info!("Extracting source archive into {}...", self.sandbox.root());
        let report =
            extractor.extract(archive, self.sandbox.root(), &name.root_prefix(), denylist)?;
        self.sandbox.update_state(|state| {
            state.source_extracted = true;
            state.missing_cleaning_entries.clone_from(&report.missing);
        })?;
        Ok(report)
    }

    /// Applies domain substitution to the files named by the
    /// `domain_substitution_list` resource.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError`] when a list cannot be loaded, an entry is not a
    /// valid sandbox path, or a file cannot be rewritten.
    pub fn setup_sandbox(&self) -> Result<SubstitutionReport> {
        let state = self.sandbox.load_state()?;
        if !state.source_extracted {
            warn!("no extracted source recorded in {}", self.sandbox.root());
        }
        if state.domain_substituted {
            warn!("domain substitution was already applied to {}", self.sandbox.root());
        }

        let rules = self.domain_rules()?;
        let targets = self.layout.read_list(DOMAIN_SUBSTITUTION_LIST)?;
        info!("Running domain substitution over {} files...", targets.len());

        let mut invalid = None;
        let paths = targets.iter().map_while(|entry| match self.substitution_target(entry) {
            Ok(path) => Some(path),
            Err(err) => {
                invalid = Some(err);
                None
            }
        });
        let result = substitute_files(
            rules,
            paths,
            SubstitutionOptions {
                warn_on_no_match: true,
                jobs: self.config.substitution.jobs,
            },
        );
        if let Some(err) = invalid {
            return Err(err);
        }
        let report = result?;

        self.sandbox
            .update_state(|state| state.domain_substituted = true)?;
        Ok(report)
    }

    /// Resolves a domain substitution list entry to a file that really lives
    /// in the sandbox.
    fn substitution_target(&self, entry: &str) -> Result<Utf8PathBuf> {
        let path = self
            .sandbox
            .resolve(entry)
            .map_err(|source| PrepError::SandboxPath {
                entry: entry.to_owned(),
                source,
            })?;
        self.sandbox.ensure_contained(&path)?;
        Ok(path)
    }

    /// Assembles the patch series into `output_dir`, optionally applying
    /// domain substitution to the patches.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError`] when assembly or substitution fails.
    pub fn generate_patches(
        &self,
        output_dir: &Utf8Path,
        run_substitution: bool,
    ) -> Result<PatchReport> {
        let series = assemble_patches(&self.layout, output_dir)?;
        let substitution = if run_substitution {
            let rules = self.domain_rules()?;
            Some(series.substitute(rules, self.config.substitution.jobs)?)
        } else {
            None
        };
        Ok(PatchReport {
            series,
            substitution,
        })
    }

    /// Writes the `build_flags` resource into the sandbox metadata directory.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError`] when the list cannot be read or written.
    pub fn write_build_flags(&self) -> Result<Utf8PathBuf> {
        let flags = self.layout.read_list(BUILD_FLAGS)?;
        Ok(self.sandbox.write_build_flags(&flags)?)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
