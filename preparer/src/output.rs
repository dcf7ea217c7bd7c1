//! Summary messages printed by the `sourceprep` CLI.
//!
//! Each stage returns a report; these helpers turn reports into the lines
//! shown once a stage finishes. Progress lines go through `log` instead.

use crate::pipeline::{PatchReport, SourceReport};
use crate::source::{ExtractionReport, VerificationReport};
use crate::substitution::SubstitutionReport;
use camino::Utf8Path;
use std::fmt::Display;
use std::io::Write;

/// Writes one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

/// Describes a verification outcome.
///
/// # Example
///
/// ```
/// use sourceprep_preparer::output::verification_message;
/// use sourceprep_preparer::source::{HashAlgorithm, VerificationReport};
///
/// let report = VerificationReport {
///     verified: vec![HashAlgorithm::Sha256],
///     ..VerificationReport::default()
/// };
/// assert_eq!(verification_message(&report), "Archive verified (sha256)");
/// ```
#[must_use]
pub fn verification_message(report: &VerificationReport) -> String {
    if report.is_vacuous() {
        return "Archive not verified: manifest had no usable digests".to_owned();
    }
    let names: Vec<String> = report.verified.iter().map(ToString::to_string).collect();
    let mut message = format!("Archive verified ({})", names.join(", "));
    if !report.mismatches.is_empty() {
        let count = report.mismatches.len();
        message.push_str(&format!(
            "; {count} {} ignored",
            plural(count, "mismatch", "mismatches")
        ));
    }
    message
}

/// Describes an extraction outcome.
#[must_use]
pub fn extraction_message(report: &ExtractionReport, sandbox: &Utf8Path) -> String {
    let extracted = report.extracted;
    let mut message = format!(
        "Extracted {extracted} {} into {sandbox}",
        plural(extracted, "entry", "entries")
    );
    if !report.skipped.is_empty() {
        message.push_str(&format!(
            " ({} skipped by the cleaning list)",
            report.skipped.len()
        ));
    }
    if !report.missing.is_empty() {
        let count = report.missing.len();
        message.push_str(&format!(
            "; {count} cleaning list {} not found",
            plural(count, "entry was", "entries were")
        ));
    }
    message
}

/// Lines summarising the source stage.
#[must_use]
pub fn source_lines(report: &SourceReport, sandbox: &Utf8Path) -> Vec<String> {
    let mut lines = Vec::new();
    if report.plan.download_archive {
        lines.push(format!("Downloaded {}", report.plan.archive));
    }
    if let Some(verification) = &report.verification {
        lines.push(verification_message(verification));
    }
    if let Some(extraction) = &report.extraction {
        lines.push(extraction_message(extraction, sandbox));
    }
    lines
}

/// Describes a substitution run.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use sourceprep_preparer::output::substitution_message;
/// use sourceprep_preparer::substitution::{FileSubstitution, SubstitutionReport};
///
/// let report = SubstitutionReport {
///     files: vec![FileSubstitution { path: Utf8PathBuf::from("e/f.txt"), count: 3 }],
/// };
/// assert_eq!(
///     substitution_message(&report),
///     "Made 3 replacements in 1 of 1 file",
/// );
/// ```
#[must_use]
pub fn substitution_message(report: &SubstitutionReport) -> String {
    let total = report.total();
    let files = report.files.len();
    let modified = report.modified().count();
    format!(
        "Made {total} {} in {modified} of {files} {}",
        plural(total, "replacement", "replacements"),
        plural(files, "file", "files")
    )
}

/// Lines summarising the patch stage.
#[must_use]
pub fn patch_lines(report: &PatchReport) -> Vec<String> {
    let count = report.series.order.len();
    let mut lines = vec![format!(
        "Assembled {count} {} in {}",
        plural(count, "patch", "patches"),
        report.series.output_dir
    )];
    if let Some(substitution) = &report.substitution {
        lines.push(substitution_message(substitution));
    }
    lines
}

/// Describes the written build flag file.
#[must_use]
pub fn flags_message(path: &Utf8Path) -> String {
    format!("Build flags written to {path}")
}
