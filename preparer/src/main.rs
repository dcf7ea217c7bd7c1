//! `sourceprep` CLI entrypoint.
//!
//! Prepares a build sandbox from an upstream source archive: acquisition,
//! verification, cleaned extraction, domain substitution, patch assembly and
//! build flags. Progress goes to the log; stage summaries are printed to
//! stderr unless `--quiet` is given.

use clap::Parser;
use sourceprep_preparer::cli::{Cli, Command, PatchesArgs, SourceArgs};
use sourceprep_preparer::error::Result;
use sourceprep_preparer::logging;
use sourceprep_preparer::output::{
    flags_message, patch_lines, source_lines, substitution_message, write_stderr_line,
};
use sourceprep_preparer::pipeline::Pipeline;
use sourceprep_preparer::source::HttpDownloader;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    if let Err(err) = logging::init(cli.verbosity, cli.quiet) {
        write_stderr_line(&mut stderr, format!("logging disabled: {err}"));
    }
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let config = cli.load_config()?;
    let pipeline = Pipeline::open(config)?;

    match &cli.command {
        Command::Source(args) => run_source(&pipeline, args, cli.quiet, stderr),
        Command::Substitute => run_substitute(&pipeline, cli.quiet, stderr),
        Command::Patches(args) => run_patches(&pipeline, args, cli.quiet, stderr),
        Command::Flags => run_flags(&pipeline, cli.quiet, stderr),
        Command::Prepare(args) => {
            run_source(&pipeline, args, cli.quiet, stderr)?;
            run_substitute(&pipeline, cli.quiet, stderr)?;
            run_flags(&pipeline, cli.quiet, stderr)
        }
    }
}

/// Acquires, verifies and extracts the source archive.
fn run_source(
    pipeline: &Pipeline,
    args: &SourceArgs,
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<()> {
    let report = pipeline.setup_source(
        &args.acquire_options(),
        &HttpDownloader,
        &pipeline.extractor(),
    )?;
    if !quiet {
        for line in source_lines(&report, pipeline.sandbox().root()) {
            write_stderr_line(stderr, line);
        }
    }
    Ok(())
}

/// Rewrites the domain substitution targets in the sandbox.
fn run_substitute(pipeline: &Pipeline, quiet: bool, stderr: &mut dyn Write) -> Result<()> {
    let report = pipeline.setup_sandbox()?;
    if !quiet {
        write_stderr_line(stderr, substitution_message(&report));
    }
    Ok(())
}

/// Assembles the patch series.
fn run_patches(
    pipeline: &Pipeline,
    args: &PatchesArgs,
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<()> {
    let report = pipeline.generate_patches(&args.output, !args.skip_substitution)?;
    if !quiet {
        for line in patch_lines(&report) {
            write_stderr_line(stderr, line);
        }
    }
    Ok(())
}

fn run_flags(pipeline: &Pipeline, quiet: bool, stderr: &mut dyn Write) -> Result<()> {
    let path = pipeline.write_build_flags()?;
    if !quiet {
        write_stderr_line(stderr, flags_message(&path));
    }
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use sourceprep::ConfigError;
    use sourceprep_preparer::error::PrepError;
    use sourceprep_preparer::test_utils::{utf8_temp_dir, write_file};

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = PrepError::Config(ConfigError::MissingVersion);

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("error: "));
    }

    fn cli_for(root: &Utf8Path, args: &[&str]) -> Cli {
        let sandbox = root.join("sandbox");
        let common = root.join("common");
        let config = root.join("sourceprep.toml");
        let mut argv = vec![
            "sourceprep",
            "--sandbox",
            sandbox.as_str(),
            "--common-resources",
            common.as_str(),
            "--config",
            config.as_str(),
        ];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn flags_command_prints_summary() {
        let (_temp, root) = utf8_temp_dir();
        write_file(&root, "sourceprep.toml", "");
        write_file(&root, "common/build_flags", "is_debug=false\n");
        let cli = cli_for(&root, &["flags"]);

        let mut stderr = Vec::new();
        run(&cli, &mut stderr).expect("flags run");

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("Build flags written to "));
    }

    #[test]
    fn quiet_suppresses_summaries() {
        let (_temp, root) = utf8_temp_dir();
        write_file(&root, "sourceprep.toml", "");
        write_file(&root, "common/build_flags", "is_debug=false\n");
        let cli = cli_for(&root, &["-q", "flags"]);

        let mut stderr = Vec::new();
        run(&cli, &mut stderr).expect("flags run");

        assert!(stderr.is_empty());
    }
}
