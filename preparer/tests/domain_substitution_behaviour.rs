//! Behaviour-driven coverage for domain substitution over a sandbox.

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use sourceprep::{PrepConfig, ResourcesConfig};
use sourceprep_preparer::pipeline::Pipeline;
use sourceprep_preparer::substitution::SubstitutionReport;
use sourceprep_preparer::test_utils::{utf8_temp_dir, write_file};
use std::cell::RefCell;
use tempfile::TempDir;

struct SubstitutionWorld {
    _temp: TempDir,
    root: Utf8PathBuf,
    pipeline: RefCell<Option<Pipeline>>,
    report: RefCell<Option<SubstitutionReport>>,
}

impl SubstitutionWorld {
    fn sandbox(&self) -> Utf8PathBuf {
        self.root.join("sandbox")
    }

    fn resources(&self) -> Utf8PathBuf {
        self.root.join("resources")
    }

    fn run(&self) {
        let mut pipeline = self.pipeline.borrow_mut();
        if pipeline.is_none() {
            let config = PrepConfig {
                sandbox_root: self.sandbox(),
                resources: ResourcesConfig {
                    common: self.resources(),
                    platform: None,
                },
                ..PrepConfig::default()
            };
            let opened = Pipeline::open(config)
                .unwrap_or_else(|error| panic!("sandbox should open: {error}"));
            *pipeline = Some(opened);
        }
        let report = pipeline
            .as_ref()
            .map(Pipeline::setup_sandbox)
            .unwrap_or_else(|| panic!("pipeline must be open"))
            .unwrap_or_else(|error| panic!("substitution should succeed: {error}"));
        self.report.replace(Some(report));
    }

    fn report(&self) -> SubstitutionReport {
        self.report
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("substitution must have run"))
    }

    fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.sandbox().join(path))
            .unwrap_or_else(|error| panic!("{path} should be readable: {error}"))
    }
}

#[fixture]
fn world() -> SubstitutionWorld {
    let (temp, root) = utf8_temp_dir();
    SubstitutionWorld {
        _temp: temp,
        root,
        pipeline: RefCell::new(None),
        report: RefCell::new(None),
    }
}

#[given("the domain regex list is {rule}")]
fn given_regex_list(world: &SubstitutionWorld, rule: String) {
    write_file(&world.resources(), "domain_regex_list", format!("{rule}\n"));
}

#[given("the domain substitution list names {path}")]
fn given_substitution_list(world: &SubstitutionWorld, path: String) {
    write_file(
        &world.resources(),
        "domain_substitution_list",
        format!("{path}\n"),
    );
}

#[given("the sandbox file {path} contains {contents}")]
fn given_sandbox_file(world: &SubstitutionWorld, path: String, contents: String) {
    write_file(&world.sandbox(), &path, contents);
}

#[when("domain substitution runs")]
fn when_substitution_runs(world: &SubstitutionWorld) {
    world.run();
}

#[when("domain substitution runs again")]
fn when_substitution_runs_again(world: &SubstitutionWorld) {
    world.run();
}

#[then("the sandbox file {path} contains {contents}")]
fn then_sandbox_file(world: &SubstitutionWorld, path: String, contents: String) {
    assert_eq!(world.read(&path), contents);
}

#[then("the sandbox file {path} is left as {contents}")]
fn then_sandbox_file_untouched(world: &SubstitutionWorld, path: String, contents: String) {
    assert_eq!(world.read(&path), contents);
}

#[then("{count} replacements were made")]
fn then_replacements(world: &SubstitutionWorld, count: usize) {
    assert_eq!(world.report().total(), count);
}

#[then("{path} is reported as unmatched")]
fn then_unmatched(world: &SubstitutionWorld, path: String) {
    let expected = world.sandbox().join(path);
    let report = world.report();
    let unmatched: Vec<_> = report.unmatched().collect();
    assert_eq!(unmatched, vec![expected.as_path()]);
}

#[scenario(path = "tests/features/domain_substitution.feature", index = 0)]
fn scenario_listed_files(world: SubstitutionWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/domain_substitution.feature", index = 1)]
fn scenario_second_pass(world: SubstitutionWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/domain_substitution.feature", index = 2)]
fn scenario_capture_groups(world: SubstitutionWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/domain_substitution.feature", index = 3)]
fn scenario_no_matches(world: SubstitutionWorld) {
    let _ = world;
}
