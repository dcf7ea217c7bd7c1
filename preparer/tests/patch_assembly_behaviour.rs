//! Behaviour-driven coverage for layered patch series assembly.

use camino::{Utf8Path, Utf8PathBuf};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use sourceprep::{PrepConfig, ResourcesConfig};
use sourceprep_preparer::pipeline::{PatchReport, Pipeline};
use sourceprep_preparer::test_utils::{utf8_temp_dir, write_file};
use std::cell::{Cell, RefCell};
use tempfile::TempDir;

struct PatchWorld {
    _temp: TempDir,
    root: Utf8PathBuf,
    listed: Cell<usize>,
    has_platform: Cell<bool>,
    report: RefCell<Option<PatchReport>>,
}

impl PatchWorld {
    fn common(&self) -> Utf8PathBuf {
        self.root.join("resources/common")
    }

    fn platform(&self) -> Utf8PathBuf {
        self.root.join("resources/linux")
    }

    fn output(&self) -> Utf8PathBuf {
        self.root.join("out/patches")
    }

    fn add_layer(&self, layer: &Utf8Path, label: &str, names: &str) {
        let names = parse_list(names);
        let mut order = String::new();
        for name in &names {
            write_file(
                layer,
                &format!("patches/{name}"),
                format!("{label} {name} https://www.google.com/\n"),
            );
            order.push_str(name);
            order.push('\n');
        }
        write_file(layer, "patches/patch_order", order);
        self.listed.set(self.listed.get() + names.len());
    }

    fn assemble(&self, run_substitution: bool) {
        let config = PrepConfig {
            sandbox_root: self.root.join("sandbox"),
            resources: ResourcesConfig {
                common: self.common(),
                platform: self.has_platform.get().then(|| self.platform()),
            },
            ..PrepConfig::default()
        };
        let pipeline =
            Pipeline::open(config).unwrap_or_else(|error| panic!("sandbox should open: {error}"));
        let report = pipeline
            .generate_patches(&self.output(), run_substitution)
            .unwrap_or_else(|error| panic!("patch assembly should succeed: {error}"));
        self.report.replace(Some(report));
    }

    fn report(&self) -> PatchReport {
        self.report
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("patch assembly must have run"))
    }

    fn read_output(&self, name: &str) -> String {
        std::fs::read_to_string(self.output().join(name))
            .unwrap_or_else(|error| panic!("{name} should be readable: {error}"))
    }
}

#[fixture]
fn world() -> PatchWorld {
    let (temp, root) = utf8_temp_dir();
    PatchWorld {
        _temp: temp,
        root,
        listed: Cell::new(0),
        has_platform: Cell::new(false),
        report: RefCell::new(None),
    }
}

fn parse_list(values: &str) -> Vec<String> {
    values
        .split(',')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_owned)
        .collect()
}

#[given("common patches {names}")]
fn given_common_patches(world: &PatchWorld, names: String) {
    world.add_layer(&world.common(), "common", &names);
}

#[given("platform patches {names}")]
fn given_platform_patches(world: &PatchWorld, names: String) {
    world.add_layer(&world.platform(), "platform", &names);
    world.has_platform.set(true);
}

#[given("the domain regex list is {rule}")]
fn given_regex_list(world: &PatchWorld, rule: String) {
    write_file(&world.common(), "domain_regex_list", format!("{rule}\n"));
}

#[when("the patch series is assembled")]
fn when_assembled(world: &PatchWorld) {
    world.assemble(false);
}

#[when("the patch series is assembled with domain substitution")]
fn when_assembled_with_substitution(world: &PatchWorld) {
    world.assemble(true);
}

#[then("the patch order lists {names}")]
fn then_order_lists(world: &PatchWorld, names: String) {
    assert_eq!(world.report().series.order, parse_list(&names));
}

#[then("the patch order has one line per listed patch")]
fn then_order_line_count(world: &PatchWorld) {
    let order = world.read_output("patch_order");
    assert_eq!(order.ends_with('\n'), world.listed.get() > 0);
    assert_eq!(order.lines().count(), world.listed.get());
}

#[then("every listed patch exists in the output")]
fn then_patches_exist(world: &PatchWorld) {
    for name in &world.report().series.order {
        assert!(world.output().join(name).is_file(), "{name} is missing");
    }
}

#[then("the output patch {name} comes from the platform")]
fn then_from_platform(world: &PatchWorld, name: String) {
    assert!(world.read_output(&name).starts_with("platform "));
}

#[then("the output patch {name} mentions {text}")]
fn then_patch_mentions(world: &PatchWorld, name: String, text: String) {
    assert!(world.read_output(&name).contains(&text));
}

#[then("{count} patch replacements were made")]
fn then_patch_replacements(world: &PatchWorld, count: usize) {
    let substitution = world
        .report()
        .substitution
        .unwrap_or_else(|| panic!("substitution should have run"));
    assert_eq!(substitution.total(), count);
}

#[scenario(path = "tests/features/patch_assembly.feature", index = 0)]
fn scenario_layered_order(world: PatchWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/patch_assembly.feature", index = 1)]
fn scenario_platform_override(world: PatchWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/patch_assembly.feature", index = 2)]
fn scenario_substituted_patches(world: PatchWorld) {
    let _ = world;
}
