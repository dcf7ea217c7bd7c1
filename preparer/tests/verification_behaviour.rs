//! Behaviour-driven coverage for hash manifest verification.

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use sourceprep::MismatchAction;
use sourceprep_preparer::source::{
    HashAlgorithm, VerificationError, VerificationPolicy, VerificationReport, verify_file,
};
use sourceprep_preparer::test_utils::{sha256_hex, utf8_temp_dir, write_file};
use std::cell::{Cell, RefCell};
use tempfile::TempDir;

struct VerificationWorld {
    _temp: TempDir,
    root: Utf8PathBuf,
    contents: RefCell<String>,
    manifest: RefCell<Vec<String>>,
    policy: Cell<VerificationPolicy>,
    outcome: RefCell<Option<Result<VerificationReport, VerificationError>>>,
}

impl VerificationWorld {
    fn push_line(&self, algorithm: &str, digest: &str) {
        self.manifest
            .borrow_mut()
            .push(format!("{algorithm}  {digest}"));
    }

    fn update_policy(&self, update: impl FnOnce(&mut VerificationPolicy)) {
        let mut policy = self.policy.get();
        update(&mut policy);
        self.policy.set(policy);
    }

    fn verify(&self) {
        let archive = write_file(&self.root, "source.tar.xz", self.contents.borrow().as_str());
        let mut manifest = self.manifest.borrow().join("\n");
        manifest.push('\n');
        let hashes = write_file(&self.root, "source.tar.xz.hashes", manifest);
        let outcome = verify_file(&archive, &hashes, self.policy.get());
        self.outcome.replace(Some(outcome));
    }

    fn report(&self) -> VerificationReport {
        match self.outcome.borrow().as_ref() {
            Some(Ok(report)) => report.clone(),
            Some(Err(error)) => panic!("verification should succeed: {error}"),
            None => panic!("verification must have run"),
        }
    }
}

#[fixture]
fn world() -> VerificationWorld {
    let (temp, root) = utf8_temp_dir();
    VerificationWorld {
        _temp: temp,
        root,
        contents: RefCell::new(String::new()),
        manifest: RefCell::new(Vec::new()),
        policy: Cell::new(VerificationPolicy::default()),
        outcome: RefCell::new(None),
    }
}

#[given("an archive with contents {contents}")]
fn given_archive(world: &VerificationWorld, contents: String) {
    world.contents.replace(contents);
}

#[given("the manifest has a correct sha256 digest")]
fn given_correct_digest(world: &VerificationWorld) {
    let digest = sha256_hex(world.contents.borrow().as_bytes());
    world.push_line("sha256", &digest);
}

#[given("the manifest has a wrong {algorithm} digest")]
fn given_wrong_digest(world: &VerificationWorld, algorithm: String) {
    world.push_line(&algorithm, &"0".repeat(128));
}

#[given("the manifest has an {algorithm} digest")]
fn given_unsupported_digest(world: &VerificationWorld, algorithm: String) {
    world.push_line(&algorithm, "d41d8cd98f00b204e9800998ecf8427e");
}

#[given("mismatches only warn")]
fn given_mismatches_warn(world: &VerificationWorld) {
    world.update_policy(|policy| policy.on_mismatch = MismatchAction::Warn);
}

#[given("empty manifests are allowed")]
fn given_empty_allowed(world: &VerificationWorld) {
    world.update_policy(|policy| policy.allow_empty_manifest = true);
}

#[when("the archive is verified")]
fn when_verified(world: &VerificationWorld) {
    world.verify();
}

#[then("verification succeeds with {algorithm}")]
fn then_verified_with(world: &VerificationWorld, algorithm: String) {
    let expected = HashAlgorithm::from_name(&algorithm)
        .unwrap_or_else(|| panic!("{algorithm} should be supported"));
    assert_eq!(world.report().verified, vec![expected]);
}

#[then("{algorithm} is skipped as unsupported")]
fn then_skipped(world: &VerificationWorld, algorithm: String) {
    assert_eq!(world.report().skipped, vec![algorithm]);
}

#[then("verification fails with a {algorithm} mismatch")]
fn then_mismatch(world: &VerificationWorld, algorithm: String) {
    match world.outcome.borrow().as_ref() {
        Some(Err(VerificationError::Mismatch {
            algorithm: failed, ..
        })) => assert_eq!(failed.name(), algorithm),
        other => panic!("expected a digest mismatch, got {other:?}"),
    }
}

#[then("verification passes with {count} tolerated mismatch")]
fn then_tolerated(world: &VerificationWorld, count: usize) {
    let report = world.report();
    assert_eq!(report.mismatches.len(), count);
    assert!(report.verified.is_empty());
}

#[then("verification fails because no algorithm is supported")]
fn then_no_supported(world: &VerificationWorld) {
    assert!(matches!(
        world.outcome.borrow().as_ref(),
        Some(Err(VerificationError::NoSupportedAlgorithms { .. }))
    ));
}

#[then("nothing was verified")]
fn then_vacuous(world: &VerificationWorld) {
    assert!(world.report().is_vacuous());
}

#[scenario(path = "tests/features/verification.feature", index = 0)]
fn scenario_matching_digest(world: VerificationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/verification.feature", index = 1)]
fn scenario_mismatch_aborts(world: VerificationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/verification.feature", index = 2)]
fn scenario_mismatch_warns(world: VerificationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/verification.feature", index = 3)]
fn scenario_no_supported_algorithm(world: VerificationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/verification.feature", index = 4)]
fn scenario_empty_allowed(world: VerificationWorld) {
    let _ = world;
}
