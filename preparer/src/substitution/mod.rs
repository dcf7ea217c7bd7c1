//! Domain substitution: regex rewriting of a fixed set of source files.

pub mod cache;
pub mod engine;
pub mod rules;

pub use cache::{DomainRegexCache, RegexListError};
pub use engine::{
    FileSubstitution, SubstitutionError, SubstitutionOptions, SubstitutionReport, clamp_jobs,
    substitute_file, substitute_files,
};
pub use rules::{RegexRule, RuleError, RuleSet};
