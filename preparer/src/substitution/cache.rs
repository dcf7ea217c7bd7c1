//! Per-run cache of the compiled domain regex list.
//!
//! The list is parsed on first access and the same [`RuleSet`] is handed to
//! every later caller, even if the resource file has since changed. Call
//! [`DomainRegexCache::invalidate`] to force a re-parse.

use super::rules::{RuleError, RuleSet};
use log::debug;
use once_cell::sync::OnceCell;
use sourceprep_common::{DOMAIN_REGEX_LIST, ResourceError, ResourceLayout};

/// Errors raised while loading the regex list.
#[derive(Debug, thiserror::Error)]
pub enum RegexListError {
    /// The list resource could not be read.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A rule failed to parse.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Lazily populated holder for the compiled regex list.
///
/// # Examples
///
/// ```
/// use sourceprep_preparer::substitution::{DomainRegexCache, RuleSet};
///
/// let cache = DomainRegexCache::new();
/// let rules = cache
///     .get_or_load_with(|| Ok(RuleSet::parse(&["foo#bar"])?))
///     .unwrap();
/// assert_eq!(rules.len(), 1);
/// assert!(cache.is_loaded());
/// ```
#[derive(Debug, Default)]
pub struct DomainRegexCache {
    rules: OnceCell<RuleSet>,
}

impl DomainRegexCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached rules, reading `domain_regex_list` from `layout`
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegexListError`] when the list cannot be read or parsed.
    /// A failed load leaves the cache empty.
    pub fn get_or_load(&self, layout: &ResourceLayout) -> Result<&RuleSet, RegexListError> {
        self.get_or_load_with(|| {
            let lines = layout.read_byte_list(DOMAIN_REGEX_LIST)?;
            Ok(RuleSet::parse(&lines)?)
        })
    }

    /// Returns the cached rules, populating them with `load` on first use.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `load`.
    pub fn get_or_load_with<F>(&self, load: F) -> Result<&RuleSet, RegexListError>
    where
        F: FnOnce() -> Result<RuleSet, RegexListError>,
    {
        self.rules.get_or_try_init(|| {
            let rules = load()?;
            debug!("compiled {} domain substitution rules", rules.len());
            Ok(rules)
        })
    }

    /// Returns true once the rules have been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.rules.get().is_some()
    }

    /// Drops the cached rules so the next access re-reads the list.
    pub fn invalidate(&mut self) {
        self.rules.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{utf8_temp_dir, write_file};

    #[test]
    fn loads_once_until_invalidated() {
        let (_temp, root) = utf8_temp_dir();
        let common = root.join("common");
        write_file(&common, DOMAIN_REGEX_LIST, "foo#bar\n");
        let layout = ResourceLayout::new(common.clone(), None);
        let mut cache = DomainRegexCache::new();

        assert_eq!(cache.get_or_load(&layout).expect("load").len(), 1);

        write_file(&common, DOMAIN_REGEX_LIST, "foo#bar\nbaz#qux\n");
        assert_eq!(cache.get_or_load(&layout).expect("cached").len(), 1);

        cache.invalidate();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get_or_load(&layout).expect("reload").len(), 2);
    }

    #[test]
    fn platform_rules_follow_common_rules() {
        let (_temp, root) = utf8_temp_dir();
        write_file(&root, "common/domain_regex_list", "foo#bar\n");
        write_file(&root, "linux/domain_regex_list", "bar#baz\n");
        let layout = ResourceLayout::new(root.join("common"), Some(root.join("linux")));

        let cache = DomainRegexCache::new();
        let rules = cache.get_or_load(&layout).expect("load");
        let (output, total) = rules.apply(b"foo".to_vec());

        assert_eq!(output, b"baz");
        assert_eq!(total, 2);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = DomainRegexCache::new();
        let err = cache
            .get_or_load_with(|| Ok(RuleSet::parse(&["missing separator"])?))
            .expect_err("parse fails");
        assert!(matches!(err, RegexListError::Rule(RuleError::MissingSeparator { line: 1 })));
        assert!(!cache.is_loaded());

        let rules = cache
            .get_or_load_with(|| Ok(RuleSet::parse(&["a#b"])?))
            .expect("second load");
        assert_eq!(rules.len(), 1);
    }
}
