//! Byte-level regex rules of the form `pattern#replacement`.

use regex::bytes::{Captures, Regex, Replacer};
use std::borrow::Cow;

/// Separator between the pattern and the replacement.
const RULE_SEPARATOR: u8 = b'#';

/// Errors raised while parsing the regex list.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The line has no `#` separator.
    #[error("rule {line} has no `#` separating pattern and replacement")]
    MissingSeparator {
        /// 1-based rule number.
        line: usize,
    },

    /// The pattern is not valid UTF-8 and cannot be compiled.
    #[error("rule {line} has a pattern that is not valid UTF-8")]
    NonUtf8Pattern {
        /// 1-based rule number.
        line: usize,
    },

    /// The pattern failed to compile.
    #[error("rule {line} has an invalid pattern: {source}")]
    InvalidPattern {
        /// 1-based rule number.
        line: usize,
        /// The regex compiler's error.
        #[source]
        source: regex::Error,
    },
}

/// One compiled substitution rule.
#[derive(Debug, Clone)]
pub struct RegexRule {
    pattern: Regex,
    replacement: Vec<u8>,
}

impl RegexRule {
    /// Parses a `pattern#replacement` line, splitting on the first `#`.
    ///
    /// `line` numbers the rule in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the separator is missing or the pattern
    /// does not compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use sourceprep_preparer::substitution::RegexRule;
    ///
    /// let rule = RegexRule::parse(b"google\\.com#9oo91e.qjz9zk", 1).unwrap();
    /// let (output, count) = rule.apply(b"www.google.com");
    /// assert_eq!(&output[..], b"www.9oo91e.qjz9zk");
    /// assert_eq!(count, 1);
    /// ```
    pub fn parse(rule: &[u8], line: usize) -> Result<Self, RuleError> {
        let split = rule
            .iter()
            .position(|&byte| byte == RULE_SEPARATOR)
            .ok_or(RuleError::MissingSeparator { line })?;
        let (pattern, rest) = rule.split_at(split);
        let replacement = rest.get(1..).unwrap_or_default();
        let pattern =
            std::str::from_utf8(pattern).map_err(|_| RuleError::NonUtf8Pattern { line })?;
        let pattern =
            Regex::new(pattern).map_err(|source| RuleError::InvalidPattern { line, source })?;
        Ok(Self {
            pattern,
            replacement: replacement.to_vec(),
        })
    }

    /// Returns the compiled pattern.
    #[must_use]
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Returns the replacement template.
    #[must_use]
    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }

    /// Replaces every match in `input`, returning the output and the number
    /// of replacements. The input is borrowed back when nothing matched.
    #[must_use]
    pub fn apply<'h>(&self, input: &'h [u8]) -> (Cow<'h, [u8]>, usize) {
        let mut template = CountingTemplate {
            template: &self.replacement,
            count: 0,
        };
        let output = self.pattern.replace_all(input, template.by_ref());
        (output, template.count)
    }
}

/// Expands the replacement template while counting matches.
struct CountingTemplate<'t> {
    template: &'t [u8],
    count: usize,
}

impl Replacer for CountingTemplate<'_> {
    fn replace_append(&mut self, caps: &Captures<'_>, dst: &mut Vec<u8>) {
        caps.expand(self.template, dst);
        self.count += 1;
    }
}

/// An ordered, immutable list of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RegexRule>,
}

impl RuleSet {
    /// Compiles every line of a regex list.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleError`] encountered.
    pub fn parse<L: AsRef<[u8]>>(lines: &[L]) -> Result<Self, RuleError> {
        let rules = lines
            .iter()
            .enumerate()
            .map(|(index, line)| RegexRule::parse(line.as_ref(), index + 1))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Returns the rules in list order.
    #[must_use]
    pub fn rules(&self) -> &[RegexRule] {
        &self.rules
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true when there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies every rule in order, each to the previous rule's output.
    ///
    /// Returns the final content and the total replacement count.
    #[must_use]
    pub fn apply(&self, content: Vec<u8>) -> (Vec<u8>, usize) {
        let mut current = content;
        let mut total = 0;
        for rule in &self.rules {
            let (output, count) = rule.apply(&current);
            if count > 0 {
                current = output.into_owned();
                total += count;
            }
        }
        (current, total)
    }
}

impl FromIterator<RegexRule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = RegexRule>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::first_hash_splits(b"a#b#c".as_slice(), b"xay".as_slice(), b"xb#cy".as_slice(), 1)]
    #[case::empty_replacement(b"foo#".as_slice(), b"foofoo".as_slice(), b"".as_slice(), 2)]
    #[case::numbered_group(
        b"(\\w+)\\.com#${1}.test".as_slice(),
        b"google.com".as_slice(),
        b"google.test".as_slice(),
        1
    )]
    #[case::no_match(b"foo#bar".as_slice(), b"baz".as_slice(), b"baz".as_slice(), 0)]
    fn applies_rules(
        #[case] rule: &[u8],
        #[case] input: &[u8],
        #[case] expected: &[u8],
        #[case] count: usize,
    ) {
        let rule = RegexRule::parse(rule, 1).expect("rule parses");
        let (output, replaced) = rule.apply(input);
        assert_eq!(&*output, expected);
        assert_eq!(replaced, count);
    }

    #[test]
    fn operates_on_non_utf8_content() {
        let rule = RegexRule::parse(b"foo#bar", 1).expect("rule parses");
        let (output, count) = rule.apply(b"\xff\xfefoo\x00");
        assert_eq!(&*output, b"\xff\xfebar\x00");
        assert_eq!(count, 1);
    }

    #[test]
    fn unmatched_input_is_borrowed() {
        let rule = RegexRule::parse(b"foo#bar", 1).expect("rule parses");
        let (output, _) = rule.apply(b"nothing here");
        assert!(matches!(output, Cow::Borrowed(_)));
    }

    #[test]
    fn rules_compound_in_list_order() {
        let rules = RuleSet::parse(&["foo#bar", "bar#baz"]).expect("rules parse");
        let (output, total) = rules.apply(b"foo bar".to_vec());
        assert_eq!(output, b"baz baz");
        assert_eq!(total, 3);
    }

    #[rstest]
    #[case::missing_separator(b"no separator".as_slice())]
    #[case::invalid_pattern(b"(unclosed#x".as_slice())]
    #[case::non_utf8(b"\xff#x".as_slice())]
    fn reports_the_failing_rule(#[case] second: &[u8]) {
        let err = RuleSet::parse(&[b"ok#fine".as_slice(), second]).expect_err("second rule fails");
        let line = match err {
            RuleError::MissingSeparator { line }
            | RuleError::NonUtf8Pattern { line }
            | RuleError::InvalidPattern { line, .. } => line,
        };
        assert_eq!(line, 2);
    }
}
