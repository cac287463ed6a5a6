//! Two-way glob filtering.
//!
//! A file is allowed when it matches at least one positive pattern and no
//! negative pattern. Negations written inside either list (`"!tests/**"`) are
//! folded into the opposite list before matching, so callers may mix both
//! forms freely:
//!
//! ```text
//! positive = ["./**", "!./**/*.md"]    negative = ["./vendor/**"]
//!     effective positive = ["./**"]
//!     effective negative = ["./vendor/**", "./**/*.md"]
//! ```
//!
//! Every pattern is tried twice: as written, and resolved against the base
//! directory. `./**/*.js` therefore matches `/base/a/b.js` when the base is
//! `/base`, and a pattern that is already absolute matches as-is.

use crate::paths::normalize_path;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// An ordered list of glob patterns, possibly containing negations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternSet(Vec<String>);

impl PatternSet {
    /// Build a set from any list of patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    /// Set with no patterns
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether the set has no patterns
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the patterns as written
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Entries of this set that contain no `!`, followed by the negations
    /// found in `inverse` with their leading `!` stripped.
    ///
    /// An own entry with a `!` anywhere in it is dropped, not only one that
    /// starts with `!`. A `[!x]` character class therefore only works as the
    /// body of a negation borrowed from the other list (`"![!x]*.js"`).
    pub fn combine_positive(&self, inverse: &PatternSet) -> PatternSet {
        let own = self.iter().filter(|pattern| !pattern.contains('!'));
        let borrowed = inverse.iter().filter_map(|pattern| pattern.strip_prefix('!'));
        PatternSet::new(own.chain(borrowed))
    }

    /// Whether any pattern in the set matches `file`
    pub fn matches_any(&self, base: &Path, file: &Path) -> bool {
        self.iter().any(|pattern| pattern_matches(base, file, pattern))
    }
}

impl<S: Into<String>> FromIterator<S> for PatternSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl From<Vec<String>> for PatternSet {
    fn from(patterns: Vec<String>) -> Self {
        Self(patterns)
    }
}

impl From<&[&str]> for PatternSet {
    fn from(patterns: &[&str]) -> Self {
        Self::new(patterns.iter().copied())
    }
}

/// Resolve a pattern against `base`. A leading `!` is preserved.
pub fn resolve_pattern(base: &Path, pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix('!') {
        return format!("!{}", resolve_pattern(base, rest));
    }
    normalize_path(&base.join(pattern))
        .to_string_lossy()
        .into_owned()
}

/// Match one pattern against `file`, literally and resolved against `base`.
pub fn pattern_matches(base: &Path, file: &Path, pattern: &str) -> bool {
    let candidate = file.to_string_lossy();
    glob_matches(pattern, &candidate) || glob_matches(&resolve_pattern(base, pattern), &candidate)
}

fn glob_matches(pattern: &str, candidate: &str) -> bool {
    if pattern == candidate {
        return true;
    }
    Pattern::new(pattern).is_ok_and(|compiled| compiled.matches_with(candidate, MATCH_OPTIONS))
}

/// Positive and negative pattern lists with negations already folded across.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwoWayFilter {
    positive: PatternSet,
    negative: PatternSet,
}

impl TwoWayFilter {
    /// Fold the two lists into their effective forms
    pub fn new(positive: &PatternSet, negative: &PatternSet) -> Self {
        Self {
            positive: positive.combine_positive(negative),
            negative: negative.combine_positive(positive),
        }
    }

    /// Effective positive patterns
    pub fn positive(&self) -> &PatternSet {
        &self.positive
    }

    /// Effective negative patterns
    pub fn negative(&self) -> &PatternSet {
        &self.negative
    }

    /// Whether `file` passes the filter
    pub fn allows(&self, base: &Path, file: &Path) -> bool {
        self.positive.matches_any(base, file) && !self.negative.matches_any(base, file)
    }
}

/// Whether `file` matches at least one effective positive pattern and no
/// effective negative pattern.
pub fn allowed_by_two_way_filter(
    base: &Path,
    file: &Path,
    positive: &PatternSet,
    negative: &PatternSet,
) -> bool {
    TwoWayFilter::new(positive, negative).allows(base, file)
}
