//! Istanbul-compatible coverage data.
//!
//! The JSON layout of [`FileCoverage`] matches what the istanbul tool chain
//! reads and writes (`statementMap`, `fnMap`, `branchMap`, `s`, `f`, `b`), so
//! files produced by either side merge into the same [`CoverageMap`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Line/column position (1-based line, 0-based column)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

impl Position {
    /// Create a position
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source range between two positions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive start
    pub start: Position,
    /// Exclusive end
    pub end: Position,
}

/// Location metadata for a function counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMeta {
    /// Declared or synthesised name
    pub name: String,
    /// Range of the name (or the whole function when anonymous)
    pub decl: Range,
    /// Range of the function
    pub loc: Range,
    /// Start line
    pub line: u32,
}

/// Kind of a branch point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchKind {
    /// `if` / `else`
    If,
    /// `a ? b : c`
    CondExpr,
    /// `a && b`, `a || b`, `a ?? b`
    BinaryExpr,
    /// `switch` cases
    Switch,
    /// Default parameter values
    DefaultArg,
}

/// Location metadata for a branch counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMeta {
    /// Range of the whole branching construct
    pub loc: Range,
    /// Branch kind
    #[serde(rename = "type")]
    pub kind: BranchKind,
    /// One range per arm
    pub locations: Vec<Range>,
    /// Start line
    pub line: u32,
}

/// Coverage counters and metadata for one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    /// Original source path
    pub path: String,
    /// Statement ranges by id
    pub statement_map: BTreeMap<u32, Range>,
    /// Function metadata by id
    pub fn_map: BTreeMap<u32, FunctionMeta>,
    /// Branch metadata by id
    pub branch_map: BTreeMap<u32, BranchMeta>,
    /// Statement hit counts
    pub s: BTreeMap<u32, u64>,
    /// Function hit counts
    pub f: BTreeMap<u32, u64>,
    /// Branch arm hit counts
    pub b: BTreeMap<u32, Vec<u64>>,
    /// Hash of the source the counters were generated for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl FileCoverage {
    /// Empty coverage record for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add another run's counters for the same file.
    ///
    /// Metadata missing on this side is taken from `other`; counters are
    /// summed per id, and per arm for branches.
    pub fn merge(&mut self, other: &FileCoverage) {
        for (id, range) in &other.statement_map {
            self.statement_map.entry(*id).or_insert(*range);
        }
        for (id, meta) in &other.fn_map {
            self.fn_map.entry(*id).or_insert_with(|| meta.clone());
        }
        for (id, meta) in &other.branch_map {
            self.branch_map.entry(*id).or_insert_with(|| meta.clone());
        }
        for (id, hits) in &other.s {
            let mine = self.s.entry(*id).or_insert(0);
            *mine = mine.saturating_add(*hits);
        }
        for (id, hits) in &other.f {
            let mine = self.f.entry(*id).or_insert(0);
            *mine = mine.saturating_add(*hits);
        }
        for (id, arms) in &other.b {
            let mine = self.b.entry(*id).or_default();
            if mine.len() < arms.len() {
                mine.resize(arms.len(), 0);
            }
            for (slot, hits) in mine.iter_mut().zip(arms) {
                *slot = slot.saturating_add(*hits);
            }
        }
        if self.hash.is_none() {
            self.hash.clone_from(&other.hash);
        }
    }

    /// Hit count per line: the highest count of any statement starting on it
    pub fn line_hits(&self) -> BTreeMap<u32, u64> {
        let mut lines = BTreeMap::new();
        for (id, range) in &self.statement_map {
            let hits = self.s.get(id).copied().unwrap_or(0);
            let entry = lines.entry(range.start.line).or_insert(0);
            *entry = (*entry).max(hits);
        }
        lines
    }

    /// Coverage totals for this file
    pub fn summary(&self) -> FileSummary {
        let line_hits = self.line_hits();
        FileSummary {
            lines: CoverageTotals::from_hits(line_hits.values().copied()),
            statements: CoverageTotals::from_hits(self.s.values().copied()),
            functions: CoverageTotals::from_hits(self.f.values().copied()),
            branches: CoverageTotals::from_hits(self.b.values().flatten().copied()),
        }
    }
}

/// Covered/total counts for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageTotals {
    /// Number of counters
    pub total: u64,
    /// Counters hit at least once
    pub covered: u64,
    /// Counters excluded from measurement
    pub skipped: u64,
    /// Covered percentage, floored to two decimals; 100 when total is 0
    pub pct: f64,
}

impl Default for CoverageTotals {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl CoverageTotals {
    /// Totals from explicit counts
    pub fn new(total: u64, covered: u64) -> Self {
        Self {
            total,
            covered,
            skipped: 0,
            pct: percent(covered, total),
        }
    }

    /// Totals from a sequence of hit counts
    pub fn from_hits(hits: impl IntoIterator<Item = u64>) -> Self {
        let (total, covered) = hits
            .into_iter()
            .fold((0, 0), |(total, covered), hit| (total + 1, covered + u64::from(hit > 0)));
        Self::new(total, covered)
    }

    /// Sum two totals
    pub fn combine(self, other: Self) -> Self {
        Self {
            skipped: self.skipped + other.skipped,
            ..Self::new(self.total + other.total, self.covered + other.covered)
        }
    }
}

/// Covered percentage floored to two decimals, 100 when there is nothing to cover
pub fn percent(covered: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let scaled = (100_000 * covered) / total;
    (scaled / 10) as f64 / 100.0
}

/// Totals for every metric of one file, or of a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Line coverage
    pub lines: CoverageTotals,
    /// Statement coverage
    pub statements: CoverageTotals,
    /// Function coverage
    pub functions: CoverageTotals,
    /// Branch arm coverage
    pub branches: CoverageTotals,
}

impl FileSummary {
    /// Sum two summaries metric by metric
    pub fn combine(self, other: Self) -> Self {
        Self {
            lines: self.lines.combine(other.lines),
            statements: self.statements.combine(other.statements),
            functions: self.functions.combine(other.functions),
            branches: self.branches.combine(other.branches),
        }
    }
}

/// Coverage for many files, keyed by source path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap(BTreeMap<String, FileCoverage>);

impl CoverageMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a file's coverage, summing with any existing record for its path
    pub fn add_file(&mut self, key: impl Into<String>, coverage: FileCoverage) {
        match self.0.entry(key.into()) {
            std::collections::btree_map::Entry::Occupied(mut existing) => {
                existing.get_mut().merge(&coverage);
            }
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(coverage);
            }
        }
    }

    /// Merge every file of another map into this one
    pub fn merge(&mut self, other: CoverageMap) {
        for (key, coverage) in other.0 {
            self.add_file(key, coverage);
        }
    }

    /// Coverage for one path
    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.0.get(path)
    }

    /// Files in path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &FileCoverage)> {
        self.0.iter().map(|(path, coverage)| (path.as_str(), coverage))
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map holds no files
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Totals across every file
    pub fn summary(&self) -> FileSummary {
        self.0
            .values()
            .map(FileCoverage::summary)
            .fold(FileSummary::default(), FileSummary::combine)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn range(line: u32, start: u32, end: u32) -> Range {
        Range {
            start: Position::new(line, start),
            end: Position::new(line, end),
        }
    }

    fn sample(s: &[u64], f: &[u64], b: &[&[u64]]) -> FileCoverage {
        let mut cov = FileCoverage::new("/src/a.js");
        for (id, hits) in s.iter().enumerate() {
            cov.statement_map.insert(id as u32, range(id as u32 + 1, 0, 10));
            cov.s.insert(id as u32, *hits);
        }
        for (id, hits) in f.iter().enumerate() {
            cov.fn_map.insert(
                id as u32,
                FunctionMeta {
                    name: format!("f{id}"),
                    decl: range(1, 9, 11),
                    loc: range(1, 0, 20),
                    line: 1,
                },
            );
            cov.f.insert(id as u32, *hits);
        }
        for (id, arms) in b.iter().enumerate() {
            cov.branch_map.insert(
                id as u32,
                BranchMeta {
                    loc: range(2, 0, 30),
                    kind: BranchKind::If,
                    locations: vec![range(2, 0, 10); arms.len()],
                    line: 2,
                },
            );
            cov.b.insert(id as u32, arms.to_vec());
        }
        cov
    }

    #[test]
    fn test_percent_zero_total_is_full() {
        assert_eq!(percent(0, 0), 100.0);
    }

    #[test]
    fn test_percent_floors_to_two_decimals() {
        assert_eq!(percent(2, 3), 66.66);
        assert_eq!(percent(1, 2), 50.0);
        assert_eq!(percent(3, 3), 100.0);
    }

    #[test]
    fn test_summary_counts_hits() {
        let cov = sample(&[1, 0, 3], &[2], &[&[1, 0]]);
        let summary = cov.summary();
        assert_eq!(summary.statements.total, 3);
        assert_eq!(summary.statements.covered, 2);
        assert_eq!(summary.functions.pct, 100.0);
        assert_eq!(summary.branches.total, 2);
        assert_eq!(summary.branches.pct, 50.0);
        assert_eq!(summary.lines.total, 3);
    }

    #[test]
    fn test_line_hits_take_max_statement() {
        let mut cov = sample(&[0, 4], &[], &[]);
        cov.statement_map.insert(1, range(1, 12, 20));
        let lines = cov.line_hits();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[&1], 4);
    }

    #[test]
    fn test_merge_sums_counters() {
        let mut left = sample(&[1, 0], &[0], &[&[1, 0]]);
        let right = sample(&[2, 0], &[1], &[&[0, 5]]);
        left.merge(&right);
        assert_eq!(left.s[&0], 3);
        assert_eq!(left.s[&1], 0);
        assert_eq!(left.f[&0], 1);
        assert_eq!(left.b[&0], vec![1, 5]);
    }

    #[test]
    fn test_merge_saturates_at_max() {
        let mut left = sample(&[u64::MAX - 1], &[u64::MAX], &[&[u64::MAX, 1]]);
        let right = sample(&[5], &[1], &[&[1, 1]]);
        left.merge(&right);
        assert_eq!(left.s[&0], u64::MAX);
        assert_eq!(left.f[&0], u64::MAX);
        assert_eq!(left.b[&0], vec![u64::MAX, 2]);
    }

    #[test]
    fn test_merge_adopts_missing_metadata() {
        let mut left = FileCoverage::new("/src/a.js");
        let right = sample(&[1], &[], &[]);
        left.merge(&right);
        assert_eq!(left.statement_map.len(), 1);
        assert_eq!(left.s[&0], 1);
    }

    #[test]
    fn test_json_layout_matches_istanbul() {
        let cov = sample(&[1], &[0], &[&[0, 1]]);
        let json = serde_json::to_value(&cov).unwrap();
        assert!(json.get("statementMap").is_some());
        assert!(json.get("fnMap").is_some());
        assert_eq!(json["branchMap"]["0"]["type"], "if");
        assert_eq!(json["s"]["0"], 1);
        assert_eq!(json["b"]["0"][1], 1);

        let back: FileCoverage = serde_json::from_value(json).unwrap();
        assert_eq!(back, cov);
    }

    #[test]
    fn test_coverage_map_merges_same_path() {
        let mut map = CoverageMap::new();
        map.add_file("/src/a.js", sample(&[1], &[], &[]));
        map.add_file("/src/a.js", sample(&[1], &[], &[]));
        map.add_file("/src/b.js", FileCoverage::new("/src/b.js"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("/src/a.js").unwrap().s[&0], 2);
    }

    #[test]
    fn test_map_summary_combines_files() {
        let mut map = CoverageMap::new();
        map.add_file("/a.js", sample(&[1, 1], &[1], &[&[1, 1]]));
        map.add_file("/b.js", sample(&[0, 0], &[0], &[&[0, 0]]));
        let summary = map.summary();
        assert_eq!(summary.statements.total, 4);
        assert_eq!(summary.statements.covered, 2);
        assert_eq!(summary.branches.pct, 50.0);
        assert_eq!(summary.functions.pct, 50.0);
    }
}
