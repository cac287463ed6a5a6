//! LCOV report formatter
//!
//! ```text
//! TN:<test name>
//! SF:<source file>
//! FN:<line>,<function name>
//! FNDA:<execution count>,<function name>
//! FNF:<functions found>
//! FNH:<functions hit>
//! BRDA:<line>,<block>,<branch>,<taken>
//! BRF:<branches found>
//! BRH:<branches hit>
//! DA:<line>,<execution count>
//! LF:<lines found>
//! LH:<lines hit>
//! end_of_record
//! ```

use crate::coverage::CoverageMap;
use std::fmt::Write;

/// LCOV format report generator
#[derive(Debug)]
pub struct LcovFormatter<'a> {
    coverage: &'a CoverageMap,
    test_name: Option<String>,
}

impl<'a> LcovFormatter<'a> {
    /// Create a formatter over merged coverage
    #[must_use]
    pub fn new(coverage: &'a CoverageMap) -> Self {
        Self {
            coverage,
            test_name: None,
        }
    }

    /// Set the test name written to the `TN:` line
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Generate the report text
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();
        let test_name = self.test_name.as_deref().unwrap_or_default();

        for (path, file) in self.coverage.files() {
            let _ = writeln!(output, "TN:{test_name}");
            let _ = writeln!(output, "SF:{path}");

            for meta in file.fn_map.values() {
                let _ = writeln!(output, "FN:{},{}", meta.line, meta.name);
            }
            let mut functions_hit = 0;
            for (id, meta) in &file.fn_map {
                let count = file.f.get(id).copied().unwrap_or(0);
                let _ = writeln!(output, "FNDA:{count},{}", meta.name);
                if count > 0 {
                    functions_hit += 1;
                }
            }
            let _ = writeln!(output, "FNF:{}", file.fn_map.len());
            let _ = writeln!(output, "FNH:{functions_hit}");

            let lines = file.line_hits();
            for (line, count) in &lines {
                let _ = writeln!(output, "DA:{line},{count}");
            }
            let _ = writeln!(output, "LF:{}", lines.len());
            let _ = writeln!(output, "LH:{}", lines.values().filter(|c| **c > 0).count());

            let mut branches_found = 0;
            let mut branches_hit = 0;
            for (id, meta) in &file.branch_map {
                let arms = file.b.get(id).map(Vec::as_slice).unwrap_or_default();
                for (arm, taken) in arms.iter().enumerate() {
                    let _ = writeln!(output, "BRDA:{},{id},{arm},{taken}", meta.line);
                    branches_found += 1;
                    if *taken > 0 {
                        branches_hit += 1;
                    }
                }
            }
            let _ = writeln!(output, "BRF:{branches_found}");
            let _ = writeln!(output, "BRH:{branches_hit}");

            output.push_str("end_of_record\n");
        }

        output
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{FileCoverage, FunctionMeta, Position, Range};

    fn file() -> FileCoverage {
        let at = |line| Range {
            start: Position::new(line, 0),
            end: Position::new(line, 5),
        };
        let mut cov = FileCoverage::new("/src/a.js");
        cov.statement_map.insert(0, at(1));
        cov.statement_map.insert(1, at(2));
        cov.s.insert(0, 2);
        cov.s.insert(1, 0);
        cov.fn_map.insert(
            0,
            FunctionMeta {
                name: "main".to_string(),
                decl: at(1),
                loc: at(1),
                line: 1,
            },
        );
        cov.f.insert(0, 1);
        cov
    }

    #[test]
    fn test_lcov_records() {
        let mut map = CoverageMap::new();
        map.add_file("/src/a.js", file());
        let text = LcovFormatter::new(&map).with_test_name("suite").generate();

        assert!(text.starts_with("TN:suite\nSF:/src/a.js\n"));
        assert!(text.contains("FN:1,main\n"));
        assert!(text.contains("FNDA:1,main\n"));
        assert!(text.contains("DA:1,2\n"));
        assert!(text.contains("DA:2,0\n"));
        assert!(text.contains("LF:2\nLH:1\n"));
        assert!(text.contains("BRF:0\nBRH:0\n"));
        assert!(text.ends_with("end_of_record\n"));
    }

    #[test]
    fn test_empty_map_is_empty_report() {
        assert!(LcovFormatter::new(&CoverageMap::new()).generate().is_empty());
    }
}
