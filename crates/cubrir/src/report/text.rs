//! Plain-text summary in the istanbul `text-summary` layout.

use crate::coverage::{CoverageTotals, FileSummary};
use std::fmt::Write;

const WIDTH: usize = 80;

/// Format a percentage the way JavaScript prints numbers: no trailing zeros
pub fn format_pct(pct: f64) -> String {
    let text = format!("{pct:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text}%")
}

fn metric_line(output: &mut String, label: &str, totals: &CoverageTotals) {
    let _ = writeln!(
        output,
        "{label:<13}: {} ( {}/{} )",
        format_pct(totals.pct),
        totals.covered,
        totals.total
    );
}

/// Render the overall summary
pub fn text_summary(summary: &FileSummary) -> String {
    let title = " Coverage summary ";
    let left = (WIDTH - title.len()) / 2;
    let right = WIDTH - title.len() - left;

    let mut output = String::new();
    let _ = writeln!(output, "{}{title}{}", "=".repeat(left), "=".repeat(right));
    metric_line(&mut output, "Statements", &summary.statements);
    metric_line(&mut output, "Branches", &summary.branches);
    metric_line(&mut output, "Functions", &summary.functions);
    metric_line(&mut output, "Lines", &summary.lines);
    let _ = writeln!(output, "{}", "=".repeat(WIDTH));
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(100.0), "100%");
        assert_eq!(format_pct(66.66), "66.66%");
        assert_eq!(format_pct(50.5), "50.5%");
        assert_eq!(format_pct(0.0), "0%");
    }

    #[test]
    fn test_summary_layout() {
        let summary = FileSummary {
            statements: CoverageTotals::new(4, 4),
            branches: CoverageTotals::new(2, 1),
            functions: CoverageTotals::new(2, 2),
            lines: CoverageTotals::new(4, 4),
        };
        let text = text_summary(&summary);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].len(), WIDTH);
        assert!(lines[0].contains(" Coverage summary "));
        assert_eq!(lines[1], "Statements   : 100% ( 4/4 )");
        assert_eq!(lines[2], "Branches     : 50% ( 1/2 )");
        assert_eq!(lines[5], "=".repeat(WIDTH));
    }
}
