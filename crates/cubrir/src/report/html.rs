//! Single-page HTML coverage report.

use super::text::format_pct;
use crate::coverage::{CoverageMap, CoverageTotals, FileSummary};
use std::fmt::Write;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;width:100%}\
th,td{padding:.4em .8em;border-bottom:1px solid #ddd;text-align:left}\
td.num{text-align:right;font-variant-numeric:tabular-nums}\
.high{background:#e6f5d0}.medium{background:#fff4c2}.low{background:#fce1e1}\
.strong{font-weight:600}";

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Watermark class for a percentage
pub fn watermark(pct: f64) -> &'static str {
    if pct >= 80.0 {
        "high"
    } else if pct >= 50.0 {
        "medium"
    } else {
        "low"
    }
}

/// HTML report generator
#[derive(Debug)]
pub struct HtmlFormatter<'a> {
    coverage: &'a CoverageMap,
    title: String,
}

impl<'a> HtmlFormatter<'a> {
    /// Create a formatter over merged coverage
    #[must_use]
    pub fn new(coverage: &'a CoverageMap) -> Self {
        Self {
            coverage,
            title: "Code coverage report".to_string(),
        }
    }

    /// Override the page title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn cells(row: &mut String, summary: &FileSummary) {
        for totals in [
            &summary.statements,
            &summary.branches,
            &summary.functions,
            &summary.lines,
        ] {
            Self::cell(row, totals);
        }
    }

    fn cell(row: &mut String, totals: &CoverageTotals) {
        let _ = write!(
            row,
            "<td class=\"num {}\">{} <small>({}/{})</small></td>",
            watermark(totals.pct),
            format_pct(totals.pct),
            totals.covered,
            totals.total
        );
    }

    /// Generate the page
    #[must_use]
    pub fn generate(&self) -> String {
        let title = escape_html(&self.title);
        let total = self.coverage.summary();

        let mut html = String::new();
        let _ = writeln!(html, "<!DOCTYPE html>");
        let _ = writeln!(html, "<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">");
        let _ = writeln!(html, "<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>");
        let _ = writeln!(html, "<h1>{title}</h1>");
        let _ = writeln!(
            html,
            "<table>\n<thead><tr><th>File</th><th>Statements</th><th>Branches</th><th>Functions</th><th>Lines</th></tr></thead>\n<tbody>"
        );

        for (path, file) in self.coverage.files() {
            let mut row = format!("<tr><td>{}</td>", escape_html(path));
            Self::cells(&mut row, &file.summary());
            row.push_str("</tr>");
            let _ = writeln!(html, "{row}");
        }

        let mut footer = String::from("<tr class=\"strong\"><td>All files</td>");
        Self::cells(&mut footer, &total);
        footer.push_str("</tr>");
        let _ = writeln!(html, "</tbody>\n<tfoot>{footer}</tfoot>\n</table>");
        let _ = writeln!(
            html,
            "<p><small>Generated {}</small></p>\n</body>\n</html>",
            chrono::Utc::now().to_rfc3339()
        );
        html
    }
}
