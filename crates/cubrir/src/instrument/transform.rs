//! Source-to-source coverage instrumentation of a single JavaScript file.
//!
//! The file is parsed with oxc, counters are planned as text insertions at
//! byte offsets, and the output is assembled by copying the original text
//! between insertions. Nothing is re-printed, so formatting, comments and
//! unparsed constructs survive untouched.
//!
//! Counters live on a per-file object registered under a global key
//! (`__coverage__` by default) and follow the istanbul layout:
//!
//! ```text
//! cov_1a2b3c().s[n]++        statement n executed
//! cov_1a2b3c().f[n]++        function n entered
//! cov_1a2b3c().b[n][arm]++   arm of branch point n taken
//! ```
//!
//! `cov_1a2b3c` is a hoisted function declaration, so counters inside other
//! hoisted functions work even when those run before the prelude line. The
//! first call registers the file and replaces the accessor with one that
//! returns the cached record.

use super::source_map::{Mapping, SourceMapBuilder};
use crate::coverage::{BranchKind, BranchMeta, FileCoverage, FunctionMeta, Position, Range};
use crate::error::{CubrirError, CubrirResult};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, ConditionalExpression, Function, FunctionBody, IfStatement,
    LogicalExpression, Program, Statement, SwitchStatement,
};
use oxc_ast::{AstKind, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Default global key the per-file coverage objects register under
pub const DEFAULT_COVERAGE_VARIABLE: &str = "__coverage__";

/// Options for transforming one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TransformOptions {
    /// Emit a source map alongside the instrumented code
    #[serde(alias = "produceSourceMap")]
    pub produce_source_map: bool,
    /// Global key coverage objects register under
    #[serde(alias = "coverageVariable")]
    pub coverage_variable: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            produce_source_map: true,
            coverage_variable: DEFAULT_COVERAGE_VARIABLE.to_string(),
        }
    }
}

/// Result of instrumenting one file
#[derive(Debug, Clone)]
pub struct InstrumentedSource {
    /// Instrumented JavaScript
    pub code: String,
    /// Zero-count coverage record embedded in the code
    pub coverage: FileCoverage,
    /// Source map JSON, when requested
    pub source_map: Option<String>,
}

/// Hex SHA-256 of `data`
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Instrument `source`, recording `path` as its origin.
pub fn instrument_source(
    source: &str,
    path: &Path,
    options: &TransformOptions,
) -> CubrirResult<InstrumentedSource> {
    let source_type = SourceType::from_path(path).unwrap_or_default();
    let planned = match plan(source, path, source_type) {
        Err(err) if source_type.is_module() => {
            // Plain browser scripts may use sloppy-mode syntax; retry as a script.
            plan(source, path, source_type.with_module(false)).map_err(|_| err)
        }
        other => other,
    };
    planned?.render(source, path, options)
}

fn plan(source: &str, path: &Path, source_type: SourceType) -> CubrirResult<Plan> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CubrirError::Parse {
            path: path.to_path_buf(),
            message,
        });
    }

    let lines = LineIndex::new(source);
    let path_text = path.to_string_lossy();
    let var = format!(
        "cov_{}",
        &content_hash(format!("{path_text}\0{source}").as_bytes())[..12]
    );
    let mut visitor = CoverageVisitor::new(&lines, var, &path_text);
    visitor.visit_program(&ret.program);
    visitor.insert_prelude_slot(&ret.program, source.len() as u32);
    Ok(visitor.finish())
}

/// Counter insertions planned for one file
struct Plan {
    var: String,
    coverage: FileCoverage,
    insertions: Vec<Insertion>,
}

/// Ordering among insertions that share an offset and extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Wrap,
    Function,
    Branch,
    Statement,
    ElseArm,
}

#[derive(Debug, Clone)]
struct Insertion {
    offset: u32,
    closing: bool,
    extent: u32,
    rank: Rank,
    text: InsertText,
}

#[derive(Debug, Clone)]
enum InsertText {
    Literal(String),
    Prelude,
}

impl Insertion {
    fn open(offset: u32, owner: Span, rank: Rank, text: String) -> Self {
        Self {
            offset,
            closing: false,
            extent: owner.end.saturating_sub(owner.start),
            rank,
            text: InsertText::Literal(text),
        }
    }

    fn close(offset: u32, owner: Span, rank: Rank, text: String) -> Self {
        Self {
            closing: true,
            ..Self::open(offset, owner, rank, text)
        }
    }

    /// Closings first; openings outermost first; closings innermost first.
    fn order(&self, other: &Self) -> std::cmp::Ordering {
        self.offset
            .cmp(&other.offset)
            .then_with(|| other.closing.cmp(&self.closing))
            .then_with(|| {
                if self.closing {
                    self.extent
                        .cmp(&other.extent)
                        .then_with(|| other.rank.cmp(&self.rank))
                } else {
                    other
                        .extent
                        .cmp(&self.extent)
                        .then_with(|| self.rank.cmp(&other.rank))
                }
            })
    }
}

/// Byte offset to line/column lookup
struct LineIndex<'s> {
    source: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(index, _)| index + 1))
            .collect();
        Self { source, starts }
    }

    fn position(&self, offset: u32) -> Position {
        let offset = (offset as usize).min(self.source.len());
        let line = self.starts.partition_point(|start| *start <= offset).max(1);
        let start = self.starts[line - 1];
        let column = self
            .source
            .get(start..offset)
            .map_or(0, |text| text.chars().count());
        Position::new(line as u32, column as u32)
    }

    fn range(&self, span: Span) -> Range {
        Range {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }
}

fn is_countable(statement: &Statement<'_>) -> bool {
    !matches!(
        statement,
        Statement::FunctionDeclaration(_)
            | Statement::EmptyStatement(_)
            | Statement::ImportDeclaration(_)
            | Statement::BlockStatement(_)
    )
}

struct CoverageVisitor<'s> {
    lines: &'s LineIndex<'s>,
    var: String,
    coverage: FileCoverage,
    insertions: Vec<Insertion>,
    expression_bodies: HashSet<(u32, u32)>,
}

impl<'s> CoverageVisitor<'s> {
    fn new(lines: &'s LineIndex<'s>, var: String, path: &str) -> Self {
        Self {
            lines,
            var,
            coverage: FileCoverage::new(path),
            insertions: Vec::new(),
            expression_bodies: HashSet::new(),
        }
    }

    fn finish(self) -> Plan {
        Plan {
            var: self.var,
            coverage: self.coverage,
            insertions: self.insertions,
        }
    }

    fn declare_statement(&mut self, span: Span) -> String {
        let id = self.coverage.statement_map.len() as u32;
        self.coverage.statement_map.insert(id, self.lines.range(span));
        self.coverage.s.insert(id, 0);
        format!("{}().s[{id}]++;", self.var)
    }

    fn declare_function(&mut self, name: Option<String>, decl: Span, loc: Span) -> String {
        let id = self.coverage.fn_map.len() as u32;
        let loc = self.lines.range(loc);
        self.coverage.fn_map.insert(
            id,
            FunctionMeta {
                name: name.unwrap_or_else(|| format!("(anonymous_{id})")),
                decl: self.lines.range(decl),
                loc,
                line: loc.start.line,
            },
        );
        self.coverage.f.insert(id, 0);
        format!("{}().f[{id}]++;", self.var)
    }

    fn declare_branch(&mut self, kind: BranchKind, span: Span, arms: &[Span]) -> u32 {
        let id = self.coverage.branch_map.len() as u32;
        let loc = self.lines.range(span);
        self.coverage.branch_map.insert(
            id,
            BranchMeta {
                loc,
                kind,
                locations: arms.iter().map(|arm| self.lines.range(*arm)).collect(),
                line: loc.start.line,
            },
        );
        self.coverage.b.insert(id, vec![0; arms.len()]);
        id
    }

    fn branch_counter(&self, branch: u32, arm: usize) -> String {
        format!("{}().b[{branch}][{arm}]++", self.var)
    }

    fn count_statements<'b, 'a: 'b>(&mut self, statements: impl IntoIterator<Item = &'b Statement<'a>>) {
        for statement in statements {
            if is_countable(statement) {
                let span = statement.span();
                let counter = self.declare_statement(span);
                self.insertions
                    .push(Insertion::open(span.start, span, Rank::Statement, counter));
            }
        }
    }

    /// Give a loop or `if` body its own block so counters can precede it.
    fn wrap_body(&mut self, body: &Statement<'_>, arm: Option<(u32, usize)>) {
        let span = body.span();
        if let Statement::BlockStatement(block) = body {
            if let Some((branch, index)) = arm {
                let counter = format!("{};", self.branch_counter(branch, index));
                self.insertions
                    .push(Insertion::open(block.span.start + 1, span, Rank::Branch, counter));
            }
            return;
        }

        self.insertions
            .push(Insertion::open(span.start, span, Rank::Wrap, "{ ".to_string()));
        if let Some((branch, index)) = arm {
            let counter = format!("{};", self.branch_counter(branch, index));
            self.insertions
                .push(Insertion::open(span.start, span, Rank::Branch, counter));
        }
        if is_countable(body) {
            let counter = self.declare_statement(span);
            self.insertions
                .push(Insertion::open(span.start, span, Rank::Statement, counter));
        }
        self.insertions
            .push(Insertion::close(span.end, span, Rank::Wrap, " }".to_string()));
    }

    fn instrument_if(&mut self, statement: &IfStatement<'_>) {
        let consequent = statement.consequent.span();
        let alternate = statement.alternate.as_ref().map_or(statement.span, GetSpan::span);
        let branch = self.declare_branch(BranchKind::If, statement.span, &[consequent, alternate]);

        self.wrap_body(&statement.consequent, Some((branch, 0)));
        match &statement.alternate {
            Some(alternate) => self.wrap_body(alternate, Some((branch, 1))),
            None => {
                let text = format!(" else {{ {}; }}", self.branch_counter(branch, 1));
                self.insertions.push(Insertion::close(
                    statement.span.end,
                    statement.span,
                    Rank::ElseArm,
                    text,
                ));
            }
        }
    }

    fn wrap_arm(&mut self, branch: u32, arm: usize, span: Span) {
        let open = format!("({}, ", self.branch_counter(branch, arm));
        self.insertions
            .push(Insertion::open(span.start, span, Rank::Branch, open));
        self.insertions
            .push(Insertion::close(span.end, span, Rank::Branch, ")".to_string()));
    }

    fn instrument_conditional(&mut self, expression: &ConditionalExpression<'_>) {
        let arms = [expression.consequent.span(), expression.alternate.span()];
        let branch = self.declare_branch(BranchKind::CondExpr, expression.span, &arms);
        for (index, span) in arms.into_iter().enumerate() {
            self.wrap_arm(branch, index, span);
        }
    }

    fn instrument_logical(&mut self, expression: &LogicalExpression<'_>) {
        let arms = [expression.left.span(), expression.right.span()];
        let branch = self.declare_branch(BranchKind::BinaryExpr, expression.span, &arms);
        for (index, span) in arms.into_iter().enumerate() {
            self.wrap_arm(branch, index, span);
        }
    }

    fn instrument_switch(&mut self, statement: &SwitchStatement<'_>) {
        let arms: Vec<Span> = statement.cases.iter().map(|case| case.span).collect();
        let branch = self.declare_branch(BranchKind::Switch, statement.span, &arms);
        for (index, case) in statement.cases.iter().enumerate() {
            let counter = format!("{};", self.branch_counter(branch, index));
            let insertion = match case.consequent.first() {
                Some(first) => {
                    Insertion::open(first.span().start, case.span, Rank::Branch, counter)
                }
                None => Insertion::close(case.span.end, case.span, Rank::Branch, counter),
            };
            self.insertions.push(insertion);
        }
    }

    fn push_function_counter(&mut self, counter: String, body: &FunctionBody<'_>) {
        let insertion = if let Some(first) = body.statements.first() {
            Insertion::open(first.span().start, body.span, Rank::Function, counter)
        } else if let Some(last) = body.directives.last() {
            Insertion::open(last.span.end, body.span, Rank::Function, format!(";{counter}"))
        } else {
            Insertion::open(body.span.start + 1, body.span, Rank::Function, counter)
        };
        self.insertions.push(insertion);
    }

    fn instrument_function(&mut self, function: &Function<'_>) {
        let Some(body) = &function.body else {
            return;
        };
        let name = function.id.as_ref().map(|id| id.name.to_string());
        let decl = function.id.as_ref().map_or(function.span, |id| id.span);
        let counter = self.declare_function(name, decl, function.span);
        self.push_function_counter(counter, body);
    }

    fn instrument_arrow(&mut self, arrow: &ArrowFunctionExpression<'_>) {
        let counter = self.declare_function(None, arrow.span, arrow.span);
        if !arrow.expression {
            self.push_function_counter(counter, &arrow.body);
            return;
        }

        // `x => expr` becomes `x => { counters; return expr }`.
        let body = arrow.body.span;
        self.expression_bodies.insert((body.start, body.end));
        let statement = self.declare_statement(body);
        self.insertions.push(Insertion::open(
            body.start,
            body,
            Rank::Wrap,
            format!("{{ {counter}{statement} return "),
        ));
        self.insertions
            .push(Insertion::close(body.end, body, Rank::Wrap, " }".to_string()));
    }

    /// The coverage object is created before the first statement, after any
    /// hashbang and directive prologue.
    fn insert_prelude_slot(&mut self, program: &Program<'_>, source_len: u32) {
        let offset = program
            .body
            .first()
            .map(|statement| statement.span().start)
            .or_else(|| program.directives.last().map(|directive| directive.span.end))
            .or_else(|| program.hashbang.as_ref().map(|hashbang| hashbang.span.end))
            .unwrap_or(0)
            .min(source_len);
        self.insertions.push(Insertion {
            offset,
            closing: false,
            extent: u32::MAX,
            rank: Rank::Wrap,
            text: InsertText::Prelude,
        });
    }
}

impl<'a> Visit<'a> for CoverageVisitor<'_> {
    fn enter_node(&mut self, kind: AstKind<'a>) {
        match kind {
            AstKind::Program(program) => self.count_statements(program.body.iter()),
            AstKind::BlockStatement(block) => self.count_statements(block.body.iter()),
            AstKind::StaticBlock(block) => self.count_statements(block.body.iter()),
            AstKind::SwitchCase(case) => self.count_statements(case.consequent.iter()),
            AstKind::FunctionBody(body) => {
                if !self.expression_bodies.contains(&(body.span.start, body.span.end)) {
                    self.count_statements(body.statements.iter());
                }
            }
            AstKind::IfStatement(statement) => self.instrument_if(statement),
            AstKind::ForStatement(statement) => self.wrap_body(&statement.body, None),
            AstKind::ForInStatement(statement) => self.wrap_body(&statement.body, None),
            AstKind::ForOfStatement(statement) => self.wrap_body(&statement.body, None),
            AstKind::WhileStatement(statement) => self.wrap_body(&statement.body, None),
            AstKind::DoWhileStatement(statement) => self.wrap_body(&statement.body, None),
            AstKind::SwitchStatement(statement) => self.instrument_switch(statement),
            AstKind::ConditionalExpression(expression) => self.instrument_conditional(expression),
            AstKind::LogicalExpression(expression) => self.instrument_logical(expression),
            AstKind::Function(function) => self.instrument_function(function),
            AstKind::ArrowFunctionExpression(arrow) => self.instrument_arrow(arrow),
            _ => {}
        }
    }
}

/// Output text plus the generated position of its end
struct Emitter<'s> {
    lines: &'s LineIndex<'s>,
    out: String,
    line: u32,
    column: u32,
    map: Option<SourceMapBuilder>,
}

impl<'s> Emitter<'s> {
    fn insert(&mut self, text: &str) {
        self.out.push_str(text);
        self.advance(text);
    }

    fn copy(&mut self, source: &str, from: u32, to: u32) {
        let Some(chunk) = source.get(from as usize..to as usize) else {
            return;
        };
        if chunk.is_empty() {
            return;
        }
        let origin = self.lines.position(from);
        self.mark(origin.line - 1, origin.column);
        let mut original_line = origin.line - 1;
        for ch in chunk.chars() {
            self.out.push(ch);
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
                original_line += 1;
                self.mark(original_line, 0);
            } else {
                self.column += 1;
            }
        }
    }

    fn mark(&mut self, original_line: u32, original_column: u32) {
        if let Some(map) = self.map.as_mut() {
            map.add(Mapping {
                generated_line: self.line,
                generated_column: self.column,
                original_line,
                original_column,
            });
        }
    }

    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }
}

impl Plan {
    fn prelude(&self, options: &TransformOptions) -> CubrirResult<String> {
        let data = serde_json::to_string(&self.coverage)?;
        let path = serde_json::to_string(&self.coverage.path)?;
        let hash = serde_json::to_string(&self.coverage.hash)?;
        let key = serde_json::to_string(&options.coverage_variable)?;
        Ok(format!(
            "function {var}() {{ var path = {path}; var hash = {hash}; \
             var global = typeof globalThis !== \"undefined\" ? globalThis : new Function(\"return this\")(); \
             var gcv = {key}; var coverageData = {data}; \
             var coverage = global[gcv] || (global[gcv] = {{}}); \
             if (!coverage[path] || coverage[path].hash !== hash) {{ coverage[path] = coverageData; }} \
             var actualCoverage = coverage[path]; \
             {var} = function () {{ return actualCoverage; }}; \
             return actualCoverage; }}\n{var}();\n",
            var = self.var,
        ))
    }

    fn render(
        mut self,
        source: &str,
        path: &Path,
        options: &TransformOptions,
    ) -> CubrirResult<InstrumentedSource> {
        self.coverage.hash = Some(content_hash(source.as_bytes()));
        let prelude = self.prelude(options)?;

        let mut insertions = std::mem::take(&mut self.insertions);
        insertions.sort_by(Insertion::order);

        let lines = LineIndex::new(source);
        let mut emitter = Emitter {
            lines: &lines,
            out: String::with_capacity(source.len() + prelude.len() + insertions.len() * 16),
            line: 0,
            column: 0,
            map: options.produce_source_map.then(SourceMapBuilder::default),
        };

        let mut cursor = 0u32;
        for insertion in &insertions {
            emitter.copy(source, cursor, insertion.offset);
            cursor = cursor.max(insertion.offset);
            match &insertion.text {
                InsertText::Literal(text) => emitter.insert(text),
                InsertText::Prelude => emitter.insert(&prelude),
            }
        }
        emitter.copy(source, cursor, source.len() as u32);

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source_map = match emitter.map.take() {
            Some(map) => {
                emitter.insert(&format!("\n//# sourceMappingURL={file_name}.map\n"));
                Some(map.to_json(&file_name, &self.coverage.path, source)?)
            }
            None => None,
        };

        Ok(InstrumentedSource {
            code: emitter.out,
            coverage: self.coverage,
            source_map,
        })
    }
}

/// Whether `code` already carries coverage instrumentation
pub fn is_instrumented(code: &str) -> bool {
    code.contains(DEFAULT_COVERAGE_VARIABLE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn instrument(source: &str) -> InstrumentedSource {
        instrument_source(source, Path::new("/src/a.js"), &TransformOptions::default()).unwrap()
    }

    fn reparse(code: &str) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::default().with_module(false)).parse();
        assert!(ret.errors.is_empty(), "output does not parse: {code}\n{:?}", ret.errors);
    }

    #[test]
    fn test_statements_counted() {
        let result = instrument("var a = 1;\nvar b = 2;\nconsole.log(a + b);\n");
        assert_eq!(result.coverage.s.len(), 3);
        assert_eq!(result.coverage.statement_map[&2].start, Position::new(3, 0));
        assert!(result.code.contains(".s[0]++;var a = 1;"));
        reparse(&result.code);
    }

    #[test]
    fn test_counters_start_at_zero() {
        let result = instrument("function f(x) { return x ? 1 : 2; }\nf(true);\n");
        assert!(result.coverage.s.values().all(|hits| *hits == 0));
        assert!(result.coverage.f.values().all(|hits| *hits == 0));
        assert!(result.coverage.b.values().flatten().all(|hits| *hits == 0));
    }

    #[test]
    fn test_function_names_and_counter_placement() {
        let result = instrument("function add(a, b) {\n  return a + b;\n}\nvar g = function () {};\n");
        assert_eq!(result.coverage.fn_map[&0].name, "add");
        assert_eq!(result.coverage.fn_map[&1].name, "(anonymous_1)");
        assert!(result.code.contains(".f[0]++;"));
        assert!(result.code.contains("function () {") && result.code.contains(".f[1]++;}"));
        reparse(&result.code);
    }

    #[test]
    fn test_if_without_else_gets_synthesized_arm() {
        let result = instrument("if (x) y();\n");
        let branch = &result.coverage.branch_map[&0];
        assert_eq!(branch.kind, BranchKind::If);
        assert_eq!(branch.locations.len(), 2);
        assert!(result.code.contains(" else { "));
        assert!(result.code.contains(".b[0][1]++; }"));
        reparse(&result.code);
    }

    #[test]
    fn test_else_if_chain_parses() {
        let result = instrument("if (a) x(); else if (b) y(); else z();\n");
        assert_eq!(result.coverage.b.len(), 2);
        reparse(&result.code);
    }

    #[test]
    fn test_nested_unbraced_bodies() {
        let result = instrument("for (var i = 0; i < 3; i++) if (i) while (i--) f(i);\n");
        reparse(&result.code);
        assert!(result.coverage.s.len() >= 4);
    }

    #[test]
    fn test_logical_and_conditional_branches() {
        let result = instrument("var v = a && b || c;\nvar w = t ? 1 : 2;\n");
        let kinds: Vec<BranchKind> = result.coverage.branch_map.values().map(|b| b.kind).collect();
        assert_eq!(
            kinds.iter().filter(|k| **k == BranchKind::BinaryExpr).count(),
            2
        );
        assert!(kinds.contains(&BranchKind::CondExpr));
        reparse(&result.code);
    }

    #[test]
    fn test_switch_arms() {
        let result =
            instrument("switch (x) {\n  case 1:\n  case 2: f(); break;\n  default: g();\n}\n");
        let branch = result.coverage.branch_map.values().next().unwrap();
        assert_eq!(branch.kind, BranchKind::Switch);
        assert_eq!(result.coverage.b[&0].len(), 3);
        reparse(&result.code);
    }

    #[test]
    fn test_expression_arrow_becomes_block() {
        let result = instrument("var sq = x => x * x;\nvar obj = () => ({ a: 1 });\n");
        assert_eq!(result.coverage.f.len(), 2);
        assert!(result.code.contains("return x * x }"));
        reparse(&result.code);
    }

    #[test]
    fn test_directives_stay_first() {
        let result = instrument("\"use strict\";\nfunction f() { \"use strict\"; }\n");
        assert!(result.code.starts_with("\"use strict\";"));
        assert!(result.code.contains("\"use strict\";;"));
        reparse(&result.code);
    }

    #[test]
    fn test_hashbang_preserved() {
        let result = instrument("#!/usr/bin/env node\nrun();\n");
        assert!(result.code.starts_with("#!/usr/bin/env node\n"));
    }

    #[test]
    fn test_labels_and_empty_statements() {
        let result = instrument("outer: for (;;) { break outer; }\nif (a);\n");
        reparse(&result.code);
    }

    #[test]
    fn test_prelude_registers_global() {
        let result = instrument("x();\n");
        assert!(is_instrumented(&result.code));
        assert!(result.code.contains("\"/src/a.js\""));
        assert!(result.coverage.hash.is_some());
    }

    #[test]
    fn test_prelude_is_hoisted_accessor() {
        let result = instrument("function early() { return 1; }\nearly();\n");
        let accessor = result.code.split('(').next().unwrap().trim_start_matches("function ").to_string();
        assert!(accessor.starts_with("cov_"));
        assert!(result.code.starts_with(&format!("function {accessor}() {{")));
        assert!(result.code.contains(&format!("{accessor} = function () {{ return actualCoverage; }};")));
        assert!(result.code.contains(&format!("}}\n{accessor}();\n")));
        assert!(!result.code.contains(&format!("var {accessor}")));
        assert!(result.code.contains(&format!("{accessor}().f[0]++;")));
        assert!(result.code.contains(&format!("{accessor}().s[0]++;")));
        reparse(&result.code);
    }

    #[test]
    fn test_source_map_emitted_on_request() {
        let with_map = instrument("x();\n");
        let map: serde_json::Value =
            serde_json::from_str(with_map.source_map.as_deref().unwrap()).unwrap();
        assert_eq!(map["version"], 3);
        assert!(with_map.code.contains("//# sourceMappingURL=a.js.map"));

        let options = TransformOptions {
            produce_source_map: false,
            ..TransformOptions::default()
        };
        let without = instrument_source("x();\n", Path::new("/src/a.js"), &options).unwrap();
        assert!(without.source_map.is_none());
        assert!(!without.code.contains("sourceMappingURL"));
    }

    #[test]
    fn test_sloppy_script_falls_back() {
        let result = instrument("with (obj) { x = 1; }\nvar n = 010;\n");
        reparse(&result.code);
    }

    #[test]
    fn test_parse_error_reported() {
        let err = instrument_source("var = ;", Path::new("/src/bad.js"), &TransformOptions::default())
            .unwrap_err();
        assert!(matches!(err, CubrirError::Parse { .. }));
        assert!(err.to_string().contains("/src/bad.js"));
    }

    #[test]
    fn test_is_instrumented() {
        assert!(!is_instrumented("var a = 1;"));
        assert!(is_instrumented("window.__coverage__ = {};"));
    }

    #[test]
    fn test_insertion_order() {
        let outer = Span::new(0, 10);
        let inner = Span::new(0, 4);
        let mut items = vec![
            Insertion::open(0, inner, Rank::Statement, "s".into()),
            Insertion::close(0, inner, Rank::Wrap, "}".into()),
            Insertion::open(0, outer, Rank::Branch, "b".into()),
            Insertion::open(0, outer, Rank::Wrap, "{".into()),
        ];
        items.sort_by(Insertion::order);
        let texts: Vec<String> = items
            .iter()
            .map(|i| match &i.text {
                InsertText::Literal(text) => text.clone(),
                InsertText::Prelude => String::new(),
            })
            .collect();
        assert_eq!(texts, vec!["}", "{", "b", "s"]);
    }

    #[test]
    fn test_line_index_columns() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.position(0), Position::new(1, 0));
        assert_eq!(index.position(4), Position::new(2, 1));
        assert_eq!(index.position(6), Position::new(3, 0));
    }
}
