//! Terminal diagnostics for the front-end.
//!
//! Recoverable conditions (skipped tokens, resynchronizations, lexical
//! noise) render as warnings; fatal parse errors render as errors. Both go
//! through ariadne so the offending source span is shown inline, with a
//! plain-text fallback when rendering fails.

use std::fmt;
use std::io::IsTerminal;
use std::ops::Range;
use std::path::Path;

use ariadne::{sources, Config, Label, Report, ReportKind};

use crate::parser::{Parse, ParseError, RecoveryEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Tokenize,
    Parse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Tokenize => "tokenize",
            Stage::Parse => "parse",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, Debug)]
pub struct SourceLabel {
    pub span: Range<usize>,
    pub message: String,
}

/// One renderable report against a single source file.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub code: String,
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
    pub labels: Vec<SourceLabel>,
    pub notes: Vec<String>,
    file_id: String,
    source: String,
}

impl Diagnostic {
    pub fn error(code: impl Into<String>, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(code, stage, Severity::Error, message)
    }

    pub fn warning(code: impl Into<String>, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(code, stage, Severity::Warning, message)
    }

    fn new(
        code: impl Into<String>,
        stage: Stage,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            stage,
            severity,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            file_id: "<memory>".to_string(),
            source: String::new(),
        }
    }

    pub fn with_source(mut self, path: Option<&Path>, source: impl Into<String>) -> Self {
        self.file_id = file_id_from_path(path);
        self.source = source.into();
        self
    }

    pub fn with_label(mut self, span: Range<usize>, message: impl Into<String>) -> Self {
        self.labels.push(SourceLabel {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn render_plain(&self) -> String {
        self.render_with_color(false)
    }

    pub fn render_terminal_auto(&self) -> String {
        self.render_with_color(std::io::stderr().is_terminal())
    }

    fn render_with_color(&self, use_color: bool) -> String {
        let primary_span = self
            .labels
            .first()
            .map(|label| sanitize_span(&label.span))
            .unwrap_or(0..1);

        let (report_kind, severity_prefix) = match self.severity {
            Severity::Error => (ReportKind::Error, "error"),
            Severity::Warning => (ReportKind::Warning, "warning"),
        };

        let mut report = Report::build(report_kind, (self.file_id.clone(), primary_span))
            .with_code(self.code.clone())
            .with_message(format!(
                "{severity_prefix}[{}:{}]: {}",
                self.stage, self.code, self.message
            ))
            .with_config(Config::default().with_color(use_color));

        for label in &self.labels {
            report = report.with_label(
                Label::new((self.file_id.clone(), sanitize_span(&label.span)))
                    .with_message(label.message.clone()),
            );
        }

        for note in &self.notes {
            report = report.with_note(note.clone());
        }

        let mut output = Vec::new();
        let source_entries = vec![(self.file_id.clone(), self.source.clone())];
        match report.finish().write(sources(source_entries), &mut output) {
            Ok(()) => String::from_utf8_lossy(&output).trim_end().to_string(),
            Err(_) => self.fallback_render(),
        }
    }

    fn fallback_render(&self) -> String {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let mut out = format!("{severity}[{}:{}]: {}", self.stage, self.code, self.message);
        for note in &self.notes {
            out.push('\n');
            out.push_str("note: ");
            out.push_str(note);
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}

#[derive(Clone, Debug, Default)]
pub struct DiagnosticBundle {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBundle {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn render_plain(&self) -> String {
        self.render_all(false)
    }

    pub fn render_terminal_auto(&self) -> String {
        self.render_all(std::io::stderr().is_terminal())
    }

    fn render_all(&self, use_color: bool) -> String {
        self.diagnostics
            .iter()
            .map(|diagnostic| diagnostic.render_with_color(use_color))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for DiagnosticBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}

/// Warnings for everything a recovered parse noted along the way, in the
/// order the parser hit them: lexical noise first, then recovery events.
pub fn recovery_bundle(source: &str, path: Option<&Path>, parse: &Parse) -> DiagnosticBundle {
    let mut bundle = DiagnosticBundle::default();

    for lexical in &parse.lex_diagnostics {
        let span = span_at(source, lexical.line, lexical.column);
        bundle.push(
            Diagnostic::warning("BEGC-TOKENIZE-001", Stage::Tokenize, lexical.message.clone())
                .with_source(path, source)
                .with_label(span, "dropped from the token stream"),
        );
    }

    for event in &parse.diagnostics {
        let code = match event.event {
            RecoveryEvent::UnexpectedToken => "BEGC-RECOVER-001",
            RecoveryEvent::SkippedToken => "BEGC-RECOVER-002",
            RecoveryEvent::Resynchronized => "BEGC-RECOVER-003",
            RecoveryEvent::MissingEnd => "BEGC-RECOVER-004",
            RecoveryEvent::IncompleteRecovery => "BEGC-RECOVER-005",
        };
        let span = span_at(source, event.line, event.column);
        let mut diagnostic = Diagnostic::warning(code, Stage::Parse, event.message.clone())
            .with_source(path, source)
            .with_label(span, format!("at line {}, column {}", event.line, event.column));
        if event.event == RecoveryEvent::MissingEnd {
            diagnostic = diagnostic.with_note("the block was closed implicitly at end of input");
        }
        bundle.push(diagnostic);
    }

    bundle
}

/// The single error report for a parse that aborted.
pub fn fatal_diagnostic(source: &str, path: Option<&Path>, error: &ParseError) -> Diagnostic {
    let (code, span, label) = match error {
        ParseError::MalformedTerm { line, column, .. } => (
            "BEGC-PARSE-001",
            span_at(source, *line, *column),
            "expected an identifier or a literal here",
        ),
        ParseError::UnexpectedEndOfInput { .. } => (
            "BEGC-PARSE-002",
            sanitize_span(&(source.len()..source.len())),
            "input ends here",
        ),
        ParseError::TrailingInput { line, column, .. } => (
            "BEGC-PARSE-003",
            span_at(source, *line, *column),
            "this is past the closing END",
        ),
    };
    Diagnostic::error(code, Stage::Parse, error.to_string())
        .with_source(path, source)
        .with_label(span, label)
}

pub fn file_id_from_path(path: Option<&Path>) -> String {
    path.map(|value| value.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string())
}

/// Byte span of the single character at a 1-based line/column position.
fn span_at(source: &str, line: u32, column: u32) -> Range<usize> {
    let start = line_column_to_byte_index(source, line, column);
    let end = next_char_boundary(source, start);
    sanitize_span(&(start..end))
}

fn sanitize_span(span: &Range<usize>) -> Range<usize> {
    if span.end <= span.start {
        span.start..span.start.saturating_add(1)
    } else {
        span.clone()
    }
}

fn line_column_to_byte_index(source: &str, line_1_based: u32, column_1_based: u32) -> usize {
    let mut line = 1_u32;
    let mut column = 1_u32;
    for (idx, ch) in source.char_indices() {
        if line == line_1_based && column == column_1_based {
            return idx;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    source.len()
}

fn next_char_boundary(source: &str, start: usize) -> usize {
    if start >= source.len() {
        return start.saturating_add(1);
    }
    let mut iter = source[start..].char_indices();
    let _ = iter.next();
    if let Some((delta, _)) = iter.next() {
        start + delta
    } else {
        source.len()
    }
}
