//! A lazy tokenizer for Begonia source files.
//!
//! By "lazy", we mean that the tokenizer scans one token per `next` call
//! instead of consuming the whole file up front; the parser pulls tokens on
//! demand and never holds more than one of lookahead. A `Lexer` is a
//! single-use value: re-enumerating the tokens means starting a fresh scan
//! from the source text.

use std::fmt;

use serde::Serialize;
use tracing::trace;

/// Keyword lexemes, tried before the identifier pattern. A keyword must win
/// ties with an identical or prefix-equal identifier match, so `FORMAT`
/// scans as `FOR` followed by the identifier `MAT`.
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("BEGIN", TokenKind::Begin),
    ("END", TokenKind::End),
    ("PRINT", TokenKind::Print),
    ("FOR", TokenKind::For),
    ("TO", TokenKind::To),
    ("INTEGER", TokenKind::IntegerType),
    ("REAL", TokenKind::RealType),
    ("STRING", TokenKind::StringType),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Begin,
    End,
    Print,
    For,
    To,
    IntegerType,
    RealType,
    StringType,
    Assign,
    Comma,
    Identifier,
    FloatLiteral,
    IntLiteral,
    StringLiteral,
    Operator,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Begin => "'BEGIN'",
            TokenKind::End => "'END'",
            TokenKind::Print => "'PRINT'",
            TokenKind::For => "'FOR'",
            TokenKind::To => "'TO'",
            TokenKind::IntegerType => "'INTEGER'",
            TokenKind::RealType => "'REAL'",
            TokenKind::StringType => "'STRING'",
            TokenKind::Assign => "':='",
            TokenKind::Comma => "','",
            TokenKind::Identifier => "identifier",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::IntLiteral => "integer literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::Operator => "operator",
        };
        f.write_str(name)
    }
}

/// A classified, positioned unit of lexical text. For string literals the
/// stored text excludes the surrounding quotes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Position {
    fn advance(&mut self, c: char) {
        self.offset += c.len_utf8();
        self.column += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A lexical condition that does not stop the scan: the offending input is
/// dropped, the condition is recorded, and scanning continues.
#[derive(Clone, Debug, Serialize)]
pub struct LexDiagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

#[tracing::instrument(level = "trace", skip_all)]
pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer {
        source,
        position: Position::default(),
        diagnostics: Vec::new(),
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    position: Position,
    diagnostics: Vec<LexDiagnostic>,
}

impl<'a> Lexer<'a> {
    /// Line and column of the next unscanned character (end of input once
    /// the scan is exhausted).
    pub fn position(&self) -> (u32, u32) {
        (self.position.line, self.position.column)
    }

    pub fn take_diagnostics(&mut self) -> Vec<LexDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.source[self.position.offset..].chars().next() {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.position.advance(c);
        }
    }

    fn advance_over(&mut self, matched: &str) {
        for c in matched.chars() {
            self.position.advance(c);
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            self.skip_whitespace();
            let rest = &self.source[self.position.offset..];
            let c = rest.chars().next()?;
            let start = self.position;

            let Some((kind, len)) = match_token(rest) else {
                // No pattern matches: drop the character, record it, keep
                // scanning.
                self.diagnostics.push(LexDiagnostic {
                    message: format!("unrecognized character '{}'", c),
                    line: start.line,
                    column: start.column,
                });
                self.position.advance(c);
                continue;
            };

            let raw = &rest[..len];
            self.advance_over(raw);

            let text = if kind == TokenKind::StringLiteral {
                let terminated = len >= 2 && raw.ends_with('"');
                if !terminated {
                    self.diagnostics.push(LexDiagnostic {
                        message: "unterminated string literal".to_string(),
                        line: start.line,
                        column: start.column,
                    });
                }
                let body_end = if terminated { len - 1 } else { len };
                raw[1..body_end].to_string()
            } else {
                raw.to_string()
            };

            trace!(kind = ?kind, text = %text, line = start.line, column = start.column, "scanned token");
            return Some(Token {
                kind,
                text,
                line: start.line,
                column: start.column,
            });
        }
    }
}

/// Try each token pattern at the head of `rest`, in fixed priority order:
/// keywords, `:=`, `,`, identifier, float, integer, string literal,
/// operator. Returns the matched kind and the raw length consumed.
fn match_token(rest: &str) -> Option<(TokenKind, usize)> {
    for (lexeme, kind) in KEYWORDS {
        if rest.starts_with(lexeme) {
            return Some((*kind, lexeme.len()));
        }
    }
    if rest.starts_with(":=") {
        return Some((TokenKind::Assign, 2));
    }
    if rest.starts_with(',') {
        return Some((TokenKind::Comma, 1));
    }
    if let Some(len) = match_identifier(rest) {
        return Some((TokenKind::Identifier, len));
    }
    if let Some(len) = match_float(rest) {
        return Some((TokenKind::FloatLiteral, len));
    }
    if let Some(len) = match_int(rest) {
        return Some((TokenKind::IntLiteral, len));
    }
    if let Some(len) = match_string(rest) {
        return Some((TokenKind::StringLiteral, len));
    }
    if let Some(len) = match_operator(rest) {
        return Some((TokenKind::Operator, len));
    }
    None
}

/// `letter (letter | digit)*`
fn match_identifier(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    for (i, c) in chars {
        if !c.is_ascii_alphanumeric() {
            return Some(i);
        }
    }
    Some(s.len())
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// `[+-]? digits . digits ([eE][+-]?digits)?`
fn match_float(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let integral = count_digits(&bytes[i..]);
    if integral == 0 {
        return None;
    }
    i += integral;
    if bytes.get(i) != Some(&b'.') {
        return None;
    }
    i += 1;
    let fractional = count_digits(&bytes[i..]);
    if fractional == 0 {
        return None;
    }
    i += fractional;
    if matches!(bytes.get(i), Some(b'e') | Some(b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        let exponent = count_digits(&bytes[j..]);
        if exponent > 0 {
            i = j + exponent;
        }
    }
    Some(i)
}

/// `[+-]? digits`
fn match_int(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let digits = count_digits(&bytes[i..]);
    if digits == 0 {
        return None;
    }
    Some(i + digits)
}

/// Double-quoted, no escape processing. An unterminated literal runs to the
/// end of input; the caller records a diagnostic for it.
fn match_string(s: &str) -> Option<usize> {
    if !s.starts_with('"') {
        return None;
    }
    match s[1..].find('"') {
        Some(close) => Some(close + 2),
        None => Some(s.len()),
    }
}

fn match_operator(s: &str) -> Option<usize> {
    let c = s.chars().next()?;
    if matches!(c, '+' | '-' | '*' | '/') {
        Some(1)
    } else {
        None
    }
}
