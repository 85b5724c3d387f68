//! Recursive-descent parser with panic-mode error recovery.
//!
//! One procedure per grammar production:
//!
//! ```text
//! Program      := BEGIN Statements END
//! Statements   := Statement*
//! Statement    := PrintStmt | VarDecl | Assignment | ForLoop
//! PrintStmt    := PRINT StringLiteral
//! VarDecl      := (INTEGER|REAL|STRING) Identifier (COMMA Identifier)*
//! Assignment   := (Identifier ASSIGN Expression)+
//! ForLoop      := FOR Identifier ASSIGN Expression TO Expression Statements END
//! Expression   := Term (Operator Term)*
//! Term         := Identifier | IntLiteral | FloatLiteral | StringLiteral
//! ```
//!
//! A mismatch inside `consume` flips the parser into panic mode: the
//! offending token is dropped, and the next `consume` call discards tokens
//! until it reaches the kind it wants. Each grammar context additionally
//! has its own synchronization set, and leaves an `ErrorRecovery*`
//! placeholder node where a construct could not be parsed. Recovery always
//! moves the cursor forward, so a parse terminates on any finite input.
//!
//! Only two conditions abort a parse outright: a malformed term (the one
//! production with no synchronization point) and input continuing after the
//! closing `END`.

use serde::Serialize;
use tracing::{debug, trace};

use crate::ast::{NodeId, NodeKind, SyntaxTree};
use crate::tokenizer::{tokenize, LexDiagnostic, Lexer, Token, TokenKind};

/// Tokens that can begin a statement.
const STATEMENT_START: &[TokenKind] = &[
    TokenKind::Print,
    TokenKind::IntegerType,
    TokenKind::RealType,
    TokenKind::StringType,
    TokenKind::Identifier,
    TokenKind::For,
];

/// Tokens that can begin a term.
const TERM_START: &[TokenKind] = &[
    TokenKind::Identifier,
    TokenKind::IntLiteral,
    TokenKind::FloatLiteral,
    TokenKind::StringLiteral,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Normal,
    Panic,
}

/// Fatal conditions. Everything else is absorbed by panic-mode recovery
/// and surfaces as [`ParseDiagnostic`]s plus placeholder nodes.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected {found} at line {line}, column {column}: expected a term (identifier or literal)")]
    MalformedTerm {
        found: TokenKind,
        line: u32,
        column: u32,
    },
    #[error("unexpected end of input: expected {expected}")]
    UnexpectedEndOfInput { expected: String },
    #[error("unexpected {found} at line {line}, column {column}: input continues after the closing END")]
    TrailingInput {
        found: TokenKind,
        line: u32,
        column: u32,
    },
}

/// What a recovery-related diagnostic records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RecoveryEvent {
    /// `consume` saw the wrong token kind and entered panic mode.
    UnexpectedToken,
    /// One token discarded while looking for a synchronization point.
    SkippedToken,
    /// A synchronization point was reached and normal parsing resumed.
    Resynchronized,
    /// The top-level `END` was missing at the end of input.
    MissingEnd,
    /// Recovery hit something it cannot repair (e.g. a nested `BEGIN`).
    IncompleteRecovery,
}

/// A recoverable condition noted while parsing continued.
#[derive(Clone, Debug, Serialize)]
pub struct ParseDiagnostic {
    pub event: RecoveryEvent,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// The outcome of a successful (possibly recovered) parse.
#[derive(Debug, Serialize)]
pub struct Parse {
    pub tree: SyntaxTree,
    pub root: NodeId,
    pub diagnostics: Vec<ParseDiagnostic>,
    pub lex_diagnostics: Vec<LexDiagnostic>,
}

impl Parse {
    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty() || !self.lex_diagnostics.is_empty()
    }
}

#[tracing::instrument(level = "trace", skip_all)]
pub fn parse(source: &str) -> Result<Parse, ParseError> {
    let mut lexer = tokenize(source);
    let current = lexer.next();
    let parser = Parser {
        lexer,
        current,
        mode: Mode::Normal,
        tree: SyntaxTree::new(),
        diagnostics: Vec::new(),
        consumed_end: false,
    };
    parser.run()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Option<Token>,
    mode: Mode,
    tree: SyntaxTree,
    diagnostics: Vec<ParseDiagnostic>,
    consumed_end: bool,
}

impl Parser<'_> {
    fn run(mut self) -> Result<Parse, ParseError> {
        let root = self.program()?;

        // Tokens past the consumed closing END are a distinct, fatal error.
        // When END itself went missing, recovery already reported it and
        // whatever remains was diagnosed as skippable.
        if self.consumed_end {
            if let Some(token) = &self.current {
                return Err(ParseError::TrailingInput {
                    found: token.kind,
                    line: token.line,
                    column: token.column,
                });
            }
        }

        let lex_diagnostics = self.lexer.take_diagnostics();
        debug!(
            nodes = self.tree.len(),
            diagnostics = self.diagnostics.len(),
            "parse finished"
        );
        Ok(Parse {
            tree: self.tree,
            root,
            diagnostics: self.diagnostics,
            lex_diagnostics,
        })
    }

    fn advance(&mut self) {
        self.current = self.lexer.next();
    }

    fn report(&mut self, event: RecoveryEvent, message: String, line: u32, column: u32) {
        trace!(event = ?event, %message, line, column, "recovery");
        self.diagnostics.push(ParseDiagnostic {
            event,
            message,
            line,
            column,
        });
    }

    /// Match the current token against `expected`.
    ///
    /// In normal mode a mismatch drops the offending token and enters panic
    /// mode; the production carries on as if the token had been there. In
    /// panic mode this is the resynchronization operation instead.
    fn consume(&mut self, expected: TokenKind) -> Result<(), ParseError> {
        match self.mode {
            Mode::Normal => self.consume_normal(expected),
            Mode::Panic => {
                self.resynchronize(expected);
                Ok(())
            }
        }
    }

    fn consume_normal(&mut self, expected: TokenKind) -> Result<(), ParseError> {
        match self.current.clone() {
            Some(token) if token.kind == expected => {
                trace!(kind = %token.kind, line = token.line, "consuming token");
                self.advance();
                Ok(())
            }
            Some(token) => {
                self.report(
                    RecoveryEvent::UnexpectedToken,
                    format!("unexpected {}: expected {}", token.kind, expected),
                    token.line,
                    token.column,
                );
                self.mode = Mode::Panic;
                self.advance();
                Ok(())
            }
            // END at true end of input counts as an implicit close.
            None if expected == TokenKind::End => Ok(()),
            None => Err(ParseError::UnexpectedEndOfInput {
                expected: expected.to_string(),
            }),
        }
    }

    /// Discard tokens until one of kind `expected` shows up, consume it, and
    /// drop back to normal mode. If input runs out first, recovery gives up
    /// and the current production returns what it has. Either way the
    /// cursor moves forward, so recovery cannot loop.
    fn resynchronize(&mut self, expected: TokenKind) {
        while let Some(token) = self.current.clone() {
            if token.kind == expected {
                self.report(
                    RecoveryEvent::Resynchronized,
                    format!("resynchronized at {}", token.kind),
                    token.line,
                    token.column,
                );
                self.mode = Mode::Normal;
                self.advance();
                return;
            }
            self.report(
                RecoveryEvent::SkippedToken,
                format!("skipped {}", token.kind),
                token.line,
                token.column,
            );
            self.advance();
        }
        self.mode = Mode::Normal;
    }

    /// `Program := BEGIN Statements END`
    fn program(&mut self) -> Result<NodeId, ParseError> {
        let program = self.tree.push(NodeKind::Program, None);
        self.consume(TokenKind::Begin)?;
        let statements = self.statements()?;

        // Close the block: anything between the last statement and the END
        // (or a stray BEGIN) is discarded.
        while let Some(token) = self.current.clone() {
            if matches!(token.kind, TokenKind::End | TokenKind::Begin) {
                break;
            }
            self.report(
                RecoveryEvent::SkippedToken,
                format!("skipped {}", token.kind),
                token.line,
                token.column,
            );
            self.advance();
        }

        match self.current.clone() {
            Some(token) if token.kind == TokenKind::End => {
                self.consume(TokenKind::End)?;
                self.consumed_end = true;
            }
            Some(token) => {
                // A nested BEGIN: leave it unconsumed and report the block
                // as incompletely recovered.
                self.report(
                    RecoveryEvent::IncompleteRecovery,
                    "nested BEGIN: recovery may be incomplete".to_string(),
                    token.line,
                    token.column,
                );
            }
            None => {
                let (line, column) = self.lexer.position();
                self.report(
                    RecoveryEvent::MissingEnd,
                    "missing END at end of input".to_string(),
                    line,
                    column,
                );
            }
        }

        self.tree.add_child(program, statements);
        Ok(program)
    }

    /// `Statements := Statement*`, with statement-level recovery: when a
    /// statement left the parser in panic mode, skip to the next statement
    /// boundary, leave a placeholder in the list, and resume if the
    /// boundary can start a statement.
    fn statements(&mut self) -> Result<NodeId, ParseError> {
        let list = self.tree.push(NodeKind::Statements, None);
        while let Some(token) = self.current.clone() {
            match self.mode {
                Mode::Normal => {
                    if !STATEMENT_START.contains(&token.kind) {
                        break;
                    }
                    let statement = self.statement(token.kind)?;
                    self.tree.add_child(list, statement);
                }
                Mode::Panic => {
                    let placeholder = self.recover_statement();
                    self.tree.add_child(list, placeholder);
                    if self.mode == Mode::Panic {
                        // Stopped at END or ran out of input; the caller
                        // consumes its own closing token.
                        break;
                    }
                }
            }
        }
        Ok(list)
    }

    /// Statement-level synchronization set: anything that can start a
    /// statement, plus END.
    fn recover_statement(&mut self) -> NodeId {
        while let Some(token) = self.current.clone() {
            if STATEMENT_START.contains(&token.kind) {
                self.report(
                    RecoveryEvent::Resynchronized,
                    format!("resumed statement parsing at {}", token.kind),
                    token.line,
                    token.column,
                );
                self.mode = Mode::Normal;
                break;
            }
            if token.kind == TokenKind::End {
                break;
            }
            self.report(
                RecoveryEvent::SkippedToken,
                format!("skipped {}", token.kind),
                token.line,
                token.column,
            );
            self.advance();
        }
        self.tree.push(NodeKind::ErrorRecoveryStatement, None)
    }

    fn statement(&mut self, lookahead: TokenKind) -> Result<NodeId, ParseError> {
        match lookahead {
            TokenKind::Print => self.print_statement(),
            TokenKind::IntegerType | TokenKind::RealType | TokenKind::StringType => {
                self.var_declaration(lookahead)
            }
            TokenKind::Identifier => self.assignments(),
            TokenKind::For => self.for_loop(),
            // Guarded by the caller's lookahead check.
            _ => Ok(self.tree.push(NodeKind::ErrorRecoveryStatement, None)),
        }
    }

    /// `PrintStmt := PRINT StringLiteral`
    fn print_statement(&mut self) -> Result<NodeId, ParseError> {
        self.consume(TokenKind::Print)?;
        // The literal node is built from the lookahead before it is
        // checked, so a malformed PRINT still leaves its payload visible.
        let literal = self.tree.push(NodeKind::StringLiteral, None);
        if let Some(token) = self.current.clone() {
            let value = self.tree.leaf(NodeKind::Value, token.text);
            self.tree.add_child(literal, value);
        }
        self.consume(TokenKind::StringLiteral)?;
        let statement = self.tree.push(NodeKind::PrintStatement, None);
        self.tree.add_child(statement, literal);
        Ok(statement)
    }

    /// `VarDecl := (INTEGER|REAL|STRING) Identifier (COMMA Identifier)*`
    ///
    /// One node per declaration list; every declared name becomes a leaf
    /// tagged with the declared type.
    fn var_declaration(&mut self, type_kind: TokenKind) -> Result<NodeId, ParseError> {
        let leaf_kind = match type_kind {
            TokenKind::IntegerType => NodeKind::Integer,
            TokenKind::RealType => NodeKind::Real,
            _ => NodeKind::String,
        };
        self.consume(type_kind)?;
        let declaration = self.tree.push(NodeKind::VarDeclaration, None);
        self.declared_name(declaration, leaf_kind)?;
        while matches!(&self.current, Some(t) if t.kind == TokenKind::Comma) {
            self.consume(TokenKind::Comma)?;
            self.declared_name(declaration, leaf_kind)?;
        }
        Ok(declaration)
    }

    fn declared_name(&mut self, declaration: NodeId, kind: NodeKind) -> Result<(), ParseError> {
        if let Some(token) = self.current.clone() {
            let leaf = self.tree.leaf(kind, token.text);
            self.tree.add_child(declaration, leaf);
        }
        self.consume(TokenKind::Identifier)
    }

    /// `Assignment := (Identifier ASSIGN Expression)+`
    ///
    /// Greedy: one call consumes every consecutive identifier-led
    /// assignment. A single assignment is returned bare; a run of them is
    /// grouped under an `Assignments` node.
    fn assignments(&mut self) -> Result<NodeId, ParseError> {
        let mut nodes = Vec::new();
        while self.mode == Mode::Normal {
            let Some(token) = self.current.clone() else {
                break;
            };
            if token.kind != TokenKind::Identifier {
                break;
            }
            let assignment = self.tree.push(NodeKind::Assignment, None);
            let variable = self.tree.leaf(NodeKind::Variable, token.text);
            self.tree.add_child(assignment, variable);
            self.consume(TokenKind::Identifier)?;
            self.consume(TokenKind::Assign)?;
            if self.mode == Mode::Normal {
                let expression = self.expression()?;
                self.tree.add_child(assignment, expression);
            }
            nodes.push(assignment);
        }

        if let [single] = *nodes.as_slice() {
            return Ok(single);
        }
        let group = self.tree.push(NodeKind::Assignments, None);
        for node in nodes {
            self.tree.add_child(group, node);
        }
        Ok(group)
    }

    /// `ForLoop := FOR Identifier ASSIGN Expression TO Expression Statements END`
    ///
    /// The raw text of the first token of each bound is kept on the node as
    /// a label, independent of the expression sub-nodes.
    fn for_loop(&mut self) -> Result<NodeId, ParseError> {
        self.consume(TokenKind::For)?;

        let variable = match self.current.clone() {
            Some(token) if self.mode == Mode::Normal && token.kind == TokenKind::Identifier => {
                token
            }
            _ => return Ok(self.recover_for_loop()),
        };

        let variable_leaf = self.tree.leaf(NodeKind::Variable, variable.text);
        self.consume(TokenKind::Identifier)?;
        self.consume(TokenKind::Assign)?;
        let start_text = self.current.as_ref().map(|t| t.text.clone());
        let start = self.expression()?;
        self.consume(TokenKind::To)?;
        let end_text = self.current.as_ref().map(|t| t.text.clone());
        let end = self.expression()?;
        let body = self.statements()?;
        self.consume(TokenKind::End)?;

        let bounds = match (start_text, end_text) {
            (Some(start), Some(end)) => Some(format!("{start} TO {end}")),
            _ => None,
        };
        let loop_node = self.tree.push(NodeKind::ForLoop, bounds);
        self.tree.add_child(loop_node, variable_leaf);
        self.tree.add_child(loop_node, start);
        self.tree.add_child(loop_node, end);
        self.tree.add_child(loop_node, body);
        Ok(loop_node)
    }

    /// FOR-header synchronization set: `Identifier` or `END`.
    fn recover_for_loop(&mut self) -> NodeId {
        while let Some(token) = self.current.clone() {
            if matches!(token.kind, TokenKind::Identifier | TokenKind::End) {
                break;
            }
            self.report(
                RecoveryEvent::SkippedToken,
                format!("skipped {}", token.kind),
                token.line,
                token.column,
            );
            self.advance();
        }
        self.tree.push(NodeKind::ErrorRecoveryForLoop, None)
    }

    /// `Expression := Term (Operator Term)*`
    ///
    /// Not evaluation: the terms fold left-to-right into a single textual
    /// value, so `1 + 2 * 3` becomes the leaf `"1 + 2 * 3"`. No precedence,
    /// no arithmetic.
    fn expression(&mut self) -> Result<NodeId, ParseError> {
        let mut text = self.term()?;
        while self.mode == Mode::Normal {
            let Some(token) = self.current.clone() else {
                break;
            };
            if token.kind != TokenKind::Operator {
                break;
            }
            self.consume(TokenKind::Operator)?;

            let next_is_term =
                matches!(&self.current, Some(t) if TERM_START.contains(&t.kind));
            if !next_is_term {
                // Operator with no right operand: give up on the expression
                // without consuming further and let the enclosing statement
                // resynchronize.
                let (line, column) = match &self.current {
                    Some(t) => (t.line, t.column),
                    None => self.lexer.position(),
                };
                self.report(
                    RecoveryEvent::UnexpectedToken,
                    format!("operator {} has no right operand", token.text),
                    line,
                    column,
                );
                self.mode = Mode::Panic;
                return Ok(self.tree.push(NodeKind::ErrorRecoveryExpression, None));
            }

            let right = self.term()?;
            text = format!("{text} {} {right}", token.text);
        }
        Ok(self.tree.leaf(NodeKind::Expression, text))
    }

    /// A term has no synchronization point, so a bad leading token here is
    /// fatal rather than recoverable.
    fn term(&mut self) -> Result<String, ParseError> {
        match self.current.clone() {
            Some(token) if TERM_START.contains(&token.kind) => {
                self.consume(token.kind)?;
                Ok(token.text)
            }
            Some(token) => Err(ParseError::MalformedTerm {
                found: token.kind,
                line: token.line,
                column: token.column,
            }),
            None => Err(ParseError::UnexpectedEndOfInput {
                expected: "a term (identifier or literal)".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_walk::render_outline;

    fn parse_ok(source: &str) -> Parse {
        parse(source).expect("parse should recover, not abort")
    }

    fn outline(parse: &Parse) -> String {
        render_outline(&parse.tree, parse.root)
    }

    fn statement_children(parse: &Parse) -> Vec<NodeKind> {
        let statements = parse.tree.children(parse.root)[0];
        parse
            .tree
            .children(statements)
            .iter()
            .map(|&id| parse.tree.node(id).kind)
            .collect()
    }

    #[test]
    fn parses_a_print_statement() {
        let parse = parse_ok("BEGIN PRINT \"HI\" END");
        assert!(!parse.has_diagnostics());
        insta::assert_snapshot!(outline(&parse), @r#"
        Program
          Statements
            PrintStatement
              StringLiteral
                Value "HI"
        "#);
    }

    #[test]
    fn program_root_has_exactly_one_statements_child() {
        for source in ["BEGIN END", "BEGIN PRINT \"X\" END", "BEGIN A := 1 END"] {
            let parse = parse_ok(source);
            let root = parse.tree.node(parse.root);
            assert_eq!(root.kind, NodeKind::Program);
            assert_eq!(root.children.len(), 1);
            assert_eq!(
                parse.tree.node(root.children[0]).kind,
                NodeKind::Statements
            );
        }
    }

    #[test]
    fn declaration_list_shares_one_node_and_type() {
        let parse = parse_ok("BEGIN INTEGER A, B END");
        assert!(!parse.has_diagnostics());
        insta::assert_snapshot!(outline(&parse), @r#"
        Program
          Statements
            VarDeclaration
              Integer "A"
              Integer "B"
        "#);
    }

    #[test]
    fn real_and_string_declarations_tag_their_leaves() {
        let parse = parse_ok("BEGIN REAL D STRING X, Y END");
        let statements = parse.tree.children(parse.root)[0];
        let declarations = parse.tree.children(statements);
        assert_eq!(declarations.len(), 2);
        let real_leaves = parse.tree.children(declarations[0]);
        assert_eq!(parse.tree.node(real_leaves[0]).kind, NodeKind::Real);
        let string_leaves = parse.tree.children(declarations[1]);
        assert_eq!(string_leaves.len(), 2);
        assert_eq!(parse.tree.node(string_leaves[1]).kind, NodeKind::String);
        assert_eq!(
            parse.tree.node(string_leaves[1]).value.as_deref(),
            Some("Y")
        );
    }

    #[test]
    fn single_assignment_keeps_variable_and_folded_expression() {
        let parse = parse_ok("BEGIN A := 1 + 2 END");
        assert!(!parse.has_diagnostics());
        insta::assert_snapshot!(outline(&parse), @r#"
        Program
          Statements
            Assignment
              Variable "A"
              Expression "1 + 2"
        "#);
    }

    #[test]
    fn expression_folds_left_to_right_without_precedence() {
        let parse = parse_ok("BEGIN A := 1 + 2 * 3 END");
        let statements = parse.tree.children(parse.root)[0];
        let assignment = parse.tree.children(statements)[0];
        let expression = parse.tree.children(assignment)[1];
        assert_eq!(parse.tree.node(expression).kind, NodeKind::Expression);
        assert!(parse.tree.is_leaf(expression));
        assert_eq!(
            parse.tree.node(expression).value.as_deref(),
            Some("1 + 2 * 3")
        );

        let parse = parse_ok("BEGIN X := A - 2.5 / B END");
        let statements = parse.tree.children(parse.root)[0];
        let assignment = parse.tree.children(statements)[0];
        let expression = parse.tree.children(assignment)[1];
        assert_eq!(
            parse.tree.node(expression).value.as_deref(),
            Some("A - 2.5 / B")
        );
    }

    #[test]
    fn consecutive_assignments_group_greedily() {
        let parse = parse_ok("BEGIN A := 1 B := 2 PRINT \"X\" END");
        assert_eq!(
            statement_children(&parse),
            vec![NodeKind::Assignments, NodeKind::PrintStatement]
        );
        let statements = parse.tree.children(parse.root)[0];
        let group = parse.tree.children(statements)[0];
        assert_eq!(parse.tree.children(group).len(), 2);
        for &assignment in parse.tree.children(group) {
            assert_eq!(parse.tree.node(assignment).kind, NodeKind::Assignment);
        }
    }

    #[test]
    fn for_loop_keeps_bounds_label_and_body() {
        let parse = parse_ok("BEGIN FOR I := 1 TO 5 PRINT \"HI\" END END");
        assert!(!parse.has_diagnostics());
        insta::assert_snapshot!(outline(&parse), @r#"
        Program
          Statements
            ForLoop "1 TO 5"
              Variable "I"
              Expression "1"
              Expression "5"
              Statements
                PrintStatement
                  StringLiteral
                    Value "HI"
        "#);
    }

    #[test]
    fn statement_count_matches_source() {
        let parse = parse_ok(
            "BEGIN\n PRINT \"A\"\n INTEGER A, B\n REAL D\n FOR I := 1 TO 2 PRINT \"B\" END\n END",
        );
        assert!(!parse.has_diagnostics());
        assert_eq!(
            statement_children(&parse),
            vec![
                NodeKind::PrintStatement,
                NodeKind::VarDeclaration,
                NodeKind::VarDeclaration,
                NodeKind::ForLoop,
            ]
        );
    }

    #[test]
    fn missing_end_is_tolerated_with_a_diagnostic() {
        let parse = parse_ok("BEGIN PRINT \"X\"");
        assert_eq!(statement_children(&parse), vec![NodeKind::PrintStatement]);
        assert!(parse
            .diagnostics
            .iter()
            .any(|d| d.event == RecoveryEvent::MissingEnd));
    }

    #[test]
    fn recovery_resumes_after_a_malformed_statement() {
        // PRINT with a non-string payload: the parser panics, drops the
        // offending token, leaves a placeholder, and the next statement
        // still parses as a sibling after it.
        let parse = parse_ok("BEGIN PRINT 5 PRINT \"OK\" END");
        assert_eq!(
            statement_children(&parse),
            vec![
                NodeKind::PrintStatement,
                NodeKind::ErrorRecoveryStatement,
                NodeKind::PrintStatement,
            ]
        );
        let events: Vec<RecoveryEvent> = parse.diagnostics.iter().map(|d| d.event).collect();
        assert!(events.contains(&RecoveryEvent::UnexpectedToken));
        assert!(events.contains(&RecoveryEvent::Resynchronized));
    }

    #[test]
    fn operator_without_operand_recovers_at_end() {
        let parse = parse_ok("BEGIN A := 1 + END");
        let kinds = statement_children(&parse);
        assert_eq!(kinds[0], NodeKind::Assignment);
        let statements = parse.tree.children(parse.root)[0];
        let assignment = parse.tree.children(statements)[0];
        let expression = parse.tree.children(assignment)[1];
        assert_eq!(
            parse.tree.node(expression).kind,
            NodeKind::ErrorRecoveryExpression
        );
        assert!(parse.tree.is_leaf(expression));
        assert!(parse.has_diagnostics());
        // END was still consumed normally: no trailing-input error, no
        // missing-END diagnostic.
        assert!(!parse
            .diagnostics
            .iter()
            .any(|d| d.event == RecoveryEvent::MissingEnd));
    }

    #[test]
    fn malformed_for_header_leaves_a_placeholder() {
        let parse = parse_ok("BEGIN FOR 5 END");
        assert_eq!(
            statement_children(&parse),
            vec![NodeKind::ErrorRecoveryForLoop]
        );
        assert!(parse
            .diagnostics
            .iter()
            .any(|d| d.event == RecoveryEvent::SkippedToken));
    }

    #[test]
    fn tokens_before_end_are_skipped_at_program_level() {
        let parse = parse_ok("BEGIN , := END");
        assert!(statement_children(&parse).is_empty());
        let skipped = parse
            .diagnostics
            .iter()
            .filter(|d| d.event == RecoveryEvent::SkippedToken)
            .count();
        assert_eq!(skipped, 2);
    }

    #[test]
    fn nested_begin_reports_incomplete_recovery() {
        let parse = parse_ok("BEGIN PRINT \"X\" BEGIN");
        assert!(parse
            .diagnostics
            .iter()
            .any(|d| d.event == RecoveryEvent::IncompleteRecovery));
    }

    #[test]
    fn malformed_term_is_fatal() {
        let error = parse("BEGIN A := , END").expect_err("term mismatch must abort");
        match error {
            ParseError::MalformedTerm {
                found,
                line,
                column,
            } => {
                assert_eq!(found, TokenKind::Comma);
                assert_eq!((line, column), (1, 12));
            }
            other => panic!("expected MalformedTerm, got {other:?}"),
        }
    }

    #[test]
    fn trailing_input_is_fatal() {
        let error = parse("BEGIN PRINT \"X\" END PRINT \"Y\"").expect_err("trailing input");
        assert!(matches!(error, ParseError::TrailingInput { .. }));
    }

    #[test]
    fn empty_input_is_fatal() {
        let error = parse("").expect_err("nothing to parse");
        assert!(matches!(error, ParseError::UnexpectedEndOfInput { .. }));
    }

    #[test]
    fn adversarial_input_still_terminates() {
        for source in [
            "BEGIN FOR FOR FOR END",
            "BEGIN A B C END",
            "BEGIN PRINT PRINT PRINT END",
            "BEGIN INTEGER , , END",
            "BEGIN FOR I TO TO TO",
        ] {
            // Some of these recover, some abort; none may hang.
            let _ = parse(source);
        }
    }

    #[test]
    fn unrecognized_characters_surface_as_lexical_diagnostics() {
        let parse = parse_ok("BEGIN A := 1 ? 2 END");
        assert_eq!(parse.lex_diagnostics.len(), 1);
        assert!(parse.lex_diagnostics[0].message.contains('?'));
    }

    #[test]
    fn node_identities_are_distinct_and_traversal_is_stable() {
        let source = "BEGIN INTEGER A, B A := A + 1 END";
        let first = parse_ok(source);
        let second = parse_ok(source);
        let collect = |p: &Parse| {
            let mut out = Vec::new();
            crate::ast_walk::walk(&p.tree, p.root, &mut |path, id| {
                out.push((path.to_string(), id));
            });
            out
        };
        // Two parses of the same input visit the same paths with the same
        // handles, and no handle repeats within a traversal.
        assert_eq!(collect(&first), collect(&second));
    }
}
