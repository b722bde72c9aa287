// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Grammatical parser: token stream to statement stream.
//!
//! The grammar is line-oriented. Each statement is an optional label
//! followed by an instruction or a directive, terminated by end-of-line:
//!
//! ```text
//! [<label>] [<instruction> <parameter>* <operands>?] <eol>
//! [<label>] [<directive> <args>?] <eol>
//! ```
//!
//! On any error the parser records a diagnostic, discards tokens through
//! the next end-of-line, and resumes with the next statement. A parse
//! always runs to completion; errors are collected, never thrown.

use crate::error::{AsmErrorKind, Diagnostic, SourceLocation};
use crate::lexer::Lexer;
use crate::token::{ImmediateValue, MemoryReference, Token, TokenKind};

/// An instruction or directive operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(String),
    Immediate(ImmediateValue),
    Memory(MemoryReference),
    Label(String),
}

/// A parsed instruction: mnemonic (possibly `.type`-suffixed),
/// `^`-parameters in source order, and positional operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: String,
    pub parameters: Vec<String>,
    pub operands: Vec<Operand>,
    pub location: SourceLocation,
}

/// A parsed directive with its operands and any `^`-parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub parameters: Vec<String>,
    pub operands: Vec<Operand>,
    pub location: SourceLocation,
}

/// A label definition site.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelDef {
    pub name: String,
    pub location: SourceLocation,
}

/// One source statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Empty,
    LabelOnly(LabelDef),
    Instruction {
        label: Option<LabelDef>,
        instruction: Instruction,
    },
    Directive {
        label: Option<LabelDef>,
        directive: Directive,
    },
}

pub struct Parser {
    lexer: Lexer,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            diagnostics: Vec::new(),
        }
    }

    /// Parse the whole input. Returns every statement plus the collected
    /// diagnostics; never fails outright.
    pub fn parse(mut self) -> (Vec<Statement>, Vec<Diagnostic>) {
        let mut statements = Vec::new();
        while let Some(statement) = self.parse_statement() {
            statements.push(statement);
        }
        (statements, self.diagnostics)
    }

    /// Parse one statement, or `None` at end of input.
    fn parse_statement(&mut self) -> Option<Statement> {
        let token = self.next_significant();
        match token.kind {
            TokenKind::EndOfFile => None,
            TokenKind::EndOfLine => Some(Statement::Empty),
            TokenKind::Error(message) => {
                self.diagnostics.push(Diagnostic::error(
                    AsmErrorKind::Lex,
                    &message,
                    None,
                    token.location,
                ));
                self.skip_to_eol();
                Some(Statement::Empty)
            }
            TokenKind::Label(name) => {
                let label = LabelDef {
                    name,
                    location: token.location,
                };
                let next = self.next_significant();
                match next.kind {
                    TokenKind::EndOfLine | TokenKind::EndOfFile => {
                        Some(Statement::LabelOnly(label))
                    }
                    TokenKind::Instruction(mnemonic) => {
                        Some(self.parse_instruction(Some(label), mnemonic, next.location))
                    }
                    TokenKind::Directive(name) => {
                        Some(self.parse_directive(Some(label), name, next.location))
                    }
                    other => {
                        self.unexpected(&other, next.location, "instruction or directive");
                        Some(Statement::Empty)
                    }
                }
            }
            TokenKind::Instruction(mnemonic) => {
                Some(self.parse_instruction(None, mnemonic, token.location))
            }
            TokenKind::Directive(name) => Some(self.parse_directive(None, name, token.location)),
            other => {
                self.unexpected(&other, token.location, "label, instruction, or directive");
                Some(Statement::Empty)
            }
        }
    }

    fn parse_instruction(
        &mut self,
        label: Option<LabelDef>,
        mnemonic: String,
        location: SourceLocation,
    ) -> Statement {
        let mut parameters = Vec::new();
        // Parameters sit between the mnemonic and the first operand and
        // are consumed greedily.
        loop {
            match &self.peek_significant().kind {
                TokenKind::Parameter(_) => {
                    let token = self.next_significant();
                    if let TokenKind::Parameter(name) = token.kind {
                        parameters.push(name);
                    }
                }
                _ => break,
            }
        }

        let operands = match self.parse_operand_list(false) {
            Ok((operands, _)) => operands,
            Err(()) => return Statement::Empty,
        };

        if !self.expect_end_of_line() {
            return Statement::Empty;
        }

        Statement::Instruction {
            label,
            instruction: Instruction {
                mnemonic,
                parameters,
                operands,
                location,
            },
        }
    }

    fn parse_directive(
        &mut self,
        label: Option<LabelDef>,
        name: String,
        location: SourceLocation,
    ) -> Statement {
        // Directive arguments share the operand grammar; `^`-parameters
        // may be mixed in for section attributes.
        let (operands, parameters) = match self.parse_operand_list(true) {
            Ok(result) => result,
            Err(()) => return Statement::Empty,
        };

        if !self.expect_end_of_line() {
            return Statement::Empty;
        }

        Statement::Directive {
            label,
            directive: Directive {
                name,
                parameters,
                operands,
                location,
            },
        }
    }

    /// Parse a comma-separated operand list up to end-of-line. When
    /// `allow_parameters` is set, `^name` arguments collect separately.
    fn parse_operand_list(
        &mut self,
        allow_parameters: bool,
    ) -> Result<(Vec<Operand>, Vec<String>), ()> {
        let mut operands = Vec::new();
        let mut parameters = Vec::new();

        if matches!(
            self.peek_significant().kind,
            TokenKind::EndOfLine | TokenKind::EndOfFile
        ) {
            return Ok((operands, parameters));
        }

        loop {
            let token = self.next_significant();
            match token.kind {
                TokenKind::Register(name) => operands.push(Operand::Register(name)),
                TokenKind::Immediate(value) => operands.push(Operand::Immediate(value)),
                TokenKind::MemoryRef(mem) => operands.push(Operand::Memory(mem)),
                TokenKind::LabelRef(name) => operands.push(Operand::Label(name)),
                TokenKind::Parameter(name) if allow_parameters => parameters.push(name),
                TokenKind::Error(message) => {
                    self.diagnostics.push(Diagnostic::error(
                        AsmErrorKind::Lex,
                        &message,
                        None,
                        token.location,
                    ));
                    self.skip_to_eol();
                    return Err(());
                }
                other => {
                    self.unexpected(&other, token.location, "operand");
                    return Err(());
                }
            }

            match &self.peek_significant().kind {
                TokenKind::Comma => {
                    self.next_significant();
                }
                _ => return Ok((operands, parameters)),
            }
        }
    }

    /// Consume the statement terminator; on anything else, record a
    /// diagnostic and discard through end-of-line.
    fn expect_end_of_line(&mut self) -> bool {
        let token = self.next_significant();
        match token.kind {
            TokenKind::EndOfLine | TokenKind::EndOfFile => true,
            TokenKind::Error(message) => {
                self.diagnostics.push(Diagnostic::error(
                    AsmErrorKind::Lex,
                    &message,
                    None,
                    token.location,
                ));
                self.skip_to_eol();
                false
            }
            other => {
                self.unexpected(&other, token.location, "end of line");
                false
            }
        }
    }

    fn unexpected(&mut self, kind: &TokenKind, location: SourceLocation, expected: &str) {
        self.diagnostics.push(Diagnostic::error(
            AsmErrorKind::Parse,
            &format!("Expected {expected}, found {}", describe(kind)),
            None,
            location,
        ));
        self.skip_to_eol();
    }

    /// Discard tokens through the next end-of-line.
    fn skip_to_eol(&mut self) {
        loop {
            let token = self.lexer.next_token();
            if matches!(token.kind, TokenKind::EndOfLine | TokenKind::EndOfFile) {
                return;
            }
        }
    }

    fn next_significant(&mut self) -> Token {
        loop {
            let token = self.lexer.next_token();
            if !matches!(token.kind, TokenKind::Comment(_)) {
                return token;
            }
        }
    }

    fn peek_significant(&mut self) -> &Token {
        while matches!(self.lexer.peek_token().kind, TokenKind::Comment(_)) {
            self.lexer.next_token();
        }
        self.lexer.peek_token()
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Label(name) => format!("label #{name}"),
        TokenKind::Instruction(name) => format!("instruction {name}"),
        TokenKind::Directive(name) => format!("directive .{name}"),
        TokenKind::Register(name) => format!("register %{name}"),
        TokenKind::Immediate(_) => "immediate".to_string(),
        TokenKind::MemoryRef(_) => "memory reference".to_string(),
        TokenKind::LabelRef(name) => format!("label reference @{name}"),
        TokenKind::Parameter(name) => format!("parameter ^{name}"),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Comment(_) => "comment".to_string(),
        TokenKind::EndOfLine => "end of line".to_string(),
        TokenKind::EndOfFile => "end of file".to_string(),
        TokenKind::Error(message) => format!("invalid token ({message})"),
    }
}

/// Convenience: parse a source string into statements and diagnostics.
pub fn parse_source(source: &str, filename: &str) -> (Vec<Statement>, Vec<Diagnostic>) {
    Parser::new(Lexer::new(source, filename)).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ImmediateValue;

    fn parse_ok(source: &str) -> Vec<Statement> {
        let (statements, diagnostics) = parse_source(source, "test");
        assert!(
            diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            diagnostics.iter().map(|d| d.format()).collect::<Vec<_>>()
        );
        statements
    }

    fn non_empty(statements: Vec<Statement>) -> Vec<Statement> {
        statements
            .into_iter()
            .filter(|s| !matches!(s, Statement::Empty))
            .collect()
    }

    #[test]
    fn parses_instruction_with_operands() {
        let statements = non_empty(parse_ok("add %r1, %r2, %r3\n"));
        match &statements[0] {
            Statement::Instruction { label, instruction } => {
                assert!(label.is_none());
                assert_eq!(instruction.mnemonic, "add");
                assert_eq!(instruction.operands.len(), 3);
            }
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn parses_label_attached_to_instruction() {
        let statements = non_empty(parse_ok("#main ret\n"));
        match &statements[0] {
            Statement::Instruction { label, instruction } => {
                assert_eq!(label.as_ref().unwrap().name, "main");
                assert_eq!(instruction.mnemonic, "ret");
            }
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn parses_label_only_line() {
        let statements = non_empty(parse_ok("#loop\n"));
        assert_eq!(
            statements[0],
            Statement::LabelOnly(LabelDef {
                name: "loop".into(),
                location: crate::error::SourceLocation::new("test", 1, 1),
            })
        );
    }

    #[test]
    fn parses_instruction_parameters_before_operands() {
        let statements = non_empty(parse_ok("br ^lt @loop\n"));
        match &statements[0] {
            Statement::Instruction { instruction, .. } => {
                assert_eq!(instruction.parameters, vec!["lt".to_string()]);
                assert_eq!(instruction.operands, vec![Operand::Label("loop".into())]);
            }
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn parses_section_directive_with_attributes() {
        let statements = non_empty(parse_ok(".section .custom, ^nobits, ^write\n"));
        match &statements[0] {
            Statement::Directive { directive, .. } => {
                assert_eq!(directive.name, "section");
                assert_eq!(directive.operands, vec![Operand::Label(".custom".into())]);
                assert_eq!(directive.parameters, vec!["nobits", "write"]);
            }
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn parses_data_directive_operand_list() {
        let statements = non_empty(parse_ok(".i32 $id1, $id2, $id3\n"));
        match &statements[0] {
            Statement::Directive { directive, .. } => {
                assert_eq!(directive.name, "i32");
                assert_eq!(directive.operands.len(), 3);
                assert_eq!(
                    directive.operands[0],
                    Operand::Immediate(ImmediateValue::integer(1))
                );
            }
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn blank_and_comment_lines_are_empty_statements() {
        let (statements, diagnostics) = parse_source("\n; only a comment\n", "test");
        assert!(diagnostics.is_empty());
        assert!(statements.iter().all(|s| matches!(s, Statement::Empty)));
    }

    #[test]
    fn recovers_at_next_line_after_error() {
        let (statements, diagnostics) = parse_source("mov %r1 %r2\nret\n", "test");
        // Missing comma: one diagnostic, then parsing resumes with `ret`.
        assert_eq!(diagnostics.len(), 1);
        let recovered = non_empty(statements);
        assert_eq!(recovered.len(), 1);
        match &recovered[0] {
            Statement::Instruction { instruction, .. } => {
                assert_eq!(instruction.mnemonic, "ret")
            }
            other => panic!("expected ret, got {other:?}"),
        }
    }

    #[test]
    fn lexer_errors_become_diagnostics() {
        let (_, diagnostics) = parse_source("mov %r1, $ix\n", "test");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message().contains("Malformed immediate"));
    }

    #[test]
    fn parameter_after_operand_is_rejected() {
        let (_, diagnostics) = parse_source("br @loop ^lt\n", "test");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn statement_without_trailing_newline_parses() {
        let statements = non_empty(parse_ok("ret"));
        assert_eq!(statements.len(), 1);
    }
}
