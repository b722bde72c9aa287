// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Lexical scanner for CASM source.
//!
//! Single-pass over the source with a `(position, line, column)` cursor;
//! never re-reads backwards. One token of lookahead is available through
//! [`Lexer::peek_token`]. Errors produce [`TokenKind::Error`] tokens and
//! scanning continues, so one run surfaces every lexical problem.
//!
//! Dispatch is on the first significant character:
//! `#` label, `.` directive, `%` register, `$` immediate, `[` memory
//! reference, `@` label reference, `^` parameter, `;` comment, `,` comma,
//! newline, alphabetic for instructions.

use crate::error::SourceLocation;
use crate::opcodes;
use crate::token::{self, ImmediateValue, Token, TokenKind};

/// Directive names the lexer recognizes after a leading dot. Any other
/// dotted name lexes as a label reference so that section names like
/// `.text` can appear as `.section` operands.
const DIRECTIVES: &[&str] = &[
    "section", "global", "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64",
    "ascii", "asciiz", "zero", "align", "byte",
];

/// Parameter names accepted after `^`: condition codes, section
/// attributes, and value types.
const PARAMETERS: &[&str] = &[
    "eq", "neq", "gt", "gte", "lt", "lte", "progbits", "nobits", "symtab", "strtab", "write",
    "code", "alloc", "merge", "tls", "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32",
    "f64",
];

pub struct Lexer {
    filename: String,
    source: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    peeked: Option<Token>,
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            source: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            peeked: None,
        }
    }

    /// Consume and return the next token.
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.peeked.take() {
            return token;
        }
        self.scan_token()
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> &Token {
        if self.peeked.is_none() {
            let token = self.scan_token();
            self.peeked = Some(token);
        }
        self.peeked.as_ref().unwrap()
    }

    /// Tokenize the remaining input, ending with `EndOfFile`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let eof = token.is_eof();
            tokens.push(token);
            if eof {
                return tokens;
            }
        }
    }

    fn scan_token(&mut self) -> Token {
        self.skip_blank();
        let location = self.location();

        let Some(c) = self.current() else {
            return Token::new(TokenKind::EndOfFile, location);
        };

        match c {
            '\n' => {
                self.advance();
                Token::new(TokenKind::EndOfLine, location)
            }
            ',' => {
                self.advance();
                Token::new(TokenKind::Comma, location)
            }
            ';' => self.scan_comment(location),
            '#' => {
                self.advance();
                match self.scan_name() {
                    Some(name) => Token::new(TokenKind::Label(name), location),
                    None => self.error_token("Empty label name", location),
                }
            }
            '.' => self.scan_directive(location),
            '%' => {
                self.advance();
                match self.scan_name() {
                    Some(name) if token::is_register_name(&name) => {
                        Token::new(TokenKind::Register(name), location)
                    }
                    Some(name) => {
                        self.error_token(&format!("Invalid register name: {name}"), location)
                    }
                    None => self.error_token("Empty register name", location),
                }
            }
            '@' => {
                self.advance();
                match self.scan_name() {
                    Some(name) => Token::new(TokenKind::LabelRef(name), location),
                    None => self.error_token("Empty label reference", location),
                }
            }
            '^' => {
                self.advance();
                match self.scan_name() {
                    Some(name) => {
                        let lower = name.to_ascii_lowercase();
                        if PARAMETERS.contains(&lower.as_str()) {
                            Token::new(TokenKind::Parameter(lower), location)
                        } else {
                            self.error_token(&format!("Unknown parameter: {name}"), location)
                        }
                    }
                    None => self.error_token("Empty parameter name", location),
                }
            }
            '$' => self.scan_immediate(location),
            '[' => self.scan_memory_ref(location),
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_instruction(location),
            other => {
                self.advance();
                self.error_token(&format!("Unexpected character: {other}"), location)
            }
        }
    }

    fn scan_comment(&mut self, location: SourceLocation) -> Token {
        self.advance();
        let mut text = String::new();
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        Token::new(TokenKind::Comment(text), location)
    }

    fn scan_directive(&mut self, location: SourceLocation) -> Token {
        self.advance();
        let Some(name) = self.scan_name() else {
            return self.error_token("Empty directive name", location);
        };
        if DIRECTIVES.contains(&name.as_str()) {
            Token::new(TokenKind::Directive(name), location)
        } else {
            // Dotted names outside the directive set are section-name
            // operands, e.g. the `.text` in `.section .text`.
            Token::new(TokenKind::LabelRef(format!(".{name}")), location)
        }
    }

    fn scan_instruction(&mut self, location: SourceLocation) -> Token {
        let name = self.scan_name().unwrap_or_default();
        let mut full = name;
        // Optional `.type` suffix is part of the mnemonic.
        if self.current() == Some('.')
            && self
                .peek_at(1)
                .map(|c| c.is_ascii_alphanumeric())
                .unwrap_or(false)
        {
            self.advance();
            full.push('.');
            if let Some(suffix) = self.scan_name_or_digits() {
                full.push_str(&suffix);
            }
        }
        if opcodes::parse_mnemonic(&full).is_some() {
            Token::new(TokenKind::Instruction(full), location)
        } else {
            self.error_token(&format!("Unknown instruction: {full}"), location)
        }
    }

    fn scan_immediate(&mut self, location: SourceLocation) -> Token {
        self.advance();
        match self.current() {
            Some('"') => self.scan_string_immediate(location),
            Some('\'') => self.scan_char_immediate(location),
            _ => {
                let mut body = String::new();
                while let Some(c) = self.current() {
                    if c.is_whitespace() || c == ',' || c == ';' || c == ']' {
                        break;
                    }
                    body.push(c);
                    self.advance();
                }
                match token::parse_immediate(&body) {
                    Some(value) => Token::new(TokenKind::Immediate(value), location),
                    None => {
                        self.error_token(&format!("Malformed immediate: ${body}"), location)
                    }
                }
            }
        }
    }

    fn scan_string_immediate(&mut self, location: SourceLocation) -> Token {
        self.advance(); // opening quote
        let mut content = String::new();
        loop {
            match self.current() {
                None | Some('\n') => {
                    return self.error_token("Unterminated string literal", location);
                }
                Some('"') => {
                    self.advance();
                    return Token::new(
                        TokenKind::Immediate(ImmediateValue::Str(content)),
                        location,
                    );
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        None | Some('\n') => {
                            return self.error_token("Unterminated string literal", location);
                        }
                        Some(esc) => {
                            content.push(token::unescape(esc).unwrap_or(esc));
                            self.advance();
                        }
                    }
                }
                Some(c) => {
                    content.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_char_immediate(&mut self, location: SourceLocation) -> Token {
        // Collect the raw quoted body and defer to the immediate parser.
        let mut body = String::new();
        body.push('\'');
        self.advance();
        loop {
            match self.current() {
                None | Some('\n') => {
                    return self.error_token("Unterminated character literal", location);
                }
                Some('\\') => {
                    body.push('\\');
                    self.advance();
                    if let Some(c) = self.current() {
                        if c != '\n' {
                            body.push(c);
                            self.advance();
                        }
                    }
                }
                Some('\'') => {
                    body.push('\'');
                    self.advance();
                    break;
                }
                Some(c) => {
                    body.push(c);
                    self.advance();
                }
            }
        }
        match token::parse_immediate(&body) {
            Some(value) => Token::new(TokenKind::Immediate(value), location),
            None => self.error_token(&format!("Malformed character literal: ${body}"), location),
        }
    }

    fn scan_memory_ref(&mut self, location: SourceLocation) -> Token {
        self.advance(); // '['
        let mut body = String::new();
        let mut depth = 1usize;
        loop {
            match self.current() {
                None | Some('\n') => {
                    return self.error_token("Unterminated memory reference", location);
                }
                Some('[') => {
                    depth += 1;
                    body.push('[');
                    self.advance();
                }
                Some(']') => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    body.push(']');
                }
                Some(c) => {
                    body.push(c);
                    self.advance();
                }
            }
        }
        match token::parse_memory_ref(&body) {
            Some(mem) => Token::new(TokenKind::MemoryRef(mem), location),
            None => self.error_token(&format!("Malformed memory reference: [{body}]"), location),
        }
    }

    /// Scan `[A-Za-z_][A-Za-z0-9_]*`, or `None` if the cursor is not at a
    /// name start.
    fn scan_name(&mut self) -> Option<String> {
        let first = self.current()?;
        if !first.is_ascii_alphabetic() && first != '_' {
            return None;
        }
        let mut name = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Some(name)
    }

    /// Like `scan_name` but digits may lead, for mnemonic type suffixes.
    fn scan_name_or_digits(&mut self) -> Option<String> {
        let mut name = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    fn skip_blank(&mut self) {
        while let Some(c) = self.current() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.filename.clone(), self.line, self.column)
    }

    fn error_token(&self, message: &str, location: SourceLocation) -> Token {
        Token::new(TokenKind::Error(message.to_string()), location)
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}
