// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembly driver - public entry points.
//!
//! [`assemble_source`] runs the full pipeline on source text;
//! [`assemble_statements`] starts from an already-parsed statement list.
//! Both always return an [`Object`] together with every diagnostic from
//! every stage; an error-severity diagnostic means the object may be
//! incomplete for linking, but it is still a valid value.

mod directives;
mod encoder;
mod engine;

use crate::error::Diagnostic;
use crate::object::Object;
use crate::parser;
use crate::parser::Statement;

/// Driver configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblerOptions {
    /// Keep undefined symbols as unresolved relocations in the object
    /// instead of diagnosing them.
    pub allow_unresolved: bool,
}

/// Assemble CASM source text into an object.
pub fn assemble_source(source: &str, filename: &str) -> (Object, Vec<Diagnostic>) {
    assemble_source_with(source, filename, AssemblerOptions::default())
}

/// Assemble CASM source text with explicit driver options.
pub fn assemble_source_with(
    source: &str,
    filename: &str,
    options: AssemblerOptions,
) -> (Object, Vec<Diagnostic>) {
    let (statements, mut diagnostics) = parser::parse_source(source, filename);
    let (object, drive_diagnostics) = engine::Assembler::new(options).run(&statements);
    diagnostics.extend(drive_diagnostics);
    (object, diagnostics)
}

/// Assemble an already-parsed statement list.
pub fn assemble_statements(statements: &[Statement]) -> (Object, Vec<Diagnostic>) {
    assemble_statements_with(statements, AssemblerOptions::default())
}

/// Assemble a statement list with explicit driver options.
pub fn assemble_statements_with(
    statements: &[Statement],
    options: AssemblerOptions,
) -> (Object, Vec<Diagnostic>) {
    engine::Assembler::new(options).run(statements)
}
