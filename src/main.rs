// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for casm.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use casm::assembler::{assemble_source_with, AssemblerOptions};
use casm::disasm::Disassembler;
use casm::error::{error_count, Diagnostic, Severity};
use casm::object::{Object, SectionKind};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "casm",
    version = VERSION,
    about = "CASM assembler for the COIL virtual instruction set"
)]
struct Cli {
    /// Input CASM source file.
    input: PathBuf,
    /// Output file. Defaults to the input base with a .coil extension
    /// (.dasm extension for --disassemble), or stdout with -.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
    /// Assemble, then print the canonical disassembly instead of
    /// writing an object file.
    #[arg(short = 'd', long = "disassemble")]
    disassemble: bool,
    /// Keep undefined symbols as unresolved relocations instead of
    /// reporting them.
    #[arg(long = "allow-unresolved")]
    allow_unresolved: bool,
    /// Print diagnostics as a JSON array on stdout.
    #[arg(long = "diagnostics-json")]
    diagnostics_json: bool,
    /// Suppress diagnostic output.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("casm: cannot read {}: {err}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };
    let filename = cli.input.display().to_string();

    let options = AssemblerOptions {
        allow_unresolved: cli.allow_unresolved,
    };
    let (object, diagnostics) = assemble_source_with(&source, &filename, options);

    if cli.diagnostics_json {
        println!("{}", diagnostics_json(&diagnostics));
    } else if !cli.quiet {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        for diag in &diagnostics {
            eprintln!("{}", diag.format_with_context(Some(&lines)));
        }
    }

    let failed = error_count(&diagnostics) > 0;

    if cli.disassemble {
        let text = Disassembler::new().disassemble(&object);
        if let Err(err) = write_output(&cli, "dasm", text.as_bytes()) {
            eprintln!("casm: {err}");
            return ExitCode::FAILURE;
        }
    } else if !failed {
        let encoded = encode_object(&object);
        if let Err(err) = write_output(&cli, "coil", &encoded) {
            eprintln!("casm: {err}");
            return ExitCode::FAILURE;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn write_output(cli: &Cli, extension: &str, bytes: &[u8]) -> std::io::Result<()> {
    let path = match &cli.output {
        Some(path) if path.as_os_str() == "-" => {
            return std::io::stdout().write_all(bytes);
        }
        Some(path) => path.clone(),
        None => cli.input.with_extension(extension),
    };
    fs::write(path, bytes)
}

fn diagnostics_json(diagnostics: &[Diagnostic]) -> String {
    let entries: Vec<serde_json::Value> = diagnostics
        .iter()
        .map(|diag| {
            json!({
                "severity": match diag.severity() {
                    Severity::Error => "error",
                    Severity::Warning => "warning",
                    Severity::Note => "note",
                },
                "code": diag.code(),
                "message": diag.message(),
                "file": diag.location().filename,
                "line": diag.location().line,
                "column": diag.location().column,
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

/// Flat on-disk rendering of the in-memory object.
///
/// Layout: magic, version, section count, then per section a header
/// (name offset, kind, flags, alignment, size) followed by its data,
/// then the symbol table, then the string table. All fields are
/// little-endian.
fn encode_object(object: &Object) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"COIL");
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(object.section_count() as u16).to_le_bytes());
    out.extend_from_slice(&object.symbol_table_section_id().to_le_bytes());

    for section in object.sections() {
        let name_offset = object
            .string_table()
            .offset_of(&section.name)
            .unwrap_or(0);
        out.extend_from_slice(&name_offset.to_le_bytes());
        out.push(section.kind as u8);
        out.extend_from_slice(&section.flags.bits().to_le_bytes());
        out.extend_from_slice(&section.alignment.to_le_bytes());
        out.extend_from_slice(&section.size().to_le_bytes());
        if section.kind != SectionKind::NoBits {
            out.extend_from_slice(&section.data);
        }
    }

    out.extend_from_slice(&(object.symbol_count() as u16).to_le_bytes());
    for symbol in object.symbols() {
        let name_offset = object.string_table().offset_of(&symbol.name).unwrap_or(0);
        let section_index = symbol
            .section_name
            .as_deref()
            .map(|name| object.section_index(name))
            .unwrap_or(0);
        out.extend_from_slice(&name_offset.to_le_bytes());
        out.extend_from_slice(&symbol.value.to_le_bytes());
        out.extend_from_slice(&section_index.to_le_bytes());
        out.push(symbol.symbol_type as u8);
        out.push(symbol.binding as u8);
    }

    let table = object.string_table().as_bytes();
    out.extend_from_slice(&(table.len() as u64).to_le_bytes());
    out.extend_from_slice(table);
    out
}
