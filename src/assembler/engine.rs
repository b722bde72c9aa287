// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The two-pass assembly driver.
//!
//! Pass 1 lays out sections and establishes symbol offsets; pass 2 resets
//! every section and emits final bytes, rewriting each symbol's value at
//! its definition site, so pass-1 offsets are advisory only. Relocations
//! recorded during pass 2 are resolved afterwards, then the surviving
//! sections and symbols are packed into an [`Object`].
//!
//! The driver owns all mutable state for one assembly: section and symbol
//! tables, the relocation list, and the diagnostic list. It is not safe
//! to share across concurrent assemblies; independent runs use
//! independent drivers.

use indexmap::IndexMap;
use std::collections::HashSet;

use super::{directives, encoder, AssemblerOptions};
use crate::error::{codes, AsmErrorKind, Diagnostic};
use crate::object::{
    Object, Relocation, Section, SectionFlags, SectionKind, Symbol, SymbolBinding, SymbolType,
};
use crate::opcodes;
use crate::parser::{Directive, LabelDef, Operand, Statement};

pub(crate) struct Assembler {
    sections: IndexMap<String, Section>,
    symbols: IndexMap<String, Symbol>,
    relocations: Vec<Relocation>,
    diagnostics: Vec<Diagnostic>,
    current_section: Option<String>,
    options: AssemblerOptions,
}

impl Assembler {
    pub(crate) fn new(options: AssemblerOptions) -> Self {
        Self {
            sections: IndexMap::new(),
            symbols: IndexMap::new(),
            relocations: Vec::new(),
            diagnostics: Vec::new(),
            current_section: None,
            options,
        }
    }

    /// Run both passes, resolve relocations, and finalize the object.
    pub(crate) fn run(mut self, statements: &[Statement]) -> (Object, Vec<Diagnostic>) {
        self.pass1(statements);
        self.pass2(statements);
        self.resolve_relocations();
        self.finalize()
    }

    /// Pass 1: create sections and symbols, compute preliminary offsets.
    ///
    /// Symbol-definition and section-attribute problems are diagnosed
    /// here, exactly once; emission problems wait for pass 2.
    fn pass1(&mut self, statements: &[Statement]) {
        for statement in statements {
            match statement {
                Statement::Empty => {}
                Statement::LabelOnly(label) => {
                    self.define_label(label, None);
                }
                Statement::Instruction { label, instruction } => {
                    if let Some(label) = label {
                        self.define_label(label, Some(SymbolType::Func));
                    }
                    let section = self.ensure_section();
                    if section.is_code() {
                        if let Some((opcode, _)) = opcodes::parse_mnemonic(&instruction.mnemonic) {
                            if instruction.operands.len() == opcode.operand_count() {
                                section.current_offset +=
                                    opcodes::instruction_size(instruction.operands.len()) as u64;
                            }
                        }
                    }
                }
                Statement::Directive { label, directive } => {
                    if let Some(label) = label {
                        self.define_label(label, None);
                    }
                    self.layout_directive(directive);
                }
            }
        }
    }

    /// Pass 2: reset sections and emit final bytes. Symbol values are
    /// rewritten at their definition sites as emission proceeds.
    fn pass2(&mut self, statements: &[Statement]) {
        for section in self.sections.values_mut() {
            section.reset();
        }
        self.current_section = None;
        let mut placed: HashSet<String> = HashSet::new();

        for statement in statements {
            match statement {
                Statement::Empty => {}
                Statement::LabelOnly(label) => {
                    self.place_label(label, &mut placed);
                }
                Statement::Instruction { label, instruction } => {
                    if let Some(label) = label {
                        self.place_label(label, &mut placed);
                    }
                    self.ensure_section();
                    let name = self.current_section.clone().unwrap();
                    let section = self.sections.get_mut(&name).unwrap();
                    encoder::encode_instruction(
                        instruction,
                        section,
                        &mut self.symbols,
                        &mut self.relocations,
                        &mut self.diagnostics,
                    );
                }
                Statement::Directive { label, directive } => {
                    if let Some(label) = label {
                        self.place_label(label, &mut placed);
                    }
                    self.emit_directive(directive);
                }
            }
        }
    }

    /// Pass-1 handling of a directive: section bookkeeping and size
    /// accounting.
    fn layout_directive(&mut self, directive: &Directive) {
        match directive.name.as_str() {
            "section" => self.switch_section(directive, true),
            "global" => self.mark_global(directive, true),
            "align" => {
                let align = directives::first_int_operand(directive);
                match align {
                    Some(n) if n > 0 && (n & (n - 1)) == 0 => {
                        let section = self.ensure_section();
                        let align = n as u64;
                        let rem = section.current_offset % align;
                        if rem != 0 {
                            section.current_offset += align - rem;
                        }
                    }
                    _ => {
                        self.diagnostics.push(Diagnostic::error(
                            AsmErrorKind::Layout,
                            "Alignment must be a positive power of two",
                            None,
                            directive.location.clone(),
                        ));
                    }
                }
            }
            "zero" => {
                let count = directives::first_int_operand(directive);
                match count {
                    Some(n) if n >= 0 => {
                        let section = self.ensure_section();
                        section.current_offset += n as u64;
                    }
                    _ => {
                        self.diagnostics.push(Diagnostic::error(
                            AsmErrorKind::Layout,
                            "Missing or invalid size for .zero",
                            None,
                            directive.location.clone(),
                        ));
                    }
                }
            }
            name if directives::data_class(name).is_some() => {
                let section = self.ensure_section();
                section.current_offset += directives::size_of(directive, section.current_offset);
            }
            other => {
                self.diagnostics.push(Diagnostic::error(
                    AsmErrorKind::Layout,
                    "Unknown directive",
                    Some(other),
                    directive.location.clone(),
                ));
            }
        }
    }

    /// Pass-2 handling of a directive: re-apply attributes and emit
    /// bytes. Structural problems were already diagnosed in pass 1.
    fn emit_directive(&mut self, directive: &Directive) {
        match directive.name.as_str() {
            "section" => self.switch_section(directive, false),
            "global" => self.mark_global(directive, false),
            "align" => {
                if let Some(n) = directives::first_int_operand(directive) {
                    if n > 0 && (n & (n - 1)) == 0 {
                        self.ensure_section().align_to(n as u64);
                    }
                }
            }
            "zero" => {
                if let Some(n) = directives::first_int_operand(directive) {
                    if n >= 0 {
                        self.ensure_section().reserve(n as u64);
                    }
                }
            }
            name if directives::data_class(name).is_some() => {
                self.ensure_section();
                let name = self.current_section.clone().unwrap();
                let section = self.sections.get_mut(&name).unwrap();
                directives::emit(directive, section, &mut self.diagnostics);
            }
            _ => {}
        }
    }

    /// Switch the current section, creating it on first reference and
    /// applying any attribute parameters.
    fn switch_section(&mut self, directive: &Directive, report: bool) {
        let name = match directive.operands.first() {
            Some(Operand::Label(name)) => name.clone(),
            _ => {
                if report {
                    self.diagnostics.push(Diagnostic::error(
                        AsmErrorKind::Layout,
                        "Missing section name",
                        None,
                        directive.location.clone(),
                    ));
                }
                return;
            }
        };

        if !self.sections.contains_key(&name) {
            self.sections
                .insert(name.clone(), Section::with_defaults(&name));
        }
        let section = self.sections.get_mut(&name).unwrap();

        for attr in &directive.parameters {
            if let Some(kind) = SectionKind::from_name(attr) {
                section.kind = kind;
            } else if let Some(flag) = SectionFlags::from_name(attr) {
                section.flags.insert(flag);
            } else if report {
                self.diagnostics.push(Diagnostic::error(
                    AsmErrorKind::Layout,
                    "Unknown section attribute",
                    Some(attr),
                    directive.location.clone(),
                ));
            }
        }

        self.current_section = Some(name);
    }

    /// Mark a symbol global, creating an undefined placeholder if it has
    /// not been seen yet.
    fn mark_global(&mut self, directive: &Directive, report: bool) {
        let name = match directive.operands.first() {
            Some(Operand::Label(name)) => name.clone(),
            _ => {
                if report {
                    self.diagnostics.push(Diagnostic::error(
                        AsmErrorKind::Layout,
                        "Missing symbol name for .global",
                        None,
                        directive.location.clone(),
                    ));
                }
                return;
            }
        };
        let entry = self
            .symbols
            .entry(name.clone())
            .or_insert_with(|| Symbol::undefined(&name, directive.location.clone()));
        entry.binding = SymbolBinding::Global;
    }

    /// Define a label at the current offset (pass 1). Duplicate
    /// definitions are diagnosed here and only here.
    fn define_label(&mut self, label: &LabelDef, forced_type: Option<SymbolType>) {
        self.ensure_section();
        let section_name = self.current_section.clone().unwrap();
        let offset = self.sections[&section_name].current_offset;
        let symbol_type = forced_type.unwrap_or_else(|| {
            if self.sections[&section_name].is_code() {
                SymbolType::Func
            } else {
                SymbolType::NoType
            }
        });

        match self.symbols.get_mut(&label.name) {
            Some(existing) if existing.defined => {
                self.diagnostics.push(
                    Diagnostic::error(
                        AsmErrorKind::Symbol,
                        "Symbol already defined",
                        Some(&label.name),
                        label.location.clone(),
                    )
                    .with_code(codes::DUPLICATE_SYMBOL),
                );
            }
            Some(existing) => {
                // Forward reference or .global placeholder: fill in the
                // definition, keep the binding.
                existing.value = offset;
                existing.section_name = Some(section_name);
                existing.symbol_type = symbol_type;
                existing.defined = true;
                existing.location = label.location.clone();
            }
            None => {
                self.symbols.insert(
                    label.name.clone(),
                    Symbol {
                        name: label.name.clone(),
                        value: offset,
                        section_name: Some(section_name),
                        symbol_type,
                        binding: SymbolBinding::Local,
                        defined: true,
                        location: label.location.clone(),
                    },
                );
            }
        }
    }

    /// Update a symbol's value to the pass-2 offset. Only the first
    /// placement wins, mirroring the first-definition rule of pass 1.
    fn place_label(&mut self, label: &LabelDef, placed: &mut HashSet<String>) {
        self.ensure_section();
        if !placed.insert(label.name.clone()) {
            return;
        }
        let section_name = self.current_section.clone().unwrap();
        let offset = self.sections[&section_name].current_offset;
        if let Some(symbol) = self.symbols.get_mut(&label.name) {
            if symbol.defined {
                symbol.value = offset;
                symbol.section_name = Some(section_name);
            }
        }
    }

    /// The current section, defaulting to `.text` on first use.
    fn ensure_section(&mut self) -> &mut Section {
        if self.current_section.is_none() {
            if !self.sections.contains_key(".text") {
                self.sections
                    .insert(".text".to_string(), Section::with_defaults(".text"));
            }
            self.current_section = Some(".text".to_string());
        }
        let name = self.current_section.as_ref().unwrap();
        self.sections.get_mut(name).unwrap()
    }

    /// Patch every recorded relocation into its section's bytes.
    fn resolve_relocations(&mut self) {
        for reloc in &self.relocations {
            let symbol = self.symbols.get(&reloc.symbol_name);
            let defined = symbol.map(|s| s.defined).unwrap_or(false);
            if !defined {
                if !self.options.allow_unresolved {
                    let location = symbol.map(|s| s.location.clone()).unwrap_or_default();
                    self.diagnostics.push(
                        Diagnostic::error(
                            AsmErrorKind::Symbol,
                            "Undefined symbol",
                            Some(&reloc.symbol_name),
                            location,
                        )
                        .with_code(codes::UNDEFINED_SYMBOL),
                    );
                }
                continue;
            }
            let symbol = symbol.unwrap();

            let value = if reloc.pc_relative {
                symbol.value as i64 - (reloc.offset + reloc.width as u64) as i64 + reloc.addend
            } else {
                symbol.value as i64 + reloc.addend
            };

            let bits = reloc.width as u32 * 8;
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if value < min || value > max {
                    self.diagnostics.push(
                        Diagnostic::error(
                            AsmErrorKind::Relocation,
                            &format!(
                                "Relocation value {value} does not fit in {} byte(s)",
                                reloc.width
                            ),
                            Some(&reloc.symbol_name),
                            symbol.location.clone(),
                        )
                        .with_code(codes::RELOCATION_OVERFLOW),
                    );
                    continue;
                }
            }

            let Some(section) = self.sections.get_mut(&reloc.section_name) else {
                continue;
            };
            let start = reloc.offset as usize;
            let end = start + reloc.width as usize;
            if end > section.data.len() {
                continue;
            }
            section.data[start..end].copy_from_slice(&value.to_le_bytes()[..reloc.width as usize]);
        }
    }

    /// Build the final object: sections in first-reference order with
    /// empty progbits sections dropped, then symbols in first-definition
    /// order, then the bookkeeping symbol and string tables.
    fn finalize(mut self) -> (Object, Vec<Diagnostic>) {
        let mut object = Object::new();
        let mut emitted: HashSet<String> = HashSet::new();

        for section in self.sections.values() {
            if section.kind == SectionKind::ProgBits && section.size() == 0 {
                continue;
            }
            emitted.insert(section.name.clone());
            object.add_section(section.clone());
        }

        for symbol in self.symbols.values() {
            let section_emitted = symbol
                .section_name
                .as_deref()
                .map(|name| emitted.contains(name))
                .unwrap_or(false);
            let keep_unresolved = symbol.binding == SymbolBinding::Global
                && !symbol.defined
                && self.options.allow_unresolved;
            if section_emitted || keep_unresolved {
                object.add_symbol(symbol.clone());
            }
        }

        if self.options.allow_unresolved {
            for reloc in &self.relocations {
                let resolved = self
                    .symbols
                    .get(&reloc.symbol_name)
                    .map(|s| s.defined)
                    .unwrap_or(false);
                if !resolved && emitted.contains(&reloc.section_name) {
                    object.add_relocation(reloc.clone());
                }
            }
        }

        let symtab_id = object.add_section(Section::new(
            ".symtab",
            SectionKind::SymTab,
            SectionFlags::NONE,
        ));
        object.set_symbol_table_section_id(symtab_id);

        object.add_string(".strtab");
        let mut strtab = Section::new(".strtab", SectionKind::StrTab, SectionFlags::NONE);
        strtab.data = object.string_table().as_bytes().to_vec();
        strtab.current_offset = strtab.data.len() as u64;
        object.add_section(strtab);

        (object, std::mem::take(&mut self.diagnostics))
    }
}
