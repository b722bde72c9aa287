// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Disassembler: object to CASM text.
//!
//! Walks the object's sections in order. Code sections decode one
//! fixed-layout record at a time; data sections render as `.byte` lists,
//! sixteen values per line; nobits sections render as `.zero`. Symbols
//! become `#name` label lines at their offsets, and branch targets with
//! no symbol get synthetic `L<offset>` names that never collide with
//! user-defined symbols.

use std::collections::BTreeMap;

use crate::object::{Object, Section, SectionKind};
use crate::opcodes::{self, operand_type, CondCode, Opcode, HEADER_SIZE, PAYLOAD_SIZE};

#[derive(Default)]
pub struct Disassembler;

impl Disassembler {
    pub fn new() -> Self {
        Self
    }

    /// Render the whole object as CASM source.
    pub fn disassemble(&self, object: &Object) -> String {
        let mut out = String::new();
        for section in object.sections() {
            if matches!(section.kind, SectionKind::SymTab | SectionKind::StrTab) {
                continue;
            }
            out.push_str(&format!(".section {}\n", section_operand(&section.name)));
            let labels = section_labels(object, &section.name);
            match section.kind {
                SectionKind::NoBits => render_nobits(&mut out, section, &labels),
                _ if section.is_code() => render_code(&mut out, object, section, &labels),
                _ => render_data(&mut out, section, &labels),
            }
        }
        out
    }
}

/// Render a section name the way the parser will read it back.
fn section_operand(name: &str) -> String {
    if name.starts_with('.') {
        name.to_string()
    } else {
        format!("@{name}")
    }
}

/// Offsets of every symbol defined in one section.
fn section_labels(object: &Object, section_name: &str) -> BTreeMap<u64, Vec<String>> {
    let mut labels: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for symbol in object.symbols() {
        if symbol.defined && symbol.section_name.as_deref() == Some(section_name) {
            labels
                .entry(symbol.value)
                .or_default()
                .push(symbol.name.clone());
        }
    }
    labels
}

/// One decoded instruction record.
struct Record {
    offset: u64,
    opcode: Option<Opcode>,
    cond: CondCode,
    operand_types: Vec<u8>,
    size: usize,
}

impl Record {
    fn payload(&self, section: &Section, index: usize) -> [u8; 4] {
        let start = self.offset as usize + HEADER_SIZE + index * PAYLOAD_SIZE;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&section.data[start..start + 4]);
        bytes
    }
}

/// Decode the record starting at `offset`, or `None` if the remaining
/// bytes cannot hold one.
fn decode_record(section: &Section, offset: u64) -> Option<Record> {
    let start = offset as usize;
    let data = &section.data;
    if start + HEADER_SIZE > data.len() {
        return None;
    }
    let type_byte = data[start + 2];
    let codes = [type_byte >> 4, (type_byte >> 2) & 0x3, type_byte & 0x3];
    let operand_types: Vec<u8> = codes
        .into_iter()
        .take_while(|&c| c != operand_type::NONE)
        .collect();
    let size = opcodes::instruction_size(operand_types.len());
    if start + size > data.len() {
        return None;
    }
    Some(Record {
        offset,
        opcode: Opcode::from_byte(data[start]),
        cond: CondCode::from_byte(data[start + 1]).unwrap_or(CondCode::None),
        operand_types,
        size,
    })
}

/// Decode every record in a code section. A trailing fragment that does
/// not fill a record is returned as a byte range.
fn decode_section(section: &Section) -> (Vec<Record>, Option<u64>) {
    let mut records = Vec::new();
    let mut offset = 0u64;
    while (offset as usize) < section.data.len() {
        match decode_record(section, offset) {
            Some(record) => {
                offset += record.size as u64;
                records.push(record);
            }
            None => return (records, Some(offset)),
        }
    }
    (records, None)
}

/// The branch/reference target of a record's dest-slot label operand.
fn label_target(record: &Record, section: &Section) -> Option<u64> {
    if record.operand_types.first() != Some(&operand_type::LABEL) {
        return None;
    }
    let value = i32::from_le_bytes(record.payload(section, 0)) as i64;
    let pc_relative = record.opcode.map(|op| op.is_pc_relative()).unwrap_or(false);
    let target = if pc_relative {
        let site = record.offset as i64 + HEADER_SIZE as i64;
        value + site + PAYLOAD_SIZE as i64
    } else {
        value
    };
    u64::try_from(target).ok()
}

fn render_code(
    out: &mut String,
    object: &Object,
    section: &Section,
    labels: &BTreeMap<u64, Vec<String>>,
) {
    let (records, tail) = decode_section(section);

    // Synthesize names for referenced offsets that carry no symbol.
    let mut synthetic: BTreeMap<u64, String> = BTreeMap::new();
    for record in &records {
        if let Some(target) = label_target(record, section) {
            if !labels.contains_key(&target) && !synthetic.contains_key(&target) {
                let mut name = format!("L{target}");
                while object.symbol(&name).is_some() {
                    name.push('_');
                }
                synthetic.insert(target, name);
            }
        }
    }

    for record in &records {
        if let Some(names) = labels.get(&record.offset) {
            for name in names {
                out.push_str(&format!("#{name}\n"));
            }
        }
        if let Some(name) = synthetic.get(&record.offset) {
            out.push_str(&format!("#{name}\n"));
        }
        render_record(out, record, section, labels, &synthetic);
    }

    if let Some(tail) = tail {
        let chunk = &section.data[tail as usize..];
        render_byte_rows(out, chunk);
    }

    // Symbols sitting at the end of the section still need a line.
    let end = section.data.len() as u64;
    if let Some(names) = labels.get(&end) {
        for name in names {
            out.push_str(&format!("#{name}\n"));
        }
    }
}

fn render_record(
    out: &mut String,
    record: &Record,
    section: &Section,
    labels: &BTreeMap<u64, Vec<String>>,
    synthetic: &BTreeMap<u64, String>,
) {
    let Some(opcode) = record.opcode else {
        // Unknown opcode byte: keep the raw record so nothing is lost.
        let start = record.offset as usize;
        render_byte_rows(out, &section.data[start..start + record.size]);
        return;
    };

    out.push_str("  ");
    out.push_str(opcode.mnemonic());
    if record.cond != CondCode::None {
        out.push_str(&format!(" ^{}", record.cond.name()));
    }

    for (index, &type_code) in record.operand_types.iter().enumerate() {
        out.push_str(if index == 0 { " " } else { ", " });
        let payload = record.payload(section, index);
        match type_code {
            operand_type::REG => {
                out.push_str(&format!("%r{}", u32::from_le_bytes(payload)));
            }
            operand_type::MEM => {
                let base = u16::from_le_bytes([payload[0], payload[1]]);
                let offset = i16::from_le_bytes([payload[2], payload[3]]);
                if offset > 0 {
                    out.push_str(&format!("[%r{base}+{offset}]"));
                } else if offset < 0 {
                    out.push_str(&format!("[%r{base}{offset}]"));
                } else {
                    out.push_str(&format!("[%r{base}]"));
                }
            }
            operand_type::LABEL => {
                let target = label_target(record, section).unwrap_or(0);
                if let Some(names) = labels.get(&target) {
                    out.push_str(&format!("@{}", names[0]));
                } else if let Some(name) = synthetic.get(&target) {
                    out.push_str(&format!("@{name}"));
                } else {
                    out.push_str(&format!("@L{target}"));
                }
            }
            _ => {
                out.push_str(&format!("${}", i32::from_le_bytes(payload)));
            }
        }
    }
    out.push('\n');
}

fn render_data(out: &mut String, section: &Section, labels: &BTreeMap<u64, Vec<String>>) {
    // Break the byte rows at label offsets so each symbol keeps its
    // exact position on re-assembly.
    let len = section.data.len() as u64;
    let mut cuts: Vec<u64> = labels.keys().copied().filter(|&o| o <= len).collect();
    cuts.push(len);
    cuts.dedup();

    let mut start = 0u64;
    for &cut in &cuts {
        if cut > start {
            render_byte_rows(out, &section.data[start as usize..cut as usize]);
            start = cut;
        }
        if let Some(names) = labels.get(&cut) {
            for name in names {
                out.push_str(&format!("#{name}\n"));
            }
        }
    }
}

fn render_nobits(out: &mut String, section: &Section, labels: &BTreeMap<u64, Vec<String>>) {
    let mut start = 0u64;
    for (&offset, names) in labels {
        if offset > start {
            out.push_str(&format!(".zero ${}\n", offset - start));
            start = offset;
        }
        for name in names {
            out.push_str(&format!("#{name}\n"));
        }
    }
    if section.size() > start {
        out.push_str(&format!(".zero ${}\n", section.size() - start));
    }
}

fn render_byte_rows(out: &mut String, bytes: &[u8]) {
    for row in bytes.chunks(16) {
        out.push_str("  .byte ");
        for (index, byte) in row.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("$ix{byte:02x}"));
        }
        out.push('\n');
    }
}
