// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoder: one parsed instruction to one byte record.
//!
//! Record layout:
//!
//! ```text
//! byte 0      opcode
//! byte 1      flag0 (condition code, 0 = unconditional)
//! byte 2      operand types: dest << 4 | src1 << 2 | src2
//! byte 3      reserved, zero
//! bytes 4..   one 4-byte payload per operand (dest, src1, src2)
//! ```
//!
//! Records are zero-padded to the 8-byte minimum, so the encoded size is
//! `max(8, 4 + 4 × operands)` and depends only on the operand count.
//! Encoding is position-independent: label operands emit four zero bytes
//! and record a relocation against the containing section.
//!
//! The two-bit source-type fields cannot carry the label type code, so a
//! label used as a source operand encodes as an immediate patched by an
//! absolute relocation; only dest-slot labels (jumps, branches, calls)
//! keep the label type code and PC-relative patching.

use indexmap::IndexMap;

use crate::error::{codes, AsmErrorKind, Diagnostic};
use crate::object::{Relocation, Section, Symbol};
use crate::opcodes::{self, operand_type, CondCode, Opcode, ValueType, MIN_INSTRUCTION_SIZE};
use crate::parser::{Instruction, Operand};
use crate::token::{self, ImmediateValue};

/// Encode one instruction into the current section, recording any label
/// relocations and registering referenced symbols as placeholders.
///
/// On error the statement is skipped entirely: a diagnostic is pushed and
/// nothing is appended to the section.
pub fn encode_instruction(
    instruction: &Instruction,
    section: &mut Section,
    symbols: &mut IndexMap<String, Symbol>,
    relocations: &mut Vec<Relocation>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some((opcode, suffix_type)) = opcodes::parse_mnemonic(&instruction.mnemonic) else {
        diagnostics.push(
            Diagnostic::error(
                AsmErrorKind::Encode,
                "Unknown instruction",
                Some(&instruction.mnemonic),
                instruction.location.clone(),
            )
            .with_code(codes::INVALID_OPCODE),
        );
        return;
    };

    if !section.is_code() {
        diagnostics.push(Diagnostic::error(
            AsmErrorKind::Encode,
            "Instruction in non-code section",
            Some(&section.name),
            instruction.location.clone(),
        ));
        return;
    }

    let expected = opcode.operand_count();
    if instruction.operands.len() != expected {
        diagnostics.push(
            Diagnostic::error(
                AsmErrorKind::Encode,
                &format!(
                    "{} expects {} operand(s), found {}",
                    opcode.mnemonic(),
                    expected,
                    instruction.operands.len()
                ),
                None,
                instruction.location.clone(),
            )
            .with_code(codes::INVALID_OPERAND_COUNT),
        );
        return;
    }

    let (cond, value_type) = interpret_parameters(instruction, suffix_type, diagnostics);

    let mut bytes = Vec::with_capacity(MIN_INSTRUCTION_SIZE);
    bytes.push(opcode as u8);
    bytes.push(cond as u8);
    bytes.push(type_byte(&instruction.operands));
    bytes.push(0);

    let base_offset = section.current_offset;
    let mut pending = Vec::new();

    for operand in &instruction.operands {
        let payload_offset = base_offset + bytes.len() as u64;
        match encode_operand(operand, value_type, opcode, payload_offset, section) {
            Ok((payload, reloc)) => {
                bytes.extend_from_slice(&payload);
                if let Some(reloc) = reloc {
                    pending.push(reloc);
                }
            }
            Err(diag) => {
                diagnostics.push(diag.at(instruction.location.clone()));
                return;
            }
        }
    }

    while bytes.len() < MIN_INSTRUCTION_SIZE {
        bytes.push(0);
    }

    for reloc in &pending {
        if !symbols.contains_key(&reloc.symbol_name) {
            symbols.insert(
                reloc.symbol_name.clone(),
                Symbol::undefined(&reloc.symbol_name, instruction.location.clone()),
            );
        }
    }

    section.append(&bytes);
    relocations.extend(pending);
}

/// Derive the condition code and value type from the parameter list and
/// mnemonic suffix. The suffix wins over a type parameter.
fn interpret_parameters(
    instruction: &Instruction,
    suffix_type: Option<ValueType>,
    diagnostics: &mut Vec<Diagnostic>,
) -> (CondCode, ValueType) {
    let mut cond = CondCode::None;
    let mut param_type = None;
    for name in &instruction.parameters {
        if let Some(code) = CondCode::from_name(name) {
            if cond == CondCode::None {
                cond = code;
            }
        } else if let Some(vt) = ValueType::from_name(name) {
            if param_type.is_none() {
                param_type = Some(vt);
            }
        } else {
            diagnostics.push(Diagnostic::new(
                crate::error::Severity::Warning,
                crate::error::AsmError::new(
                    AsmErrorKind::Encode,
                    "Parameter has no effect on instruction",
                    Some(name),
                ),
                instruction.location.clone(),
            ));
        }
    }
    let value_type = suffix_type.or(param_type).unwrap_or_default();
    (cond, value_type)
}

/// Pack operand type codes into header byte 2.
fn type_byte(operands: &[Operand]) -> u8 {
    let code = |operand: Option<&Operand>, dest_slot: bool| -> u8 {
        match operand {
            None => operand_type::NONE,
            Some(Operand::Register(_)) => operand_type::REG,
            Some(Operand::Immediate(_)) => operand_type::IMM,
            Some(Operand::Memory(_)) => operand_type::MEM,
            Some(Operand::Label(_)) => {
                if dest_slot {
                    operand_type::LABEL
                } else {
                    operand_type::IMM
                }
            }
        }
    };
    (code(operands.first(), true) << 4)
        | (code(operands.get(1), false) << 2)
        | code(operands.get(2), false)
}

/// Failed operand encoding, to be located by the caller.
struct OperandError {
    message: String,
    param: Option<String>,
    code: u32,
}

impl OperandError {
    fn new(message: &str, param: Option<&str>, code: u32) -> Self {
        Self {
            message: message.to_string(),
            param: param.map(str::to_string),
            code,
        }
    }

    fn at(self, location: crate::error::SourceLocation) -> Diagnostic {
        Diagnostic::error(
            AsmErrorKind::Encode,
            &self.message,
            self.param.as_deref(),
            location,
        )
        .with_code(self.code)
    }
}

/// Encode one operand payload; label operands also yield a relocation at
/// `payload_offset`.
fn encode_operand(
    operand: &Operand,
    value_type: ValueType,
    opcode: Opcode,
    payload_offset: u64,
    section: &Section,
) -> Result<([u8; 4], Option<Relocation>), OperandError> {
    match operand {
        Operand::Register(name) => {
            let Some(index) = token::register_index(name) else {
                return Err(OperandError::new(
                    "Invalid register",
                    Some(name),
                    codes::INVALID_OPERAND_TYPE,
                ));
            };
            Ok((index.to_le_bytes(), None))
        }
        Operand::Immediate(imm) => {
            let payload = encode_immediate(imm, value_type).ok_or_else(|| {
                OperandError::new(
                    "Immediate not usable as instruction operand",
                    None,
                    codes::INVALID_OPERAND_TYPE,
                )
            })?;
            Ok((payload, None))
        }
        Operand::Memory(mem) => {
            let Some(base) = token::register_index(&mem.base) else {
                return Err(OperandError::new(
                    "Invalid base register",
                    Some(&mem.base),
                    codes::INVALID_OPERAND_TYPE,
                ));
            };
            let Ok(base) = u16::try_from(base) else {
                return Err(OperandError::new(
                    "Base register index out of range",
                    Some(&mem.base),
                    codes::VALUE_OUT_OF_RANGE,
                ));
            };
            let Ok(offset) = i16::try_from(mem.offset) else {
                return Err(OperandError::new(
                    &format!("Memory offset {} out of range", mem.offset),
                    None,
                    codes::VALUE_OUT_OF_RANGE,
                ));
            };
            let mut payload = [0u8; 4];
            payload[..2].copy_from_slice(&base.to_le_bytes());
            payload[2..].copy_from_slice(&offset.to_le_bytes());
            Ok((payload, None))
        }
        Operand::Label(name) => {
            let relocation = Relocation {
                symbol_name: name.clone(),
                section_name: section.name.clone(),
                offset: payload_offset,
                width: 4,
                pc_relative: opcode.is_pc_relative(),
                addend: 0,
            };
            Ok(([0u8; 4], Some(relocation)))
        }
    }
}

/// Serialize an immediate into the 4-byte payload slot, sized by the
/// value type. Wider values truncate to the low 32 bits in this profile.
fn encode_immediate(imm: &ImmediateValue, value_type: ValueType) -> Option<[u8; 4]> {
    if matches!(imm, ImmediateValue::Str(_)) {
        return None;
    }
    if value_type.is_float() {
        let value = imm.as_float()?;
        let bits = match value_type {
            ValueType::F32 => (value as f32).to_bits() as u64,
            _ => value.to_bits(),
        };
        Some((bits as u32).to_le_bytes())
    } else {
        let value = imm.as_int().or_else(|| {
            // Integer contexts accept a float literal by truncation.
            imm.as_float().map(|f| f as i64)
        })?;
        Some((value as u32).to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceLocation;
    use crate::token::MemoryReference;

    fn instr(mnemonic: &str, parameters: Vec<&str>, operands: Vec<Operand>) -> Instruction {
        Instruction {
            mnemonic: mnemonic.to_string(),
            parameters: parameters.into_iter().map(str::to_string).collect(),
            operands,
            location: SourceLocation::default(),
        }
    }

    fn encode(instruction: &Instruction) -> (Section, Vec<Relocation>, Vec<Diagnostic>) {
        let mut section = Section::with_defaults(".text");
        let mut symbols = IndexMap::new();
        let mut relocations = Vec::new();
        let mut diagnostics = Vec::new();
        encode_instruction(
            instruction,
            &mut section,
            &mut symbols,
            &mut relocations,
            &mut diagnostics,
        );
        (section, relocations, diagnostics)
    }

    #[test]
    fn nop_is_a_padded_eight_byte_record() {
        let (section, relocations, diagnostics) = encode(&instr("nop", vec![], vec![]));
        assert!(diagnostics.is_empty());
        assert!(relocations.is_empty());
        assert_eq!(section.data, vec![0x00, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn register_payload_is_little_endian_index() {
        let (section, _, diagnostics) = encode(&instr(
            "inc",
            vec![],
            vec![Operand::Register("r7".into())],
        ));
        assert!(diagnostics.is_empty());
        assert_eq!(
            section.data,
            vec![0x65, 0, 0x10, 0, 7, 0, 0, 0]
        );
    }

    #[test]
    fn three_operand_instruction_is_sixteen_bytes() {
        let (section, _, diagnostics) = encode(&instr(
            "add",
            vec![],
            vec![
                Operand::Register("r1".into()),
                Operand::Register("r2".into()),
                Operand::Register("r3".into()),
            ],
        ));
        assert!(diagnostics.is_empty());
        assert_eq!(section.data.len(), 16);
        assert_eq!(section.data[0], 0x60);
        // dest=reg, src1=reg, src2=reg
        assert_eq!(section.data[2], (1 << 4) | (1 << 2) | 1);
        assert_eq!(&section.data[4..8], &[1, 0, 0, 0]);
        assert_eq!(&section.data[8..12], &[2, 0, 0, 0]);
        assert_eq!(&section.data[12..16], &[3, 0, 0, 0]);
    }

    #[test]
    fn condition_parameter_sets_flag0() {
        let (section, _, _) = encode(&instr(
            "br",
            vec!["lt"],
            vec![Operand::Label("loop".into())],
        ));
        assert_eq!(section.data[1], CondCode::Lt as u8);
    }

    #[test]
    fn label_operand_records_pc_relative_relocation_for_branches() {
        let (section, relocations, diagnostics) = encode(&instr(
            "jmp",
            vec![],
            vec![Operand::Label("target".into())],
        ));
        assert!(diagnostics.is_empty());
        assert_eq!(relocations.len(), 1);
        let reloc = &relocations[0];
        assert_eq!(reloc.symbol_name, "target");
        assert_eq!(reloc.offset, 4);
        assert_eq!(reloc.width, 4);
        assert!(reloc.pc_relative);
        assert_eq!(&section.data[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn label_source_operand_records_absolute_relocation() {
        let (_, relocations, diagnostics) = encode(&instr(
            "load",
            vec![],
            vec![
                Operand::Register("r1".into()),
                Operand::Label("data".into()),
            ],
        ));
        assert!(diagnostics.is_empty());
        assert_eq!(relocations.len(), 1);
        assert!(!relocations[0].pc_relative);
        assert_eq!(relocations[0].offset, 8);
    }

    #[test]
    fn memory_payload_packs_base_and_offset() {
        let (section, _, diagnostics) = encode(&instr(
            "load",
            vec![],
            vec![
                Operand::Register("r1".into()),
                Operand::Memory(MemoryReference {
                    base: "r2".into(),
                    offset: -4,
                }),
            ],
        ));
        assert!(diagnostics.is_empty());
        assert_eq!(&section.data[8..10], &2u16.to_le_bytes());
        assert_eq!(&section.data[10..12], &(-4i16).to_le_bytes());
    }

    #[test]
    fn memory_offset_out_of_range_skips_statement() {
        let (section, relocations, diagnostics) = encode(&instr(
            "load",
            vec![],
            vec![
                Operand::Register("r1".into()),
                Operand::Memory(MemoryReference {
                    base: "r2".into(),
                    offset: 40000,
                }),
            ],
        ));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), codes::VALUE_OUT_OF_RANGE);
        assert!(section.data.is_empty());
        assert!(relocations.is_empty());
    }

    #[test]
    fn operand_count_mismatch_skips_statement() {
        let (section, _, diagnostics) = encode(&instr("nop", vec![], vec![
            Operand::Register("r1".into()),
        ]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), codes::INVALID_OPERAND_COUNT);
        assert!(section.data.is_empty());
    }

    #[test]
    fn instruction_outside_code_section_is_error() {
        let mut section = Section::with_defaults(".data");
        let mut symbols = IndexMap::new();
        let mut relocations = Vec::new();
        let mut diagnostics = Vec::new();
        encode_instruction(
            &instr("nop", vec![], vec![]),
            &mut section,
            &mut symbols,
            &mut relocations,
            &mut diagnostics,
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message().contains("non-code section"));
    }

    #[test]
    fn float_immediate_uses_ieee_bits() {
        let (section, _, diagnostics) = encode(&instr(
            "mov",
            vec!["f32"],
            vec![
                Operand::Register("r1".into()),
                Operand::Immediate(ImmediateValue::Float(1.5)),
            ],
        ));
        assert!(diagnostics.is_empty());
        assert_eq!(&section.data[8..12], &1.5f32.to_bits().to_le_bytes());
    }

    #[test]
    fn mnemonic_suffix_wins_over_default_type() {
        let (section, _, diagnostics) = encode(&instr(
            "mov.i64",
            vec![],
            vec![
                Operand::Register("r1".into()),
                Operand::Immediate(ImmediateValue::integer(-1)),
            ],
        ));
        assert!(diagnostics.is_empty());
        // Truncated to the low 32 bits.
        assert_eq!(&section.data[8..12], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn referenced_labels_register_placeholder_symbols() {
        let mut section = Section::with_defaults(".text");
        let mut symbols = IndexMap::new();
        let mut relocations = Vec::new();
        let mut diagnostics = Vec::new();
        encode_instruction(
            &instr("call", vec![], vec![Operand::Label("helper".into())]),
            &mut section,
            &mut symbols,
            &mut relocations,
            &mut diagnostics,
        );
        let symbol = symbols.get("helper").expect("placeholder symbol");
        assert!(!symbol.defined);
    }
}
