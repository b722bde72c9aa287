// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Data directive layout and emission.
//!
//! Pass 1 asks only for sizes through [`size_of`]; pass 2 emits bytes
//! through [`emit`], which is the authoritative path and the only one
//! that reports diagnostics. Both agree on sizes for well-formed input;
//! for malformed input pass 2 wins because it also rewrites every symbol
//! offset.

use crate::error::{codes, AsmErrorKind, Diagnostic};
use crate::object::Section;
use crate::parser::{Directive, Operand};
use crate::token::ImmediateValue;

/// Shape of a data-emitting directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataClass {
    Int { width: usize, signed: bool },
    Float { width: usize },
    Ascii { nul_terminated: bool },
}

/// Classify a data directive name, or `None` for non-data directives.
pub fn data_class(name: &str) -> Option<DataClass> {
    match name {
        "i8" => Some(DataClass::Int {
            width: 1,
            signed: true,
        }),
        "i16" => Some(DataClass::Int {
            width: 2,
            signed: true,
        }),
        "i32" => Some(DataClass::Int {
            width: 4,
            signed: true,
        }),
        "i64" => Some(DataClass::Int {
            width: 8,
            signed: true,
        }),
        "u8" | "byte" => Some(DataClass::Int {
            width: 1,
            signed: false,
        }),
        "u16" => Some(DataClass::Int {
            width: 2,
            signed: false,
        }),
        "u32" => Some(DataClass::Int {
            width: 4,
            signed: false,
        }),
        "u64" => Some(DataClass::Int {
            width: 8,
            signed: false,
        }),
        "f32" => Some(DataClass::Float { width: 4 }),
        "f64" => Some(DataClass::Float { width: 8 }),
        "ascii" => Some(DataClass::Ascii {
            nul_terminated: false,
        }),
        "asciiz" => Some(DataClass::Ascii {
            nul_terminated: true,
        }),
        _ => None,
    }
}

/// Advisory size of a directive's emission, given the current offset.
/// Used by pass 1 to establish preliminary symbol offsets.
pub fn size_of(directive: &Directive, current_offset: u64) -> u64 {
    match directive.name.as_str() {
        "zero" => first_int_operand(directive).map(|n| n.max(0) as u64).unwrap_or(0),
        "align" => {
            let align = first_int_operand(directive).unwrap_or(0);
            if align > 0 && (align & (align - 1)) == 0 {
                let align = align as u64;
                let rem = current_offset % align;
                if rem == 0 {
                    0
                } else {
                    align - rem
                }
            } else {
                0
            }
        }
        name => match data_class(name) {
            Some(DataClass::Int { width, .. }) | Some(DataClass::Float { width }) => {
                (width * directive.operands.len()) as u64
            }
            Some(DataClass::Ascii { nul_terminated }) => directive
                .operands
                .iter()
                .map(|op| match op {
                    Operand::Immediate(ImmediateValue::Str(s)) => {
                        s.len() as u64 + u64::from(nul_terminated)
                    }
                    _ => 0,
                })
                .sum(),
            None => 0,
        },
    }
}

/// Emit a data directive into the current section. Bad operands abort the
/// rest of the directive with a Layout diagnostic; bytes already emitted
/// stay.
pub fn emit(directive: &Directive, section: &mut Section, diagnostics: &mut Vec<Diagnostic>) {
    let Some(class) = data_class(&directive.name) else {
        return;
    };

    if directive.operands.is_empty() {
        diagnostics.push(Diagnostic::error(
            AsmErrorKind::Layout,
            "Missing values for data directive",
            Some(&directive.name),
            directive.location.clone(),
        ));
        return;
    }

    match class {
        DataClass::Int { width, signed } => {
            for operand in &directive.operands {
                let Some(value) = int_operand_value(operand) else {
                    diagnostics.push(Diagnostic::error(
                        AsmErrorKind::Layout,
                        "Invalid value for integer directive",
                        Some(&directive.name),
                        directive.location.clone(),
                    ));
                    return;
                };
                if !int_in_range(value, width, signed) {
                    diagnostics.push(
                        Diagnostic::error(
                            AsmErrorKind::Layout,
                            &format!("Value {value} out of range for {}", directive.name),
                            None,
                            directive.location.clone(),
                        )
                        .with_code(codes::VALUE_OUT_OF_RANGE),
                    );
                    return;
                }
                section.append(&value.to_le_bytes()[..width]);
            }
        }
        DataClass::Float { width } => {
            for operand in &directive.operands {
                let value = match operand {
                    Operand::Immediate(imm) => imm.as_float(),
                    _ => None,
                };
                let Some(value) = value else {
                    diagnostics.push(Diagnostic::error(
                        AsmErrorKind::Layout,
                        "Invalid value for float directive",
                        Some(&directive.name),
                        directive.location.clone(),
                    ));
                    return;
                };
                if width == 4 {
                    section.append(&(value as f32).to_le_bytes());
                } else {
                    section.append(&value.to_le_bytes());
                }
            }
        }
        DataClass::Ascii { nul_terminated } => {
            for operand in &directive.operands {
                let Operand::Immediate(ImmediateValue::Str(s)) = operand else {
                    diagnostics.push(Diagnostic::error(
                        AsmErrorKind::Layout,
                        "Expected string literal",
                        Some(&directive.name),
                        directive.location.clone(),
                    ));
                    return;
                };
                section.append(s.as_bytes());
                if nul_terminated {
                    section.append(&[0]);
                }
            }
        }
    }
}

/// Extract the integer value of a zero/align count operand.
pub fn first_int_operand(directive: &Directive) -> Option<i64> {
    directive.operands.first().and_then(int_operand_value)
}

fn int_operand_value(operand: &Operand) -> Option<i64> {
    match operand {
        Operand::Immediate(imm) => imm.as_int(),
        _ => None,
    }
}

fn int_in_range(value: i64, width: usize, signed: bool) -> bool {
    if width == 8 {
        // All i64 bit patterns are accepted at full width.
        return true;
    }
    let bits = width as u32 * 8;
    if signed {
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        value >= min && value <= max
    } else {
        value >= 0 && value <= ((1i64 << bits) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceLocation;
    use crate::parser::{Directive, Operand};
    use crate::token::ImmediateValue;

    fn directive(name: &str, operands: Vec<Operand>) -> Directive {
        Directive {
            name: name.to_string(),
            parameters: Vec::new(),
            operands,
            location: SourceLocation::default(),
        }
    }

    fn int_op(value: i64) -> Operand {
        Operand::Immediate(ImmediateValue::integer(value))
    }

    #[test]
    fn emits_little_endian_integers() {
        let mut section = Section::with_defaults(".data");
        let mut diags = Vec::new();
        emit(
            &directive("i32", vec![int_op(1), int_op(2)]),
            &mut section,
            &mut diags,
        );
        assert!(diags.is_empty());
        assert_eq!(section.data, vec![1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn emits_negative_values_twos_complement() {
        let mut section = Section::with_defaults(".data");
        let mut diags = Vec::new();
        emit(&directive("i16", vec![int_op(-2)]), &mut section, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(section.data, vec![0xFE, 0xFF]);
    }

    #[test]
    fn range_checks_signed_and_unsigned() {
        let mut section = Section::with_defaults(".data");
        let mut diags = Vec::new();
        emit(&directive("i8", vec![int_op(200)]), &mut section, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), codes::VALUE_OUT_OF_RANGE);

        let mut diags = Vec::new();
        emit(&directive("u8", vec![int_op(-1)]), &mut section, &mut diags);
        assert_eq!(diags.len(), 1);

        let mut diags = Vec::new();
        emit(&directive("u8", vec![int_op(255)]), &mut section, &mut diags);
        assert!(diags.is_empty());
    }

    #[test]
    fn emits_float_bit_patterns() {
        let mut section = Section::with_defaults(".data");
        let mut diags = Vec::new();
        emit(
            &directive(
                "f32",
                vec![Operand::Immediate(ImmediateValue::Float(1.5))],
            ),
            &mut section,
            &mut diags,
        );
        assert!(diags.is_empty());
        assert_eq!(section.data, 1.5f32.to_le_bytes().to_vec());
    }

    #[test]
    fn asciiz_appends_nul() {
        let mut section = Section::with_defaults(".data");
        let mut diags = Vec::new();
        emit(
            &directive(
                "asciiz",
                vec![Operand::Immediate(ImmediateValue::Str("Hi".into()))],
            ),
            &mut section,
            &mut diags,
        );
        assert!(diags.is_empty());
        assert_eq!(section.data, vec![b'H', b'i', 0]);
    }

    #[test]
    fn sizes_match_emission() {
        let dir = directive("i16", vec![int_op(1), int_op(2), int_op(3)]);
        let mut section = Section::with_defaults(".data");
        let mut diags = Vec::new();
        emit(&dir, &mut section, &mut diags);
        assert_eq!(size_of(&dir, 0), section.size());

        let dir = directive(
            "asciiz",
            vec![Operand::Immediate(ImmediateValue::Str("abc".into()))],
        );
        assert_eq!(size_of(&dir, 0), 4);
    }

    #[test]
    fn align_size_depends_on_offset() {
        let dir = directive("align", vec![int_op(8)]);
        assert_eq!(size_of(&dir, 0), 0);
        assert_eq!(size_of(&dir, 3), 5);
        assert_eq!(size_of(&dir, 8), 0);
        // Non-power-of-two contributes nothing; the engine diagnoses it.
        let bad = directive("align", vec![int_op(6)]);
        assert_eq!(size_of(&bad, 3), 0);
    }

    #[test]
    fn string_in_integer_directive_is_diagnosed() {
        let mut section = Section::with_defaults(".data");
        let mut diags = Vec::new();
        emit(
            &directive(
                "i32",
                vec![Operand::Immediate(ImmediateValue::Str("x".into()))],
            ),
            &mut section,
            &mut diags,
        );
        assert_eq!(diags.len(), 1);
        assert!(section.data.is_empty());
    }
}
