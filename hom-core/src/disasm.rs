//!
//! Facilities for disassembling bytecode.
//!

use std::convert::{TryFrom, TryInto};

use crate::opcode::Opcode;

/// Disassemble a raw instruction stream into one line per instruction.
///
/// Decoding stops at the first unknown or truncated instruction, which is
/// reported as a final diagnostic line.
pub fn disassemble(code: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut offset = 0;

    while offset < code.len() {
        match disassemble_at(code, offset) {
            Some((line, size)) => {
                lines.push(format!("{:04} {}", offset, line));
                offset += size;
            }
            None => {
                lines.push(format!("{:04} ???  0x{:02x}", offset, code[offset]));
                break;
            }
        }
    }

    lines
}

/// Disassemble the single instruction at `offset`, returning its rendering
/// and its encoded size.
pub fn disassemble_at(code: &[u8], offset: usize) -> Option<(String, usize)> {
    let opcode = Opcode::try_from(*code.get(offset)?).ok()?;
    let operands = &code[offset + 1..];

    let rendered = match opcode {
        Opcode::Noop | Opcode::ContextEnd => (opcode.padded_name().to_string(), 1),
        Opcode::Assign => {
            let [dest, src] = *fixed::<2>(operands)?;
            (format!("{} {}, {}", opcode.padded_name(), dest, src), 3)
        }
        Opcode::AssignProperty | Opcode::AssignClassProperty => {
            let [dest, index] = *fixed::<2>(operands)?;
            (
                format!("{} {}, property: {}", opcode.padded_name(), dest, index),
                3,
            )
        }
        Opcode::SetProperty | Opcode::SetClassProperty => {
            let [index, src] = *fixed::<2>(operands)?;
            (
                format!("{} property: {}, {}", opcode.padded_name(), index, src),
                3,
            )
        }
        Opcode::AssignClass => {
            let dest = *operands.first()?;
            let hash = read_u32(operands, 1)?;
            (
                format!("{} {}, class: 0x{:08x}", opcode.padded_name(), dest, hash),
                6,
            )
        }
        Opcode::AssignConstInt => {
            let dest = *operands.first()?;
            let value = read_u32(operands, 1)? as i32;
            (format!("{} {}, {}", opcode.padded_name(), dest, value), 6)
        }
        Opcode::AssignConstNum => {
            let dest = *operands.first()?;
            let mantissa = i64::from_be_bytes(fixed_at::<8>(operands, 1)?);
            let exponent = read_u32(operands, 9)? as i32;
            let value = crate::float::decode_number(mantissa, exponent);
            (format!("{} {}, {}", opcode.padded_name(), dest, value), 14)
        }
        Opcode::AssignConstTxt => {
            let dest = *operands.first()?;
            let terminator = operands.iter().skip(1).position(|byte| *byte == 0)?;
            let text = String::from_utf8_lossy(&operands[1..1 + terminator]);
            (
                format!("{} {}, {:?}", opcode.padded_name(), dest, text),
                3 + terminator,
            )
        }
        Opcode::Block => {
            let [result, own] = *fixed::<2>(operands)?;
            let size = read_u16(operands, 2)?;
            (
                format!(
                    "{} {}, own: {}, body: {} bytes",
                    opcode.padded_name(),
                    result,
                    own,
                    size
                ),
                5,
            )
        }
        Opcode::Message | Opcode::MessageSuper => {
            let object = *operands.first()?;
            let selector = read_u32(operands, 1)?;
            let count = *operands.get(5)? as usize;
            let params = operands.get(6..6 + count)?;
            (
                format!(
                    "{} {}, selector: 0x{:08x}, params: {:?}",
                    opcode.padded_name(),
                    object,
                    selector,
                    params
                ),
                7 + count,
            )
        }
        Opcode::MessageResult | Opcode::MessageSuperResult => {
            let [object, result] = *fixed::<2>(operands)?;
            let selector = read_u32(operands, 2)?;
            let count = *operands.get(6)? as usize;
            let params = operands.get(7..7 + count)?;
            (
                format!(
                    "{} {}, {}, selector: 0x{:08x}, params: {:?}",
                    opcode.padded_name(),
                    object,
                    result,
                    selector,
                    params
                ),
                8 + count,
            )
        }
    };

    Some(rendered)
}

fn fixed<const N: usize>(bytes: &[u8]) -> Option<&[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

fn fixed_at<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    bytes.get(offset..offset + N)?.try_into().ok()
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes(fixed_at::<2>(bytes, offset)?))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(fixed_at::<4>(bytes, offset)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_small_stream() {
        let mut code = vec![
            Opcode::AssignConstInt as u8,
            4,
            0,
            0,
            0,
            41, // local 4 = 41
        ];
        code.extend_from_slice(&[Opcode::Assign as u8, 5, 4]);
        code.push(Opcode::ContextEnd as u8);

        let lines = disassemble(&code);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("ASSIGN_CONST_INT"));
        assert!(lines[0].contains("41"));
        assert!(lines[1].contains("ASSIGN"));
        assert!(lines[2].contains("CONTEXT_END"));
    }

    #[test]
    fn reports_unknown_bytes() {
        let lines = disassemble(&[Opcode::Noop as u8, 0xff]);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("???"));
    }

    #[test]
    fn reports_truncated_operands() {
        let lines = disassemble(&[Opcode::Assign as u8, 1]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("???"));
    }
}
