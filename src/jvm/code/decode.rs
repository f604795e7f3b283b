//! Split a `Code` attribute's bytecode into instructions
//!
//! Decoding only goes as far as is needed to relocate the code: instruction boundaries are found
//! from the [opcode lengths][0] and branch offsets are resolved into the indices of the elements
//! they jump to. Everything else stays as raw bytes.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5

use crate::jvm::class_file::Deserialize;
use crate::jvm::code::{BranchInstruction, CodeElement, EqComparison, Instruction, OrdComparison};
use crate::jvm::Error;
use crate::util::{Offset, OffsetResult, OffsetVec};

/// Method body where jump targets are the indices of the elements being jumped to
pub type CodeElements = OffsetVec<CodeElement<usize, usize>>;

/// Decode a method body
///
/// Every jump target must land on the start of an instruction.
pub fn decode_code(code: &[u8]) -> Result<CodeElements, Error> {
    // First pass: jump targets are absolute offsets
    let mut absolute: OffsetVec<CodeElement<usize, usize>> = OffsetVec::new();
    while absolute.offset_len().0 < code.len() {
        let offset = absolute.offset_len().0;
        let element = decode_element(code, offset)?;
        absolute.push(element);
    }

    // Second pass: jump targets become element indices
    let index_of = |target: &usize| -> Result<usize, Error> {
        match absolute.get_offset(Offset(*target)) {
            OffsetResult::Ok(index, _) => Ok(index),
            _ => Err(Error::OffsetNotOnInstructionBoundary {
                context: "branch target",
                offset: *target,
            }),
        }
    };
    absolute
        .iter()
        .map(|(_, _, element)| match element {
            CodeElement::Instruction(insn) => Ok(CodeElement::Instruction(insn.clone())),
            CodeElement::Branch(branch) => {
                Ok(CodeElement::Branch(branch.map_labels(index_of, index_of)?))
            }
        })
        .collect()
}

fn truncated(_: Error) -> Error {
    Error::Truncated("method code")
}

fn read_i16(code: &[u8], at: usize) -> Result<i16, Error> {
    let mut bytes = code.get(at..).unwrap_or(&[]);
    Ok(u16::deserialize(&mut bytes).map_err(truncated)? as i16)
}

fn read_i32(code: &[u8], at: usize) -> Result<i32, Error> {
    let mut bytes = code.get(at..).unwrap_or(&[]);
    i32::deserialize(&mut bytes).map_err(truncated)
}

/// Target of a relative jump, as an absolute offset
fn jump_target(offset: usize, relative: i32) -> Result<usize, Error> {
    let target = offset as i64 + relative as i64;
    if target < 0 {
        Err(Error::OffsetNotOnInstructionBoundary {
            context: "branch target",
            offset,
        })
    } else {
        Ok(target as usize)
    }
}

/// Decode the single instruction starting at `offset`
fn decode_element(code: &[u8], offset: usize) -> Result<CodeElement<usize, usize>, Error> {
    let opcode = code[offset];
    let narrow = |make: fn(usize) -> BranchInstruction<usize, usize>| -> Result<_, Error> {
        let relative = read_i16(code, offset + 1)?;
        Ok(CodeElement::Branch(make(jump_target(offset, relative as i32)?)))
    };
    let wide = |make: fn(usize) -> BranchInstruction<usize, usize>| -> Result<_, Error> {
        let relative = read_i32(code, offset + 1)?;
        Ok(CodeElement::Branch(make(jump_target(offset, relative)?)))
    };

    let length: usize = match opcode {
        0x99 => return narrow(|l| BranchInstruction::If(OrdComparison::EQ, l)),
        0x9a => return narrow(|l| BranchInstruction::If(OrdComparison::NE, l)),
        0x9b => return narrow(|l| BranchInstruction::If(OrdComparison::LT, l)),
        0x9c => return narrow(|l| BranchInstruction::If(OrdComparison::GE, l)),
        0x9d => return narrow(|l| BranchInstruction::If(OrdComparison::GT, l)),
        0x9e => return narrow(|l| BranchInstruction::If(OrdComparison::LE, l)),
        0x9f => return narrow(|l| BranchInstruction::IfICmp(OrdComparison::EQ, l)),
        0xa0 => return narrow(|l| BranchInstruction::IfICmp(OrdComparison::NE, l)),
        0xa1 => return narrow(|l| BranchInstruction::IfICmp(OrdComparison::LT, l)),
        0xa2 => return narrow(|l| BranchInstruction::IfICmp(OrdComparison::GE, l)),
        0xa3 => return narrow(|l| BranchInstruction::IfICmp(OrdComparison::GT, l)),
        0xa4 => return narrow(|l| BranchInstruction::IfICmp(OrdComparison::LE, l)),
        0xa5 => return narrow(|l| BranchInstruction::IfACmp(EqComparison::EQ, l)),
        0xa6 => return narrow(|l| BranchInstruction::IfACmp(EqComparison::NE, l)),
        0xa7 => return narrow(BranchInstruction::Goto),
        0xa8 => return narrow(BranchInstruction::Jsr),
        0xc6 => return narrow(|l| BranchInstruction::IfNull(EqComparison::EQ, l)),
        0xc7 => return narrow(|l| BranchInstruction::IfNull(EqComparison::NE, l)),
        0xc8 => return wide(BranchInstruction::GotoW),
        0xc9 => return wide(BranchInstruction::JsrW),
        0xaa | 0xab => return decode_switch(code, offset),

        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0xa9 => 2,
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        0xc4 => match code.get(offset + 1).copied() {
            Some(0x84) => 6,
            Some(0x15..=0x19 | 0x36..=0x3a | 0xa9) => 4,
            Some(modified) => {
                return Err(Error::InvalidOpcode {
                    opcode: modified,
                    offset: offset + 1,
                })
            }
            None => return Err(Error::Truncated("method code")),
        },
        0xc5 => 4,
        _ => return Err(Error::InvalidOpcode { opcode, offset }),
    };

    match code.get(offset..offset + length) {
        Some(bytes) => Ok(CodeElement::Instruction(Instruction::Verbatim(bytes.to_vec()))),
        None => Err(Error::Truncated("method code")),
    }
}

fn decode_switch(code: &[u8], offset: usize) -> Result<CodeElement<usize, usize>, Error> {
    let padding = (4 - (offset + 1) % 4) % 4;
    let mut cursor = offset + 1 + padding;
    if code[offset + 1..cursor.min(code.len())].iter().any(|b| *b != 0) {
        log::debug!("non-zero switch padding at offset {}", offset);
    }
    let default = jump_target(offset, read_i32(code, cursor)?)?;
    cursor += 4;

    let switch = if code[offset] == 0xaa {
        let low = read_i32(code, cursor)?;
        let high = read_i32(code, cursor + 4)?;
        cursor += 8;
        if high < low {
            return Err(Error::malformed_attribute(
                "Code",
                format!("tableswitch at {} has high {} below low {}", offset, high, low),
            ));
        }
        let count = (high as i64 - low as i64 + 1) as usize;
        if cursor + 4 * count > code.len() {
            return Err(Error::Truncated("method code"));
        }
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            targets.push(jump_target(offset, read_i32(code, cursor)?)?);
            cursor += 4;
        }
        BranchInstruction::TableSwitch {
            padding: padding as u8,
            default,
            low,
            targets,
        }
    } else {
        let npairs = read_i32(code, cursor)?;
        cursor += 4;
        if npairs < 0 {
            return Err(Error::malformed_attribute(
                "Code",
                format!("lookupswitch at {} has {} pairs", offset, npairs),
            ));
        }
        let count = npairs as usize;
        if cursor + 8 * count > code.len() {
            return Err(Error::Truncated("method code"));
        }
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            let key = read_i32(code, cursor)?;
            let target = jump_target(offset, read_i32(code, cursor + 4)?)?;
            targets.push((key, target));
            cursor += 8;
        }
        BranchInstruction::LookupSwitch {
            padding: padding as u8,
            default,
            targets,
        }
    };
    Ok(CodeElement::Branch(switch))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::Width;

    #[test]
    fn straight_line_code() {
        // aload_0; invokespecial #1; wide iinc 300 1; return
        let code = [0x2a, 0xb7, 0, 1, 0xc4, 0x84, 0x01, 0x2c, 0, 1, 0xb1];
        let elements = decode_code(&code).unwrap();
        let offsets: Vec<usize> = elements.iter().map(|(off, _, _)| off.0).collect();
        assert_eq!(offsets, vec![0, 1, 4, 10]);
        assert_eq!(elements.offset_len().0, code.len());
    }

    #[test]
    fn branch_targets_become_indices() {
        // 0: aload_1; 1: ifnonnull +5 (6); 4: aconst_null; 5: areturn; 6: aload_1; 7: areturn
        let code = [0x2b, 0xc7, 0x00, 0x05, 0x01, 0xb0, 0x2b, 0xb0];
        let elements = decode_code(&code).unwrap();
        let (_, branch) = match elements.get_index(1) {
            Some((off, CodeElement::Branch(branch))) => (off, branch.clone()),
            other => panic!("expected branch, got {:?}", other.map(|(_, e)| e)),
        };
        assert_eq!(branch, BranchInstruction::IfNull(EqComparison::NE, 4));
    }

    #[test]
    fn switch_padding_is_skipped() {
        // 0: iload_0; 1: lookupswitch (2 bytes padding) default +19, 1 pair {5 -> +19}; 20: return
        let mut code = vec![0x1a, 0xab, 0, 0];
        code.extend_from_slice(&19i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&5i32.to_be_bytes());
        code.extend_from_slice(&19i32.to_be_bytes());
        code.push(0xb1);
        let elements = decode_code(&code).unwrap();
        assert_eq!(elements.len(), 3);
        match elements.get_index(1) {
            Some((_, element @ CodeElement::Branch(BranchInstruction::LookupSwitch { .. }))) => {
                assert_eq!(element.width(), 19);
            }
            _ => panic!("expected lookupswitch"),
        }
    }

    #[test]
    fn jump_into_middle_of_instruction() {
        // goto +1 lands inside the goto itself
        let code = [0xa7, 0x00, 0x01, 0xb1];
        assert!(matches!(
            decode_code(&code),
            Err(Error::OffsetNotOnInstructionBoundary { offset: 1, .. })
        ));
    }

    #[test]
    fn invalid_and_truncated_opcodes() {
        assert!(matches!(
            decode_code(&[0x00, 0xca]),
            Err(Error::InvalidOpcode {
                opcode: 0xca,
                offset: 1
            })
        ));
        assert!(matches!(
            decode_code(&[0xb7, 0x00]),
            Err(Error::Truncated(_))
        ));
    }
}
