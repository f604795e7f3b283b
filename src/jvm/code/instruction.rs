use crate::jvm::class_file::Serialize;
use crate::jvm::{ClassConstantIndex, MethodRefConstantIndex, StringConstantIndex};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io::Result;

/// Instruction that does not carry a relative jump offset
///
/// Existing method bodies are never interpreted beyond what is needed to relocate them, so
/// instructions decoded from a class file are kept as their raw bytes. Only the handful of
/// instructions that get emitted by the instrumentation have a structured form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Instruction copied as-is, including any `wide` prefix
    Verbatim(Vec<u8>),
    ALoad(u16), // covers `aload`, `aload_{0,3}`, and `wide aload`
    New(ClassConstantIndex),
    Dup,
    Ldc(StringConstantIndex), // covers both `ldc` and `ldc_w`
    LdcClass(ClassConstantIndex), // covers both `ldc` and `ldc_w`
    InvokeSpecial(MethodRefConstantIndex),
    InvokeVirtual(MethodRefConstantIndex),
    AThrow,
}

impl Width for Instruction {
    fn width(&self) -> usize {
        match self {
            Instruction::Verbatim(bytes) => bytes.len(),
            Instruction::ALoad(0..=3) => 1,
            Instruction::ALoad(4..=255) => 2,
            Instruction::ALoad(_) => 4,
            Instruction::New(_) => 3,
            Instruction::Dup => 1,
            Instruction::Ldc(StringConstantIndex(idx)) if idx.0 <= 255 => 2,
            Instruction::Ldc(_) => 3,
            Instruction::LdcClass(ClassConstantIndex(idx)) if idx.0 <= 255 => 2,
            Instruction::LdcClass(_) => 3,
            Instruction::InvokeSpecial(_) | Instruction::InvokeVirtual(_) => 3,
            Instruction::AThrow => 1,
        }
    }
}

impl Serialize for Instruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            Instruction::Verbatim(bytes) => writer.write_all(bytes)?,
            Instruction::ALoad(idx) => match u8::try_from(*idx) {
                Ok(n @ 0..=3) => (0x2Au8 + n).serialize(writer)?,
                Ok(n) => {
                    0x19u8.serialize(writer)?;
                    n.serialize(writer)?;
                }
                Err(_) => {
                    0xC4u8.serialize(writer)?;
                    0x19u8.serialize(writer)?;
                    idx.serialize(writer)?;
                }
            },
            Instruction::New(idx) => {
                0xbbu8.serialize(writer)?;
                idx.serialize(writer)?;
            }
            Instruction::Dup => 0x59u8.serialize(writer)?,
            Instruction::Ldc(StringConstantIndex(idx))
            | Instruction::LdcClass(ClassConstantIndex(idx)) => match u8::try_from(idx.0) {
                Ok(b) => {
                    0x12u8.serialize(writer)?;
                    b.serialize(writer)?;
                }
                Err(_) => {
                    0x13u8.serialize(writer)?;
                    idx.serialize(writer)?;
                }
            },
            Instruction::InvokeSpecial(idx) => {
                0xb7u8.serialize(writer)?;
                idx.serialize(writer)?;
            }
            Instruction::InvokeVirtual(idx) => {
                0xb6u8.serialize(writer)?;
                idx.serialize(writer)?;
            }
            Instruction::AThrow => 0xbfu8.serialize(writer)?,
        }
        Ok(())
    }
}

/// Instruction carrying one or more jump offsets relative to its own start
///
/// `Lbl` is the target type for jumps with a 16-bit offset and `LblWide` for those with a 32-bit
/// offset. While code is being edited, both are indices of elements in the method body. Once the
/// final layout is known, they become the relative offsets that get serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl, LblWide> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),
    GotoW(LblWide),
    Jsr(Lbl),
    JsrW(LblWide),
    TableSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there must be a 0-3 inclusive byte padding
        padding: u8,

        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: LblWide,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<LblWide>,
    },
    LookupSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there must be a 0-3 inclusive byte padding
        padding: u8,

        /// Jump target if there is no corresponding key
        default: LblWide,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, LblWide)>,
    },
}

impl<Lbl, LblWide> BranchInstruction<Lbl, LblWide> {
    /// Switches have their padding depend on their own offset
    pub fn set_padding_at(&mut self, offset: usize) {
        let new_padding = ((4 - (offset + 1) % 4) % 4) as u8;
        match self {
            BranchInstruction::TableSwitch { padding, .. }
            | BranchInstruction::LookupSwitch { padding, .. } => *padding = new_padding,
            _ => (),
        }
    }

    /// Convert all labels, failing on the first label that can't be converted
    pub fn map_labels<Lbl2, LblWide2, E>(
        &self,
        map_label: impl Fn(&Lbl) -> std::result::Result<Lbl2, E>,
        map_wide_label: impl Fn(&LblWide) -> std::result::Result<LblWide2, E>,
    ) -> std::result::Result<BranchInstruction<Lbl2, LblWide2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            GotoW(wide) => GotoW(map_wide_label(wide)?),
            Jsr(lbl) => Jsr(map_label(lbl)?),
            JsrW(wide) => JsrW(map_wide_label(wide)?),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => TableSwitch {
                padding: *padding,
                default: map_wide_label(default)?,
                low: *low,
                targets: targets
                    .iter()
                    .map(&map_wide_label)
                    .collect::<std::result::Result<_, E>>()?,
            },
            LookupSwitch {
                padding,
                default,
                targets,
            } => LookupSwitch {
                padding: *padding,
                default: map_wide_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| Ok((*key, map_wide_label(lbl)?)))
                    .collect::<std::result::Result<_, E>>()?,
            },
        })
    }
}

impl<Lbl: Copy, LblWide: Copy> BranchInstruction<Lbl, LblWide> {
    /// Get all of the jump targets
    pub fn jump_targets(&self) -> JumpTargets<Lbl, LblWide> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::Jsr(lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::GotoW(lbl_w) | BranchInstruction::JsrW(lbl_w) => {
                JumpTargets::Wide(*lbl_w)
            }
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                JumpTargets::WideMany(ts)
            }
            BranchInstruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                JumpTargets::WideMany(ts)
            }
        }
    }
}

impl<Lbl, LblWide> Width for BranchInstruction<Lbl, LblWide> {
    fn width(&self) -> usize {
        match self {
            BranchInstruction::Goto(_)
            | BranchInstruction::Jsr(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::GotoW(_) | BranchInstruction::JsrW(_) => 5,

            BranchInstruction::TableSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * (3 + targets.len()),

            BranchInstruction::LookupSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 8 * (1 + targets.len()),
        }
    }
}

impl Serialize for BranchInstruction<i16, i32> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            BranchInstruction::If(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x99,
                    OrdComparison::NE => 0x9a,
                    OrdComparison::LT => 0x9b,
                    OrdComparison::GE => 0x9c,
                    OrdComparison::GT => 0x9d,
                    OrdComparison::LE => 0x9e,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::IfICmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x9f,
                    OrdComparison::NE => 0xa0,
                    OrdComparison::LT => 0xa1,
                    OrdComparison::GE => 0xa2,
                    OrdComparison::GT => 0xa3,
                    OrdComparison::LE => 0xa4,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::IfACmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xa5,
                    EqComparison::NE => 0xa6,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::IfNull(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xc6,
                    EqComparison::NE => 0xc7,
                };
                opcode.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::Goto(lbl) => {
                0xa7u8.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::Jsr(lbl) => {
                0xa8u8.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::GotoW(lbl_ext) => {
                0xc8u8.serialize(writer)?;
                lbl_ext.serialize(writer)?;
            }
            BranchInstruction::JsrW(lbl_ext) => {
                0xc9u8.serialize(writer)?;
                lbl_ext.serialize(writer)?;
            }
            BranchInstruction::TableSwitch {
                padding,
                default,
                low,
                targets,
            } => {
                0xaau8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for target in targets {
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::LookupSwitch {
                padding,
                default,
                targets,
            } => {
                0xabu8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                (targets.len() as i32).serialize(writer)?;
                for (key, target) in targets {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
            }
        }
        Ok(())
    }
}

/// Element of a method body
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeElement<Lbl, LblWide> {
    Instruction(Instruction),
    Branch(BranchInstruction<Lbl, LblWide>),
}

impl<Lbl, LblWide> Width for CodeElement<Lbl, LblWide> {
    fn width(&self) -> usize {
        match self {
            CodeElement::Instruction(insn) => insn.width(),
            CodeElement::Branch(branch) => branch.width(),
        }
    }
}

impl<Lbl, LblWide> From<Instruction> for CodeElement<Lbl, LblWide> {
    fn from(insn: Instruction) -> Self {
        CodeElement::Instruction(insn)
    }
}

impl<Lbl, LblWide> From<BranchInstruction<Lbl, LblWide>> for CodeElement<Lbl, LblWide> {
    fn from(branch: BranchInstruction<Lbl, LblWide>) -> Self {
        CodeElement::Branch(branch)
    }
}

/// Jump targets of a `BranchInstruction`
pub enum JumpTargets<Lbl, LblWide> {
    Regular(Lbl),
    Wide(LblWide),
    WideMany(Vec<LblWide>),
}

impl<A> JumpTargets<A, A> {
    /// If all targets are the same type, extract them
    pub fn targets(&self) -> &[A] {
        match self {
            JumpTargets::Regular(a) => std::slice::from_ref(a),
            JumpTargets::Wide(a) => std::slice::from_ref(a),
            JumpTargets::WideMany(a_many) => a_many,
        }
    }
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}


/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::serialize_to_vec;
    use crate::jvm::ConstantIndex;

    #[test]
    fn aload_forms() {
        assert_eq!(serialize_to_vec(&Instruction::ALoad(2)), vec![0x2c]);
        assert_eq!(serialize_to_vec(&Instruction::ALoad(7)), vec![0x19, 7]);
        assert_eq!(
            serialize_to_vec(&Instruction::ALoad(300)),
            vec![0xc4, 0x19, 0x01, 0x2c]
        );
        for slot in [0, 3, 4, 255, 256, 65535] {
            let insn = Instruction::ALoad(slot);
            assert_eq!(serialize_to_vec(&insn).len(), insn.width());
        }
    }

    #[test]
    fn ldc_switches_to_wide_form() {
        let narrow = Instruction::Ldc(StringConstantIndex(ConstantIndex(255)));
        let wide = Instruction::Ldc(StringConstantIndex(ConstantIndex(256)));
        assert_eq!(serialize_to_vec(&narrow), vec![0x12, 0xff]);
        assert_eq!(serialize_to_vec(&wide), vec![0x13, 0x01, 0x00]);
        assert_eq!(wide.width(), 3);
    }

    #[test]
    fn switch_padding_depends_on_offset() {
        let mut switch: BranchInstruction<i16, i32> = BranchInstruction::LookupSwitch {
            padding: 0,
            default: 12,
            targets: vec![(1, 20)],
        };
        for (offset, expected) in [(0, 3), (1, 2), (2, 1), (3, 0), (4, 3)] {
            switch.set_padding_at(offset);
            assert_eq!(switch.width(), 1 + expected + 16);
            assert_eq!(serialize_to_vec(&switch).len(), switch.width());
        }
    }

    #[test]
    fn table_switch_encoding() {
        let switch: BranchInstruction<i16, i32> = BranchInstruction::TableSwitch {
            padding: 1,
            default: 40,
            low: 5,
            targets: vec![20, 30],
        };
        assert_eq!(
            serialize_to_vec(&switch),
            vec![
                0xaa, 0, 0, 0, 0, 40, 0, 0, 0, 5, 0, 0, 0, 6, 0, 0, 0, 20, 0, 0, 0, 30
            ]
        );
    }

    #[test]
    fn map_labels_stops_at_first_failure() {
        let switch: BranchInstruction<usize, usize> = BranchInstruction::TableSwitch {
            padding: 0,
            default: 1,
            low: 0,
            targets: vec![2, 99],
        };
        let mapped: std::result::Result<BranchInstruction<i16, i32>, usize> = switch.map_labels(
            |lbl| Ok(*lbl as i16),
            |lbl| if *lbl < 10 { Ok(*lbl as i32) } else { Err(*lbl) },
        );
        assert_eq!(mapped, Err(99));
    }
}
