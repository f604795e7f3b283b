//! Lay out a method body and encode it into bytes
//!
//! Inserting code in front of existing instructions moves them, which has a couple knock-on
//! effects on the instructions being moved:
//!
//!   - `tableswitch`/`lookupswitch` padding depends on the offset of the switch, so it has to be
//!     recomputed
//!
//!   - relative jumps may no longer fit in their 16-bit offset
//!
//! Oversized `goto` and `jsr` get rewritten into `goto_w` and `jsr_w`. Those are longer, so the
//! rewrite can push other jumps out of range too: the layout is recomputed until nothing else
//! needs widening. That process terminates since the number of 16-bit `goto`/`jsr` only ever
//! decreases. Conditional branches have no wide form, so an oversized one is an error.

use crate::jvm::class_file::Serialize;
use crate::jvm::code::{BranchInstruction, CodeElement};
use crate::jvm::Error;
use crate::util::Width;
use std::convert::TryFrom;

/// Maximum length of the bytecode of a single method
pub const MAX_CODE_LENGTH: usize = 65535;

/// Method body encoded into bytes
#[derive(Debug)]
pub struct CodeLayout {
    /// Encoded bytecode
    pub bytes: Vec<u8>,

    /// Offset of every element, plus a final entry for the end of the code
    pub offsets: Vec<usize>,
}

impl CodeLayout {
    /// Offset at which the element at this index starts
    pub fn offset_of(&self, index: usize) -> usize {
        self.offsets[index]
    }
}

/// Compute offsets (and update switch padding) for the current elements
fn compute_offsets(elements: &mut [CodeElement<usize, usize>]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(elements.len() + 1);
    let mut offset = 0;
    for element in elements.iter_mut() {
        if let CodeElement::Branch(branch) = element {
            branch.set_padding_at(offset);
        }
        offsets.push(offset);
        offset += element.width();
    }
    offsets.push(offset);
    offsets
}

fn fits_in_16_bits(from: usize, to: usize) -> bool {
    i16::try_from(to as isize - from as isize).is_ok()
}

/// Lay out the elements of a method body (where jump targets are element indices)
///
/// Jump targets must be in bounds.
pub fn layout_code(mut elements: Vec<CodeElement<usize, usize>>) -> Result<CodeLayout, Error> {
    let mut widenings = 0;
    let offsets = loop {
        let offsets = compute_offsets(&mut elements);

        let mut widened = false;
        for (index, element) in elements.iter_mut().enumerate() {
            let replacement = match element {
                CodeElement::Branch(BranchInstruction::Goto(target))
                    if !fits_in_16_bits(offsets[index], offsets[*target]) =>
                {
                    BranchInstruction::GotoW(*target)
                }
                CodeElement::Branch(BranchInstruction::Jsr(target))
                    if !fits_in_16_bits(offsets[index], offsets[*target]) =>
                {
                    BranchInstruction::JsrW(*target)
                }
                _ => continue,
            };
            *element = CodeElement::Branch(replacement);
            widened = true;
            widenings += 1;
        }

        if !widened {
            break offsets;
        }
    };
    if widenings > 0 {
        log::debug!("widened {} jumps to 32-bit offsets", widenings);
    }

    let code_length = offsets[elements.len()];
    if code_length > MAX_CODE_LENGTH {
        return Err(Error::MethodCodeOverflow(code_length));
    }

    let mut bytes = Vec::with_capacity(code_length);
    for (index, element) in elements.iter().enumerate() {
        let from = offsets[index];
        let io_result = match element {
            CodeElement::Instruction(insn) => insn.serialize(&mut bytes),
            CodeElement::Branch(branch) => {
                let relative: BranchInstruction<i16, i32> = branch.map_labels(
                    |target| {
                        let to = offsets[*target];
                        i16::try_from(to as isize - from as isize)
                            .map_err(|_| Error::BranchOffsetOverflow { from, to })
                    },
                    |target| Ok((offsets[*target] as isize - from as isize) as i32),
                )?;
                relative.serialize(&mut bytes)
            }
        };
        io_result.map_err(Error::IoError)?;
    }
    debug_assert_eq!(bytes.len(), code_length);

    Ok(CodeLayout { bytes, offsets })
}
