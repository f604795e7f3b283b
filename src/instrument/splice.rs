//! Insert guards at the start of an existing method body
//!
//! The body is decoded into code elements and the guards are put in front of them. Since jumps
//! refer to elements by index, shifting every original label by the number of inserted elements
//! keeps control flow intact. Everything else that points into the bytecode by offset (exception
//! ranges, debug tables, type annotations, stack map frames) gets translated from old offsets to
//! new offsets once the new body has been laid out.

use super::GuardInstruction;
use crate::jvm::class_file::{
    serialize_to_vec, Attribute, AttributeLike, BytecodeArray, BytecodeIndex, ClassFile, Code,
    ConstantsPool, ExceptionHandler, LineNumber, LineNumberTable, LocalVariableTable,
    LocalVariableTypeTable, RuntimeInvisibleTypeAnnotations, RuntimeVisibleTypeAnnotations,
    StackMapFrame, StackMapTable, TypeAnnotation, TypeAnnotationTarget, Version,
};
use crate::jvm::code::{decode_code, layout_code, CodeElement, CodeElements, CodeLayout};
use crate::jvm::verifier::AbsoluteFrames;
use crate::jvm::Error;
use crate::model::Method;
use crate::util::{Offset, OffsetResult};
use std::convert::TryFrom;

/// Translates offsets in the original body into offsets in the patched body
struct Relocation<'a> {
    original: &'a CodeElements,
    layout: &'a CodeLayout,

    /// Number of elements inserted in front of the original body
    shift: usize,
}

impl<'a> Relocation<'a> {
    /// Map an old offset to its new offset (the end of the code is a valid offset)
    fn offset(&self, context: &'static str, offset: usize) -> Result<usize, Error> {
        let index = if offset == self.original.offset_len().0 {
            self.original.len()
        } else {
            match self.original.get_offset(Offset(offset)) {
                OffsetResult::Ok(index, _) => index,
                _ => return Err(Error::OffsetNotOnInstructionBoundary { context, offset }),
            }
        };
        Ok(self.layout.offset_of(index + self.shift))
    }

    fn bytecode_index(
        &self,
        context: &'static str,
        index: BytecodeIndex,
    ) -> Result<BytecodeIndex, Error> {
        let offset = self.offset(context, index.0 as usize)?;
        u16::try_from(offset)
            .map(BytecodeIndex)
            .map_err(|_| Error::MethodCodeOverflow(offset))
    }

    /// Map a `[start, start + length)` range
    ///
    /// Ranges starting at the method entry keep starting there and grow to cover the guards.
    fn range(
        &self,
        context: &'static str,
        start: BytecodeIndex,
        length: u16,
    ) -> Result<(BytecodeIndex, u16), Error> {
        let end = self.offset(context, start.0 as usize + length as usize)?;
        let start = if start.0 == 0 {
            0
        } else {
            self.offset(context, start.0 as usize)?
        };
        let length = end - start;
        let start = u16::try_from(start).map_err(|_| Error::MethodCodeOverflow(start))?;
        let length = u16::try_from(length).map_err(|_| Error::MethodCodeOverflow(end))?;
        Ok((BytecodeIndex(start), length))
    }
}

/// Put guards (in order) at the start of a method's code
pub fn splice_guards(
    class: &mut ClassFile,
    method: &Method,
    guards: &[GuardInstruction],
) -> Result<(), Error> {
    if guards.is_empty() {
        return Ok(());
    }
    let version = class.version;
    let class_method = class
        .methods
        .get(method.index)
        .ok_or_else(|| Error::malformed_attribute("Code", "method index out of range"))?;
    let code_index = class_method
        .attributes
        .iter()
        .position(|attribute| attribute.is_named(&class.constants, Code::NAME))
        .ok_or_else(|| Error::malformed_attribute("Code", "method has no code"))?;
    let code_attribute = &class_method.attributes[code_index];
    let mut code: Code = code_attribute.decode()?;
    let code_name = code_attribute.name_index;

    let parameter_length = method.descriptor.parameter_length(!method.is_static());
    if parameter_length > code.max_locals as usize {
        return Err(Error::malformed_attribute(
            "Code",
            format!(
                "max_locals {} does not cover {} parameter slots",
                code.max_locals, parameter_length
            ),
        ));
    }

    let original = decode_code(&code.code_array.0)?;
    let mut elements: Vec<CodeElement<usize, usize>> = vec![];
    let mut guard_ends: Vec<usize> = Vec::with_capacity(guards.len());
    for guard in guards {
        elements.extend(guard.elements(elements.len()));
        guard_ends.push(elements.len());
    }
    let shift = elements.len();
    elements.reserve(original.len());
    for (_, _, element) in original.iter() {
        elements.push(match element {
            CodeElement::Instruction(insn) => CodeElement::Instruction(insn.clone()),
            CodeElement::Branch(branch) => CodeElement::Branch(
                branch.map_labels(|l| Ok::<usize, Error>(l + shift), |l| Ok(l + shift))?,
            ),
        });
    }

    // Everything the verifier will want a frame for
    let jump_targets: Vec<usize> = elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::Branch(branch) => Some(branch.jump_targets().targets().to_vec()),
            CodeElement::Instruction(_) => None,
        })
        .flatten()
        .collect();

    let layout = layout_code(elements)?;
    let relocation = Relocation {
        original: &original,
        layout: &layout,
        shift,
    };

    for handler in &mut code.exception_table {
        remap_handler(&relocation, handler)?;
    }

    let mut frames: Option<AbsoluteFrames> = None;
    for attribute in &mut code.attributes {
        let constants = &class.constants;
        if attribute.is_named(constants, StackMapTable::NAME) {
            let table: StackMapTable = attribute.decode()?;
            frames = Some(
                AbsoluteFrames::from_table(&table)?
                    .relocate(|offset| relocation.offset("stack map frame", offset))?,
            );
        } else {
            remap_debug_attribute(&relocation, constants, attribute)?;
        }
    }

    let guard_targets: Vec<usize> = guard_ends
        .iter()
        .map(|&index| layout.offset_of(index))
        .collect();
    if frames.is_none() && version.uses_stack_map_frames() {
        frames = Some(AbsoluteFrames::new());
    }
    let frames = match frames {
        Some(mut frames) => {
            for &target in &guard_targets {
                // An existing frame for the method entry takes priority
                if frames.contains(target) && target == layout.offset_of(shift) {
                    continue;
                }
                frames.insert(target, StackMapFrame::SameLocalsNoStack { offset_delta: 0 })?;
            }
            check_frames(version, &frames, &layout, &jump_targets, &code, &guard_targets)?;
            Some(frames.into_table()?)
        }
        None => None,
    };

    code.max_stack = code.max_stack.max(GuardInstruction::MAX_STACK);
    code.code_array = BytecodeArray(layout.bytes);
    if let Some(table) = frames {
        let existing = code
            .attributes
            .iter()
            .position(|attribute| attribute.is_named(&class.constants, StackMapTable::NAME));
        match existing {
            Some(position) => code.attributes[position].info = serialize_to_vec(&table),
            None => code
                .attributes
                .push(class.constants.get_attribute(&table)?),
        }
    }

    log::debug!(
        "spliced {} guards into {}, code is now {} bytes",
        guards.len(),
        method.signature(),
        code.code_array.0.len()
    );
    class.methods[method.index].attributes[code_index] = Attribute {
        name_index: code_name,
        info: serialize_to_vec(&code),
    };
    Ok(())
}

fn remap_handler(relocation: &Relocation, handler: &mut ExceptionHandler) -> Result<(), Error> {
    handler.start_pc = relocation.bytecode_index("exception range start", handler.start_pc)?;
    handler.end_pc = relocation.bytecode_index("exception range end", handler.end_pc)?;
    handler.handler_pc = relocation.bytecode_index("exception handler", handler.handler_pc)?;
    Ok(())
}

/// Remap the offsets in one of the attributes of a `Code` attribute
///
/// Attributes that aren't understood are left alone.
fn remap_debug_attribute(
    relocation: &Relocation,
    constants: &ConstantsPool,
    attribute: &mut Attribute,
) -> Result<(), Error> {
    if attribute.is_named(constants, LineNumberTable::NAME) {
        let mut table: LineNumberTable = attribute.decode()?;
        let entry_line = table
            .0
            .iter()
            .find(|line| line.start_pc.0 == 0)
            .map(|line| line.line_number);
        for line in &mut table.0 {
            line.start_pc = relocation.bytecode_index("line number", line.start_pc)?;
        }
        if let Some(line_number) = entry_line {
            table.0.insert(
                0,
                LineNumber {
                    start_pc: BytecodeIndex(0),
                    line_number,
                },
            );
        }
        attribute.info = serialize_to_vec(&table);
    } else if attribute.is_named(constants, LocalVariableTable::NAME) {
        let mut table: LocalVariableTable = attribute.decode()?;
        for variable in &mut table.0 {
            let (start_pc, length) =
                relocation.range("local variable", variable.start_pc, variable.length)?;
            variable.start_pc = start_pc;
            variable.length = length;
        }
        attribute.info = serialize_to_vec(&table);
    } else if attribute.is_named(constants, LocalVariableTypeTable::NAME) {
        let mut table: LocalVariableTypeTable = attribute.decode()?;
        for variable in &mut table.0 {
            let (start_pc, length) =
                relocation.range("local variable type", variable.start_pc, variable.length)?;
            variable.start_pc = start_pc;
            variable.length = length;
        }
        attribute.info = serialize_to_vec(&table);
    } else if attribute.is_named(constants, RuntimeVisibleTypeAnnotations::NAME) {
        let mut annotations: RuntimeVisibleTypeAnnotations = attribute.decode()?;
        remap_type_annotations(relocation, &mut annotations.0)?;
        attribute.info = serialize_to_vec(&annotations);
    } else if attribute.is_named(constants, RuntimeInvisibleTypeAnnotations::NAME) {
        let mut annotations: RuntimeInvisibleTypeAnnotations = attribute.decode()?;
        remap_type_annotations(relocation, &mut annotations.0)?;
        attribute.info = serialize_to_vec(&annotations);
    }
    Ok(())
}

fn remap_type_annotations(
    relocation: &Relocation,
    annotations: &mut [TypeAnnotation],
) -> Result<(), Error> {
    for annotation in annotations {
        match &mut annotation.target {
            TypeAnnotationTarget::LocalVariable { table, .. } => {
                for variable in table {
                    let (start_pc, length) = relocation.range(
                        "local variable type annotation",
                        variable.start_pc,
                        variable.length,
                    )?;
                    variable.start_pc = start_pc;
                    variable.length = length;
                }
            }
            TypeAnnotationTarget::Offset { offset, .. }
            | TypeAnnotationTarget::TypeArgument { offset, .. } => {
                *offset = relocation.bytecode_index("type annotation", *offset)?;
            }

            // `Catch` indexes the exception table, which keeps its order
            _ => (),
        }
    }
    Ok(())
}

/// Make sure the frames cover what the verifier will ask for
///
/// From version 51 on, the type checker is mandatory so every jump target and handler needs a
/// frame. Version 50 can fall back to type inference, so only the guards' own frames matter.
fn check_frames(
    version: Version,
    frames: &AbsoluteFrames,
    layout: &CodeLayout,
    jump_targets: &[usize],
    code: &Code,
    guard_targets: &[usize],
) -> Result<(), Error> {
    frames.ensure_frames_at(guard_targets.iter().copied())?;
    if version.major_version >= 51 {
        frames.ensure_frames_at(jump_targets.iter().map(|&index| layout.offset_of(index)))?;
        frames.ensure_frames_at(
            code.exception_table
                .iter()
                .map(|handler| handler.handler_pc.0 as usize),
        )?;
    }
    Ok(())
}
