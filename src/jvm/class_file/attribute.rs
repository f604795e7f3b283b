use crate::jvm::class_file::{
    deserialize_exact, read_bytes, ConstantsPool, Deserialize, Serialize,
};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{
    ClassConstantIndex, Error, InnerClassAccessFlags, NameAndTypeConstantIndex,
    ParameterAccessFlags, Utf8ConstantIndex,
};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// The representation is designed to be easily extended with custom attributes.
/// While some attributes aren't essential, others are really important (eg. the
/// code attribute for including the actual bytecode). Attributes that nothing
/// here needs to understand are carried around as opaque bytes.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes (and read back out of them).
pub trait AttributeLike: Serialize + Deserialize {
    /// Name of the attribute
    const NAME: &'static str;
}

impl Attribute {
    /// Does this attribute have the given name?
    pub fn is_named(&self, constants: &ConstantsPool, name: &str) -> bool {
        constants
            .utf8_bytes(self.name_index)
            .map_or(false, |bytes| bytes == name.as_bytes())
    }

    /// Decode the attribute contents, which must span the entire attribute
    pub fn decode<A: AttributeLike>(&self) -> Result<A, Error> {
        deserialize_exact(&self.info, A::NAME).map_err(|err| match err {
            Error::Truncated(_) | Error::TrailingBytes { .. } => {
                Error::malformed_attribute(A::NAME, err.to_string())
            }
            other => other,
        })
    }
}

/// Find and decode the first attribute of a given type
pub fn find_attribute<A: AttributeLike>(
    attributes: &[Attribute],
    constants: &ConstantsPool,
) -> Result<Option<A>, Error> {
    attributes
        .iter()
        .find(|attribute| attribute.is_named(constants, A::NAME))
        .map(Attribute::decode)
        .transpose()
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Code {
            max_stack: u16::deserialize(reader)?,
            max_locals: u16::deserialize(reader)?,
            code_array: BytecodeArray::deserialize(reader)?,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Zero means the handler catches everything (`finally`)
    pub catch_type: ClassConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: BytecodeIndex::deserialize(reader)?,
            end_pc: BytecodeIndex::deserialize(reader)?,
            handler_pc: BytecodeIndex::deserialize(reader)?,
            catch_type: ClassConstantIndex::deserialize(reader)?,
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u32::deserialize(reader)?;
        if len == 0 || len > u16::MAX as u32 {
            return Err(Error::malformed_attribute(
                "Code",
                format!("code length {} is outside 1..=65535", len),
            ));
        }
        Ok(BytecodeArray(read_bytes(reader, len as usize)?))
    }
}

/// Index into `BytecodeArray`
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BytecodeIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(BytecodeIndex(u16::deserialize(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for StackMapTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(StackMapTable(Vec::deserialize(reader)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType<ClassConstantIndex, u16>,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
        stack: Vec<VerificationType<ClassConstantIndex, u16>>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub fn set_offset_delta(&mut self, delta: u16) {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta = delta,
        }
    }

    /// Rewrite the `new` offsets carried by uninitialized verification types
    pub fn map_uninitialized(
        &mut self,
        mut map_offset: impl FnMut(u16) -> Result<u16, Error>,
    ) -> Result<(), Error> {
        let types: Vec<&mut VerificationType<ClassConstantIndex, u16>> = match self {
            StackMapFrame::SameLocalsNoStack { .. } | StackMapFrame::ChopLocalsNoStack { .. } => {
                vec![]
            }
            StackMapFrame::SameLocalsOneStack { stack, .. } => vec![stack],
            StackMapFrame::AppendLocalsNoStack { locals, .. } => locals.iter_mut().collect(),
            StackMapFrame::Full { locals, stack, .. } => {
                locals.iter_mut().chain(stack.iter_mut()).collect()
            }
        };
        for verification_type in types {
            if let VerificationType::Uninitialized(offset) = verification_type {
                *offset = map_offset(*offset)?;
            }
        }
        Ok(())
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for StackMapFrame {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let frame = match u8::deserialize(reader)? {
            tag @ 0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            tag @ 64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: VerificationType::deserialize(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::deserialize(reader)?,
                stack: VerificationType::deserialize(reader)?,
            },
            tag @ 248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
            },
            tag @ 252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let mut locals = vec![];
                for _ in 0..(tag - 251) {
                    locals.push(VerificationType::deserialize(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: u16::deserialize(reader)?,
                locals: Vec::deserialize(reader)?,
                stack: Vec::deserialize(reader)?,
            },
            tag => {
                return Err(Error::malformed_attribute(
                    StackMapTable::NAME,
                    format!("reserved frame type {}", tag),
                ))
            }
        };
        Ok(frame)
    }
}

/// Every inner class referenced in a class' constant pool must be included in the inner classes
/// attribute on the class.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClasses(pub Vec<InnerClass>);

impl AttributeLike for InnerClasses {
    const NAME: &'static str = "InnerClasses";
}

impl Serialize for InnerClasses {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for InnerClasses {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(InnerClasses(Vec::deserialize(reader)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class: ClassConstantIndex,

    /// Zero for local and anonymous classes
    pub outer_class: ClassConstantIndex,

    /// Zero for anonymous classes
    pub inner_name: Utf8ConstantIndex,
    pub access_flags: InnerClassAccessFlags,
}

impl Serialize for InnerClass {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.inner_class.serialize(writer)?;
        self.outer_class.serialize(writer)?;
        self.inner_name.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for InnerClass {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(InnerClass {
            inner_class: ClassConstantIndex::deserialize(reader)?,
            outer_class: ClassConstantIndex::deserialize(reader)?,
            inner_name: Utf8ConstantIndex::deserialize(reader)?,
            access_flags: InnerClassAccessFlags::deserialize(reader)?,
        })
    }
}

/// Present on local and anonymous classes
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class: ClassConstantIndex,

    /// Zero when the class is not immediately enclosed by a method or constructor
    pub method: NameAndTypeConstantIndex,
}

impl AttributeLike for EnclosingMethod {
    const NAME: &'static str = "EnclosingMethod";
}

impl Serialize for EnclosingMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.class.serialize(writer)?;
        self.method.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for EnclosingMethod {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(EnclosingMethod {
            class: ClassConstantIndex::deserialize(reader)?,
            method: NameAndTypeConstantIndex::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.24
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodParameters(pub Vec<MethodParameter>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodParameter {
    /// Zero for a parameter with no name
    pub name_index: Utf8ConstantIndex,
    pub access_flags: ParameterAccessFlags,
}

impl AttributeLike for MethodParameters {
    const NAME: &'static str = "MethodParameters";
}

/// Unlike most tables, this one has a `u8` length
impl Serialize for MethodParameters {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u8).serialize(writer)?;
        for parameter in &self.0 {
            parameter.name_index.serialize(writer)?;
            parameter.access_flags.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for MethodParameters {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u8::deserialize(reader)?;
        let mut parameters = Vec::with_capacity(len as usize);
        for _ in 0..len {
            parameters.push(MethodParameter {
                name_index: Utf8ConstantIndex::deserialize(reader)?,
                access_flags: ParameterAccessFlags::deserialize(reader)?,
            });
        }
        Ok(MethodParameters(parameters))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u16).serialize(writer)?;
        for entry in &self.0 {
            entry.start_pc.serialize(writer)?;
            entry.line_number.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for LineNumberTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut entries = Vec::with_capacity(len as usize);
        for _ in 0..len {
            entries.push(LineNumber {
                start_pc: BytecodeIndex::deserialize(reader)?,
                line_number: u16::deserialize(reader)?,
            });
        }
        Ok(LineNumberTable(entries))
    }
}

/// Entry in either a `LocalVariableTable` or a `LocalVariableTypeTable`
///
/// The variable is live over `start_pc .. start_pc + length` (`descriptor_index` holds a field
/// signature rather than a descriptor in the type table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for LocalVariable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LocalVariable {
            start_pc: BytecodeIndex::deserialize(reader)?,
            length: u16::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            index: u16::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.14
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTypeTable(pub Vec<LocalVariable>);

impl AttributeLike for LocalVariableTypeTable {
    const NAME: &'static str = "LocalVariableTypeTable";
}

macro_rules! local_variable_table {
    ($($table:ident),*) => {
        $(
            impl Serialize for $table {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $table {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($table(Vec::deserialize(reader)?))
                }
            }
        )*
    };
}

local_variable_table!(LocalVariableTable, LocalVariableTypeTable);

/// Class attribute marking a class as already carrying null guards
///
/// The payload is a free-form description of the tool version and configuration that did the
/// instrumentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationMarker {
    pub description: Utf8ConstantIndex,
}

impl AttributeLike for InstrumentationMarker {
    const NAME: &'static str = "NullGuardInstrumented";
}

impl Serialize for InstrumentationMarker {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.description.serialize(writer)
    }
}

impl Deserialize for InstrumentationMarker {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(InstrumentationMarker {
            description: Utf8ConstantIndex::deserialize(reader)?,
        })
    }
}
