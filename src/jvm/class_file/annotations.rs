//! Annotation attributes
//!
//! Only the structure of annotations is modelled: which annotation type is attached to which
//! element. Element values are decoded just far enough to be skipped over and re-encoded.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.16

use crate::jvm::class_file::{Attribute, AttributeLike, BytecodeIndex, Deserialize, Serialize};
use crate::jvm::{ConstantIndex, Error, Utf8ConstantIndex};
use byteorder::{ReadBytesExt, WriteBytesExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation type (eg. `Lorg/jspecify/annotations/NonNull;`)
    pub type_index: Utf8ConstantIndex,
    pub element_value_pairs: Vec<ElementValuePair>,
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.type_index.serialize(writer)?;
        self.element_value_pairs.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Annotation {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Annotation {
            type_index: Utf8ConstantIndex::deserialize(reader)?,
            element_value_pairs: Vec::deserialize(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name_index: Utf8ConstantIndex,
    pub value: ElementValue,
}

impl Serialize for ElementValuePair {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        self.value.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ElementValuePair {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ElementValuePair {
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            value: ElementValue::deserialize(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant, `tag` is one of `BCDFIJSZs`
    Const { tag: u8, value: ConstantIndex },
    Enum {
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },
    Class(Utf8ConstantIndex),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            ElementValue::Const { tag, value } => {
                tag.serialize(writer)?;
                value.serialize(writer)?;
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)?;
            }
            ElementValue::Class(class_info) => {
                b'c'.serialize(writer)?;
                class_info.serialize(writer)?;
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)?;
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for ElementValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let value = match u8::deserialize(reader)? {
            tag @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's') => {
                ElementValue::Const {
                    tag,
                    value: ConstantIndex::deserialize(reader)?,
                }
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::deserialize(reader)?,
                const_name: Utf8ConstantIndex::deserialize(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::deserialize(reader)?),
            b'@' => ElementValue::Annotation(Box::new(Annotation::deserialize(reader)?)),
            b'[' => ElementValue::Array(Vec::deserialize(reader)?),
            tag => {
                return Err(Error::malformed_attribute(
                    "RuntimeVisibleAnnotations",
                    format!("unknown element value tag {:?}", tag as char),
                ))
            }
        };
        Ok(value)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVisibleAnnotations(pub Vec<Annotation>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.17
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInvisibleAnnotations(pub Vec<Annotation>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.18
///
/// Javac may emit fewer entries than there are parameters in the descriptor: the entries then
/// line up with the _last_ parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVisibleParameterAnnotations(pub Vec<Vec<Annotation>>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.19
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInvisibleParameterAnnotations(pub Vec<Vec<Annotation>>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.20
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVisibleTypeAnnotations(pub Vec<TypeAnnotation>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.21
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInvisibleTypeAnnotations(pub Vec<TypeAnnotation>);

macro_rules! annotation_list_attribute {
    ($($attribute:ident),*) => {
        $(
            impl AttributeLike for $attribute {
                const NAME: &'static str = stringify!($attribute);
            }

            impl Serialize for $attribute {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $attribute {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($attribute(Vec::deserialize(reader)?))
                }
            }
        )*
    };
}

annotation_list_attribute!(
    RuntimeVisibleAnnotations,
    RuntimeInvisibleAnnotations,
    RuntimeVisibleTypeAnnotations,
    RuntimeInvisibleTypeAnnotations
);

macro_rules! parameter_annotations_attribute {
    ($($attribute:ident),*) => {
        $(
            impl AttributeLike for $attribute {
                const NAME: &'static str = stringify!($attribute);
            }

            /// The outer table has a `u8` length
            impl Serialize for $attribute {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    (self.0.len() as u8).serialize(writer)?;
                    for annotations in &self.0 {
                        annotations.serialize(writer)?;
                    }
                    Ok(())
                }
            }

            impl Deserialize for $attribute {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    let num_parameters = u8::deserialize(reader)?;
                    let mut parameters = Vec::with_capacity(num_parameters as usize);
                    for _ in 0..num_parameters {
                        parameters.push(Vec::deserialize(reader)?);
                    }
                    Ok($attribute(parameters))
                }
            }
        )*
    };
}

parameter_annotations_attribute!(
    RuntimeVisibleParameterAnnotations,
    RuntimeInvisibleParameterAnnotations
);

/// Annotation on a use of a type
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.20
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub target: TypeAnnotationTarget,
    pub target_path: Vec<TypePathEntry>,
    pub annotation: Annotation,
}

impl TypeAnnotation {
    /// Does the annotation apply to the outermost type of the annotated element?
    ///
    /// Stepping into a nested type still annotates the declared type itself (`Outer.@A Inner`),
    /// while steps into array elements, wildcard bounds or type arguments do not.
    pub fn targets_declared_type(&self) -> bool {
        self.target_path
            .iter()
            .all(|entry| entry.kind == TypePathEntry::NESTED_TYPE)
    }
}

impl Serialize for TypeAnnotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.target.serialize(writer)?;
        (self.target_path.len() as u8).serialize(writer)?;
        for entry in &self.target_path {
            entry.kind.serialize(writer)?;
            entry.type_argument_index.serialize(writer)?;
        }
        self.annotation.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for TypeAnnotation {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let target = TypeAnnotationTarget::deserialize(reader)?;
        let path_length = u8::deserialize(reader)?;
        let mut target_path = Vec::with_capacity(path_length as usize);
        for _ in 0..path_length {
            target_path.push(TypePathEntry {
                kind: u8::deserialize(reader)?,
                type_argument_index: u8::deserialize(reader)?,
            });
        }
        let annotation = Annotation::deserialize(reader)?;
        Ok(TypeAnnotation {
            target,
            target_path,
            annotation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePathEntry {
    pub kind: u8,
    pub type_argument_index: u8,
}

impl TypePathEntry {
    pub const ARRAY_ELEMENT: u8 = 0;
    pub const NESTED_TYPE: u8 = 1;
    pub const WILDCARD_BOUND: u8 = 2;
    pub const TYPE_ARGUMENT: u8 = 3;
}

/// Element annotated by a type annotation, along with its `target_type` byte
///
/// Targets at or above `0x40` only occur inside `Code` attributes and point into the bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotationTarget {
    /// `0x00`, `0x01`
    TypeParameter { target_type: u8, index: u8 },

    /// `0x10`
    Supertype(u16),

    /// `0x11`, `0x12`
    TypeParameterBound {
        target_type: u8,
        type_parameter_index: u8,
        bound_index: u8,
    },

    /// `0x13` (field), `0x14` (return type), `0x15` (receiver)
    Empty(u8),

    /// `0x16`: index into the parameters of the method descriptor, ignoring synthetic ones in
    /// practice the same way parameter annotations do
    FormalParameter(u8),

    /// `0x17`
    Throws(u16),

    /// `0x40`, `0x41`
    LocalVariable {
        target_type: u8,
        table: Vec<LocalVariableTarget>,
    },

    /// `0x42`
    Catch(u16),

    /// `0x43` - `0x46`
    Offset { target_type: u8, offset: BytecodeIndex },

    /// `0x47` - `0x4B`
    TypeArgument {
        target_type: u8,
        offset: BytecodeIndex,
        type_argument_index: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTarget {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub index: u16,
}

impl Serialize for TypeAnnotationTarget {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            TypeAnnotationTarget::TypeParameter { target_type, index } => {
                target_type.serialize(writer)?;
                index.serialize(writer)?;
            }
            TypeAnnotationTarget::Supertype(index) => {
                0x10u8.serialize(writer)?;
                index.serialize(writer)?;
            }
            TypeAnnotationTarget::TypeParameterBound {
                target_type,
                type_parameter_index,
                bound_index,
            } => {
                target_type.serialize(writer)?;
                type_parameter_index.serialize(writer)?;
                bound_index.serialize(writer)?;
            }
            TypeAnnotationTarget::Empty(target_type) => target_type.serialize(writer)?,
            TypeAnnotationTarget::FormalParameter(index) => {
                0x16u8.serialize(writer)?;
                index.serialize(writer)?;
            }
            TypeAnnotationTarget::Throws(index) => {
                0x17u8.serialize(writer)?;
                index.serialize(writer)?;
            }
            TypeAnnotationTarget::LocalVariable { target_type, table } => {
                target_type.serialize(writer)?;
                (table.len() as u16).serialize(writer)?;
                for entry in table {
                    entry.start_pc.serialize(writer)?;
                    entry.length.serialize(writer)?;
                    entry.index.serialize(writer)?;
                }
            }
            TypeAnnotationTarget::Catch(index) => {
                0x42u8.serialize(writer)?;
                index.serialize(writer)?;
            }
            TypeAnnotationTarget::Offset {
                target_type,
                offset,
            } => {
                target_type.serialize(writer)?;
                offset.serialize(writer)?;
            }
            TypeAnnotationTarget::TypeArgument {
                target_type,
                offset,
                type_argument_index,
            } => {
                target_type.serialize(writer)?;
                offset.serialize(writer)?;
                type_argument_index.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for TypeAnnotationTarget {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let target = match u8::deserialize(reader)? {
            target_type @ (0x00 | 0x01) => TypeAnnotationTarget::TypeParameter {
                target_type,
                index: u8::deserialize(reader)?,
            },
            0x10 => TypeAnnotationTarget::Supertype(u16::deserialize(reader)?),
            target_type @ (0x11 | 0x12) => TypeAnnotationTarget::TypeParameterBound {
                target_type,
                type_parameter_index: u8::deserialize(reader)?,
                bound_index: u8::deserialize(reader)?,
            },
            target_type @ (0x13..=0x15) => TypeAnnotationTarget::Empty(target_type),
            0x16 => TypeAnnotationTarget::FormalParameter(u8::deserialize(reader)?),
            0x17 => TypeAnnotationTarget::Throws(u16::deserialize(reader)?),
            target_type @ (0x40 | 0x41) => {
                let len = u16::deserialize(reader)?;
                let mut table = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    table.push(LocalVariableTarget {
                        start_pc: BytecodeIndex::deserialize(reader)?,
                        length: u16::deserialize(reader)?,
                        index: u16::deserialize(reader)?,
                    });
                }
                TypeAnnotationTarget::LocalVariable { target_type, table }
            }
            0x42 => TypeAnnotationTarget::Catch(u16::deserialize(reader)?),
            target_type @ (0x43..=0x46) => TypeAnnotationTarget::Offset {
                target_type,
                offset: BytecodeIndex::deserialize(reader)?,
            },
            target_type @ (0x47..=0x4B) => TypeAnnotationTarget::TypeArgument {
                target_type,
                offset: BytecodeIndex::deserialize(reader)?,
                type_argument_index: u8::deserialize(reader)?,
            },
            other => {
                return Err(Error::malformed_attribute(
                    "RuntimeVisibleTypeAnnotations",
                    format!("unknown target type 0x{:02x}", other),
                ))
            }
        };
        Ok(target)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.30
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(pub Vec<RecordComponent>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl AttributeLike for Record {
    const NAME: &'static str = "Record";
}

impl Serialize for Record {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u16).serialize(writer)?;
        for component in &self.0 {
            component.name_index.serialize(writer)?;
            component.descriptor_index.serialize(writer)?;
            component.attributes.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for Record {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut components = Vec::with_capacity(len as usize);
        for _ in 0..len {
            components.push(RecordComponent {
                name_index: Utf8ConstantIndex::deserialize(reader)?,
                descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
                attributes: Vec::deserialize(reader)?,
            });
        }
        Ok(Record(components))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{deserialize_exact, serialize_to_vec};

    fn utf8(index: u16) -> Utf8ConstantIndex {
        Utf8ConstantIndex(ConstantIndex(index))
    }

    #[test]
    fn nested_element_values_are_skipped_correctly() {
        let annotations = RuntimeVisibleAnnotations(vec![
            Annotation {
                type_index: utf8(1),
                element_value_pairs: vec![ElementValuePair {
                    name_index: utf8(2),
                    value: ElementValue::Array(vec![
                        ElementValue::Const {
                            tag: b's',
                            value: ConstantIndex(3),
                        },
                        ElementValue::Annotation(Box::new(Annotation {
                            type_index: utf8(4),
                            element_value_pairs: vec![],
                        })),
                    ]),
                }],
            },
            Annotation {
                type_index: utf8(5),
                element_value_pairs: vec![],
            },
        ]);
        let bytes = serialize_to_vec(&annotations);
        let decoded: RuntimeVisibleAnnotations =
            deserialize_exact(&bytes, RuntimeVisibleAnnotations::NAME).unwrap();
        assert_eq!(decoded.0.len(), 2);
        assert_eq!(decoded.0[1].type_index, utf8(5));
    }

    #[test]
    fn parameter_annotations_have_byte_sized_count() {
        let bytes = [2, 0, 0, 0, 1, 0, 7, 0, 0];
        let decoded: RuntimeInvisibleParameterAnnotations =
            deserialize_exact(&bytes, RuntimeInvisibleParameterAnnotations::NAME).unwrap();
        assert_eq!(decoded.0[0], vec![]);
        assert_eq!(decoded.0[1][0].type_index, utf8(7));
    }

    #[test]
    fn formal_parameter_type_annotation_paths() {
        // `@A String[] p` annotates the array element type, `@A String p` the parameter
        let element = TypeAnnotation {
            target: TypeAnnotationTarget::FormalParameter(0),
            target_path: vec![TypePathEntry {
                kind: TypePathEntry::ARRAY_ELEMENT,
                type_argument_index: 0,
            }],
            annotation: Annotation {
                type_index: utf8(1),
                element_value_pairs: vec![],
            },
        };
        assert!(!element.targets_declared_type());

        let declared = TypeAnnotation {
            target_path: vec![],
            ..element
        };
        assert!(declared.targets_declared_type());
    }
}
