use crate::jvm::class_file::{read_bytes, Attribute, AttributeLike, Deserialize, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetResult, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::result::Result;

/// Class file constants pool
///
/// A pool is either decoded from an existing class file or started empty. Existing entries are
/// never moved or rewritten (so indices held elsewhere in the class stay valid); new entries are
/// only ever appended, and the `get_*` methods reuse a matching entry when there already is one.
#[derive(Debug, Clone)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    methodrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    utf8s: HashMap<Vec<u8>, Utf8ConstantIndex>,
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            classes: HashMap::new(),
            strings: HashMap::new(),
            name_and_types: HashMap::new(),
            methodrefs: HashMap::new(),
            utf8s: HashMap::new(),
        }
    }

    /// Number of slots used (this is the `constant_pool_count` of the class file)
    pub fn offset_len(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    /// Iterate through constants along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        // Compute the offset at which this constant will be inserted
        let offset: u16 = self.offset_len();

        // Detect if the next constant would overflow the pool
        if offset.checked_add(constant.width() as u16).is_none() {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }

        let index = ConstantIndex(offset);
        self.remember(index, &constant);
        self.constants.push(constant);
        Ok(index)
    }

    /// Record a constant in the reuse tables (the first occurrence of a duplicate wins)
    fn remember(&mut self, index: ConstantIndex, constant: &Constant) {
        match constant {
            Constant::Utf8(bytes) => {
                self.utf8s
                    .entry(bytes.clone())
                    .or_insert(Utf8ConstantIndex(index));
            }
            Constant::Class(name) => {
                self.classes
                    .entry(*name)
                    .or_insert(ClassConstantIndex(index));
            }
            Constant::String(utf8) => {
                self.strings
                    .entry(*utf8)
                    .or_insert(StringConstantIndex(index));
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(NameAndTypeConstantIndex(index));
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.methodrefs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(MethodRefConstantIndex(index));
            }
            _ => (),
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, Error> {
        let encoded = encode_modified_utf8(utf8);
        if encoded.len() > u16::MAX as usize {
            return Err(Error::Utf8ConstantTooLong(encoded.len()));
        }
        if let Some(idx) = self.utf8s.get(&encoded) {
            Ok(*idx)
        } else {
            Ok(Utf8ConstantIndex(self.push_constant(Constant::Utf8(encoded))?))
        }
    }

    /// Get or insert a class constant (by binary name) from the constant pool
    pub fn get_class(&mut self, binary_name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(binary_name)?;
        if let Some(idx) = self.classes.get(&name) {
            Ok(*idx)
        } else {
            Ok(ClassConstantIndex(self.push_constant(Constant::Class(name))?))
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, string: &str) -> Result<StringConstantIndex, Error> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            Ok(StringConstantIndex(self.push_constant(Constant::String(utf8))?))
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.name_and_types.get(&(name, descriptor)) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            Ok(NameAndTypeConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a `CONSTANT_Methodref_info` from the constant pool
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<MethodRefConstantIndex, Error> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(idx) = self.methodrefs.get(&(class, name_and_type, false)) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class,
                name_and_type,
                is_interface: false,
            };
            Ok(MethodRefConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info).map_err(Error::IoError)?;

        Ok(Attribute { name_index, info })
    }

    /// Look up a constant by index
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        match self.constants.get_offset(Offset(index.0 as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            _ => Err(Error::BadConstantIndex {
                index,
                expected: "constant",
            }),
        }
    }

    /// Raw modified UTF-8 bytes of a utf8 constant
    pub fn utf8_bytes(&self, index: Utf8ConstantIndex) -> Result<&[u8], Error> {
        match self.get(index.0) {
            Ok(Constant::Utf8(bytes)) => Ok(bytes),
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_Utf8",
            }),
        }
    }

    /// Decoded contents of a utf8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<String, Error> {
        decode_modified_utf8(self.utf8_bytes(index)?).ok_or(Error::InvalidModifiedUtf8(index.0))
    }

    /// Name of the class referred to by a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<String, Error> {
        match self.get(index.0) {
            Ok(Constant::Class(name)) => self.utf8(*name),
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_Class",
            }),
        }
    }

    /// Check that every reference between constants points at a constant of the right kind
    pub fn validate(&self) -> Result<(), Error> {
        let expect = |index: ConstantIndex, expected: &'static str, ok: fn(&Constant) -> bool| {
            match self.get(index) {
                Ok(constant) if ok(constant) => Ok(()),
                _ => Err(Error::BadConstantIndex { index, expected }),
            }
        };
        fn is_utf8(c: &Constant) -> bool {
            matches!(c, Constant::Utf8(_))
        }
        fn is_class(c: &Constant) -> bool {
            matches!(c, Constant::Class(_))
        }
        fn is_name_and_type(c: &Constant) -> bool {
            matches!(c, Constant::NameAndType { .. })
        }
        fn is_member(c: &Constant) -> bool {
            matches!(c, Constant::FieldRef(..) | Constant::MethodRef { .. })
        }

        for (_, constant) in self.iter() {
            match constant {
                Constant::Class(name)
                | Constant::String(name)
                | Constant::Module(name)
                | Constant::Package(name)
                | Constant::MethodType { descriptor: name } => {
                    expect(name.0, "CONSTANT_Utf8", is_utf8)?;
                }
                Constant::FieldRef(class, name_and_type)
                | Constant::MethodRef {
                    class,
                    name_and_type,
                    ..
                } => {
                    expect(class.0, "CONSTANT_Class", is_class)?;
                    expect(name_and_type.0, "CONSTANT_NameAndType", is_name_and_type)?;
                }
                Constant::NameAndType { name, descriptor } => {
                    expect(name.0, "CONSTANT_Utf8", is_utf8)?;
                    expect(descriptor.0, "CONSTANT_Utf8", is_utf8)?;
                }
                Constant::MethodHandle { member, .. } => {
                    expect(*member, "member reference", is_member)?;
                }
                Constant::Dynamic { name_and_type, .. }
                | Constant::InvokeDynamic { name_and_type, .. } => {
                    expect(name_and_type.0, "CONSTANT_NameAndType", is_name_and_type)?;
                }
                Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Utf8(_) => (),
            }
        }
        Ok(())
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.offset_len().serialize(writer)?;
        for (_, constant) in self.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantsPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::deserialize(reader)?;
        if count == 0 {
            return Err(Error::Truncated("constant pool count must be at least 1"));
        }
        let mut pool = ConstantsPool::new();
        while pool.offset_len() < count {
            let index = ConstantIndex(pool.offset_len());
            let constant = Constant::deserialize_at(reader, index)?;
            if pool.offset_len() as usize + constant.width() > count as usize {
                return Err(Error::BadConstantIndex {
                    index,
                    expected: "constant that fits in the declared pool size",
                });
            }
            pool.push_constant(constant)?;
        }
        Ok(pool)
    }
}

/// Constants as in the constant pool
///
/// Floating point and string constants are kept in their exact encoded form, so that a decoded
/// pool re-encodes to the same bytes (NaN payloads and unpaired surrogates included).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float` (raw IEEE 754 bits)
    Float(u32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double` (raw IEEE 754 bits)
    Double(u64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant string value, in its encoded modified UTF-8 form
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(Vec<u8>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Module (only in `module-info`)
    Module(Utf8ConstantIndex),

    /// Package exported or opened by a module (only in `module-info`)
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Read one constant, `index` is only used for error reporting
    fn deserialize_at<R: ReadBytesExt>(reader: &mut R, index: ConstantIndex) -> Result<Self, Error> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                Constant::Utf8(read_bytes(reader, len as usize)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(u32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(u64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => {
                let class = ClassConstantIndex::deserialize(reader)?;
                let name_and_type = NameAndTypeConstantIndex::deserialize(reader)?;
                Constant::FieldRef(class, name_and_type)
            }
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            _ => return Err(Error::UnknownConstantTag { tag, index }),
        };
        Ok(constant)
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(bytes) => {
                1u8.serialize(writer)?;
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(bytes)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(bits) => {
                4u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(bits) => {
                6u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Decode modified UTF-8 (see [`encode_modified_utf8`])
///
/// Returns `None` for byte sequences that aren't valid modified UTF-8 or which decode to unpaired
/// surrogates (legal in Java strings, but not representable in a Rust `String`).
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let continuation = |byte: Option<&u8>| -> Option<u16> {
        match byte {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((b & 0x3F) as u16),
            _ => None,
        }
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b == 0 {
            return None;
        } else if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = continuation(bytes.get(i + 1))?;
            units.push((b & 0x1F) << 6 | b2);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = continuation(bytes.get(i + 1))?;
            let b3 = continuation(bytes.get(i + 2))?;
            units.push((b & 0x0F) << 12 | b2 << 6 | b3);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod encode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
        assert_eq!(decode_modified_utf8(&[97, 0, 97]), None);
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(
            encode_modified_utf8("hel10_World"),
            vec![104, 101, 108, 49, 48, 95, 87, 111, 114, 108, 100]
        );
    }

    #[test]
    fn two_and_three_byte_encodings() {
        assert_eq!(
            encode_modified_utf8("ĄǍǞǠǺȀȂȦȺӐӒ"),
            vec![
                196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166,
                200, 186, 211, 144, 211, 146
            ]
        );
        assert_eq!(
            decode_modified_utf8(&[224, 164, 132, 224, 164, 133]).unwrap(),
            "ऄअ"
        );
    }

    #[test]
    fn supplementary_characters() {
        let encoded = vec![
            237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237, 191,
            191,
        ];
        assert_eq!(encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"), encoded);
        assert_eq!(
            decode_modified_utf8(&encoded).unwrap(),
            "\u{10000}\u{dffff}\u{10FFFF}"
        );
    }

    #[test]
    fn unpaired_surrogate_is_not_decodable() {
        assert_eq!(decode_modified_utf8(&[237, 160, 128]), None);
        assert_eq!(decode_modified_utf8(&[0xC3]), None);
    }
}

#[cfg(test)]
mod pool_tests {
    use super::*;
    use crate::jvm::class_file::{deserialize_exact, serialize_to_vec};

    #[test]
    fn reuses_existing_entries() {
        let mut pool = ConstantsPool::new();
        let object = pool.get_class("java/lang/Object").unwrap();
        let string = pool.get_string("java/lang/Object").unwrap();
        assert_eq!(pool.offset_len(), 4);

        let mut decoded: ConstantsPool =
            deserialize_exact(&serialize_to_vec(&pool), "pool").unwrap();
        assert_eq!(decoded.get_class("java/lang/Object").unwrap(), object);
        assert_eq!(decoded.get_string("java/lang/Object").unwrap(), string);
        assert_eq!(decoded.offset_len(), 4);
        assert_eq!(decoded.class_name(object).unwrap(), "java/lang/Object");
    }

    #[test]
    fn oversized_utf8_is_rejected() {
        let mut pool = ConstantsPool::new();
        let fits = "x".repeat(65535);
        assert!(pool.get_utf8(&fits).is_ok());

        // `\0` takes two bytes in modified UTF-8
        let too_long = "\0".repeat(40000);
        assert!(matches!(
            pool.get_string(&too_long),
            Err(Error::Utf8ConstantTooLong(80000))
        ));
        assert_eq!(pool.offset_len(), 2);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        pool.push_constant(Constant::Long(7)).unwrap();
        let next = pool.get_utf8("x").unwrap();
        assert_eq!(next, Utf8ConstantIndex(ConstantIndex(3)));
        assert!(pool.get(ConstantIndex(2)).is_err());

        let bytes = serialize_to_vec(&pool);
        assert_eq!(&bytes[..2], &[0, 4]);
        let decoded: ConstantsPool = deserialize_exact(&bytes, "pool").unwrap();
        assert_eq!(decoded.get(ConstantIndex(1)).unwrap(), &Constant::Long(7));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let mut pool = ConstantsPool::new();
        pool.push_constant(Constant::Class(Utf8ConstantIndex(ConstantIndex(9))))
            .unwrap();
        assert!(matches!(
            pool.validate(),
            Err(Error::BadConstantIndex { .. })
        ));
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let bytes = [0, 2, 99];
        assert!(matches!(
            deserialize_exact::<ConstantsPool>(&bytes, "pool"),
            Err(Error::UnknownConstantTag { tag: 99, .. })
        ));
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub ConstantIndex);

macro_rules! constant_index_newtype {
    ($($index:ident),*) => {
        $(
            impl From<$index> for ConstantIndex {
                fn from(index: $index) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $index {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $index {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($index(ConstantIndex::deserialize(reader)?))
                }
            }
        )*
    };
}

constant_index_newtype!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    MethodRefConstantIndex
);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let kind = match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::malformed_attribute(
                    "CONSTANT_MethodHandle",
                    format!("unknown reference kind {}", other),
                ))
            }
        };
        Ok(kind)
    }
}
