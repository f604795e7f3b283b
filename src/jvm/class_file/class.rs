use crate::jvm::class_file::{
    deserialize_exact, find_attribute, serialize_to_vec, Attribute, AttributeLike, ConstantsPool,
    Deserialize, Field, Method, Serialize, Version,
};
use crate::jvm::{BinaryName, ClassAccessFlags, ClassConstantIndex, Error, Name};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Representation of the [`class` file format of the JVM][0]
///
/// Decoding keeps everything needed to write the class back out unchanged: constants keep their
/// exact bytes and attributes nothing here understands stay opaque.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Zero for `java/lang/Object` and `module-info`
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Decode a complete class file
    pub fn decode(bytes: &[u8]) -> Result<ClassFile, Error> {
        deserialize_exact(bytes, "class file")
    }

    /// Encode the class file into bytes
    pub fn encode(&self) -> Vec<u8> {
        serialize_to_vec(self)
    }

    /// Name of this class
    pub fn name(&self) -> Result<BinaryName, Error> {
        let name = self.constants.class_name(self.this_class)?;
        BinaryName::from_string(name).map_err(Error::BadDescriptor)
    }

    /// Name of the superclass (if there is one)
    pub fn super_name(&self) -> Result<Option<BinaryName>, Error> {
        if self.super_class.0 .0 == 0 {
            return Ok(None);
        }
        let name = self.constants.class_name(self.super_class)?;
        BinaryName::from_string(name)
            .map(Some)
            .map_err(Error::BadDescriptor)
    }

    /// Find and decode the first class attribute of a given type
    pub fn attribute<A: AttributeLike>(&self) -> Result<Option<A>, Error> {
        find_attribute(&self.attributes, &self.constants)
    }

    /// Is there a class attribute with this name?
    pub fn has_attribute<A: AttributeLike>(&self) -> bool {
        self.attributes
            .iter()
            .any(|attribute| attribute.is_named(&self.constants, A::NAME))
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::deserialize(reader)?;
        let constants = ConstantsPool::deserialize(reader)?;
        constants.validate()?;

        let class = ClassFile {
            version,
            constants,
            access_flags: ClassAccessFlags::deserialize(reader)?,
            this_class: ClassConstantIndex::deserialize(reader)?,
            super_class: ClassConstantIndex::deserialize(reader)?,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        };
        class.constants.class_name(class.this_class)?;
        for attribute in class
            .fields
            .iter()
            .flat_map(|field| &field.attributes)
            .chain(class.methods.iter().flat_map(|method| &method.attributes))
            .chain(&class.attributes)
        {
            class.constants.utf8_bytes(attribute.name_index)?;
        }
        Ok(class)
    }
}
