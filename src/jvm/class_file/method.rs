use crate::jvm::class_file::{find_attribute, Attribute, AttributeLike, ConstantsPool};
use crate::jvm::class_file::{Deserialize, Serialize};
use crate::jvm::{Error, MethodAccessFlags, Utf8ConstantIndex};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Does the method have a body? (abstract and native methods do not)
    pub fn has_body(&self) -> bool {
        !self
            .access_flags
            .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }

    /// Find and decode the first attribute of a given type
    pub fn attribute<A: AttributeLike>(&self, constants: &ConstantsPool) -> Result<Option<A>, Error> {
        find_attribute(&self.attributes, constants)
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
