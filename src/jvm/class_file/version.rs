use super::{Deserialize, Serialize};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// Oldest class file version (JDK 1.0.2)
    pub const OLDEST: Version = Version {
        minor_version: 0,
        major_version: 45,
    };

    /// Newest class file version that can be instrumented (Java SE 27)
    pub const NEWEST: Version = Version {
        minor_version: 0,
        major_version: 71,
    };

    /// JVM class file version corresponding to Java SE 6, the first to carry stack map tables
    pub const JAVA6: Version = Version {
        minor_version: 0,
        major_version: 50,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };

    /// JVM class file version corresponding to Java SE 17
    pub const JAVA17: Version = Version {
        minor_version: 0,
        major_version: 61,
    };

    /// Does the type-checking verifier expect a `StackMapTable` on every method with branches?
    pub fn uses_stack_map_frames(&self) -> bool {
        self.major_version >= Version::JAVA6.major_version
    }

    /// Can `ldc` load a class constant? (added in Java SE 5)
    pub fn supports_class_literals(&self) -> bool {
        self.major_version >= 49
    }

    /// Is this a version the JVM specification defines (and that isn't newer than we know)?
    ///
    /// From Java SE 12 on, the minor version is either 0 or 65535 (preview features).
    pub fn is_supported(&self) -> bool {
        let major_ok = (Version::OLDEST.major_version..=Version::NEWEST.major_version)
            .contains(&self.major_version);
        let minor_ok = self.major_version < 56 || matches!(self.minor_version, 0 | 0xFFFF);
        major_ok && minor_ok
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let minor_version = u16::deserialize(reader)?;
        let major_version = u16::deserialize(reader)?;
        let version = Version {
            minor_version,
            major_version,
        };
        if !version.is_supported() {
            return Err(Error::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }
        Ok(version)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::deserialize_exact;

    fn decode(minor: u16, major: u16) -> Result<Version, Error> {
        let mut bytes = minor.to_be_bytes().to_vec();
        bytes.extend_from_slice(&major.to_be_bytes());
        deserialize_exact(&bytes, "version")
    }

    #[test]
    fn known_versions_decode() {
        assert_eq!(decode(3, 45).unwrap().major_version, 45);
        assert_eq!(decode(0, 52).unwrap(), Version::JAVA8);
        assert_eq!(decode(0xFFFF, 61).unwrap().minor_version, 0xFFFF);
        assert_eq!(decode(0, 71).unwrap(), Version::NEWEST);
    }

    #[test]
    fn out_of_range_versions_are_rejected() {
        for (minor, major) in [(0, 3), (0, 44), (0, 72), (0, 0xFFFF), (1, 61)] {
            assert!(
                matches!(decode(minor, major), Err(Error::UnsupportedVersion { .. })),
                "{}.{} should be rejected",
                major,
                minor
            );
        }
    }
}
