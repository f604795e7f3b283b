use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()>;
}

/// Inverse of [`Serialize`]
///
/// Reading never trusts the input: running out of bytes is reported as [`Error::Truncated`] and
/// structurally invalid content as one of the other malformed-input errors.
pub trait Deserialize: Sized {
    /// Read the construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for u64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<BigEndian>(*self)
    }
}

impl Serialize for i16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i16::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

impl Serialize for i64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i64::<BigEndian>(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u8()?)
    }
}

impl Deserialize for u16 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u16::<BigEndian>()?)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u32::<BigEndian>()?)
    }
}

impl Deserialize for u64 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u64::<BigEndian>()?)
    }
}

impl Deserialize for i32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_i32::<BigEndian>()?)
    }
}

impl Deserialize for i64 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_i64::<BigEndian>()?)
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` raw bytes
///
/// Lengths come from the input, so the buffer only grows as bytes actually arrive.
pub fn read_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>, Error> {
    let mut buffer = Vec::with_capacity(len.min(READ_BYTES_PREALLOCATION));
    Read::take(&mut *reader, len as u64).read_to_end(&mut buffer)?;
    if buffer.len() < len {
        return Err(Error::Truncated("length prefixed bytes"));
    }
    Ok(buffer)
}

const READ_BYTES_PREALLOCATION: usize = 64 * 1024;

/// Deserialize a value from a complete buffer, rejecting leftover bytes
pub fn deserialize_exact<A: Deserialize>(mut bytes: &[u8], context: &'static str) -> Result<A, Error> {
    let value = A::deserialize(&mut bytes)?;
    if bytes.is_empty() {
        Ok(value)
    } else {
        Err(Error::TrailingBytes {
            context,
            remaining: bytes.len(),
        })
    }
}

/// Serialize a value into a fresh buffer
pub fn serialize_to_vec<A: Serialize>(value: &A) -> Vec<u8> {
    let mut buffer = vec![];
    // Writing into a `Vec` cannot fail
    let _ = value.serialize(&mut buffer);
    buffer
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_integers() {
        assert_eq!(serialize_to_vec(&0x1234u16), vec![0x12, 0x34]);
        assert_eq!(serialize_to_vec(&-2i32), vec![0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(deserialize_exact::<u32>(&[0, 0, 1, 0], "u32").unwrap(), 256);
    }

    #[test]
    fn length_prefixed_vectors() {
        let bytes = serialize_to_vec(&vec![1u16, 2, 3]);
        assert_eq!(bytes, vec![0, 3, 0, 1, 0, 2, 0, 3]);
        assert_eq!(
            deserialize_exact::<Vec<u16>>(&bytes, "vec").unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn huge_declared_length_is_truncated() {
        let mut input: &[u8] = &[1, 2, 3];
        assert!(matches!(
            read_bytes(&mut input, u32::MAX as usize),
            Err(Error::Truncated(_))
        ));
        let mut input: &[u8] = &[1, 2, 3];
        assert_eq!(read_bytes(&mut input, 2).unwrap(), vec![1, 2]);
        assert_eq!(input, &[3]);
    }

    #[test]
    fn truncated_and_trailing_input() {
        assert!(matches!(
            deserialize_exact::<Vec<u16>>(&[0, 2, 0, 1], "vec"),
            Err(Error::Truncated(_))
        ));
        assert!(matches!(
            deserialize_exact::<u16>(&[0, 2, 0], "u16"),
            Err(Error::TrailingBytes { remaining: 1, .. })
        ));
    }
}
