use super::{Constant, ConstantIndex};
use std::fmt;

/// Errors produced while decoding or re-encoding class files
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Input ended in the middle of a structure
    Truncated(&'static str),

    /// First four bytes are not `0xCAFEBABE`
    BadMagic([u8; 4]),

    /// Class file version outside of what the JVM specification defines
    UnsupportedVersion {
        major: u16,
        minor: u16,
    },

    /// Bytes remain after the structure was fully read
    TrailingBytes {
        context: &'static str,
        remaining: usize,
    },

    UnknownConstantTag {
        tag: u8,
        index: ConstantIndex,
    },

    /// Index into the constant pool is out of range or points at the wrong kind of constant
    BadConstantIndex {
        index: ConstantIndex,
        expected: &'static str,
    },

    InvalidModifiedUtf8(ConstantIndex),

    BadDescriptor(String),

    /// Attribute contents are inconsistent with its declared structure
    MalformedAttribute {
        name: &'static str,
        reason: String,
    },

    InvalidOpcode {
        opcode: u8,
        offset: usize,
    },

    /// Branch, exception range, or debug table offset not at the start of an instruction
    OffsetNotOnInstructionBoundary {
        context: &'static str,
        offset: usize,
    },

    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },

    /// String whose modified UTF-8 encoding does not fit in a `CONSTANT_Utf8` (65535 bytes)
    Utf8ConstantTooLong(usize),

    /// Method code exceeds the 65535 byte limit
    MethodCodeOverflow(usize),

    /// A conditional branch no longer fits in its signed 16-bit relative offset
    BranchOffsetOverflow {
        from: usize,
        to: usize,
    },

    /// A jump target has no stack map frame
    MissingFrame(usize),

    /// Two frames claim the same offset
    ConflictingFrames(usize),

    /// Loading a class literal needs `ldc` of a class constant, which older versions lack
    ClassLiteralUnavailable {
        major: u16,
    },
}

/// Broad classification of [`Error`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The input bytes are not a well-formed class file
    MalformedInput,

    /// Re-encoding could not uphold a structural invariant of the output
    EncodingInvariantViolation,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::IoError(_)
            | Error::Truncated(_)
            | Error::BadMagic(_)
            | Error::UnsupportedVersion { .. }
            | Error::TrailingBytes { .. }
            | Error::UnknownConstantTag { .. }
            | Error::BadConstantIndex { .. }
            | Error::InvalidModifiedUtf8(_)
            | Error::BadDescriptor(_)
            | Error::MalformedAttribute { .. }
            | Error::InvalidOpcode { .. }
            | Error::OffsetNotOnInstructionBoundary { .. } => ErrorClass::MalformedInput,

            Error::ConstantPoolOverflow { .. }
            | Error::Utf8ConstantTooLong(_)
            | Error::MethodCodeOverflow(_)
            | Error::BranchOffsetOverflow { .. }
            | Error::MissingFrame(_)
            | Error::ConflictingFrames(_)
            | Error::ClassLiteralUnavailable { .. } => ErrorClass::EncodingInvariantViolation,
        }
    }

    pub(crate) fn malformed_attribute(name: &'static str, reason: impl Into<String>) -> Error {
        Error::MalformedAttribute {
            name,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated("unexpected end of input")
        } else {
            Error::IoError(err)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "i/o error: {}", err),
            Error::Truncated(context) => write!(f, "truncated input: {}", context),
            Error::BadMagic(magic) => write!(f, "bad magic number {:02X?}", magic),
            Error::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported class file version {}.{}", major, minor)
            }
            Error::TrailingBytes { context, remaining } => {
                write!(f, "{} trailing bytes after {}", remaining, context)
            }
            Error::UnknownConstantTag { tag, index } => {
                write!(f, "unknown constant tag {} at #{}", tag, index.0)
            }
            Error::BadConstantIndex { index, expected } => {
                write!(f, "constant #{} is not a valid {}", index.0, expected)
            }
            Error::InvalidModifiedUtf8(index) => {
                write!(f, "constant #{} is not valid modified UTF-8", index.0)
            }
            Error::BadDescriptor(desc) => write!(f, "bad descriptor: {}", desc),
            Error::MalformedAttribute { name, reason } => {
                write!(f, "malformed {} attribute: {}", name, reason)
            }
            Error::InvalidOpcode { opcode, offset } => {
                write!(f, "invalid opcode 0x{:02x} at offset {}", opcode, offset)
            }
            Error::OffsetNotOnInstructionBoundary { context, offset } => {
                write!(f, "{} offset {} is not an instruction boundary", context, offset)
            }
            Error::ConstantPoolOverflow { offset, .. } => {
                write!(f, "constant pool overflow at #{}", offset)
            }
            Error::Utf8ConstantTooLong(len) => {
                write!(f, "string constant is {} bytes (limit 65535)", len)
            }
            Error::MethodCodeOverflow(len) => {
                write!(f, "method code is {} bytes (limit 65535)", len)
            }
            Error::BranchOffsetOverflow { from, to } => {
                write!(f, "branch from {} to {} does not fit in 16 bits", from, to)
            }
            Error::MissingFrame(offset) => write!(f, "no stack map frame at offset {}", offset),
            Error::ConflictingFrames(offset) => {
                write!(f, "conflicting stack map frames at offset {}", offset)
            }
            Error::ClassLiteralUnavailable { major } => write!(
                f,
                "class file version {} cannot load class literals (needs 49)",
                major
            ),
        }
    }
}

impl std::error::Error for Error {}
