use crate::jvm;
use crate::jvm::ErrorClass;
use crate::resolve::ContractConflict;
use std::fmt;

/// Kinds of problems reported for a unit
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Unit could not be decoded (unit left untouched)
    MalformedInput,

    /// Contradictory nullness annotations (method left untouched)
    ContractConflict,

    /// Patched output would have been invalid (unit left untouched)
    EncodingInvariantViolation,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::MalformedInput => "malformed input",
            DiagnosticKind::ContractConflict => "contract conflict",
            DiagnosticKind::EncodingInvariantViolation => "encoding invariant violation",
        })
    }
}

#[derive(Debug)]
pub enum Error {
    MalformedInput(jvm::Error),
    ContractConflict(ContractConflict),
    EncodingInvariantViolation(jvm::Error),
}

impl Error {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Error::MalformedInput(_) => DiagnosticKind::MalformedInput,
            Error::ContractConflict(_) => DiagnosticKind::ContractConflict,
            Error::EncodingInvariantViolation(_) => DiagnosticKind::EncodingInvariantViolation,
        }
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        match err.class() {
            ErrorClass::MalformedInput => Error::MalformedInput(err),
            ErrorClass::EncodingInvariantViolation => Error::EncodingInvariantViolation(err),
        }
    }
}

impl From<ContractConflict> for Error {
    fn from(conflict: ContractConflict) -> Error {
        Error::ContractConflict(conflict)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInput(err) | Error::EncodingInvariantViolation(err) => err.fmt(f),
            Error::ContractConflict(conflict) => conflict.fmt(f),
        }
    }
}

impl std::error::Error for Error {}
