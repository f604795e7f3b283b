//! Add runtime null checks to compiled JVM classes
//!
//! Parameters that nullness annotations declare as non-null (directly, or through a
//! `@NullMarked` default on the method, an enclosing type, the package, or the module) get a
//! check at method entry that throws as soon as `null` is passed in. The checks are spliced into
//! the existing bytecode, so no recompilation is needed.
//!
//! The pieces, from the bottom up:
//!
//!   - [`jvm`] reads and writes class files, and relocates method bodies
//!   - [`model`] extracts methods, parameters, and nullness annotations from a decoded class
//!   - [`resolve`] works out the effective contract of each parameter
//!   - [`config`] describes which exception the checks throw and with what message
//!   - [`instrument`] puts everything together

pub mod config;
pub mod instrument;
pub mod jvm;
pub mod model;
pub mod resolve;
mod util;
