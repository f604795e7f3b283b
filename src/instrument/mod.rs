//! Inserting null guards into compiled units
//!
//! [`instrument`] handles a single decoded unit against an already built [`ScopeIndex`], and
//! [`instrument_batch`] does the whole job for a set of class files: decode everything, index the
//! type, package and module defaults, then instrument every unit in parallel.
//!
//! Each unit gets a [`Report`] listing the guards that were added along with any
//! [`Diagnostic`]s. Problems come in three kinds (see [`DiagnosticKind`]), and only
//! [`DiagnosticKind::ContractConflict`] still lets the rest of the unit be instrumented.
//!
//! [`ScopeIndex`]: crate::resolve::ScopeIndex

mod batch;
mod engine;
mod errors;
mod guard;
mod report;
mod splice;

pub use batch::*;
pub use engine::*;
pub use errors::*;
pub use guard::*;
pub use report::*;
pub use splice::*;
