//! In-memory view of compiled units and their nullness annotations
//!
//! A [`CompiledUnit`] wraps a decoded class file along with the parts that matter for deciding
//! which parameters need guards: the methods and their parameters, the nullness annotations
//! directly attached to each declaration, and the types lexically enclosing the unit. Where the
//! annotations come from in the class file (declaration annotations, parameter annotations, type
//! annotations, record components) is only a concern here.

mod method;
mod nullness;
mod unit;

pub use method::*;
pub use nullness::*;
pub use unit::*;
