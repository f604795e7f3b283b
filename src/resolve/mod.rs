//! Effective nullness contracts of parameters
//!
//! The contract of a parameter comes from the nearest declaration that says anything about it.
//! Sources are tried in order, first match wins:
//!
//!   1. primitive parameters can't be `null`
//!   2. compiler generated parameters (enclosing instance, enum name and ordinal) are left alone
//!   3. a nullness annotation on the parameter itself
//!   4. a default declared on the method
//!   5. a default declared on the declaring type, then on each enclosing type
//!   6. a default declared on the package (`package-info`)
//!   7. a default declared on the module (`module-info`)
//!
//! A null-marked default makes the parameter required, while a null-unmarked one stops the
//! search.

mod contract;
mod scopes;

pub use contract::*;
pub use scopes::*;
