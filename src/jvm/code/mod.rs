//! Bytecode representation and relocation
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for instructions without jump offsets (kept as raw bytes when decoded)
//!   - [`BranchInstruction`] for instructions whose operands are relative jump offsets
//!
//! A method body is then an [`OffsetVec`](crate::util::OffsetVec) of [`CodeElement`]s, where
//! jump targets refer to other elements by index rather than by offset. That makes it possible to
//! insert instructions and then recompute every offset with [`layout_code`].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod decode;
mod instruction;
mod layout;

pub use decode::*;
pub use instruction::*;
pub use layout::*;
