//! Bytecode verification metadata
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ and the set of stack map frames for all possible jump targets in a method is the
//! _stack map table_. The "types" used in verification (represented using [`VerificationType`])
//! are slightly augmented to take into account initialization and null.
//!
//! Since inferring frames is potentially quite expensive (and is what the [verification by
//! type-checking][0] avoids the JVM having to do), nothing here infers frames. Instead, existing
//! frames are moved around using [`AbsoluteFrames`] when code is inserted, and new frames are only
//! ever added at points where the frame is known to equal the method's entry frame.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod stack_map;
mod types;

pub use stack_map::*;
pub use types::*;
