//! Read and rewrite JVM classes
//!
//! Everything here works on the raw [`class` file format][0]: a class is decoded into a
//! [`class_file::ClassFile`], which keeps the constant pool and every attribute exactly as found,
//! so that writing it back out again produces the same bytes. Only the pieces that need to be
//! understood get decoded further:
//!
//!   - [`code`] turns a method body into instructions whose jump targets are element indices,
//!     so instructions can be inserted and the body re-encoded
//!
//!   - [`verifier`] tracks stack map frames by absolute offset, so they can follow the
//!     instructions they describe
//!
//! ### Simple example
//!
//! Listing the methods of a class:
//!
//! ```
//! use nullguard::jvm::class_file::{ClassFile, ConstantsPool, Method, Version};
//! use nullguard::jvm::*;
//!
//! # fn list_methods() -> Result<(), Error> {
//! # let mut constants = ConstantsPool::new();
//! # let this_class = constants.get_class("me/alec/Point")?;
//! # let super_class = constants.get_class("java/lang/Object")?;
//! # let name_index = constants.get_utf8("norm")?;
//! # let descriptor_index = constants.get_utf8("(Ljava/lang/String;J)I")?;
//! # let bytes = ClassFile {
//! #     version: Version::JAVA8,
//! #     constants,
//! #     access_flags: ClassAccessFlags::PUBLIC,
//! #     this_class,
//! #     super_class,
//! #     interfaces: vec![],
//! #     fields: vec![],
//! #     methods: vec![Method {
//! #         access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
//! #         name_index,
//! #         descriptor_index,
//! #         attributes: vec![],
//! #     }],
//! #     attributes: vec![],
//! # }.encode();
//! let class = ClassFile::decode(&bytes)?;
//! assert_eq!(class.name()?.as_str(), "me/alec/Point");
//!
//! for method in &class.methods {
//!     let name = class.constants.utf8(method.name_index)?;
//!     let descriptor = class.constants.utf8(method.descriptor_index)?;
//!     let descriptor = MethodDescriptor::<BinaryName>::parse(&descriptor)?;
//!
//!     // `this` in slot 0, then the string in 1 and the long in 2 and 3
//!     assert_eq!(name, "norm");
//!     assert_eq!(descriptor.parameter_slots(true), vec![1, 2]);
//! }
//!
//! // Re-encoding an untouched class gives back the same bytes
//! assert_eq!(class.encode(), bytes);
//! # Ok(())
//! # }
//! # list_methods().unwrap();
//! ```
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use class_file::{
    ClassConstantIndex, Constant, ConstantIndex, MethodRefConstantIndex,
    NameAndTypeConstantIndex, StringConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
