use crate::config::{Check, Configuration, MessageContext};
use crate::jvm::class_file::{ConstantsPool, Version};
use crate::jvm::code::{BranchInstruction, CodeElement, EqComparison, Instruction, OrdComparison};
use crate::jvm::{
    BinaryName, ClassConstantIndex, Error, MethodRefConstantIndex, Name, StringConstantIndex,
    UnqualifiedName,
};
use crate::model::{Method, Parameter};

/// Null check of one parameter at method entry
///
/// ```text
/// aload <slot>
/// ifnonnull <next>
/// new <exception>
/// dup
/// ldc <message>
/// invokespecial <exception>.<init>
/// athrow
/// next:
/// ```
///
/// A conditional assertion is only checked when assertions are enabled for the class, so it
/// starts with:
///
/// ```text
/// ldc <this class>
/// invokevirtual java/lang/Class.desiredAssertionStatus()Z
/// ifeq <next>
/// ```
///
/// The stack is empty before and after, and holds at most three values in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardInstruction {
    /// Index of the guarded parameter
    pub parameter: usize,
    pub slot: u16,
    pub exception: ClassConstantIndex,
    pub constructor: MethodRefConstantIndex,
    pub message: StringConstantIndex,
    pub assertion_status: Option<AssertionStatus>,
}

/// Constants for asking whether assertions are enabled for the class being patched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssertionStatus {
    pub class: ClassConstantIndex,
    pub desired_assertion_status: MethodRefConstantIndex,
}

impl GuardInstruction {
    /// Number of code elements in an unconditional guard
    pub const LENGTH: usize = 7;

    /// Number of extra code elements when the guard depends on the assertion status
    pub const ASSERTION_STATUS_LENGTH: usize = 3;

    /// Deepest the operand stack gets
    pub const MAX_STACK: u16 = 3;

    /// Add the constants the guard needs
    ///
    /// There is no guard for [`Check::NoCheck`].
    pub fn synthesize(
        constants: &mut ConstantsPool,
        config: &Configuration,
        check: Check,
        class_name: &BinaryName,
        version: Version,
        method: &Method,
        parameter: &Parameter,
    ) -> Result<Option<GuardInstruction>, Error> {
        let exception_kind = match check.exception_kind() {
            Some(kind) => kind,
            None => return Ok(None),
        };
        let assertion_status = if check == Check::ConditionalAssertion {
            if !version.supports_class_literals() {
                return Err(Error::ClassLiteralUnavailable {
                    major: version.major_version,
                });
            }
            Some(AssertionStatus {
                class: constants.get_class(class_name.as_str())?,
                desired_assertion_status: constants.get_method_ref(
                    "java/lang/Class",
                    "desiredAssertionStatus",
                    "()Z",
                )?,
            })
        } else {
            None
        };

        let message = config.render_message(&MessageContext {
            parameter: &parameter.name,
            index: parameter.index,
            class: class_name.as_str(),
            method: &method.name,
            descriptor: &method.descriptor_string,
        });
        let exception_name = exception_kind.class_name();
        Ok(Some(GuardInstruction {
            parameter: parameter.index,
            slot: parameter.slot,
            exception: constants.get_class(exception_name.as_str())?,
            constructor: constants.get_method_ref(
                exception_name.as_str(),
                UnqualifiedName::INIT.as_str(),
                exception_kind.constructor_descriptor(),
            )?,
            message: constants.get_string(&message)?,
            assertion_status,
        }))
    }

    /// Number of code elements in this guard
    pub fn element_count(&self) -> usize {
        match self.assertion_status {
            Some(_) => GuardInstruction::LENGTH + GuardInstruction::ASSERTION_STATUS_LENGTH,
            None => GuardInstruction::LENGTH,
        }
    }

    /// Code elements of the guard, when it is placed at element index `start`
    pub fn elements(&self, start: usize) -> Vec<CodeElement<usize, usize>> {
        let next = start + self.element_count();
        let mut elements = Vec::with_capacity(self.element_count());
        if let Some(status) = &self.assertion_status {
            elements.push(Instruction::LdcClass(status.class).into());
            elements.push(Instruction::InvokeVirtual(status.desired_assertion_status).into());
            elements.push(BranchInstruction::If(OrdComparison::EQ, next).into());
        }
        let check: [CodeElement<usize, usize>; GuardInstruction::LENGTH] = [
            Instruction::ALoad(self.slot).into(),
            BranchInstruction::IfNull(EqComparison::NE, next).into(),
            Instruction::New(self.exception).into(),
            Instruction::Dup.into(),
            Instruction::Ldc(self.message).into(),
            Instruction::InvokeSpecial(self.constructor).into(),
            Instruction::AThrow.into(),
        ];
        elements.extend(check);
        elements
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ExceptionKind;
    use crate::jvm::code::layout_code;
    use crate::jvm::{FieldType, MethodAccessFlags, MethodDescriptor};
    use crate::model::NullnessMarks;

    fn rename() -> (Method, Parameter) {
        let parameter = Parameter {
            index: 0,
            slot: 1,
            name: "name".to_owned(),
            declared_type: FieldType::object(BinaryName::STRING),
            marks: NullnessMarks::NON_NULL,
            synthetic: false,
        };
        let method = Method {
            index: 0,
            name: "rename".to_owned(),
            descriptor: MethodDescriptor {
                parameters: vec![parameter.declared_type.clone()],
                return_type: None,
            },
            descriptor_string: "(Ljava/lang/String;)V".to_owned(),
            access_flags: MethodAccessFlags::PUBLIC,
            has_code: true,
            is_implicit: false,
            marks: NullnessMarks::empty(),
            parameters: vec![parameter.clone()],
        };
        (method, parameter)
    }

    fn widget() -> BinaryName {
        BinaryName::from_string("com/example/Widget".to_owned()).unwrap()
    }

    fn synthesize(
        constants: &mut ConstantsPool,
        check: Check,
        version: Version,
    ) -> Result<Option<GuardInstruction>, Error> {
        let (method, parameter) = rename();
        GuardInstruction::synthesize(
            constants,
            &Configuration::default(),
            check,
            &widget(),
            version,
            &method,
            &parameter,
        )
    }

    /// `new`, `dup`, `ldc`, `invokespecial`, `athrow`, then `return`
    fn throw_bytes(guard: &GuardInstruction) -> Vec<u8> {
        let exception = (guard.exception.0 .0).to_be_bytes();
        let constructor = (guard.constructor.0 .0).to_be_bytes();
        let message = guard.message.0 .0;
        let mut bytes = vec![0xbb, exception[0], exception[1], 0x59];
        if message <= 0xff {
            bytes.extend_from_slice(&[0x12, message as u8]);
        } else {
            bytes.extend_from_slice(&[0x13, (message >> 8) as u8, message as u8]);
        }
        bytes.extend_from_slice(&[0xb7, constructor[0], constructor[1], 0xbf, 0xb1]);
        bytes
    }

    #[test]
    fn guard_bytes() {
        let mut constants = ConstantsPool::new();
        let guard = synthesize(
            &mut constants,
            Check::Throw(ExceptionKind::IllegalArgument),
            Version::JAVA8,
        )
        .unwrap()
        .unwrap();
        assert_eq!(guard.element_count(), GuardInstruction::LENGTH);

        let mut elements = guard.elements(0);
        elements.push(Instruction::Verbatim(vec![0xb1]).into());
        let layout = layout_code(elements).unwrap();

        let mut expected = vec![0x2b, 0xc7, 0x00, 0x0d];
        expected.extend(throw_bytes(&guard));
        assert_eq!(layout.bytes, expected);
        assert_eq!(layout.offsets[GuardInstruction::LENGTH], 14);
    }

    #[test]
    fn conditional_assertion_asks_the_class_first() {
        let mut constants = ConstantsPool::new();
        let guard = synthesize(&mut constants, Check::ConditionalAssertion, Version::JAVA8)
            .unwrap()
            .unwrap();
        let status = guard.assertion_status.unwrap();
        assert_eq!(constants.class_name(status.class).unwrap(), "com/example/Widget");
        assert_eq!(constants.class_name(guard.exception).unwrap(), "java/lang/AssertionError");
        assert_eq!(guard.element_count(), 10);

        let mut elements = guard.elements(0);
        elements.push(Instruction::Verbatim(vec![0xb1]).into());
        let layout = layout_code(elements).unwrap();

        let class = status.class.0 .0;
        let status_method = status.desired_assertion_status.0 .0.to_be_bytes();
        assert!(class <= 0xff);
        let mut expected = vec![
            0x12,
            class as u8,
            0xb6,
            status_method[0],
            status_method[1],
            0x99,
            0x00,
            0x11,
            0x2b,
            0xc7,
            0x00,
            0x0d,
        ];
        expected.extend(throw_bytes(&guard));
        assert_eq!(layout.bytes, expected);
        assert_eq!(layout.offsets[guard.element_count()], 22);
    }

    #[test]
    fn no_check_means_no_guard() {
        let mut constants = ConstantsPool::new();
        assert!(matches!(
            synthesize(&mut constants, Check::NoCheck, Version::JAVA8),
            Ok(None)
        ));
        assert_eq!(constants.offset_len(), 1);
    }

    #[test]
    fn conditional_assertion_needs_class_literals() {
        let mut constants = ConstantsPool::new();
        let old = Version {
            minor_version: 0,
            major_version: 48,
        };
        assert!(matches!(
            synthesize(&mut constants, Check::ConditionalAssertion, old),
            Err(Error::ClassLiteralUnavailable { major: 48 })
        ));
    }
}
