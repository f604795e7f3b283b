use super::unit::CAPTURED_VARIABLE_PREFIX;
use super::{NullnessAnnotations, NullnessMarks};
use crate::jvm::class_file::{
    ClassFile, Code, LocalVariableTable, MethodParameters, RuntimeInvisibleParameterAnnotations,
    RuntimeVisibleParameterAnnotations, TypeAnnotationTarget,
};
use crate::jvm::class_file::{find_attribute, Annotation};
use crate::jvm::{
    BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor, ParameterAccessFlags,
    ParseDescriptor, RefType, RenderDescriptor, UnqualifiedName,
};
use crate::jvm::{BaseType, Name};

/// Method declared in a compiled unit
#[derive(Debug, Clone)]
pub struct Method {
    /// Position of the method in the class file
    pub index: usize,
    pub name: String,
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Descriptor as written in the class file
    pub descriptor_string: String,
    pub access_flags: MethodAccessFlags,

    /// Whether there is a `Code` attribute
    pub has_code: bool,

    /// Method the compiler generated in place of a source declaration (eg. a record's `equals`)
    pub is_implicit: bool,

    /// Annotations directly on the method
    pub marks: NullnessMarks,
    pub parameters: Vec<Parameter>,
}

/// Parameter of a method, as declared by its descriptor
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Position in the descriptor
    pub index: usize,

    /// Local variable slot holding the parameter on method entry
    pub slot: u16,

    /// Best known name (falls back to `arg<index>`)
    pub name: String,
    pub declared_type: FieldType<BinaryName>,

    /// Annotations directly on the parameter
    pub marks: NullnessMarks,

    /// Parameter inserted by the compiler rather than written in source
    pub synthetic: bool,
}

impl Parameter {
    pub fn is_reference(&self) -> bool {
        self.declared_type.is_reference()
    }
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT.as_str()
    }

    /// Synthetic and bridge methods are generated by the compiler and never get guards
    pub fn is_synthetic(&self) -> bool {
        self.access_flags
            .intersects(MethodAccessFlags::SYNTHETIC | MethodAccessFlags::BRIDGE)
    }

    pub fn is_public(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PUBLIC)
    }

    /// Name and descriptor (eg. `norm(Ljava/lang/String;)I`)
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor_string)
    }
}

/// What needs to be known about the declaring type to interpret its methods' parameters
#[derive(Debug, Clone, Default)]
pub struct DeclaringType {
    /// Type of the enclosing instance passed to constructors of inner classes
    pub outer_instance: Option<BinaryName>,

    /// Enum constructors get the constant's name and ordinal first
    pub is_enum: bool,

    pub is_record: bool,

    /// Descriptor and annotations of each record component, in order
    pub record_components: Option<Vec<(String, NullnessMarks)>>,

    /// Local or anonymous class (one with an `EnclosingMethod`)
    pub is_local: bool,

    /// Anonymous classes have no constructor in source at all
    pub is_anonymous: bool,

    /// Local variables captured by a local or anonymous class
    pub captured_variables: usize,
}

/// Read one method (along with its parameters) from a class
pub fn read_method(
    class: &ClassFile,
    index: usize,
    declaring: &DeclaringType,
    known: &NullnessAnnotations,
) -> Result<Method, Error> {
    let constants = &class.constants;
    let method = &class.methods[index];
    let name = constants.utf8(method.name_index)?;
    let descriptor_string = constants.utf8(method.descriptor_index)?;
    let descriptor = MethodDescriptor::<BinaryName>::parse(&descriptor_string)?;

    let mut model = Method {
        index,
        name,
        descriptor_string,
        access_flags: method.access_flags,
        has_code: false,
        is_implicit: false,
        marks: known.declaration_marks(&method.attributes, constants)?,
        parameters: vec![],
        descriptor,
    };
    let code: Option<Code> = method.attribute(constants)?;
    model.has_code = code.is_some();
    model.is_implicit = declaring.is_record
        && model.signature() == RECORD_EQUALS
        && code.as_ref().map_or(false, is_object_methods_call);
    let variables: Option<LocalVariableTable> = match &code {
        Some(code) => find_attribute(&code.attributes, constants)?,
        None => None,
    };
    let entry_name = |slot: u16| -> Result<Option<String>, Error> {
        match variables
            .iter()
            .flat_map(|table| &table.0)
            .find(|var| var.index == slot && var.start_pc.0 == 0)
        {
            Some(entry) => constants.utf8(entry.name_index).map(Some),
            None => Ok(None),
        }
    };

    let slots = model.descriptor.parameter_slots(!model.is_static());
    let mut parameters: Vec<Parameter> = model
        .descriptor
        .parameters
        .iter()
        .zip(slots)
        .enumerate()
        .map(|(index, (declared_type, slot))| Parameter {
            index,
            slot,
            name: format!("arg{}", index),
            declared_type: declared_type.clone(),
            marks: NullnessMarks::empty(),
            synthetic: false,
        })
        .collect();

    // Synthetic parameters
    let method_parameters: Option<MethodParameters> = method
        .attribute(constants)?
        .filter(|table: &MethodParameters| table.0.len() == parameters.len());
    if let Some(table) = &method_parameters {
        for (parameter, entry) in parameters.iter_mut().zip(&table.0) {
            parameter.synthetic = entry
                .access_flags
                .intersects(ParameterAccessFlags::SYNTHETIC | ParameterAccessFlags::MANDATED);
        }
    } else if model.is_constructor() {
        let mut names = Vec::with_capacity(parameters.len());
        for parameter in &parameters {
            names.push(entry_name(parameter.slot)?);
        }
        mark_implicit_constructor_parameters(&mut parameters, &names, declaring);
    }

    // Parameter annotations only cover the parameters written in source, which start after
    // the leading implicit ones
    let visible: Option<RuntimeVisibleParameterAnnotations> = method.attribute(constants)?;
    let invisible: Option<RuntimeInvisibleParameterAnnotations> = method.attribute(constants)?;
    for (table, attribute_name) in [
        (visible.map(|v| v.0), "RuntimeVisibleParameterAnnotations"),
        (invisible.map(|i| i.0), "RuntimeInvisibleParameterAnnotations"),
    ] {
        if let Some(table) = table {
            let source_end =
                apply_parameter_annotations(&mut parameters, &table, attribute_name, known, class)?;

            // Whatever follows the source parameters of a local class constructor was captured
            if method_parameters.is_none() && model.is_constructor() && declaring.is_local {
                for parameter in &mut parameters[source_end..] {
                    parameter.synthetic = true;
                }
            }
        }
    }

    // Type annotations on formal parameters skip the leading implicit parameters
    let leading_synthetic = parameters.iter().take_while(|p| p.synthetic).count();
    for parameter in parameters.iter_mut() {
        if parameter.index < leading_synthetic {
            continue;
        }
        let formal_index = parameter.index - leading_synthetic;
        parameter.marks |= known.type_annotation_marks(&method.attributes, constants, |a| {
            a.target == TypeAnnotationTarget::FormalParameter(formal_index as u8)
        })?;
    }

    // Canonical record constructor picks up the component annotations
    if let Some(components) = &declaring.record_components {
        let is_canonical = model.is_constructor()
            && components.len() == parameters.len()
            && components
                .iter()
                .zip(&model.descriptor.parameters)
                .all(|((descriptor, _), parameter)| *descriptor == parameter.render());
        if is_canonical {
            for (parameter, (_, marks)) in parameters.iter_mut().zip(components) {
                parameter.marks |= *marks;
            }
        }
    }

    // Names
    if let Some(table) = &method_parameters {
        for (parameter, entry) in parameters.iter_mut().zip(&table.0) {
            if entry.name_index.0 .0 != 0 {
                parameter.name = constants.utf8(entry.name_index)?;
            }
        }
    }
    let named_by_table = method_parameters.as_ref().map_or(false, |table| {
        table.0.iter().all(|entry| entry.name_index.0 .0 != 0)
    });
    if !named_by_table {
        for parameter in parameters.iter_mut() {
            if let Some(name) = entry_name(parameter.slot)? {
                parameter.name = name;
            }
        }
    }

    for parameter in parameters.iter_mut() {
        parameter.marks = parameter.marks.parameter_marks();
    }
    model.parameters = parameters;
    Ok(model)
}

/// Name and descriptor of the `equals` that records get when they don't declare one
const RECORD_EQUALS: &str = "equals(Ljava/lang/Object;)Z";

/// Is the body `aload_0; aload_1; invokedynamic; ireturn`?
///
/// That is the shape of the record methods javac delegates to `ObjectMethods.bootstrap`.
fn is_object_methods_call(code: &Code) -> bool {
    matches!(
        code.code_array.0.as_slice(),
        [0x2a, 0x2b, 0xba, _, _, 0, 0, 0xac]
    )
}

/// Does the local variable name mark a parameter as compiler generated (`this$0`, `val$x`)?
fn is_synthetic_name(name: &str) -> bool {
    let outer_instance = name
        .strip_prefix("this$")
        .map_or(false, |rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()));
    outer_instance || name.starts_with(CAPTURED_VARIABLE_PREFIX)
}

/// Without a `MethodParameters` attribute, recognise the parameters javac adds to constructors
///
/// `names` has the local variable name (if known) of each parameter.
fn mark_implicit_constructor_parameters(
    parameters: &mut [Parameter],
    names: &[Option<String>],
    declaring: &DeclaringType,
) {
    if declaring.is_anonymous {
        for parameter in parameters.iter_mut() {
            parameter.synthetic = true;
        }
        return;
    }
    for (parameter, name) in parameters.iter_mut().zip(names) {
        if name.as_deref().map_or(false, is_synthetic_name) {
            parameter.synthetic = true;
        }
    }
    if let Some(outer) = &declaring.outer_instance {
        if let Some(first) = parameters.first_mut() {
            if first.declared_type == FieldType::Ref(RefType::Object(outer.clone())) {
                first.synthetic = true;
            }
        }
    }
    if declaring.is_enum {
        if let [name, ordinal, ..] = parameters {
            if name.declared_type == FieldType::object(BinaryName::STRING)
                && ordinal.declared_type == FieldType::Base(BaseType::Int)
            {
                name.synthetic = true;
                ordinal.synthetic = true;
            }
        }
    }
    if declaring.is_local {
        let leading = parameters.iter().take_while(|p| p.synthetic).count();
        let captured = declaring
            .captured_variables
            .min(parameters.len() - leading);
        let len = parameters.len();
        for parameter in &mut parameters[len - captured..] {
            parameter.synthetic = true;
        }
    }
}

/// Merge one parameter annotations attribute into the parameters
///
/// The table either covers every parameter, or only those after the leading implicit ones.
/// Returns the index of the first parameter past those covered.
fn apply_parameter_annotations(
    parameters: &mut [Parameter],
    table: &[Vec<Annotation>],
    attribute_name: &'static str,
    known: &NullnessAnnotations,
    class: &ClassFile,
) -> Result<usize, Error> {
    if table.len() > parameters.len() {
        return Err(Error::malformed_attribute(
            attribute_name,
            format!(
                "{} entries for {} parameters",
                table.len(),
                parameters.len()
            ),
        ));
    }
    let skipped = if table.len() == parameters.len() {
        0
    } else {
        let leading = parameters.iter().take_while(|p| p.synthetic).count();
        leading.min(parameters.len() - table.len())
    };
    for (parameter, annotations) in parameters[skipped..].iter_mut().zip(table) {
        parameter.marks |= known.marks_of(annotations, &class.constants)?;
    }
    Ok(skipped + table.len())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{
        Attribute, BytecodeArray, BytecodeIndex, ConstantsPool, LocalVariable,
        Method as ClassMethod, MethodParameter, Version,
    };
    use crate::jvm::{ClassAccessFlags, Utf8ConstantIndex};

    const NON_NULL: &str = "Lorg/jspecify/annotations/NonNull;";

    fn class_with_method(
        name: &str,
        descriptor: &str,
        access_flags: MethodAccessFlags,
        attributes: impl FnOnce(&mut ConstantsPool) -> Vec<Attribute>,
    ) -> ClassFile {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class("com/example/Outer$Inner").unwrap();
        let super_class = constants.get_class("java/lang/Object").unwrap();
        let name_index = constants.get_utf8(name).unwrap();
        let descriptor_index = constants.get_utf8(descriptor).unwrap();
        let attributes = attributes(&mut constants);
        ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![ClassMethod {
                access_flags,
                name_index,
                descriptor_index,
                attributes,
            }],
            attributes: vec![],
        }
    }

    fn non_null_entries(constants: &mut ConstantsPool, entries: usize) -> Attribute {
        let annotation = Annotation {
            type_index: constants.get_utf8(NON_NULL).unwrap(),
            element_value_pairs: vec![],
        };
        let table = RuntimeVisibleParameterAnnotations(vec![vec![annotation]; entries]);
        constants.get_attribute(&table).unwrap()
    }

    fn code(constants: &mut ConstantsPool, body: Vec<u8>, variables: &[(&str, &str, u16)]) -> Attribute {
        let variables: Vec<LocalVariable> = variables
            .iter()
            .map(|(name, descriptor, index)| LocalVariable {
                start_pc: BytecodeIndex(0),
                length: body.len() as u16,
                name_index: constants.get_utf8(name).unwrap(),
                descriptor_index: constants.get_utf8(descriptor).unwrap(),
                index: *index,
            })
            .collect();
        let mut attributes = vec![];
        if !variables.is_empty() {
            attributes.push(constants.get_attribute(&LocalVariableTable(variables)).unwrap());
        }
        let code = Code {
            max_stack: 2,
            max_locals: 4,
            code_array: BytecodeArray(body),
            exception_table: vec![],
            attributes,
        };
        constants.get_attribute(&code).unwrap()
    }

    fn synthetic(method: &Method) -> Vec<bool> {
        method.parameters.iter().map(|p| p.synthetic).collect()
    }

    fn outer() -> Option<BinaryName> {
        Some(BinaryName::from_string("com/example/Outer".to_owned()).unwrap())
    }

    fn read(class: &ClassFile, declaring: &DeclaringType) -> Result<Method, Error> {
        read_method(class, 0, declaring, &NullnessAnnotations::default())
    }

    #[test]
    fn slots_and_default_names() {
        let class = class_with_method(
            "mix",
            "(JILjava/lang/String;)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            |_| vec![],
        );
        let method = read(&class, &DeclaringType::default()).unwrap();
        assert!(!method.has_code);
        assert_eq!(method.signature(), "mix(JILjava/lang/String;)V");
        let summary: Vec<_> = method
            .parameters
            .iter()
            .map(|p| (p.slot, p.name.as_str(), p.is_reference()))
            .collect();
        assert_eq!(
            summary,
            vec![(1, "arg0", false), (3, "arg1", false), (4, "arg2", true)]
        );
    }

    #[test]
    fn inner_class_constructor_skips_outer_instance() {
        let class = class_with_method(
            "<init>",
            "(Lcom/example/Outer;Ljava/lang/String;)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            |constants| vec![non_null_entries(constants, 1)],
        );
        let declaring = DeclaringType {
            outer_instance: Some(BinaryName::from_string("com/example/Outer".to_owned()).unwrap()),
            ..DeclaringType::default()
        };
        let method = read(&class, &declaring).unwrap();
        assert!(method.is_constructor());
        assert!(method.parameters[0].synthetic);
        assert!(method.parameters[0].marks.is_empty());
        assert!(!method.parameters[1].synthetic);
        assert_eq!(method.parameters[1].marks, NullnessMarks::NON_NULL);
    }

    #[test]
    fn enum_constructor_skips_name_and_ordinal() {
        let class = class_with_method(
            "<init>",
            "(Ljava/lang/String;ILjava/lang/Object;)V",
            MethodAccessFlags::PRIVATE | MethodAccessFlags::ABSTRACT,
            |constants| vec![non_null_entries(constants, 1)],
        );
        let declaring = DeclaringType {
            is_enum: true,
            ..DeclaringType::default()
        };
        let method = read(&class, &declaring).unwrap();
        let synthetic: Vec<bool> = method.parameters.iter().map(|p| p.synthetic).collect();
        assert_eq!(synthetic, vec![true, true, false]);
        assert_eq!(method.parameters[2].marks, NullnessMarks::NON_NULL);
    }

    #[test]
    fn names_come_from_method_parameters() {
        let class = class_with_method(
            "open",
            "(Ljava/lang/String;Ljava/lang/String;)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            |constants| {
                let table = MethodParameters(vec![
                    MethodParameter {
                        name_index: constants.get_utf8("path").unwrap(),
                        access_flags: ParameterAccessFlags::empty(),
                    },
                    MethodParameter {
                        name_index: Utf8ConstantIndex(crate::jvm::ConstantIndex(0)),
                        access_flags: ParameterAccessFlags::empty(),
                    },
                ]);
                vec![constants.get_attribute(&table).unwrap()]
            },
        );
        let method = read(&class, &DeclaringType::default()).unwrap();
        assert_eq!(method.parameters[0].name, "path");
        assert_eq!(method.parameters[1].name, "arg1");
    }

    #[test]
    fn too_many_parameter_annotations() {
        let class = class_with_method(
            "open",
            "(Ljava/lang/String;)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            |constants| vec![non_null_entries(constants, 2)],
        );
        assert!(matches!(
            read(&class, &DeclaringType::default()),
            Err(Error::MalformedAttribute {
                name: "RuntimeVisibleParameterAnnotations",
                ..
            })
        ));
    }

    #[test]
    fn local_class_annotations_skip_outer_instance_and_captures() {
        // `class Local { Local(@NonNull String a, String b) }` capturing one variable
        let class = class_with_method(
            "<init>",
            "(Lcom/example/Outer;Ljava/lang/String;Ljava/lang/String;Ljava/lang/Object;)V",
            MethodAccessFlags::ABSTRACT,
            |constants| {
                let annotation = Annotation {
                    type_index: constants.get_utf8(NON_NULL).unwrap(),
                    element_value_pairs: vec![],
                };
                let table = RuntimeVisibleParameterAnnotations(vec![vec![annotation], vec![]]);
                vec![constants.get_attribute(&table).unwrap()]
            },
        );
        let declaring = DeclaringType {
            outer_instance: outer(),
            is_local: true,
            captured_variables: 1,
            ..DeclaringType::default()
        };
        let method = read(&class, &declaring).unwrap();
        assert_eq!(synthetic(&method), vec![true, false, false, true]);
        let marks: Vec<_> = method.parameters.iter().map(|p| p.marks).collect();
        assert_eq!(
            marks,
            vec![
                NullnessMarks::empty(),
                NullnessMarks::NON_NULL,
                NullnessMarks::empty(),
                NullnessMarks::empty()
            ]
        );
    }

    #[test]
    fn captured_variables_are_synthetic() {
        // Local class declared in a static method, so there is no outer instance
        let class = class_with_method(
            "<init>",
            "(Ljava/lang/String;Ljava/lang/Object;Ljava/lang/Object;)V",
            MethodAccessFlags::ABSTRACT,
            |_| vec![],
        );
        let declaring = DeclaringType {
            is_local: true,
            captured_variables: 2,
            ..DeclaringType::default()
        };
        let method = read(&class, &declaring).unwrap();
        assert_eq!(synthetic(&method), vec![false, true, true]);
    }

    #[test]
    fn compiler_generated_names_mark_synthetic_parameters() {
        let class = class_with_method(
            "<init>",
            "(Lcom/example/Outer;Ljava/lang/String;Ljava/lang/Object;)V",
            MethodAccessFlags::empty(),
            |constants| {
                let variables = [
                    ("this", "Lcom/example/Outer$Inner;", 0),
                    ("this$0", "Lcom/example/Outer;", 1),
                    ("label", "Ljava/lang/String;", 2),
                    ("val$seed", "Ljava/lang/Object;", 3),
                ];
                vec![code(constants, vec![0xb1], &variables)]
            },
        );
        let method = read(&class, &DeclaringType::default()).unwrap();
        assert_eq!(synthetic(&method), vec![true, false, true]);
        let names: Vec<_> = method.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["this$0", "label", "val$seed"]);
    }

    #[test]
    fn anonymous_class_constructor_is_all_synthetic() {
        let class = class_with_method(
            "<init>",
            "(Lcom/example/Outer;Ljava/lang/String;)V",
            MethodAccessFlags::ABSTRACT,
            |_| vec![],
        );
        let declaring = DeclaringType {
            outer_instance: outer(),
            is_local: true,
            is_anonymous: true,
            ..DeclaringType::default()
        };
        let method = read(&class, &declaring).unwrap();
        assert_eq!(synthetic(&method), vec![true, true]);
    }

    #[test]
    fn implicit_record_equals() {
        let record = DeclaringType {
            is_record: true,
            ..DeclaringType::default()
        };
        let equals = |body: Vec<u8>| {
            class_with_method(
                "equals",
                "(Ljava/lang/Object;)Z",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL,
                |constants| vec![code(constants, body, &[])],
            )
        };
        let generated = equals(vec![0x2a, 0x2b, 0xba, 0x00, 0x07, 0x00, 0x00, 0xac]);
        assert!(read(&generated, &record).unwrap().is_implicit);
        assert!(!read(&generated, &DeclaringType::default()).unwrap().is_implicit);

        // iconst_1; ireturn
        let written = equals(vec![0x04, 0xac]);
        assert!(!read(&written, &record).unwrap().is_implicit);
    }
}
