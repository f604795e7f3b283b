//! Assembling class files in memory for tests
#![allow(dead_code)]

use nullguard::instrument::{instrument_batch, BatchEntry, UnitInput};
use nullguard::jvm::class_file::{
    Annotation, Attribute, BytecodeArray, ClassFile, Code, ConstantsPool, InnerClass, InnerClasses,
    Method, RuntimeVisibleAnnotations, RuntimeVisibleParameterAnnotations, StackMapFrame, StackMapTable,
    Version,
};
use nullguard::jvm::{
    BinaryName, ClassAccessFlags, ClassConstantIndex, ConstantIndex, InnerClassAccessFlags,
    MethodAccessFlags, MethodDescriptor, ParseDescriptor, Utf8ConstantIndex,
};
use nullguard::config::Configuration;

pub const NON_NULL: &str = "org/jspecify/annotations/NonNull";
pub const NULLABLE: &str = "org/jspecify/annotations/Nullable";
pub const NULL_MARKED: &str = "org/jspecify/annotations/NullMarked";
pub const NULL_UNMARKED: &str = "org/jspecify/annotations/NullUnmarked";

pub struct ClassBuilder {
    name: String,
    version: Version,
    access_flags: ClassAccessFlags,
    super_class: Option<&'static str>,
    nested_in: Option<(&'static str, InnerClassAccessFlags)>,
    annotations: Vec<&'static str>,
    methods: Vec<MethodBuilder>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_owned(),
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            super_class: Some("java/lang/Object"),
            nested_in: None,
            annotations: vec![],
            methods: vec![],
        }
    }

    /// `package-info` of a package, with the given annotations
    pub fn package_info(package: &str, annotations: &[&'static str]) -> Vec<u8> {
        let mut builder = ClassBuilder::new(&format!("{}/package-info", package));
        builder.access_flags =
            ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT | ClassAccessFlags::SYNTHETIC;
        builder.annotations = annotations.to_vec();
        builder.build()
    }

    /// `module-info` with the given annotations
    pub fn module_info(annotations: &[&'static str]) -> Vec<u8> {
        let mut builder = ClassBuilder::new("module-info");
        builder.version = Version::JAVA17;
        builder.access_flags = ClassAccessFlags::MODULE;
        builder.super_class = None;
        builder.annotations = annotations.to_vec();
        builder.build()
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn access(mut self, access_flags: ClassAccessFlags) -> Self {
        self.access_flags = access_flags;
        self
    }

    pub fn extends(mut self, super_class: &'static str) -> Self {
        self.super_class = Some(super_class);
        self
    }

    /// Member class of `outer`, with these flags in its own `InnerClasses` entry
    pub fn nested_in(mut self, outer: &'static str, access_flags: InnerClassAccessFlags) -> Self {
        self.nested_in = Some((outer, access_flags));
        self
    }

    pub fn annotate(mut self, annotation: &'static str) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class(&self.name).unwrap();
        let super_class = match self.super_class {
            Some(name) => constants.get_class(name).unwrap(),
            None => ClassConstantIndex(ConstantIndex(0)),
        };
        let mut attributes = vec![];
        if !self.annotations.is_empty() {
            let annotations = RuntimeVisibleAnnotations(annotations(&mut constants, &self.annotations));
            attributes.push(constants.get_attribute(&annotations).unwrap());
        }
        if let Some((outer, access_flags)) = self.nested_in {
            let simple_name = self.name.rsplit('$').next().unwrap();
            let entry = InnerClass {
                inner_class: this_class,
                outer_class: constants.get_class(outer).unwrap(),
                inner_name: constants.get_utf8(simple_name).unwrap(),
                access_flags,
            };
            let inner_classes = InnerClasses(vec![entry]);
            attributes.push(constants.get_attribute(&inner_classes).unwrap());
        }
        let methods = self
            .methods
            .into_iter()
            .map(|method| method.build(&mut constants))
            .collect();
        ClassFile {
            version: self.version,
            constants,
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods,
            attributes,
        }
        .encode()
    }
}

fn annotations(constants: &mut ConstantsPool, names: &[&str]) -> Vec<Annotation> {
    names
        .iter()
        .map(|name| Annotation {
            type_index: constants.get_utf8(&format!("L{};", name)).unwrap(),
            element_value_pairs: vec![],
        })
        .collect()
}

pub struct MethodBuilder {
    name: String,
    descriptor: String,
    access_flags: MethodAccessFlags,
    annotations: Vec<&'static str>,
    parameter_annotations: Vec<Vec<&'static str>>,
    code: Option<Vec<u8>>,
    stack_map: Option<Vec<StackMapFrame>>,
}

impl MethodBuilder {
    /// Public method whose body is just `return`
    pub fn new(name: &str, descriptor: &str) -> MethodBuilder {
        MethodBuilder {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access_flags: MethodAccessFlags::PUBLIC,
            annotations: vec![],
            parameter_annotations: vec![],
            code: Some(vec![0xb1]),
            stack_map: None,
        }
    }

    pub fn access(mut self, access_flags: MethodAccessFlags) -> Self {
        self.access_flags = access_flags;
        if access_flags.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE) {
            self.code = None;
        }
        self
    }

    pub fn annotate(mut self, annotation: &'static str) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Annotate the parameter at this index
    pub fn parameter(mut self, index: usize, annotation: &'static str) -> Self {
        let count = self.descriptor().parameters.len();
        self.parameter_annotations.resize(count, vec![]);
        self.parameter_annotations[index].push(annotation);
        self
    }

    pub fn code(mut self, code: Vec<u8>) -> Self {
        self.code = Some(code);
        self
    }

    pub fn stack_map(mut self, frames: Vec<StackMapFrame>) -> Self {
        self.stack_map = Some(frames);
        self
    }

    fn descriptor(&self) -> MethodDescriptor<BinaryName> {
        MethodDescriptor::parse(&self.descriptor).unwrap()
    }

    fn build(self, constants: &mut ConstantsPool) -> Method {
        let is_static = self.access_flags.contains(MethodAccessFlags::STATIC);
        let max_locals = self.descriptor().parameter_length(!is_static) as u16;
        let name_index = constants.get_utf8(&self.name).unwrap();
        let descriptor_index = constants.get_utf8(&self.descriptor).unwrap();

        let mut attributes: Vec<Attribute> = vec![];
        if let Some(code) = self.code {
            let mut code_attributes = vec![];
            if let Some(frames) = self.stack_map {
                code_attributes.push(constants.get_attribute(&StackMapTable(frames)).unwrap());
            }
            let code = Code {
                max_stack: 2,
                max_locals,
                code_array: BytecodeArray(code),
                exception_table: vec![],
                attributes: code_attributes,
            };
            attributes.push(constants.get_attribute(&code).unwrap());
        }
        if !self.annotations.is_empty() {
            let annotations = RuntimeVisibleAnnotations(annotations(constants, &self.annotations));
            attributes.push(constants.get_attribute(&annotations).unwrap());
        }
        if !self.parameter_annotations.is_empty() {
            let parameters = self
                .parameter_annotations
                .iter()
                .map(|names| annotations(constants, names))
                .collect();
            let parameters = RuntimeVisibleParameterAnnotations(parameters);
            attributes.push(constants.get_attribute(&parameters).unwrap());
        }

        Method {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            attributes,
        }
    }
}

/// Run a batch of `(identifier, payload)` pairs
pub fn run(config: &str, units: Vec<(&str, Vec<u8>)>) -> Vec<BatchEntry> {
    let config = Configuration::parse(config).unwrap();
    let inputs = units
        .into_iter()
        .map(|(identifier, payload)| UnitInput {
            identifier: identifier.to_owned(),
            payload,
        })
        .collect();
    instrument_batch(inputs, &config)
}

/// Code of a method in an encoded class
pub fn code_of(payload: &[u8], method_name: &str) -> Code {
    let class = ClassFile::decode(payload).unwrap();
    let method = class
        .methods
        .iter()
        .find(|method| class.constants.utf8(method.name_index).unwrap() == method_name)
        .unwrap();
    method.attribute::<Code>(&class.constants).unwrap().unwrap()
}

/// Local variable slots checked by the guards at the start of a method
pub fn guarded_slots(payload: &[u8], method_name: &str) -> Vec<u16> {
    let code = code_of(payload, method_name).code_array.0;
    let mut slots = vec![];
    let mut at = 0;
    loop {
        let (slot, load_length) = match code.get(at) {
            Some(op @ 0x2a..=0x2d) => ((op - 0x2a) as u16, 1),
            Some(0x19) => (code[at + 1] as u16, 2),
            _ => break,
        };
        if code.get(at + load_length) != Some(&0xc7) {
            break;
        }
        slots.push(slot);
        // ifnonnull, new, dup, then ldc or ldc_w
        let ldc = at + load_length + 7;
        let ldc_length = if code[ldc] == 0x12 { 2 } else { 3 };
        at = ldc + ldc_length + 4;
    }
    slots
}

/// Decoded strings of the constant pool
pub fn strings(payload: &[u8]) -> Vec<String> {
    let class = ClassFile::decode(payload).unwrap();
    class
        .constants
        .iter()
        .filter_map(|(index, _)| {
            class
                .constants
                .utf8(Utf8ConstantIndex(index))
                .ok()
        })
        .collect()
}
