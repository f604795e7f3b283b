use super::{read_method, DeclaringType, Method, NullnessAnnotations, NullnessMarks};
use crate::jvm::class_file::{
    ClassFile, EnclosingMethod, InnerClasses, InstrumentationMarker, Record, TypeAnnotationTarget,
};
use crate::jvm::{
    BinaryName, ClassAccessFlags, ClassConstantIndex, Error, FieldAccessFlags,
    InnerClassAccessFlags, Name,
};

/// What sort of declaration a compiled unit holds
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Class, interface, enum, record, or annotation
    Type,

    /// `package-info`, which only carries package annotations
    PackageInfo,

    /// `module-info`, which only carries the module declaration and its annotations
    ModuleInfo,
}

/// One class file, along with what is known about its nullness declarations
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Caller supplied identifier (eg. a path)
    pub identifier: String,
    pub name: BinaryName,
    pub kind: UnitKind,
    pub class: ClassFile,

    /// Exact bytes the unit was decoded from
    pub payload: Vec<u8>,

    /// Annotations on the type, package, or module declaration
    pub marks: NullnessMarks,

    /// Types lexically enclosing this one, nearest first
    pub enclosing_types: Vec<BinaryName>,

    /// Declared `public` (for nested types, as recorded in `InnerClasses`)
    pub is_public: bool,
    pub superclass: Option<BinaryName>,

    /// Methods of the type (empty for package and module units)
    pub methods: Vec<Method>,
}

impl CompiledUnit {
    /// Decode a unit, recognising the default set of nullness annotations
    pub fn decode(identifier: impl Into<String>, payload: Vec<u8>) -> Result<CompiledUnit, Error> {
        CompiledUnit::decode_with(identifier, payload, &NullnessAnnotations::default())
    }

    pub fn decode_with(
        identifier: impl Into<String>,
        payload: Vec<u8>,
        known: &NullnessAnnotations,
    ) -> Result<CompiledUnit, Error> {
        let class = ClassFile::decode(&payload)?;
        let name = class.name()?;
        let kind = if class.access_flags.contains(ClassAccessFlags::MODULE) || name.is_module_info()
        {
            UnitKind::ModuleInfo
        } else if name.is_package_info() {
            UnitKind::PackageInfo
        } else {
            UnitKind::Type
        };
        let marks = known.declaration_marks(&class.attributes, &class.constants)?;
        let superclass = class.super_name()?;

        let mut unit = CompiledUnit {
            identifier: identifier.into(),
            kind,
            marks,
            enclosing_types: vec![],
            is_public: class.access_flags.contains(ClassAccessFlags::PUBLIC),
            superclass,
            methods: vec![],
            name,
            class,
            payload,
        };
        if kind != UnitKind::Type {
            return Ok(unit);
        }

        let (declaring, enclosing_types, nested_public) =
            declaring_type(&unit.class, &unit.name, known)?;
        unit.enclosing_types = enclosing_types;
        if let Some(is_public) = nested_public {
            unit.is_public = is_public;
        }
        unit.methods = (0..unit.class.methods.len())
            .map(|index| read_method(&unit.class, index, &declaring, known))
            .collect::<Result<_, _>>()?;
        Ok(unit)
    }

    /// Package of the unit (empty for the unnamed package)
    pub fn package(&self) -> &str {
        self.name.package()
    }

    /// Does the unit carry the marker left by a previous instrumentation?
    pub fn is_instrumented(&self) -> bool {
        self.class.has_attribute::<InstrumentationMarker>()
    }
}

/// Work out what shapes the parameters of a class's constructors, along with the enclosing types
/// and (for nested classes) whether the class was declared `public`
fn declaring_type(
    class: &ClassFile,
    name: &BinaryName,
    known: &NullnessAnnotations,
) -> Result<(DeclaringType, Vec<BinaryName>, Option<bool>), Error> {
    let constants = &class.constants;
    let class_name = |index: ClassConstantIndex| -> Result<BinaryName, Error> {
        BinaryName::from_string(constants.class_name(index)?).map_err(Error::BadDescriptor)
    };

    // Entries of `InnerClasses`, keyed by inner class name
    let mut inner_classes = vec![];
    if let Some(table) = class.attribute::<InnerClasses>()? {
        for entry in table.0 {
            let outer = if entry.outer_class.0 .0 == 0 {
                None
            } else {
                Some(class_name(entry.outer_class)?)
            };
            let anonymous = entry.inner_name.0 .0 == 0;
            inner_classes.push((
                class_name(entry.inner_class)?,
                outer,
                entry.access_flags,
                anonymous,
            ));
        }
    }
    let enclosing_method = match class.attribute::<EnclosingMethod>()? {
        Some(enclosing) => Some(class_name(enclosing.class)?),
        None => None,
    };

    // Immediately enclosing type and whether instances hold on to an instance of it
    let own_entry = inner_classes.iter().find(|(inner, _, _, _)| inner == name);
    let mut declaring = DeclaringType::default();
    if let Some((_, outer, flags, anonymous)) = own_entry {
        if !flags.contains(InnerClassAccessFlags::STATIC) {
            declaring.outer_instance = outer.clone().or_else(|| enclosing_method.clone());
        }
        declaring.is_anonymous = *anonymous;
    }
    let nested_public =
        own_entry.map(|(_, _, flags, _)| flags.contains(InnerClassAccessFlags::PUBLIC));

    // Local and anonymous classes get captured variables as trailing constructor parameters,
    // each of which is also kept in a synthetic `val$<name>` field
    if enclosing_method.is_some() {
        for field in &class.fields {
            if field.access_flags.contains(FieldAccessFlags::SYNTHETIC)
                && constants.utf8(field.name_index)?.starts_with(CAPTURED_VARIABLE_PREFIX)
            {
                declaring.captured_variables += 1;
            }
        }
        declaring.is_local = true;
    }

    // Walk outwards
    let mut enclosing_types: Vec<BinaryName> = vec![];
    let mut current = name.clone();
    loop {
        let next = inner_classes
            .iter()
            .find(|(inner, _, _, _)| *inner == current)
            .and_then(|(_, outer, _, _)| outer.clone())
            .or_else(|| {
                if current == *name {
                    enclosing_method.clone()
                } else {
                    None
                }
            });
        match next {
            Some(outer) if outer != *name && !enclosing_types.contains(&outer) => {
                enclosing_types.push(outer.clone());
                current = outer;
            }
            _ => break,
        }
    }

    declaring.is_enum = class.access_flags.contains(ClassAccessFlags::ENUM)
        || class.super_name()?.as_ref() == Some(&BinaryName::ENUM);

    declaring.is_record = class.has_attribute::<Record>()
        || class.super_name()?.as_ref() == Some(&BinaryName::RECORD);
    if let Some(record) = class.attribute::<Record>()? {
        let mut components = vec![];
        for component in &record.0 {
            let descriptor = constants.utf8(component.descriptor_index)?;
            let marks = known.declaration_marks(&component.attributes, constants)?
                | known.type_annotation_marks(&component.attributes, constants, |a| {
                    a.target == TypeAnnotationTarget::Empty(0x13)
                })?;
            components.push((descriptor, marks));
        }
        declaring.record_components = Some(components);
    }

    Ok((declaring, enclosing_types, nested_public))
}

/// Prefix javac gives the fields (and parameters) holding captured local variables
pub(crate) const CAPTURED_VARIABLE_PREFIX: &str = "val$";
