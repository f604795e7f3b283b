use crate::jvm::BinaryName;
use crate::model::{CompiledUnit, NullnessMarks, UnitKind};
use std::collections::HashMap;

/// Nullness declarations of every type, package, and module known to a run
///
/// Built once (from all of the units of a batch) and then only ever read.
#[derive(Debug, Clone, Default)]
pub struct ScopeIndex {
    types: HashMap<BinaryName, NullnessMarks>,
    packages: HashMap<String, NullnessMarks>,
    module: Option<NullnessMarks>,

    /// Whether each type is public, along with its superclass
    visibility: HashMap<BinaryName, (bool, Option<BinaryName>)>,
}

/// Scopes surrounding the methods of one unit, nearest first
#[derive(Debug, Clone, Default)]
pub struct EnclosingScopes {
    /// Declaring type, then the types enclosing it
    pub types: Vec<(BinaryName, NullnessMarks)>,
    pub package: Option<(String, NullnessMarks)>,
    pub module: Option<NullnessMarks>,
}

impl ScopeIndex {
    pub fn new() -> ScopeIndex {
        ScopeIndex::default()
    }

    /// Index the declarations of all of these units
    ///
    /// A `module-info` among them makes every unit a member of that module.
    pub fn build<'a>(units: impl IntoIterator<Item = &'a CompiledUnit>) -> ScopeIndex {
        let mut index = ScopeIndex::new();
        for unit in units {
            index.add_unit(unit);
        }
        index
    }

    pub fn add_unit(&mut self, unit: &CompiledUnit) {
        match unit.kind {
            UnitKind::Type => {
                self.add_type(unit.name.clone(), unit.marks);
                self.visibility.insert(
                    unit.name.clone(),
                    (unit.is_public, unit.superclass.clone()),
                );
            }
            UnitKind::PackageInfo => self.add_package(unit.package(), unit.marks),
            UnitKind::ModuleInfo => self.set_module(unit.marks),
        }
    }

    pub fn add_type(&mut self, name: BinaryName, marks: NullnessMarks) {
        self.types.insert(name, marks);
    }

    pub fn add_package(&mut self, package: impl Into<String>, marks: NullnessMarks) {
        self.packages.insert(package.into(), marks);
    }

    pub fn set_module(&mut self, marks: NullnessMarks) {
        self.module = Some(marks);
    }

    /// Is the unit's type part of the public API?
    ///
    /// That is the case for public types, and for types extending a public type other than
    /// `Object`. Superclasses outside of the index end the search.
    pub fn is_public_api(&self, unit: &CompiledUnit) -> bool {
        if unit.is_public {
            return true;
        }
        let mut seen = vec![&unit.name];
        let mut superclass = unit.superclass.as_ref();
        while let Some(name) = superclass {
            if *name == BinaryName::OBJECT || seen.contains(&name) {
                break;
            }
            match self.visibility.get(name) {
                Some((true, _)) => return true,
                Some((false, next)) => {
                    seen.push(name);
                    superclass = next.as_ref();
                }
                None => break,
            }
        }
        false
    }

    /// Scopes that apply to the methods of a unit
    ///
    /// The declaring type always comes first. Enclosing types follow for as long as they are
    /// known to the index.
    pub fn enclosing_scopes(&self, unit: &CompiledUnit) -> EnclosingScopes {
        let mut types = vec![(unit.name.clone(), unit.marks)];
        for outer in &unit.enclosing_types {
            match self.types.get(outer) {
                Some(marks) => types.push((outer.clone(), *marks)),
                None => break,
            }
        }
        let package = self
            .packages
            .get(unit.package())
            .map(|marks| (unit.package().to_owned(), *marks));
        EnclosingScopes {
            types,
            package,
            module: self.module,
        }
    }
}
