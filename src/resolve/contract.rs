use super::EnclosingScopes;
use crate::jvm::BinaryName;
use crate::model::{Method, NullnessMarks, NullnessScope, Parameter};
use std::fmt;

/// Effective nullness contract of a parameter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Contract {
    /// Must not be `null` (gets a guard)
    Required,

    /// Explicitly allowed to be `null`
    Optional,

    /// Nothing is known (or the parameter can't be `null` anyway)
    Unconstrained,
}

/// Declaration carrying contradictory nullness annotations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictSite {
    /// Parameter annotated both non-null and nullable
    Parameter { index: usize, name: String },

    /// Scope declared both null-marked and null-unmarked
    Method,
    Type(BinaryName),
    Package(String),
    Module,
}

/// Contradictory annotations found while resolving the contracts of a method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractConflict {
    /// Method signature (name and descriptor)
    pub method: String,
    pub site: ConflictSite,
}

impl fmt::Display for ContractConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.site {
            ConflictSite::Parameter { index, name } => write!(
                f,
                "parameter '{}' (#{}) of {} is annotated both non-null and nullable",
                name, index, self.method
            ),
            ConflictSite::Method => write!(
                f,
                "{} is annotated both null-marked and null-unmarked",
                self.method
            ),
            ConflictSite::Type(name) => write!(
                f,
                "type {} (enclosing {}) is annotated both null-marked and null-unmarked",
                name, self.method
            ),
            ConflictSite::Package(package) => write!(
                f,
                "package '{}' (enclosing {}) is annotated both null-marked and null-unmarked",
                package, self.method
            ),
            ConflictSite::Module => write!(
                f,
                "module (enclosing {}) is annotated both null-marked and null-unmarked",
                self.method
            ),
        }
    }
}

/// One source of nullness information: either it decides, or it passes on to the next
type Lookup = fn(&Parameter, &Method, &EnclosingScopes) -> Result<Option<Contract>, ConflictSite>;

/// Sources in order of precedence
const LOOKUPS: [(&str, Lookup); 7] = [
    ("primitive type", primitive_type),
    ("synthetic parameter", synthetic_parameter),
    ("parameter annotation", parameter_annotation),
    ("method default", method_default),
    ("type default", type_default),
    ("package default", package_default),
    ("module default", module_default),
];

/// Resolve the contract of every parameter of a method, in parameter order
pub fn resolve(
    method: &Method,
    scopes: &EnclosingScopes,
) -> Result<Vec<(usize, Contract)>, ContractConflict> {
    method
        .parameters
        .iter()
        .map(|parameter| {
            resolve_parameter(parameter, method, scopes)
                .map(|contract| (parameter.index, contract))
                .map_err(|site| ContractConflict {
                    method: method.signature(),
                    site,
                })
        })
        .collect()
}

/// Resolve the contract of one parameter (first source to decide wins)
pub fn resolve_parameter(
    parameter: &Parameter,
    method: &Method,
    scopes: &EnclosingScopes,
) -> Result<Contract, ConflictSite> {
    for (source, lookup) in LOOKUPS {
        if let Some(contract) = lookup(parameter, method, scopes)? {
            log::trace!(
                "{} of {}: {:?} from {}",
                parameter.name,
                method.signature(),
                contract,
                source
            );
            return Ok(contract);
        }
    }
    Ok(Contract::Unconstrained)
}

fn primitive_type(
    parameter: &Parameter,
    _: &Method,
    _: &EnclosingScopes,
) -> Result<Option<Contract>, ConflictSite> {
    Ok(if parameter.is_reference() {
        None
    } else {
        Some(Contract::Unconstrained)
    })
}

fn synthetic_parameter(
    parameter: &Parameter,
    _: &Method,
    _: &EnclosingScopes,
) -> Result<Option<Contract>, ConflictSite> {
    Ok(if parameter.synthetic {
        Some(Contract::Unconstrained)
    } else {
        None
    })
}

fn parameter_annotation(
    parameter: &Parameter,
    _: &Method,
    _: &EnclosingScopes,
) -> Result<Option<Contract>, ConflictSite> {
    let non_null = parameter.marks.contains(NullnessMarks::NON_NULL);
    let nullable = parameter.marks.contains(NullnessMarks::NULLABLE);
    match (non_null, nullable) {
        (true, true) => Err(ConflictSite::Parameter {
            index: parameter.index,
            name: parameter.name.clone(),
        }),
        (true, false) => Ok(Some(Contract::Required)),
        (false, true) => Ok(Some(Contract::Optional)),
        (false, false) => Ok(None),
    }
}

/// Contract implied by a scope default
fn scope_contract(
    marks: NullnessMarks,
    site: impl FnOnce() -> ConflictSite,
) -> Result<Option<Contract>, ConflictSite> {
    match marks.scope() {
        Ok(Some(NullnessScope::Marked)) => Ok(Some(Contract::Required)),
        Ok(Some(NullnessScope::Unmarked)) => Ok(Some(Contract::Unconstrained)),
        Ok(None) => Ok(None),
        Err(_) => Err(site()),
    }
}

fn method_default(
    _: &Parameter,
    method: &Method,
    _: &EnclosingScopes,
) -> Result<Option<Contract>, ConflictSite> {
    scope_contract(method.marks, || ConflictSite::Method)
}

fn type_default(
    _: &Parameter,
    _: &Method,
    scopes: &EnclosingScopes,
) -> Result<Option<Contract>, ConflictSite> {
    for (name, marks) in &scopes.types {
        if let Some(contract) = scope_contract(*marks, || ConflictSite::Type(name.clone()))? {
            return Ok(Some(contract));
        }
    }
    Ok(None)
}

fn package_default(
    _: &Parameter,
    _: &Method,
    scopes: &EnclosingScopes,
) -> Result<Option<Contract>, ConflictSite> {
    match &scopes.package {
        Some((package, marks)) => scope_contract(*marks, || ConflictSite::Package(package.clone())),
        None => Ok(None),
    }
}

fn module_default(
    _: &Parameter,
    _: &Method,
    scopes: &EnclosingScopes,
) -> Result<Option<Contract>, ConflictSite> {
    match scopes.module {
        Some(marks) => scope_contract(marks, || ConflictSite::Module),
        None => Ok(None),
    }
}
