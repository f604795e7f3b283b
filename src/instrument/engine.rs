use super::{
    splice_guards, Diagnostic, Error, GuardInstruction, MethodReport, Outcome, Report, SkipReason,
};
use crate::config::{Check, Configuration};
use crate::jvm::class_file::{ClassFile, InstrumentationMarker};
use crate::jvm::BinaryName;
use crate::model::{CompiledUnit, Method, UnitKind};
use crate::resolve::{resolve, Contract, EnclosingScopes, ScopeIndex};

/// Output for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedUnit {
    pub identifier: String,
    pub payload: Vec<u8>,

    /// Is `payload` different from the input?
    pub modified: bool,
}

impl PatchedUnit {
    fn unmodified(identifier: String, payload: Vec<u8>) -> PatchedUnit {
        PatchedUnit {
            identifier,
            payload,
            modified: false,
        }
    }
}

/// Payload of the marker attribute left on instrumented classes
pub fn marker_description(config: &Configuration) -> String {
    format!(
        "version={};config={}",
        env!("CARGO_PKG_VERSION"),
        config.to_config_string()
    )
}

/// Add guards to every method of a unit that has required parameters
///
/// The unit comes back unchanged (with the original bytes) unless at least one method was
/// instrumented. Conflicting annotations only exclude the method they are found in, while any
/// other problem leaves the whole unit alone.
pub fn instrument(
    unit: CompiledUnit,
    index: &ScopeIndex,
    config: &Configuration,
) -> (PatchedUnit, Report) {
    let mut report = Report::new(unit.identifier.clone());
    let skip = if !config.enabled {
        Some(SkipReason::Disabled)
    } else if unit.kind != UnitKind::Type {
        Some(SkipReason::NotAType)
    } else if unit.is_instrumented() {
        log::warn!("{} is already instrumented", unit.identifier);
        Some(SkipReason::AlreadyInstrumented)
    } else {
        None
    };
    if let Some(reason) = skip {
        report.outcome = Outcome::Skipped(reason);
        return (PatchedUnit::unmodified(unit.identifier, unit.payload), report);
    }

    let scopes = index.enclosing_scopes(&unit);
    let public_api = index.is_public_api(&unit);
    let CompiledUnit {
        identifier,
        name,
        mut class,
        payload,
        methods,
        ..
    } = unit;

    for method in &methods {
        if !should_instrument(method) {
            continue;
        }
        let check = config.check_for(public_api && method.is_public());
        if check == Check::NoCheck {
            continue;
        }
        match guard_method(&mut class, &name, method, &scopes, config, check) {
            Ok(None) => (),
            Ok(Some(method_report)) => report.methods.push(method_report),
            Err(err @ Error::ContractConflict(_)) => {
                log::warn!("{}: {}", identifier, err);
                report.diagnostics.push(Diagnostic::new(
                    &identifier,
                    Some(method.signature()),
                    &err,
                ));
            }
            Err(err) => {
                log::warn!("{} left unchanged: {}", identifier, err);
                report.fail(Some(method.signature()), &err);
                return (PatchedUnit::unmodified(identifier, payload), report);
            }
        }
    }

    if report.methods.is_empty() {
        return (PatchedUnit::unmodified(identifier, payload), report);
    }

    match finish(class, config) {
        Ok(patched) => {
            log::info!(
                "{}: {} guards in {} methods",
                identifier,
                report.guard_count(),
                report.methods.len()
            );
            report.outcome = Outcome::Instrumented;
            let unit = PatchedUnit {
                identifier,
                payload: patched,
                modified: true,
            };
            (unit, report)
        }
        Err(err) => {
            log::warn!("{} left unchanged: {}", identifier, err);
            report.fail(None, &err);
            (PatchedUnit::unmodified(identifier, payload), report)
        }
    }
}

/// Methods without code, or without a declaration in source, never get guards
fn should_instrument(method: &Method) -> bool {
    method.has_code && !method.is_synthetic() && !method.is_implicit
}

/// Resolve contracts and splice guards for one method
///
/// Returns `None` if the method has no required parameters.
fn guard_method(
    class: &mut ClassFile,
    class_name: &BinaryName,
    method: &Method,
    scopes: &EnclosingScopes,
    config: &Configuration,
    check: Check,
) -> Result<Option<MethodReport>, Error> {
    let required: Vec<usize> = resolve(method, scopes)?
        .into_iter()
        .filter(|(_, contract)| *contract == Contract::Required)
        .map(|(index, _)| index)
        .collect();
    if required.is_empty() {
        return Ok(None);
    }

    let version = class.version;
    let mut guards = Vec::with_capacity(required.len());
    for &index in &required {
        let parameter = &method.parameters[index];
        log::debug!(
            "guarding '{}' (slot {}) of {} with {}",
            parameter.name,
            parameter.slot,
            method.signature(),
            check.name()
        );
        let guard = GuardInstruction::synthesize(
            &mut class.constants,
            config,
            check,
            class_name,
            version,
            method,
            parameter,
        )?;
        guards.extend(guard);
    }
    splice_guards(class, method, &guards)?;

    Ok(Some(MethodReport {
        method: method.signature(),
        guarded_parameters: required,
    }))
}

/// Mark the class and encode it, making sure the result reads back
fn finish(mut class: ClassFile, config: &Configuration) -> Result<Vec<u8>, Error> {
    let description = class.constants.get_utf8(&marker_description(config))?;
    let marker = class
        .constants
        .get_attribute(&InstrumentationMarker { description })?;
    class.attributes.push(marker);

    let bytes = class.encode();
    match ClassFile::decode(&bytes) {
        Ok(_) => Ok(bytes),
        Err(err) => Err(Error::EncodingInvariantViolation(err)),
    }
}

/// Decode and instrument a single class on its own
///
/// Without the rest of the batch, only defaults declared on the class itself are known.
pub fn instrument_class(
    identifier: impl Into<String>,
    payload: Vec<u8>,
    config: &Configuration,
) -> Result<(PatchedUnit, Report), Error> {
    let unit = CompiledUnit::decode(identifier, payload).map_err(Error::MalformedInput)?;
    let index = ScopeIndex::build([&unit]);
    Ok(instrument(unit, &index, config))
}
