use super::{instrument, Error, Outcome, PatchedUnit, Report, SkipReason};
use crate::config::Configuration;
use crate::model::CompiledUnit;
use crate::resolve::ScopeIndex;
use rayon::prelude::*;

/// One unit handed to a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInput {
    /// Name used in diagnostics (usually the path of the class file)
    pub identifier: String,
    pub payload: Vec<u8>,
}

/// What came out of a batch for one unit
#[derive(Debug)]
pub struct BatchEntry {
    pub report: Report,

    /// Missing when the input could not be decoded
    pub output: Option<PatchedUnit>,
}

/// Instrument a set of units that get compiled together
///
/// Package and module defaults only apply to units in the same batch as their `package-info`
/// and `module-info`. Entries come back in input order.
pub fn instrument_batch(inputs: Vec<UnitInput>, config: &Configuration) -> Vec<BatchEntry> {
    if !config.enabled {
        return inputs
            .into_iter()
            .map(|input| {
                let mut report = Report::new(input.identifier.clone());
                report.outcome = Outcome::Skipped(SkipReason::Disabled);
                let output = PatchedUnit {
                    identifier: input.identifier,
                    payload: input.payload,
                    modified: false,
                };
                BatchEntry {
                    report,
                    output: Some(output),
                }
            })
            .collect();
    }

    let decoded: Vec<Result<CompiledUnit, (String, Error)>> = inputs
        .into_par_iter()
        .map(|input| {
            let identifier = input.identifier;
            CompiledUnit::decode(identifier.clone(), input.payload)
                .map_err(|err| (identifier, Error::MalformedInput(err)))
        })
        .collect();

    let index = ScopeIndex::build(decoded.iter().filter_map(|unit| unit.as_ref().ok()));
    log::debug!("indexed {} units", decoded.len());

    decoded
        .into_par_iter()
        .map(|unit| match unit {
            Ok(unit) => {
                let (output, report) = instrument(unit, &index, config);
                BatchEntry {
                    report,
                    output: Some(output),
                }
            }
            Err((identifier, err)) => {
                log::warn!("{} could not be read: {}", identifier, err);
                BatchEntry {
                    report: Report::failed(identifier, &err),
                    output: None,
                }
            }
        })
        .collect()
}
