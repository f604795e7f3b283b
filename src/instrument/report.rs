use super::{DiagnosticKind, Error};
use std::fmt;

/// Problem found in a unit, tagged with where it was found
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub unit: String,

    /// Method signature, when the problem is specific to one method
    pub method: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(unit: &str, method: Option<String>, error: &Error) -> Diagnostic {
        Diagnostic {
            kind: error.kind(),
            unit: unit.to_owned(),
            method,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.unit)?;
        if let Some(method) = &self.method {
            write!(f, " ({})", method)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Why a unit was passed through without looking at its methods
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Configuration is disabled
    Disabled,

    /// Unit carries the marker of a previous run
    AlreadyInstrumented,

    /// `package-info` or `module-info`
    NotAType,
}

/// What happened to a unit
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// At least one method got guards
    Instrumented,

    /// No method needed guards, so the original bytes are kept
    Unchanged,
    Skipped(SkipReason),

    /// A fatal problem left the unit untouched
    Failed,
}

/// Guards added to one method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodReport {
    /// Method signature (name and descriptor)
    pub method: String,

    /// Indices of the guarded parameters
    pub guarded_parameters: Vec<usize>,
}

/// Result of instrumenting one unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub unit: String,
    pub outcome: Outcome,
    pub methods: Vec<MethodReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new(unit: impl Into<String>) -> Report {
        Report {
            unit: unit.into(),
            outcome: Outcome::Unchanged,
            methods: vec![],
            diagnostics: vec![],
        }
    }

    /// Report for a unit that failed outright
    pub fn failed(unit: impl Into<String>, error: &Error) -> Report {
        let mut report = Report::new(unit);
        report.fail(None, error);
        report
    }

    pub(crate) fn fail(&mut self, method: Option<String>, error: &Error) {
        self.outcome = Outcome::Failed;
        self.methods.clear();
        self.diagnostics.push(Diagnostic::new(&self.unit, method, error));
    }

    /// Total number of guards added
    pub fn guard_count(&self) -> usize {
        self.methods
            .iter()
            .map(|method| method.guarded_parameters.len())
            .sum()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.kind == kind)
            .count()
    }
}

/// Totals over all of the units of a run
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub instrumented_units: usize,
    pub unchanged_units: usize,
    pub skipped_units: usize,
    pub failed_units: usize,
    pub instrumented_methods: usize,
    pub guards: usize,
    pub malformed_input: usize,
    pub contract_conflicts: usize,
    pub encoding_violations: usize,
}

impl Summary {
    pub fn of<'a>(reports: impl IntoIterator<Item = &'a Report>) -> Summary {
        let mut summary = Summary::default();
        for report in reports {
            match report.outcome {
                Outcome::Instrumented => summary.instrumented_units += 1,
                Outcome::Unchanged => summary.unchanged_units += 1,
                Outcome::Skipped(_) => summary.skipped_units += 1,
                Outcome::Failed => summary.failed_units += 1,
            }
            summary.instrumented_methods += report.methods.len();
            summary.guards += report.guard_count();
            summary.malformed_input += report.count(DiagnosticKind::MalformedInput);
            summary.contract_conflicts += report.count(DiagnosticKind::ContractConflict);
            summary.encoding_violations +=
                report.count(DiagnosticKind::EncodingInvariantViolation);
        }
        summary
    }

    /// Were there any problems that left a unit untouched?
    pub fn has_fatal_errors(&self) -> bool {
        self.malformed_input > 0 || self.encoding_violations > 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} guards in {} methods; units: {} instrumented, {} unchanged, {} skipped, {} failed",
            self.guards,
            self.instrumented_methods,
            self.instrumented_units,
            self.unchanged_units,
            self.skipped_units,
            self.failed_units
        )?;
        if self.contract_conflicts > 0 {
            write!(f, "; {} contract conflicts", self.contract_conflicts)?;
        }
        Ok(())
    }
}
