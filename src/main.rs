use nullguard::config::{ConfigError, Configuration};
use nullguard::instrument::{instrument_batch, DiagnosticKind, Summary, UnitInput};

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use walkdir::WalkDir;

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Io(PathBuf, std::io::Error),
    Walk(walkdir::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(err) => write!(f, "bad configuration: {}", err),
            CliError::Io(path, err) => write!(f, "{}: {}", path.display(), err),
            CliError::Walk(err) => err.fmt(f),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> CliError {
        CliError::Config(err)
    }
}

impl From<walkdir::Error> for CliError {
    fn from(err: walkdir::Error) -> CliError {
        CliError::Walk(err)
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("nullguard")
        .version(crate_version!())
        .about("Adds runtime null checks for non-null parameters to compiled classes")
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("DIR")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory of class files to instrument"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Where to write the classes (defaults to rewriting the input in place)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("CONFIG")
                .default_value("standard")
                .help("Preset (`standard`, `development`, `disabled`) or `key=value:...` entries"),
        )
        .arg(
            Arg::new("fail-on-conflict")
                .long("fail-on-conflict")
                .action(ArgAction::SetTrue)
                .help("Exit with an error if any method has conflicting nullness annotations"),
        )
        .get_matches();

    let input = matches
        .get_one::<PathBuf>("input")
        .cloned()
        .unwrap_or_default();
    let output = matches.get_one::<PathBuf>("output").cloned();
    let config = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("standard");
    let fail_on_conflict = matches.get_flag("fail-on-conflict");

    match run(&input, output.as_deref(), config) {
        Ok(summary) => {
            println!("{}", summary);
            let failed = summary.has_fatal_errors()
                || (fail_on_conflict && summary.contract_conflicts > 0);
            if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(input: &Path, output: Option<&Path>, config: &str) -> Result<Summary, CliError> {
    let config = Configuration::parse(config)?;
    log::info!(
        "Instrumenting '{}' with {}",
        input.display(),
        config.to_config_string()
    );

    let mut inputs = vec![];
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "class") {
            continue;
        }
        let payload = fs::read(path).map_err(|err| CliError::Io(path.to_owned(), err))?;
        let relative = path.strip_prefix(input).unwrap_or(path);
        inputs.push(UnitInput {
            identifier: relative.to_string_lossy().into_owned(),
            payload,
        });
    }
    log::info!("Found {} class files", inputs.len());

    let entries = instrument_batch(inputs, &config);
    let summary = Summary::of(entries.iter().map(|entry| &entry.report));

    for entry in &entries {
        for diagnostic in &entry.report.diagnostics {
            match diagnostic.kind {
                DiagnosticKind::ContractConflict => log::warn!("{}", diagnostic),
                _ => log::error!("{}", diagnostic),
            }
        }

        let source = input.join(&entry.report.unit);
        let destination = output.unwrap_or(input).join(&entry.report.unit);
        match &entry.output {
            Some(patched) if patched.modified || output.is_some() => {
                write_file(&destination, &patched.payload)?;
            }

            // Unreadable input is copied over as is
            None if output.is_some() => {
                let payload = fs::read(&source).map_err(|err| CliError::Io(source.clone(), err))?;
                write_file(&destination, &payload)?;
            }
            _ => (),
        }
    }

    Ok(summary)
}

fn write_file(path: &Path, payload: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| CliError::Io(parent.to_owned(), err))?;
    }
    log::debug!("Writing '{}'", path.display());
    fs::write(path, payload).map_err(|err| CliError::Io(path.to_owned(), err))
}
