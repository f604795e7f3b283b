//! Instrumentation policy
//!
//! A run uses a single [`Configuration`], usually one of the [`Preset`]s. Custom configurations
//! are built from the same fields, either directly or by parsing a configuration string:
//!
//! ```text
//! exceptionKind=<kind>[:enabled=<bool>][:messageTemplate=<template>]
//! publicApi=<check>[:privateApi=<check>][:enabled=<bool>][:messageTemplate=<template>]
//! ```
//!
//! `exceptionKind` uses the same check for every method. Otherwise, public methods of public
//! types get the `publicApi` check and all other methods the `privateApi` one (a missing one means
//! `NoCheck`). Since the message template is free text, `messageTemplate` must come last and takes
//! the rest of the string.

use crate::jvm::BinaryName;
use std::fmt;

/// Exception thrown by a guard when `null` is passed for a required parameter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    IllegalArgument,
    NullPointer,
    Assertion,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 3] = [
        ExceptionKind::IllegalArgument,
        ExceptionKind::NullPointer,
        ExceptionKind::Assertion,
    ];

    /// Class of the exception
    pub fn class_name(self) -> BinaryName {
        match self {
            ExceptionKind::IllegalArgument => BinaryName::ILLEGALARGUMENTEXCEPTION,
            ExceptionKind::NullPointer => BinaryName::NULLPOINTEREXCEPTION,
            ExceptionKind::Assertion => BinaryName::ASSERTIONERROR,
        }
    }

    /// Descriptor of the constructor taking the message
    ///
    /// `AssertionError` has no `String` constructor, only an `Object` one.
    pub fn constructor_descriptor(self) -> &'static str {
        match self {
            ExceptionKind::IllegalArgument | ExceptionKind::NullPointer => "(Ljava/lang/String;)V",
            ExceptionKind::Assertion => "(Ljava/lang/Object;)V",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::IllegalArgument => "IllegalArgument",
            ExceptionKind::NullPointer => "NullPointer",
            ExceptionKind::Assertion => "Assertion",
        }
    }
}

/// What a method does on entry when `null` is passed for a required parameter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Check {
    /// No guard at all
    NoCheck,

    /// Always throw
    Throw(ExceptionKind),

    /// Throw `AssertionError`, but only when assertions are enabled for the class (`-ea`)
    ConditionalAssertion,
}

impl Check {
    pub const ALL: [Check; 5] = [
        Check::NoCheck,
        Check::Throw(ExceptionKind::IllegalArgument),
        Check::Throw(ExceptionKind::NullPointer),
        Check::Throw(ExceptionKind::Assertion),
        Check::ConditionalAssertion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Check::NoCheck => "NoCheck",
            Check::Throw(kind) => kind.name(),
            Check::ConditionalAssertion => "ConditionalAssertion",
        }
    }

    pub fn from_name(name: &str) -> Option<Check> {
        Check::ALL.into_iter().find(|check| check.name() == name)
    }

    /// Exception thrown by the guard, if there is one
    pub fn exception_kind(self) -> Option<ExceptionKind> {
        match self {
            Check::NoCheck => None,
            Check::Throw(kind) => Some(kind),
            Check::ConditionalAssertion => Some(ExceptionKind::Assertion),
        }
    }
}

/// Named configurations
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Preset {
    /// `IllegalArgumentException` naming the parameter and method
    Standard,

    /// `AssertionError` with everything known about the call site
    Development,

    /// No instrumentation at all
    Disabled,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Standard, Preset::Development, Preset::Disabled];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Standard => "standard",
            Preset::Development => "development",
            Preset::Disabled => "disabled",
        }
    }

    pub fn from_name(name: &str) -> Option<Preset> {
        Preset::ALL.into_iter().find(|preset| preset.name() == name)
    }

    pub fn configuration(self) -> Configuration {
        match self {
            Preset::Standard => Configuration {
                public_api: Check::Throw(ExceptionKind::IllegalArgument),
                private_api: Check::Throw(ExceptionKind::IllegalArgument),
                message_template: STANDARD_TEMPLATE.to_owned(),
                enabled: true,
            },
            Preset::Development => Configuration {
                public_api: Check::Throw(ExceptionKind::Assertion),
                private_api: Check::Throw(ExceptionKind::Assertion),
                message_template: DEVELOPMENT_TEMPLATE.to_owned(),
                enabled: true,
            },
            Preset::Disabled => Configuration {
                enabled: false,
                ..Preset::Standard.configuration()
            },
        }
    }
}

const STANDARD_TEMPLATE: &str = "parameter '{parameter}' must not be null in {class}.{method}{descriptor}";
const DEVELOPMENT_TEMPLATE: &str = "null passed for non-null parameter '{parameter}' (index {index}) of {class}.{method}{descriptor}";

/// Immutable instrumentation policy, shared by every unit of a run
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Configuration {
    /// Check for public methods of public types
    pub public_api: Check,

    /// Check for every other method
    pub private_api: Check,

    /// Exception message, with placeholders (see [`Placeholder`])
    pub message_template: String,

    /// When disabled, every unit passes through untouched
    pub enabled: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Preset::Standard.configuration()
    }
}

/// Values substituted into a message template
#[derive(Copy, Clone, Debug)]
pub struct MessageContext<'a> {
    pub parameter: &'a str,
    pub index: usize,

    /// Binary name of the class (rendered with `.` separators)
    pub class: &'a str,
    pub method: &'a str,
    pub descriptor: &'a str,
}

/// Placeholders that can appear in a message template
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Parameter,
    Index,
    Class,
    Method,
    Descriptor,
}

impl Placeholder {
    const ALL: [Placeholder; 5] = [
        Placeholder::Parameter,
        Placeholder::Index,
        Placeholder::Class,
        Placeholder::Method,
        Placeholder::Descriptor,
    ];

    fn name(self) -> &'static str {
        match self {
            Placeholder::Parameter => "parameter",
            Placeholder::Index => "index",
            Placeholder::Class => "class",
            Placeholder::Method => "method",
            Placeholder::Descriptor => "descriptor",
        }
    }
}

/// Piece of a message template
#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(Placeholder),
}

/// Split a template into literal text and placeholders
fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, ConfigError> {
    let mut segments = vec![];
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let end = rest[start..]
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedPlaceholder(template.to_owned()))?;
        let name = &rest[start + 1..start + end];
        let placeholder = Placeholder::ALL
            .into_iter()
            .find(|placeholder| placeholder.name() == name)
            .ok_or_else(|| ConfigError::UnknownPlaceholder(name.to_owned()))?;
        segments.push(Segment::Placeholder(placeholder));
        rest = &rest[start + end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

impl Configuration {
    /// Build a custom configuration, checking the template
    pub fn new(
        public_api: Check,
        private_api: Check,
        message_template: impl Into<String>,
        enabled: bool,
    ) -> Result<Configuration, ConfigError> {
        let message_template = message_template.into();
        parse_template(&message_template)?;
        Ok(Configuration {
            public_api,
            private_api,
            message_template,
            enabled,
        })
    }

    /// Check applying to a method, depending on whether it is part of the public API
    pub fn check_for(&self, public_api: bool) -> Check {
        if public_api {
            self.public_api
        } else {
            self.private_api
        }
    }

    /// Parse a preset name or a configuration string
    pub fn parse(config: &str) -> Result<Configuration, ConfigError> {
        let config = config.trim();
        if let Some(preset) = Preset::from_name(config) {
            return Ok(preset.configuration());
        }
        log::debug!("parsing custom configuration '{}'", config);

        let mut exception_kind = None;
        let mut public_api = None;
        let mut private_api = None;
        let mut enabled = None;
        let mut message_template = None;

        fn set<A>(slot: &mut Option<A>, key: &str, value: A) -> Result<(), ConfigError> {
            if slot.is_some() {
                return Err(ConfigError::DuplicateKey(key.to_owned()));
            }
            *slot = Some(value);
            Ok(())
        }

        let mut rest = config;
        while !rest.is_empty() {
            let (key, after_key) = rest
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedEntry(rest.to_owned()))?;
            if key == "messageTemplate" {
                set(&mut message_template, key, after_key.to_owned())?;
                break;
            }
            let (value, remaining) = after_key.split_once(':').unwrap_or((after_key, ""));
            rest = remaining;
            let bad_value = || ConfigError::BadValue {
                key: key.to_owned(),
                value: value.to_owned(),
            };
            match key {
                "exceptionKind" => {
                    let kind = ExceptionKind::ALL
                        .into_iter()
                        .find(|kind| kind.name() == value)
                        .ok_or_else(bad_value)?;
                    set(&mut exception_kind, key, kind)?
                }
                "publicApi" => {
                    let check = Check::from_name(value).ok_or_else(bad_value)?;
                    set(&mut public_api, key, check)?
                }
                "privateApi" => {
                    let check = Check::from_name(value).ok_or_else(bad_value)?;
                    set(&mut private_api, key, check)?
                }
                "enabled" => {
                    let flag = value.parse::<bool>().map_err(|_| bad_value())?;
                    set(&mut enabled, key, flag)?
                }
                _ => return Err(ConfigError::UnknownKey(key.to_owned())),
            }
        }

        let (public_api, private_api) = match (exception_kind, public_api, private_api) {
            (None, None, None) => return Err(ConfigError::MissingCheck(config.to_owned())),
            (Some(kind), None, None) => (Check::Throw(kind), Check::Throw(kind)),
            (Some(_), _, _) => {
                return Err(ConfigError::DuplicateKey("exceptionKind".to_owned()));
            }
            (None, public_api, private_api) => (
                public_api.unwrap_or(Check::NoCheck),
                private_api.unwrap_or(Check::NoCheck),
            ),
        };
        Configuration::new(
            public_api,
            private_api,
            message_template.unwrap_or_else(|| STANDARD_TEMPLATE.to_owned()),
            enabled.unwrap_or(true),
        )
    }

    /// Canonical configuration string, which parses back into the same configuration
    pub fn to_config_string(&self) -> String {
        format!(
            "publicApi={}:privateApi={}:enabled={}:messageTemplate={}",
            self.public_api.name(),
            self.private_api.name(),
            self.enabled,
            self.message_template
        )
    }

    /// Produce the exception message for one parameter
    ///
    /// A template that doesn't parse (only possible by bypassing [`Configuration::new`]) is used
    /// as is.
    pub fn render_message(&self, context: &MessageContext) -> String {
        let segments = match parse_template(&self.message_template) {
            Ok(segments) => segments,
            Err(_) => return self.message_template.clone(),
        };
        let mut message = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => message.push_str(text),
                Segment::Placeholder(Placeholder::Parameter) => message.push_str(context.parameter),
                Segment::Placeholder(Placeholder::Index) => {
                    message.push_str(&context.index.to_string())
                }
                Segment::Placeholder(Placeholder::Class) => {
                    message.push_str(&context.class.replace('/', "."))
                }
                Segment::Placeholder(Placeholder::Method) => message.push_str(context.method),
                Segment::Placeholder(Placeholder::Descriptor) => {
                    message.push_str(context.descriptor)
                }
            }
        }
        message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Entry is not of the form `key=value`
    MalformedEntry(String),
    UnknownKey(String),
    DuplicateKey(String),
    BadValue { key: String, value: String },
    /// Neither `exceptionKind` nor a `publicApi`/`privateApi` check
    MissingCheck(String),
    UnknownPlaceholder(String),
    UnterminatedPlaceholder(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MalformedEntry(entry) => {
                write!(f, "expected 'key=value' but found '{}'", entry)
            }
            ConfigError::UnknownKey(key) => write!(f, "unknown configuration key '{}'", key),
            ConfigError::DuplicateKey(key) => write!(f, "duplicate declaration for '{}'", key),
            ConfigError::BadValue { key, value } => {
                write!(f, "invalid value '{}' for '{}'", value, key)
            }
            ConfigError::MissingCheck(config) => write!(
                f,
                "'{}' is neither a preset ({}) nor sets exceptionKind, publicApi, or privateApi",
                config,
                Preset::ALL.map(Preset::name).join(", ")
            ),
            ConfigError::UnknownPlaceholder(name) => {
                write!(f, "unknown placeholder '{{{}}}' in message template", name)
            }
            ConfigError::UnterminatedPlaceholder(template) => {
                write!(f, "unterminated placeholder in message template '{}'", template)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod test {
    use super::*;

    fn context() -> MessageContext<'static> {
        MessageContext {
            parameter: "name",
            index: 1,
            class: "com/example/Widget",
            method: "rename",
            descriptor: "(ILjava/lang/String;)V",
        }
    }

    #[test]
    fn presets() {
        assert_eq!(Configuration::parse("standard").unwrap(), Configuration::default());
        let development = Configuration::parse("development").unwrap();
        assert_eq!(development.public_api, Check::Throw(ExceptionKind::Assertion));
        assert_eq!(development.private_api, Check::Throw(ExceptionKind::Assertion));
        assert!(development.enabled);
        assert!(!Configuration::parse("disabled").unwrap().enabled);
    }

    #[test]
    fn custom_configuration() {
        let config =
            Configuration::parse("exceptionKind=NullPointer:messageTemplate={parameter} is null: really")
                .unwrap();
        assert_eq!(config.check_for(true), Check::Throw(ExceptionKind::NullPointer));
        assert_eq!(config.check_for(false), Check::Throw(ExceptionKind::NullPointer));
        assert!(config.enabled);
        assert_eq!(config.message_template, "{parameter} is null: really");
        assert_eq!(config.render_message(&context()), "name is null: really");
    }

    #[test]
    fn separate_public_and_private_checks() {
        let config =
            Configuration::parse("publicApi=NullPointer:privateApi=ConditionalAssertion").unwrap();
        assert_eq!(config.check_for(true), Check::Throw(ExceptionKind::NullPointer));
        assert_eq!(config.check_for(false), Check::ConditionalAssertion);
        assert_eq!(
            Check::ConditionalAssertion.exception_kind(),
            Some(ExceptionKind::Assertion)
        );

        let public_only = Configuration::parse("publicApi=IllegalArgument").unwrap();
        assert_eq!(public_only.check_for(false), Check::NoCheck);
        assert_eq!(Check::NoCheck.exception_kind(), None);
    }

    #[test]
    fn config_string_round_trip() {
        for preset in Preset::ALL {
            let config = preset.configuration();
            assert_eq!(Configuration::parse(&config.to_config_string()).unwrap(), config);
        }
        let config = Configuration::new(
            Check::Throw(ExceptionKind::NullPointer),
            Check::ConditionalAssertion,
            "{class}#{method}: {index}",
            true,
        )
        .unwrap();
        assert_eq!(Configuration::parse(&config.to_config_string()).unwrap(), config);
    }

    #[test]
    fn standard_message() {
        let message = Configuration::default().render_message(&context());
        assert_eq!(
            message,
            "parameter 'name' must not be null in com.example.Widget.rename(ILjava/lang/String;)V"
        );
    }

    #[test]
    fn invalid_configurations() {
        assert_eq!(
            Configuration::parse("exceptionKind=Runtime"),
            Err(ConfigError::BadValue {
                key: "exceptionKind".to_owned(),
                value: "Runtime".to_owned()
            })
        );
        assert_eq!(
            Configuration::parse("exceptionKind=NullPointer:exceptionKind=Assertion"),
            Err(ConfigError::DuplicateKey("exceptionKind".to_owned()))
        );
        assert_eq!(
            Configuration::parse("enabled=false"),
            Err(ConfigError::MissingCheck("enabled=false".to_owned()))
        );
        assert_eq!(
            Configuration::parse("exceptionKind=NullPointer:privateApi=NoCheck"),
            Err(ConfigError::DuplicateKey("exceptionKind".to_owned()))
        );
        assert!(matches!(
            Configuration::parse("publicApi=Assert"),
            Err(ConfigError::BadValue { .. })
        ));
        assert_eq!(
            Configuration::parse("exceptionKind=NullPointer:verbose=yes"),
            Err(ConfigError::UnknownKey("verbose".to_owned()))
        );
        assert_eq!(
            Configuration::parse("exceptionKind=NullPointer:messageTemplate={param}"),
            Err(ConfigError::UnknownPlaceholder("param".to_owned()))
        );
        assert!(matches!(
            Configuration::parse("exceptionKind=NullPointer:messageTemplate={class"),
            Err(ConfigError::UnterminatedPlaceholder(_))
        ));
        assert!(matches!(
            Configuration::parse("nonsense"),
            Err(ConfigError::MalformedEntry(_))
        ));
    }
}
