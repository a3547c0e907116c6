use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::types::DeviceAction;

pub type Result<T> = std::result::Result<T, VmXmlError>;

#[derive(Debug, Error, Diagnostic)]
pub enum VmXmlError {
    // Usage errors
    #[error("One of {actions} must be specified.")]
    #[diagnostic(code(vmxml::usage::missing_action))]
    MissingAction { actions: String },

    #[error("Conflicting options {flags}")]
    #[diagnostic(code(vmxml::usage::conflicting_action))]
    ConflictingActions { flags: String },

    #[error("No change specified.")]
    #[diagnostic(
        code(vmxml::usage::no_change),
        help("pass one element option such as --disk, --network or --memory")
    )]
    NoChange,

    #[error("Only one change operation may be specified (conflicting options {flags})")]
    #[diagnostic(code(vmxml::usage::conflicting_change))]
    ConflictingChanges { flags: String },

    #[error("Cannot use {first} with {second}")]
    #[diagnostic(code(vmxml::usage::conflict))]
    ConflictingOptions { first: String, second: String },

    #[error("{message}")]
    #[diagnostic(code(vmxml::usage::unsupported))]
    Unsupported { message: String },

    #[error("Unknown OS name '{name}'")]
    #[diagnostic(
        code(vmxml::usage::os_variant),
        help("see `--os-variant list` for valid values")
    )]
    UnknownOsVariant { name: String },

    #[error("Unknown --{kind} options: [{options}]")]
    #[diagnostic(
        code(vmxml::usage::unknown_option),
        help("run `--{kind} help` to list the supported sub-options")
    )]
    UnknownOptions { kind: String, options: String },

    #[error("Invalid value '{value}' for --{kind} {option}: {reason}")]
    #[diagnostic(code(vmxml::usage::invalid_value))]
    InvalidOptionValue {
        kind: String,
        option: String,
        value: String,
        reason: String,
    },

    #[error("Error parsing --{kind} '{input}': {reason}")]
    #[diagnostic(code(vmxml::usage::option_syntax))]
    OptionSyntax {
        kind: String,
        input: String,
        reason: String,
    },

    // Lookup errors
    #[error("Could not find domain '{domain}': {detail}")]
    #[diagnostic(code(vmxml::lookup))]
    DomainNotFound { domain: String, detail: String },

    // Structural errors
    #[error("Invalid --{action} option '{value}'")]
    #[diagnostic(code(vmxml::select::invalid_index))]
    InvalidIndex { action: String, value: String },

    #[error("No --{kind} objects found in the XML")]
    #[diagnostic(code(vmxml::select::empty))]
    NoObjects { kind: String },

    #[error(
        "'--{action} {number}' requested but there {} only {max} --{kind} {} in the XML",
        is_or_are(.max),
        object_or_objects(.max)
    )]
    #[diagnostic(code(vmxml::select::out_of_range))]
    IndexOutOfRange {
        action: String,
        number: String,
        max: usize,
        kind: String,
    },

    #[error("No matching objects found for --{action} {selector}")]
    #[diagnostic(code(vmxml::select::no_match))]
    NoMatch { action: String, selector: String },

    #[error("Invalid XML path '{path}': {reason}")]
    #[diagnostic(code(vmxml::xpath))]
    InvalidPath { path: String, reason: String },

    // Hypervisor operation errors
    #[error("Error attempting device {action}: {detail}")]
    #[diagnostic(code(vmxml::hypervisor::device))]
    DeviceOperation { action: DeviceAction, detail: String },

    #[error("Failed to define domain '{domain}': {detail}")]
    #[diagnostic(code(vmxml::hypervisor::define))]
    DefineFailed { domain: String, detail: String },

    #[error("Failed starting domain '{domain}': {detail}")]
    #[diagnostic(code(vmxml::hypervisor::start))]
    StartFailed { domain: String, detail: String },

    #[error("{command} failed: {detail}")]
    #[diagnostic(code(vmxml::hypervisor::command))]
    CommandFailed { command: String, detail: String },

    #[error("failed to spawn {binary}")]
    #[diagnostic(
        code(vmxml::hypervisor::spawn),
        help("make sure the libvirt client tools are installed and on PATH")
    )]
    SpawnFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    // Storage
    #[error("Failed to create storage at {}: {detail}", .path.display())]
    #[diagnostic(code(vmxml::storage))]
    StorageCreationFailed { path: PathBuf, detail: String },

    // Plumbing
    #[error("XML parse error: {0}")]
    #[diagnostic(code(vmxml::xml::parse))]
    XmlParse(#[from] xmltree::ParseError),

    #[error("XML write error: {0}")]
    #[diagnostic(code(vmxml::xml::write))]
    XmlWrite(#[from] xmltree::Error),

    #[error("prompt failed: {0}")]
    #[diagnostic(code(vmxml::prompt))]
    Prompt(#[from] dialoguer::Error),

    #[error("Aborted at user request")]
    #[diagnostic(code(vmxml::aborted))]
    Aborted,

    #[error(transparent)]
    #[diagnostic(code(vmxml::io))]
    Io(#[from] std::io::Error),
}

fn is_or_are(count: &usize) -> &'static str {
    if *count == 1 { "is" } else { "are" }
}

fn object_or_objects(count: &usize) -> &'static str {
    if *count == 1 { "object" } else { "objects" }
}

impl VmXmlError {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        VmXmlError::Unsupported {
            message: message.into(),
        }
    }
}
