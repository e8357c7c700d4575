//! Output formatting

use crate::bridge::ScriptValue;
use crate::output::human::format_human;
use crate::output::json::format_json;
use crate::security::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Something the CLI reports
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Result of an evaluation or script run
    Value(ScriptValue),
    AllowList { profile: Profile, names: Vec<String> },
    /// Pre-flight analysis of a script file
    Check {
        path: String,
        outline: Vec<String>,
        issues: Vec<String>,
        passed: bool,
    },
    Message(String),
    Empty,
}

pub fn format_output(output: &Output, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(output),
        OutputFormat::Json => format_json(output),
    }
}
