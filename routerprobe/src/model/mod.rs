//! Declarative command and test model.
//!
//! The diagnostic run is described by a YAML specification: the main
//! command group, optional collect/repro mode toggles, and a set of
//! tests keyed by command. This module owns the parsed in-memory
//! structures; the core never touches the serialization format again
//! after [`Commander::load`].
//!
//! Every regular expression is compiled here, at load time, and the
//! compiled matcher stored unconditionally alongside its source. A test
//! whose pattern does not compile is dropped with a warning; sibling
//! tests survive. All other validation failures are hard errors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use log::warn;
use regex::bytes::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// A regular expression together with its compiled matcher.
///
/// Deserializes from the YAML form `{ pattern_string: "..." }`; a
/// compile failure at this level (command patterns) fails the load.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern from its source text.
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let regex = Regex::new(&source)?;
        Ok(Self { source, regex })
    }

    /// The pattern's source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The compiled matcher.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = PatternSource::deserialize(deserializer)?;
        Pattern::new(raw.pattern_string).map_err(serde::de::Error::custom)
    }
}

/// Uncompiled pattern text, as written in the specification.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternSource {
    pub pattern_string: String,
}

/// One configured CLI command.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    /// The command text.
    #[serde(rename = "command")]
    pub cmd: String,

    /// Per-command timeout in seconds; 0 uses the framer default.
    #[serde(default, rename = "command_timeout")]
    pub timeout: u64,

    /// Repetition count; 0 or 1 executes once.
    #[serde(default)]
    pub times: u32,

    /// Seconds between repetitions.
    #[serde(default)]
    pub interval: u64,

    /// Seconds to wait before issuing the command.
    #[serde(default)]
    pub wait_before: u64,

    /// Seconds to wait after the command completes.
    #[serde(default)]
    pub wait_after: u64,

    /// Abstract or concrete location tokens to fan out over.
    #[serde(default)]
    pub location: Vec<String>,

    /// Template transforming a slot before substitution, e.g.
    /// `"0/{{ slot }}/CPU0"`.
    #[serde(default)]
    pub location_format: Option<String>,

    /// When set, the whole command line is a template over
    /// `{{ location }}` instead of getting a trailing `location X`.
    #[serde(default)]
    pub location_customized: bool,

    /// Output filter appended as `| <modifier>`.
    #[serde(default)]
    pub pipe_modifier: Option<String>,

    /// Per-command verbose logging.
    #[serde(default)]
    pub debug: bool,

    /// Overrides the group's result-processing default.
    #[serde(default)]
    pub process_result: bool,

    /// Observational patterns reported against this command's output.
    #[serde(default)]
    pub patterns: Vec<Pattern>,

    /// Tests to run against this command's output. Empty runs every
    /// test defined for the command.
    #[serde(default, rename = "command_test_ids")]
    pub test_ids: Vec<u32>,
}

/// One command execution's output: the actually-sent text and the raw
/// framed result. One instance per location × repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub cmd: String,
    pub result: Vec<u8>,
}

/// Field comparison operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CompareWithPreviousEq,
    CompareWithPreviousNeq,
    CompareWithValueEq,
    CompareWithValueNeq,
    ContainSubstring,
    NotContainSubstring,
}

impl Operation {
    /// Whether the operation compares against a configured literal.
    pub fn needs_value(&self) -> bool {
        !matches!(
            self,
            Operation::CompareWithPreviousEq | Operation::CompareWithPreviousNeq
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CompareWithPreviousEq => "compare_with_previous_eq",
            Operation::CompareWithPreviousNeq => "compare_with_previous_neq",
            Operation::CompareWithValueEq => "compare_with_value_eq",
            Operation::CompareWithValueNeq => "compare_with_value_neq",
            Operation::ContainSubstring => "contain_substring",
            Operation::NotContainSubstring => "not_contain_substring",
        };
        f.write_str(name)
    }
}

/// One field check inside a test.
#[derive(Debug, Clone, Deserialize)]
pub struct Field {
    /// 1-based field index after separator splitting.
    pub field_number: usize,

    /// Comparison operation.
    pub operation: Operation,

    /// Literal comparison value, where the operation takes one.
    #[serde(default)]
    pub value: Option<String>,
}

/// A test as written in the specification, before pattern compilation.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSpec {
    pub id: u32,
    pub pattern: PatternSource,
    #[serde(default)]
    pub occurrence: usize,
    #[serde(default)]
    pub number_of_occurrences: Option<usize>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub separator: String,
    #[serde(default)]
    pub check_all_results: bool,
    #[serde(default)]
    pub if_triggered_commands: Vec<Command>,
}

/// A compiled, validated test.
#[derive(Debug, Clone)]
pub struct Test {
    pub id: u32,
    pub pattern: Pattern,
    /// 1-based occurrence under test; 0 means every occurrence.
    pub occurrence: usize,
    /// Exact expected occurrence count; a mismatch triggers by itself.
    pub number_of_occurrences: Option<usize>,
    pub fields: Vec<Field>,
    pub separator: String,
    /// AND semantics across occurrences and fields when set.
    pub check_all_results: bool,
    /// Follow-up commands run immediately on trigger.
    pub if_triggered_commands: Vec<Command>,
}

/// Tests declared for one command.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSet {
    #[serde(rename = "command")]
    pub cmd: String,
    #[serde(rename = "command_tests")]
    pub source: Vec<TestSpec>,
}

/// Repro-mode settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Repro {
    /// Iteration count; 0 runs once.
    #[serde(default)]
    pub times: u32,

    /// Seconds between iterations.
    #[serde(default)]
    pub interval: u64,

    /// Post-mortem command group run once after any trigger.
    #[serde(default)]
    pub if_triggered_commands: Vec<Command>,

    /// Stop iterating after the first trigger.
    #[serde(default)]
    pub stop_when_triggered: bool,
}

/// Collect-mode settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Collect {
    /// Evaluate patterns/tests observationally.
    #[serde(default)]
    pub process_result: bool,
}

/// Root of the declarative specification.
#[derive(Debug, Clone, Deserialize)]
pub struct Commander {
    #[serde(default)]
    pub repro: Option<Repro>,

    #[serde(default)]
    pub collect: Option<Collect>,

    #[serde(default)]
    tests: Vec<TestSet>,

    #[serde(rename = "commands")]
    pub main_command_group: Vec<Command>,

    /// Compiled tests indexed per command text; built at load.
    #[serde(skip)]
    tests_by_command: HashMap<String, BTreeMap<u32, Test>>,
}

impl Commander {
    /// Load and validate a specification file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a specification from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut commander: Commander = serde_yaml::from_str(text)?;
        commander.compile_tests()?;
        Ok(commander)
    }

    /// Validate field checks and compile every test pattern.
    ///
    /// Field validation failures are hard errors; a pattern that does
    /// not compile only drops its own test.
    fn compile_tests(&mut self) -> Result<(), ConfigError> {
        let mut by_command: HashMap<String, BTreeMap<u32, Test>> = HashMap::new();
        for set in &self.tests {
            for spec in &set.source {
                for field in &spec.fields {
                    if field.field_number == 0 {
                        return Err(ConfigError::BadFieldNumber {
                            field_number: field.field_number,
                        });
                    }
                    if field.operation.needs_value() && field.value.is_none() {
                        return Err(ConfigError::MissingValue {
                            operation: field.operation.to_string(),
                            field_number: field.field_number,
                        });
                    }
                }

                let pattern = match Pattern::new(&spec.pattern.pattern_string) {
                    Ok(pattern) => pattern,
                    Err(e) => {
                        warn!(
                            "skipping test id {} for command {:?}: invalid pattern {:?}: {e}",
                            spec.id, set.cmd, spec.pattern.pattern_string
                        );
                        continue;
                    }
                };

                by_command.entry(set.cmd.clone()).or_default().insert(
                    spec.id,
                    Test {
                        id: spec.id,
                        pattern,
                        occurrence: spec.occurrence,
                        number_of_occurrences: spec.number_of_occurrences,
                        fields: spec.fields.clone(),
                        separator: spec.separator.clone(),
                        check_all_results: spec.check_all_results,
                        if_triggered_commands: spec.if_triggered_commands.clone(),
                    },
                );
            }
        }
        self.tests_by_command = by_command;
        Ok(())
    }

    /// The compiled tests declared for a command, if any.
    pub fn tests_for(&self, cmd: &str) -> Option<&BTreeMap<u32, Test>> {
        self.tests_by_command.get(cmd)
    }
}
