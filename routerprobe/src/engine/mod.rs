//! Rule engine: declarative test evaluation over command results.
//!
//! A test names a pattern, an occurrence selector, and field checks.
//! Evaluation locates every non-overlapping pattern occurrence in a
//! command's raw result, extracts the configured fields from the
//! matched lines, and decides a trigger/no-trigger verdict. Extracted
//! values are kept per iteration so repro mode can compare a field
//! against its value from the previous pass.
//!
//! Each result of a fan-out (location × repetition) is evaluated
//! independently; the test triggers if any result triggers.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use crate::error::EngineError;
use crate::extract;
use crate::model::{CommandResult, Field, Operation, Test};

/// Extracted field values, per iteration.
///
/// Writes merge per field: recording a field never discards sibling
/// fields already stored for the same iteration.
#[derive(Debug, Clone, Default)]
pub struct ValuesStore {
    iterations: BTreeMap<usize, BTreeMap<usize, String>>,
}

impl ValuesStore {
    /// Record a field's value for an iteration.
    pub fn record(&mut self, iteration: usize, field_number: usize, value: String) {
        self.iterations
            .entry(iteration)
            .or_default()
            .insert(field_number, value);
    }

    /// Look up a field's value at an iteration.
    pub fn get(&self, iteration: usize, field_number: usize) -> Option<&str> {
        self.iterations
            .get(&iteration)
            .and_then(|fields| fields.get(&field_number))
            .map(String::as_str)
    }
}

/// Per-run test evaluator.
///
/// Owns the cross-iteration value history for every (command, test)
/// pair. Confined to the single worker evaluating its router; nothing
/// here is shared across routers.
#[derive(Debug, Default)]
pub struct Evaluator {
    stores: HashMap<(String, u32), ValuesStore>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one test against one command's results for an iteration.
    ///
    /// `cmd` is the configured command text the test is keyed under (the
    /// results may carry location-expanded variants of it).
    pub fn run_test(
        &mut self,
        cmd: &str,
        results: &[CommandResult],
        test: &Test,
        iteration: usize,
    ) -> Result<bool, EngineError> {
        let store = self
            .stores
            .entry((cmd.to_string(), test.id))
            .or_default();

        for result in results {
            debug!("executing test id {} for command {:?}", test.id, result.cmd);

            let matches: Vec<(usize, usize)> = test
                .pattern
                .regex()
                .find_iter(&result.result)
                .map(|m| (m.start(), m.end()))
                .collect();

            if matches.is_empty() {
                debug!(
                    "test id {}: pattern {:?} not found in result of {:?}",
                    test.id,
                    test.pattern.source(),
                    result.cmd
                );
                continue;
            }

            // An exact-count test is a pure count assertion: a mismatch is
            // the anomaly, a match satisfies the test for this result.
            if let Some(expected) = test.number_of_occurrences {
                if expected != matches.len() {
                    info!(
                        "test id {}: expected {} occurrence(s) of {:?}, found {}",
                        test.id,
                        expected,
                        test.pattern.source(),
                        matches.len()
                    );
                    return Ok(true);
                }
                continue;
            }

            if test.occurrence > matches.len() {
                // The requested occurrence does not exist; its absence is
                // not itself anomalous.
                warn!(
                    "test id {}: requested occurrence {} exceeds {} match(es)",
                    test.id,
                    test.occurrence,
                    matches.len()
                );
                return Ok(false);
            }

            if test.fields.is_empty() {
                return Ok(true);
            }

            let range = if test.occurrence > 0 {
                test.occurrence - 1..test.occurrence
            } else {
                0..matches.len()
            };

            if test.check_all_results {
                let mut unanimous = true;
                for idx in range {
                    for field in &test.fields {
                        let value = extract::field_value(
                            &result.result,
                            matches[idx],
                            field.field_number,
                            &test.separator,
                        )?;
                        store.record(iteration, field.field_number, value);
                        if !check_field(field, iteration, store) {
                            unanimous = false;
                        }
                    }
                }
                if unanimous {
                    return Ok(true);
                }
            } else {
                for idx in range {
                    for field in &test.fields {
                        let value = extract::field_value(
                            &result.result,
                            matches[idx],
                            field.field_number,
                            &test.separator,
                        )?;
                        store.record(iteration, field.field_number, value);
                        if check_field(field, iteration, store) {
                            return Ok(true);
                        }
                    }
                }
            }
        }

        Ok(false)
    }

    /// The value history of a (command, test) pair, if any was recorded.
    pub fn values(&self, cmd: &str, test_id: u32) -> Option<&ValuesStore> {
        self.stores.get(&(cmd.to_string(), test_id))
    }
}

/// Apply one field's comparison against the value history.
///
/// Compare-with-previous operations are defined to never trigger at
/// iteration 0, and do not trigger when the previous iteration recorded
/// no value for the field.
fn check_field(field: &Field, iteration: usize, store: &ValuesStore) -> bool {
    let Some(current) = store.get(iteration, field.field_number) else {
        return false;
    };
    let previous = iteration
        .checked_sub(1)
        .and_then(|prev| store.get(prev, field.field_number));

    match field.operation {
        Operation::CompareWithPreviousNeq => {
            iteration > 0 && previous.is_some_and(|prev| prev != current)
        }
        Operation::CompareWithPreviousEq => {
            iteration > 0 && previous.is_some_and(|prev| prev == current)
        }
        Operation::CompareWithValueNeq => field.value.as_deref().is_some_and(|v| v != current),
        Operation::CompareWithValueEq => field.value.as_deref().is_some_and(|v| v == current),
        Operation::ContainSubstring => {
            field.value.as_deref().is_some_and(|v| current.contains(v))
        }
        Operation::NotContainSubstring => {
            field.value.as_deref().is_some_and(|v| !current.contains(v))
        }
    }
}
