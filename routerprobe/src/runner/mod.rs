//! Orchestrator: collect and repro iteration control.
//!
//! Both modes share the same primitives. Collect runs the main command
//! group once, evaluating patterns and tests purely observationally.
//! Repro loops up to the configured iteration count, threading the
//! iteration index into the rule engine so cross-iteration comparisons
//! are meaningful; any trigger runs the post-mortem command group once,
//! and `stop_when_triggered` breaks the loop.
//!
//! On completion — triggered or not, success or error — the session log
//! is handed to the notifier. Notifier and logger failures are logged,
//! never escalated.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{error, info, warn};

use crate::device::Device;
use crate::engine::Evaluator;
use crate::error::Result;
use crate::extract;
use crate::model::{Command, Commander, CommandResult, Test};
use crate::notify::Notifier;

/// Run the full diagnostic sequence against one router.
///
/// Returns whether any test triggered. Framer and transport errors
/// terminate the run and propagate; the notification is still attempted
/// first.
pub async fn run<D: Device, N: Notifier>(
    device: &mut D,
    commander: &Commander,
    notifier: Option<&N>,
) -> Result<bool> {
    let outcome = drive(device, commander).await;

    if let Some(notifier) = notifier {
        match device.session_log() {
            Some(log) => match log.snapshot().await {
                Ok(content) => {
                    if let Err(e) = notifier.notify(log.file_name(), &content).await {
                        error!("router {}: failed to send log: {e}", device.name());
                    } else {
                        info!("router {}: sent session log", device.name());
                    }
                }
                Err(e) => error!("router {}: failed to read session log: {e}", device.name()),
            },
            None => warn!(
                "router {}: notification requested but no session log is attached",
                device.name()
            ),
        }
    }

    outcome
}

async fn drive<D: Device>(device: &mut D, commander: &Commander) -> Result<bool> {
    let (iterations, interval, stop_when_triggered) = match &commander.repro {
        Some(repro) => (repro.times.max(1) as usize, repro.interval, repro.stop_when_triggered),
        None => (1, 0, false),
    };
    info!(
        "router {}: command set will be executed {} time(s) with the interval of {} seconds",
        device.name(),
        iterations,
        interval
    );

    let mut evaluator = Evaluator::new();
    let mut ever_triggered = false;
    let mut post_mortem_done = false;

    for iteration in 0..iterations {
        if iterations > 1 {
            info!(
                "router {}: executing iteration - {}/{}",
                device.name(),
                iteration + 1,
                iterations
            );
        }

        let triggered =
            process_main_group(device, commander, &mut evaluator, iteration).await?;

        if triggered {
            ever_triggered = true;
            if let Some(repro) = &commander.repro {
                if !post_mortem_done {
                    info!(
                        "router {}: the failure condition was triggered, collecting post-mortem commands...",
                        device.name()
                    );
                    for command in &repro.if_triggered_commands {
                        device.process_command(command, true).await?;
                    }
                    post_mortem_done = true;
                }
            }
            if stop_when_triggered {
                break;
            }
        }

        if iterations > 1 {
            info!(
                "router {}: iteration - {}/{} completed",
                device.name(),
                iteration + 1,
                iterations
            );
        }
        if interval > 0 && iteration + 1 < iterations {
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    }

    if commander.repro.is_some() {
        if ever_triggered {
            info!(
                "router {}: repro succeeded triggering the failure condition",
                device.name()
            );
        } else {
            info!(
                "router {}: repro has not succeeded triggering the failure condition",
                device.name()
            );
        }
    }

    Ok(ever_triggered)
}

/// One pass over the main command group. Returns whether any test
/// triggered during the pass.
async fn process_main_group<D: Device>(
    device: &mut D,
    commander: &Commander,
    evaluator: &mut Evaluator,
    iteration: usize,
) -> Result<bool> {
    let group_process = commander.repro.is_some()
        || commander.collect.as_ref().is_some_and(|c| c.process_result);
    let stop_when_triggered = commander
        .repro
        .as_ref()
        .is_some_and(|r| r.stop_when_triggered);

    let mut triggered = false;
    for command in &commander.main_command_group {
        // The command's own flag overrides the group default.
        let process = command.process_result || group_process;
        let results = device.process_command(command, process).await?;

        if process && !command.patterns.is_empty() {
            for (pattern, lines) in &extract::match_lines(&results, &command.patterns) {
                info!(
                    "router {}: command {:?} pattern: {}",
                    device.name(),
                    command.cmd,
                    pattern
                );
                for line in lines {
                    info!("\t{line}");
                }
            }
        }

        if let Some(tests) = commander.tests_for(&command.cmd) {
            let triggers = run_tests(
                device,
                command,
                &results,
                tests,
                evaluator,
                iteration,
                stop_when_triggered,
            )
            .await?;
            if !triggers.is_empty() {
                info!(
                    "router {}: command {:?} triggered test ids: {:?}",
                    device.name(),
                    command.cmd,
                    triggers
                );
                triggered = true;
                if stop_when_triggered {
                    return Ok(true);
                }
            }
        }
    }

    Ok(triggered)
}

/// Run the selected tests for one command. A single test's evaluation
/// error is logged and does not stop its siblings; errors from follow-up
/// command execution are fatal and propagate.
async fn run_tests<D: Device>(
    device: &mut D,
    command: &Command,
    results: &[CommandResult],
    tests: &BTreeMap<u32, Test>,
    evaluator: &mut Evaluator,
    iteration: usize,
    stop_when_triggered: bool,
) -> Result<Vec<u32>> {
    let selected: Vec<u32> = if command.test_ids.is_empty() {
        tests.keys().copied().collect()
    } else {
        command.test_ids.clone()
    };

    let mut triggers = Vec::new();
    for id in selected {
        let Some(test) = tests.get(&id) else {
            warn!(
                "router {}: command {:?} references unknown test id {}",
                device.name(),
                command.cmd,
                id
            );
            continue;
        };

        let fired = match evaluator.run_test(&command.cmd, results, test, iteration) {
            Ok(fired) => fired,
            Err(e) => {
                error!(
                    "router {}: test id {} for command {:?} failed: {e}",
                    device.name(),
                    id,
                    command.cmd
                );
                continue;
            }
        };

        if fired {
            // Follow-ups run before the verdict propagates upward.
            for follow_up in &test.if_triggered_commands {
                device.process_command(follow_up, false).await?;
            }
            triggers.push(id);
            if stop_when_triggered {
                break;
            }
        }
    }

    Ok(triggers)
}
