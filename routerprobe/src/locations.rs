//! Location expander: abstract location tokens to concrete command lines.
//!
//! A command may name `all`, `all-rp`, `all-lc`, or explicit slots.
//! Expansion is driven by the router's one-time slot inventory and
//! recurses: `all` resolves to the RP and LC token classes, each expanded
//! in turn. `all-lc` falls back to the route processors on a chassis
//! without line cards.

use std::collections::HashSet;

use minijinja::{Environment, context};

use crate::error::ConfigError;
use crate::model::Command;
use crate::platform::Inventory;

/// Expand location tokens into concrete slots, deduplicated in order of
/// first appearance.
pub fn expand_tokens(tokens: &[String], inventory: &Inventory) -> Vec<String> {
    let mut slots = Vec::new();
    for token in tokens {
        match token.as_str() {
            "all" => slots.extend(expand_tokens(
                &["all-rp".to_string(), "all-lc".to_string()],
                inventory,
            )),
            "all-rp" => slots.extend(inventory.rps()),
            "all-lc" => slots.extend(inventory.lcs()),
            slot => slots.push(slot.to_string()),
        }
    }
    let mut seen = HashSet::new();
    slots.retain(|s| seen.insert(s.clone()));
    slots
}

/// Resolve a command into the concrete command lines to send.
///
/// Without locations this is the command itself (plus any pipe
/// modifier). With locations, each expanded slot produces one line:
/// either `<cmd> location <slot>`, or — when `location_customized` is
/// set — the whole command rendered as a template over `{{ location }}`.
/// An optional `location_format` template transforms each slot first,
/// receiving the numeric `{{ slot }}` component.
pub fn resolve(command: &Command, inventory: &Inventory) -> Result<Vec<String>, ConfigError> {
    let pipe = command
        .pipe_modifier
        .as_ref()
        .map(|m| format!(" | {m}"))
        .unwrap_or_default();

    if command.location.is_empty() {
        return Ok(vec![format!("{}{}", command.cmd, pipe)]);
    }

    let mut slots = expand_tokens(&command.location, inventory);
    if let Some(template) = &command.location_format {
        slots = slots
            .iter()
            .map(|slot| apply_format(template, slot))
            .collect::<Result<_, _>>()?;
    }

    let env = Environment::new();
    let mut lines = Vec::with_capacity(slots.len());
    for slot in &slots {
        let line = if command.location_customized {
            let rendered = env.render_str(&command.cmd, context! { location => slot })?;
            format!("{rendered}{pipe}")
        } else {
            format!("{} location {}{}", command.cmd, slot, pipe)
        };
        lines.push(line);
    }
    Ok(lines)
}

/// Render a slot through the location-format template.
fn apply_format(template: &str, location: &str) -> Result<String, ConfigError> {
    let slot = slot_number(location)?;
    let env = Environment::new();
    Ok(env.render_str(template, context! { slot => slot })?)
}

/// The numeric slot component of an `r/s/cpu` location.
fn slot_number(location: &str) -> Result<i64, ConfigError> {
    let parts: Vec<&str> = location.split('/').collect();
    if parts.len() < 3 {
        return Err(ConfigError::BadLocation {
            location: location.to_string(),
        });
    }
    parts[1].parse().map_err(|_| ConfigError::BadLocation {
        location: location.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modular_inventory() -> Inventory {
        Inventory::parse(
            b"0/RP0/CPU0        NC55-RP-E(Active)          IOS XR RUN        NSHUT
0/RP1/CPU0        NC55-RP-E(Standby)         IOS XR RUN        NSHUT
0/0/CPU0          NC55-36X100G-A-SE          IOS XR RUN        NSHUT
0/2/CPU0          NC57-24DD                  IOS XR RUN        NSHUT
",
        )
        .unwrap()
    }

    fn fixed_inventory() -> Inventory {
        Inventory::parse(b"0/RP0/CPU0        8201-32FH(Active)        IOS XR RUN   NSHUT\n")
            .unwrap()
    }

    fn command(cmd: &str) -> Command {
        serde_yaml::from_str(&format!("command: \"{cmd}\"")).unwrap()
    }

    #[test]
    fn test_expand_all() {
        let inv = modular_inventory();
        assert_eq!(
            expand_tokens(&["all".to_string()], &inv),
            vec!["0/RP0/CPU0", "0/RP1/CPU0", "0/0/CPU0", "0/2/CPU0"]
        );
    }

    #[test]
    fn test_expand_rp_and_lc_classes() {
        let inv = modular_inventory();
        assert_eq!(
            expand_tokens(&["all-rp".to_string()], &inv),
            vec!["0/RP0/CPU0", "0/RP1/CPU0"]
        );
        assert_eq!(
            expand_tokens(&["all-lc".to_string()], &inv),
            vec!["0/0/CPU0", "0/2/CPU0"]
        );
    }

    #[test]
    fn test_expand_explicit_slot_passes_through() {
        let inv = modular_inventory();
        assert_eq!(
            expand_tokens(&["0/2/CPU0".to_string()], &inv),
            vec!["0/2/CPU0"]
        );
    }

    #[test]
    fn test_expand_lc_fallback_without_line_cards() {
        let inv = fixed_inventory();
        assert_eq!(
            expand_tokens(&["all-lc".to_string()], &inv),
            vec!["0/RP0/CPU0"]
        );
        // `all` on the same chassis does not duplicate the RP.
        assert_eq!(expand_tokens(&["all".to_string()], &inv), vec!["0/RP0/CPU0"]);
    }

    #[test]
    fn test_resolve_appends_location_clause() {
        let inv = modular_inventory();
        let mut cmd = command("show controllers npu stats");
        cmd.location = vec!["all-lc".to_string()];
        assert_eq!(
            resolve(&cmd, &inv).unwrap(),
            vec![
                "show controllers npu stats location 0/0/CPU0",
                "show controllers npu stats location 0/2/CPU0",
            ]
        );
    }

    #[test]
    fn test_resolve_without_locations() {
        let inv = modular_inventory();
        let cmd = command("show clock");
        assert_eq!(resolve(&cmd, &inv).unwrap(), vec!["show clock"]);
    }

    #[test]
    fn test_resolve_pipe_modifier() {
        let inv = modular_inventory();
        let mut cmd = command("show logging");
        cmd.pipe_modifier = Some("include ERROR".to_string());
        assert_eq!(
            resolve(&cmd, &inv).unwrap(),
            vec!["show logging | include ERROR"]
        );
    }

    #[test]
    fn test_resolve_location_format_template() {
        let inv = modular_inventory();
        let mut cmd = command("show asic-errors all detail");
        cmd.location = vec!["all-lc".to_string()];
        cmd.location_format = Some("0/{{ slot }}/CPU0".to_string());
        assert_eq!(
            resolve(&cmd, &inv).unwrap(),
            vec![
                "show asic-errors all detail location 0/0/CPU0",
                "show asic-errors all detail location 0/2/CPU0",
            ]
        );
    }

    #[test]
    fn test_resolve_customized_command_template() {
        let inv = modular_inventory();
        let mut cmd = command("run on -f node{{ location }} pcie_cfrw -w 0");
        cmd.location = vec!["0_RP0_CPU0".to_string()];
        cmd.location_customized = true;
        assert_eq!(
            resolve(&cmd, &inv).unwrap(),
            vec!["run on -f node0_RP0_CPU0 pcie_cfrw -w 0"]
        );
    }

    #[test]
    fn test_slot_number_rejects_unknown_format() {
        assert!(slot_number("FC0").is_err());
        assert!(slot_number("0/RP0/CPU0").is_err());
        assert_eq!(slot_number("0/2/CPU0").unwrap(), 2);
    }
}
