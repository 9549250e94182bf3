//! Known shell-prompt patterns marking command completion.
//!
//! The interactive CLI has no framing; the only signal that a command has
//! finished is one of the router's prompts appearing after the reply.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Normal exec prompt, e.g. `RP/0/RP0/CPU0:core-1#`.
pub static EXEC_PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)RP/\d+/(RP)?\d+/CPU\d+:[0-9A-Za-z\-._]+(\([0-9A-Za-z\-._]+\))?#(\n|$)")
        .expect("exec prompt pattern")
});

/// Admin-plane prompt, e.g. `sysadmin-vm:0_RP0#`.
pub static SYSADMIN_PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)sysadmin-vm:[0-9A-Za-z\-._]+#(\n|$)").expect("sysadmin prompt pattern")
});

/// Underlying shell prompt after `run`, e.g. `[node0_RP0_CPU0:~]$`.
pub static RUN_SHELL_PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\[[0-9A-Za-z\-._]+:~\]\$(\n|$)").expect("run shell prompt pattern")
});

/// Find the first prompt in the buffer, checking the prompt classes in
/// priority order: exec, sysadmin, run-shell. Returns the match span.
pub fn find_prompt(buffer: &[u8]) -> Option<(usize, usize)> {
    for pattern in [&*EXEC_PROMPT, &*SYSADMIN_PROMPT, &*RUN_SHELL_PROMPT] {
        if let Some(m) = pattern.find(buffer) {
            return Some((m.start(), m.end()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_prompt() {
        assert!(EXEC_PROMPT.is_match(b"RP/0/RP0/CPU0:core-1#\n"));
        assert!(EXEC_PROMPT.is_match(b"some output\nRP/0/RP1/CPU0:edge-2.lab#"));
        assert!(EXEC_PROMPT.is_match(b"RP/0/RP0/CPU0:core-1(config)#\n"));
        assert!(!EXEC_PROMPT.is_match(b"RP/0/RP0/CPU0:core-1"));
    }

    #[test]
    fn test_sysadmin_prompt() {
        assert!(SYSADMIN_PROMPT.is_match(b"sysadmin-vm:0_RP0#\n"));
        assert!(!SYSADMIN_PROMPT.is_match(b"sysadmin-vm:0_RP0$"));
    }

    #[test]
    fn test_run_shell_prompt() {
        assert!(RUN_SHELL_PROMPT.is_match(b"[node0_RP0_CPU0:~]$\n"));
        assert!(!RUN_SHELL_PROMPT.is_match(b"node0_RP0_CPU0:~$"));
    }

    #[test]
    fn test_find_prompt_returns_span() {
        let buffer = b"line one\nline two\nRP/0/RP0/CPU0:core-1#\n";
        let (start, _) = find_prompt(buffer).unwrap();
        assert_eq!(&buffer[..start], b"line one\nline two\n");
    }

    #[test]
    fn test_find_prompt_absent() {
        assert!(find_prompt(b"still streaming output").is_none());
    }
}
