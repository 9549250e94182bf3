//! Command framer: discrete command results out of an unframed shell stream.
//!
//! The interactive shell offers no request/response framing. A command is
//! written as a line; completion is inferred by recognizing the command's
//! own echo in the output stream, then a known prompt pattern after it.
//! Everything between the echo line and the prompt is the result.
//!
//! The reader runs as an explicit state machine: `AwaitingEcho` until the
//! echo is located (bytes before it are stale output from earlier commands
//! and are discarded), `Collecting` until a prompt match, then `Complete`.
//! The per-command deadline is the only cancellation mechanism; a frame
//! abandoned mid-read leaves the shell session in an undefined state, and
//! the session must be reconnected before it is used again.

mod prompts;

pub use prompts::{EXEC_PROMPT, RUN_SHELL_PROMPT, SYSADMIN_PROMPT, find_prompt};

use std::time::Duration;

use bytes::BytesMut;
use log::{debug, error, warn};
use regex::bytes::Regex;

use crate::error::{FramerError, Result};
use crate::logging::SessionLog;
use crate::transport::ShellStream;

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Reader states while a frame is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    /// The command was sent; its echo has not appeared yet.
    AwaitingEcho,
    /// The echo was found; accumulating the reply until a prompt.
    Collecting,
    /// A prompt terminated the reply.
    Complete,
}

/// Send one command line and return its framed result.
///
/// Writes `command` plus a newline to the shell, reads until a recognized
/// prompt follows the command's echo, and returns the reply with the echo
/// line, the trailing prompt, and all carriage returns removed.
///
/// When a [`SessionLog`] is attached, the sent command and the framed
/// result are appended to it whether or not the caller keeps the result;
/// log append failures are logged and never fail the command.
pub async fn send_command<S: ShellStream>(
    stream: &mut S,
    command: &str,
    timeout: Duration,
    log: Option<&SessionLog>,
) -> Result<Vec<u8>> {
    let start_pattern = start_pattern(command)?;

    if let Some(log) = log {
        if let Err(e) = log.append(format!("=========> {command}\n").as_bytes()).await {
            warn!("failed to append command to session log: {e}");
        }
    }

    debug!("sending {:?}", command);
    stream.write(format!("{command}\n").as_bytes()).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut buffer = BytesMut::with_capacity(4096);
    let mut state = FramerState::AwaitingEcho;
    let mut echo_seen = false;
    let mut prompt_seen = false;

    while state != FramerState::Complete {
        let chunk = match tokio::time::timeout_at(deadline, stream.read_chunk()).await {
            Ok(chunk) => chunk?,
            Err(_) => {
                error!(
                    "reply buffer at timeout for {:?}: {:?}",
                    command,
                    String::from_utf8_lossy(&buffer)
                );
                return Err(FramerError::Timeout {
                    command: command.to_string(),
                    timeout,
                    echo_seen,
                    prompt_seen,
                }
                .into());
            }
        };
        buffer.extend_from_slice(&chunk);

        if state == FramerState::AwaitingEcho {
            if let Some(echo_start) = start_pattern.find(&buffer).map(|m| m.start()) {
                // Everything before the echo is stale output from a prior
                // command and must not contaminate this result.
                let _ = buffer.split_to(echo_start);
                echo_seen = true;
                state = FramerState::Collecting;
            }
        }

        if state == FramerState::Collecting && prompts::find_prompt(&buffer).is_some() {
            prompt_seen = true;
            state = FramerState::Complete;
        }
    }

    let framed = frame_result(&buffer, command, &start_pattern)?;

    if let Some(log) = log {
        if let Err(e) = log.append(&framed).await {
            warn!("failed to append result to session log: {e}");
        } else if let Err(e) = log.append(b"\n\n").await {
            warn!("failed to append result to session log: {e}");
        }
    }

    Ok(framed)
}

/// Derive the echo start-pattern from the command's leading token.
///
/// The token is regex-escaped so shell-meaningful characters (`|`, `\`)
/// cannot corrupt the match.
fn start_pattern(command: &str) -> std::result::Result<Regex, FramerError> {
    let first = command.split_whitespace().next().unwrap_or(command);
    Regex::new(&regex::escape(first)).map_err(|e| FramerError::StartPattern {
        command: command.to_string(),
        source: e,
    })
}

/// Trim a completed frame: drop carriage returns, the echo line, and the
/// trailing prompt.
fn frame_result(
    buffer: &[u8],
    command: &str,
    start_pattern: &Regex,
) -> std::result::Result<Vec<u8>, FramerError> {
    // Routers terminate lines with CRLF; the CR bytes are pure noise.
    let clean: Vec<u8> = buffer.iter().copied().filter(|&b| b != b'\r').collect();

    let echo = start_pattern
        .find(&clean)
        .ok_or_else(|| FramerError::EchoNotFound {
            command: command.to_string(),
        })?;
    let body_start = memchr::memchr(b'\n', &clean[echo.start()..])
        .map(|i| echo.start() + i + 1)
        .unwrap_or(clean.len());

    let (prompt_start, _) =
        prompts::find_prompt(&clean).ok_or_else(|| FramerError::PromptNotFound {
            command: command.to_string(),
        })?;

    if prompt_start <= body_start {
        // Prompt directly after the echo line: empty reply.
        return Ok(Vec::new());
    }

    Ok(clean[body_start..prompt_start].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;

    struct ScriptedStream {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }

    impl ScriptedStream {
        fn new<I: IntoIterator<Item = &'static [u8]>>(chunks: I) -> Self {
            Self {
                chunks: chunks.into_iter().map(|c| c.to_vec()).collect(),
                written: Vec::new(),
            }
        }
    }

    impl ShellStream for ScriptedStream {
        async fn write(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        async fn read_chunk(&mut self) -> Result<Vec<u8>> {
            match self.chunks.pop_front() {
                Some(chunk) => Ok(chunk),
                // Out of script: behave like a silent router.
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_frame_excludes_echo_prompt_and_cr() {
        let mut stream = ScriptedStream::new([
            b"show interfaces brief\r\n".as_slice(),
            b"line one\r\nline two\r\nline three\r\n",
            b"RP/0/RP0/CPU0:core-1#",
        ]);
        let result = send_command(&mut stream, "show interfaces brief", DEFAULT_COMMAND_TIMEOUT, None)
            .await
            .unwrap();
        assert_eq!(result, b"line one\nline two\nline three\n");
        assert_eq!(stream.written, b"show interfaces brief\n");
    }

    #[tokio::test]
    async fn test_stale_output_before_echo_is_discarded() {
        let mut stream = ScriptedStream::new([
            b"leftover junk from before\nRP/0/RP0/CPU0:core-1#show clock\n".as_slice(),
            b"12:00:00.000 UTC\n",
            b"RP/0/RP0/CPU0:core-1#",
        ]);
        let result = send_command(&mut stream, "show clock", DEFAULT_COMMAND_TIMEOUT, None)
            .await
            .unwrap();
        assert_eq!(result, b"12:00:00.000 UTC\n");
    }

    #[tokio::test]
    async fn test_empty_reply() {
        let mut stream = ScriptedStream::new([
            b"terminal length 0\nRP/0/RP0/CPU0:core-1#".as_slice(),
        ]);
        let result = send_command(&mut stream, "terminal length 0", DEFAULT_COMMAND_TIMEOUT, None)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_sysadmin_prompt_completes_frame() {
        let mut stream = ScriptedStream::new([
            b"show platform\nsome admin output\nsysadmin-vm:0_RP0#".as_slice(),
        ]);
        let result = send_command(&mut stream, "show platform", DEFAULT_COMMAND_TIMEOUT, None)
            .await
            .unwrap();
        assert_eq!(result, b"some admin output\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_echo_and_prompt_state() {
        let mut stream = ScriptedStream::new([b"show tech\npartial output...\n".as_slice()]);
        let err = send_command(&mut stream, "show tech", Duration::from_secs(5), None)
            .await
            .unwrap_err();
        match err {
            Error::Framer(FramerError::Timeout {
                echo_seen,
                prompt_seen,
                ..
            }) => {
                assert!(echo_seen);
                assert!(!prompt_seen);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_before_echo() {
        let mut stream = ScriptedStream::new(Vec::new());
        let err = send_command(&mut stream, "show clock", Duration::from_secs(1), None)
            .await
            .unwrap_err();
        match err {
            Error::Framer(FramerError::Timeout {
                echo_seen,
                prompt_seen,
                ..
            }) => {
                assert!(!echo_seen);
                assert!(!prompt_seen);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_start_pattern_escapes_shell_characters() {
        let pattern = start_pattern(r"show controllers npu | include DROP").unwrap();
        assert!(pattern.is_match(b"show controllers npu | include DROP"));

        let pattern = start_pattern(r"run\some_tool -w 0").unwrap();
        assert!(pattern.is_match(br"run\some_tool -w 0"));
    }
}
