//! Error types for routerprobe.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for routerprobe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Command framing errors
    #[error("Framer error: {0}")]
    Framer(#[from] FramerError),

    /// Platform inventory errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Rule engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Notification errors
    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),
}

/// Transport layer errors (SSH connection, authentication, shell channel).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Command framer errors (echo/prompt recognition on the raw stream).
#[derive(Error, Debug)]
pub enum FramerError {
    /// Neither the echo nor a prompt completed the frame in time.
    /// The flags record what the reader observed before the deadline.
    #[error(
        "timed out after {timeout:?} waiting for result of {command:?}, \
         echo found: {echo_seen}, prompt found: {prompt_seen}"
    )]
    Timeout {
        command: String,
        timeout: Duration,
        echo_seen: bool,
        prompt_seen: bool,
    },

    /// The command echo could not be located in the completed frame.
    #[error("failed to find echo of {command:?} in reply")]
    EchoNotFound { command: String },

    /// No recognized prompt terminates the completed frame.
    #[error("failed to find prompt after {command:?} in reply")]
    PromptNotFound { command: String },

    /// The derived echo start-pattern did not compile.
    #[error("invalid start pattern for {command:?}: {source}")]
    StartPattern {
        command: String,
        #[source]
        source: regex::Error,
    },
}

/// Platform inventory errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// The platform-status output named no route processors.
    #[error("no route processor found in platform output")]
    NoRouteProcessors,
}

/// Configuration errors (declarative command/test specification).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the specification file
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// YAML deserialization error
    #[error("invalid specification: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A command-level pattern did not compile
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A field comparison references no literal value
    #[error("operation {operation:?} on field {field_number} requires a value")]
    MissingValue {
        operation: String,
        field_number: usize,
    },

    /// Field numbers are 1-based
    #[error("invalid field number {field_number} (fields are numbered from 1)")]
    BadFieldNumber { field_number: usize },

    /// Location template rendering error
    #[error("location template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A location is not in the expected r/s/cpu form
    #[error("location {location:?} is in unknown format")]
    BadLocation { location: String },
}

/// Rule engine errors (test evaluation).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Field extraction failed
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Field extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The match span could not be bounded to a line
    #[error("failed to bound match at offset {offset} to a line")]
    LineBounds { offset: usize },

    /// The requested field does not exist after splitting
    #[error("field {field_number} not present in line {line:?}")]
    FieldOutOfRange { field_number: usize, line: String },

    /// The separator did not form a valid character class
    #[error("invalid separator {separator:?}: {source}")]
    Separator {
        separator: String,
        #[source]
        source: regex::Error,
    },
}

/// Notifier errors (best-effort delivery; callers log, never escalate).
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Malformed sender or recipient address
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// Message assembly error
    #[error("failed to build message: {0}")]
    Email(#[from] lettre::error::Error),

    /// SMTP delivery error
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The server address must carry an explicit port
    #[error("server address {0:?} must include an smtp port")]
    ServerAddress(String),

    /// The recipient list is empty
    #[error("destination email address list cannot be empty")]
    NoRecipients,
}

/// Result type alias using routerprobe's Error.
pub type Result<T> = std::result::Result<T, Error>;
