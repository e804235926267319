//! Error types for every fallible stage of the daemon: config parsing, packet
//! codec, and the router core's socket setup.

use thiserror::Error;

/// Errors produced while loading and validating a router's configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be opened or read.
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A line was neither a comment nor a well-formed `name value` pair.
    #[error("line {line}: malformed line, expected '<name> <value>'")]
    Syntax { line: usize },
    /// The same parameter name appeared twice.
    #[error("parameter '{0}' is defined more than once")]
    Duplicate(String),
    /// A required parameter was never defined.
    #[error("missing required parameter '{0}'")]
    Missing(&'static str),
    /// A value parsed but fell outside its legal range, or failed a
    /// cross-field constraint.
    #[error("parameter '{parameter}': {reason}")]
    Range { parameter: &'static str, reason: String },
    /// A port number appears in both `input-ports` and `outputs`.
    #[error("port {0} appears in both 'input-ports' and 'outputs'")]
    PortCollision(u16),
}

/// Errors produced by the wire codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// `encode` was given zero entries or more than 25.
    #[error("packet must carry between 1 and 25 entries, got {0}")]
    EntryCount(usize),
    /// A field does not fit in its wire width.
    #[error("value {value} does not fit in {bits} bits")]
    IntegerRange { value: u64, bits: u32 },
    /// `decode` was given a buffer shorter than the 4-byte header, or whose
    /// body is not a multiple of the 20-byte entry size.
    #[error("packet is truncated: {len} bytes")]
    PacketTruncated { len: usize },
}

/// Errors produced while standing up the router core's sockets.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Binding one of the configured input ports failed.
    #[error("failed to bind input port {port}: {source}")]
    PortInUse {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
